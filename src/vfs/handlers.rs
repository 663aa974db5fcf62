//! Built-in path handlers

use crate::error::ApiError;
use crate::index::{IndexEntry, RelationshipIndex};
use crate::relation::{RelationKind, RESERVED_TOOL_NAMES};
use crate::vfs::{not_found, PathHandler, VirtualNode};
use chrono::NaiveDate;

fn leaves<'a>(entries: impl IntoIterator<Item = &'a IndexEntry>) -> Vec<VirtualNode> {
    entries.into_iter().map(VirtualNode::relation_leaf).collect()
}

fn pick_leaf<'a>(
    entries: impl IntoIterator<Item = &'a IndexEntry>,
    name: &str,
) -> Option<Vec<VirtualNode>> {
    entries
        .into_iter()
        .find(|entry| entry.name() == name || entry.id().as_str() == name)
        .map(|entry| vec![VirtualNode::relation_leaf(entry)])
}

/// `/tools/...`: lineage, capability and similarity views
pub struct ToolsHandler;

impl ToolsHandler {
    fn relation_view(
        &self,
        entry: &IndexEntry,
        rest: &[&str],
        index: &RelationshipIndex,
    ) -> Option<Vec<VirtualNode>> {
        let executable = entry.relation.content.is_some();

        match rest {
            [] => {
                let mut nodes = vec![VirtualNode::named_leaf("definition", entry, entry.object)];
                if let (true, Some(content)) = (executable, entry.relation.content) {
                    nodes.push(VirtualNode::named_leaf("executable", entry, content));
                }
                nodes.push(VirtualNode::directory("parents"));
                nodes.push(VirtualNode::directory("spawned"));
                Some(nodes)
            }
            ["definition"] => Some(vec![VirtualNode::named_leaf("definition", entry, entry.object)]),
            ["executable"] => match (executable, entry.relation.content) {
                (true, Some(content)) => Some(vec![VirtualNode::named_leaf(entry.name(), entry, content)]),
                _ => None,
            },
            ["parents"] => Some(leaves(index.ancestors(entry.id()))),
            ["spawned"] => Some(leaves(index.children(entry.id()))),
            _ => None,
        }
    }
}

impl PathHandler for ToolsHandler {
    fn prefix(&self) -> &'static str {
        "tools"
    }

    fn resolve(&self, segments: &[&str], index: &RelationshipIndex) -> Result<Vec<VirtualNode>, ApiError> {
        let nodes = match segments {
            [] => {
                let mut nodes: Vec<VirtualNode> = RESERVED_TOOL_NAMES.iter().map(|v| VirtualNode::directory(*v)).collect();
                nodes.extend(
                    index
                        .by_name(Some(RelationKind::Tool))
                        .into_iter()
                        .map(VirtualNode::relation_directory),
                );
                Some(nodes)
            }

            ["by-name"] => Some(leaves(index.by_name(Some(RelationKind::Tool)))),
            ["by-name", name] => pick_leaf(index.by_name(Some(RelationKind::Tool)), name),

            ["by-transform"] => Some(
                index
                    .transforms()
                    .into_iter()
                    .map(VirtualNode::directory)
                    .collect(),
            ),
            ["by-transform", tag] => {
                let entries = index.by_transform(tag);
                if entries.is_empty() {
                    None
                } else {
                    Some(leaves(entries))
                }
            }
            ["by-transform", tag, name] => pick_leaf(index.by_transform(tag), name),

            ["spawned-by"] => Some(
                index
                    .spawners()
                    .into_iter()
                    .map(VirtualNode::relation_directory)
                    .collect(),
            ),
            ["spawned-by", parent] => index.resolve(parent).map(|entry| leaves(index.children(entry.id()))),
            ["spawned-by", parent, name] => index
                .resolve(parent)
                .and_then(|entry| pick_leaf(index.children(entry.id()), name)),

            ["similar"] => Some(
                index
                    .with_similar()
                    .into_iter()
                    .map(VirtualNode::relation_directory)
                    .collect(),
            ),
            ["similar", id] => index.resolve(id).map(|entry| {
                index
                    .similar_to(entry.id())
                    .into_iter()
                    .map(|neighbour| VirtualNode::relation_leaf(neighbour.entry))
                    .collect()
            }),

            ["ancestry"] => Some(leaves(index.with_live_parent())),
            ["ancestry", name] => pick_leaf(index.with_live_parent(), name),

            [relation, rest @ ..] => index
                .resolve(relation)
                .filter(|entry| entry.relation.kind() == RelationKind::Tool)
                .and_then(|entry| self.relation_view(entry, rest, index)),
        };

        nodes.ok_or_else(|| not_found(self.prefix(), segments))
    }
}

/// `/commands/...`: the PATH-oriented projection of tools
pub struct CommandsHandler;

impl PathHandler for CommandsHandler {
    fn prefix(&self) -> &'static str {
        "commands"
    }

    fn resolve(&self, segments: &[&str], index: &RelationshipIndex) -> Result<Vec<VirtualNode>, ApiError> {
        let commands = || {
            index
                .by_name(Some(RelationKind::Tool))
                .into_iter()
                .filter(|entry| entry.relation.content.is_some())
        };

        let nodes = match segments {
            [] => Some(leaves(commands())),
            [name] => commands()
                .find(|entry| entry.name() == *name)
                .map(|entry| vec![VirtualNode::relation_leaf(entry)]),
            _ => None,
        };

        nodes.ok_or_else(|| not_found(self.prefix(), segments))
    }
}

/// `/artifacts/...`: artifacts grouped by subtype
pub struct ArtifactsHandler;

impl PathHandler for ArtifactsHandler {
    fn prefix(&self) -> &'static str {
        "artifacts"
    }

    fn resolve(&self, segments: &[&str], index: &RelationshipIndex) -> Result<Vec<VirtualNode>, ApiError> {
        let nodes = match segments {
            [] => Some(index.subtypes().into_iter().map(VirtualNode::directory).collect()),
            [subtype] => {
                let entries = index.artifacts(subtype);
                if entries.is_empty() {
                    None
                } else {
                    Some(leaves(entries))
                }
            }
            [subtype, name] => pick_leaf(index.artifacts(subtype), name),
            _ => None,
        };

        nodes.ok_or_else(|| not_found(self.prefix(), segments))
    }
}

/// `/by-date/...`: relations and legacy objects by creation date
pub struct ByDateHandler;

impl ByDateHandler {
    pub const DATE_FORMAT: &'static str = "%Y-%m-%d";
}

impl PathHandler for ByDateHandler {
    fn prefix(&self) -> &'static str {
        "by-date"
    }

    fn resolve(&self, segments: &[&str], index: &RelationshipIndex) -> Result<Vec<VirtualNode>, ApiError> {
        let to_node = |item: crate::index::DatedItem| VirtualNode {
            name: item.name,
            relation_id: item.relation_id,
            object: item.object,
            kind: crate::vfs::NodeKind::Leaf,
        };

        let nodes = match segments {
            [] => Some(
                index
                    .dates()
                    .into_iter()
                    .map(|date| VirtualNode::directory(date.format(Self::DATE_FORMAT).to_string()))
                    .collect(),
            ),
            [date] => NaiveDate::parse_from_str(date, Self::DATE_FORMAT)
                .ok()
                .map(|date| index.on_date(date).into_iter().map(to_node).collect()),
            [date, name] => NaiveDate::parse_from_str(date, Self::DATE_FORMAT)
                .ok()
                .and_then(|date| index.on_date(date).into_iter().find(|item| item.name == *name))
                .map(|item| vec![to_node(item)]),
            _ => None,
        };

        nodes.ok_or_else(|| not_found(self.prefix(), segments))
    }
}
