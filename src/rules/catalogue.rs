//! Built-in rules

use crate::error::RuleError;
use crate::relation::{ArtifactProperties, Relation, RelationKind, RelationProperties, ToolProperties};
use crate::rules::{RelationDraft, Rule, RuleContext, RuleOutcome, SimilarityLink};
use crate::similarity;
use std::collections::BTreeMap;

pub const SPAWN_VIEWER: &str = "spawn-viewer";
pub const SPAWN_DOCS: &str = "spawn-docs";
pub const LINK_SIMILAR: &str = "link-similar";

/// Ids of every built-in rule, in priority order
pub const BUILTIN_RULE_IDS: [&str; 3] = [SPAWN_VIEWER, SPAWN_DOCS, LINK_SIMILAR];

/// Extension key recording which relation a spawned child serves
pub const EXT_COMPANION_OF: &str = "companion-of";

pub fn builtin() -> Vec<Box<dyn Rule>> {
    vec![Box::new(SpawnViewer), Box::new(SpawnDocs), Box::new(LinkSimilar)]
}

/// Single-quote a word for sh; embedded quotes become `'\''`
fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', "'\\''"))
}

fn tool_properties(relation: &Relation) -> Option<&ToolProperties> {
    match &relation.properties {
        RelationProperties::Tool(props) => Some(props),
        _ => None,
    }
}

/// Analysis tools get a companion `view-{name}` tool
pub struct SpawnViewer;

impl SpawnViewer {
    pub const TRIGGER: &'static str = "analysis";

    pub fn viewer_name(tool: &str) -> String {
        format!("view-{}", tool)
    }

    /// POSIX sh script paging the parent tool's output
    ///
    /// Names may contain spaces and shell metacharacters, so every
    /// occurrence is single-quoted.
    pub fn render_script(tool: &str) -> Vec<u8> {
        format!(
            "#!/bin/sh\n# {viewer}: page the output of {tool}\n{tool} \"$@\" | ${{PAGER:-less}}\n",
            viewer = shell_quote(&Self::viewer_name(tool)),
            tool = shell_quote(tool),
        )
        .into_bytes()
    }
}

impl Rule for SpawnViewer {
    fn id(&self) -> &'static str {
        SPAWN_VIEWER
    }

    fn name(&self) -> &'static str {
        "Spawn viewer for analysis tools"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn condition(&self, relation: &Relation) -> bool {
        tool_properties(relation)
            .map_or(false, |props| props.transforms.iter().any(|t| t == Self::TRIGGER))
    }

    fn action(&self, relation: &Relation, _ctx: &RuleContext<'_>) -> Result<RuleOutcome, RuleError> {
        let tool = relation.name();
        let mut extensions = BTreeMap::new();
        extensions.insert(EXT_COMPANION_OF.to_string(), tool.to_string());

        Ok(RuleOutcome {
            spawn: vec![RelationDraft {
                properties: RelationProperties::Tool(ToolProperties {
                    name: Self::viewer_name(tool),
                    transforms: vec!["view".to_string(), "display".to_string()],
                    extensions,
                }),
                content: Some(Self::render_script(tool)),
            }],
            links: Vec::new(),
        })
    }
}

/// Tools with three or more transforms get a Markdown documentation artifact
pub struct SpawnDocs;

impl SpawnDocs {
    pub const MIN_TRANSFORMS: usize = 3;

    pub fn docs_name(tool: &str) -> String {
        format!("{}-docs", tool)
    }

    pub fn render_markdown(tool: &str, transforms: &[String]) -> Vec<u8> {
        let mut doc = format!("# {}\n\nGenerated documentation for the `{}` tool.\n\n## Transforms\n\n", tool, tool);
        for transform in transforms {
            doc.push_str(&format!("- {}\n", transform));
        }
        doc.push_str(&format!("\n## Usage\n\n```sh\n{} [args...]\n```\n", tool));
        doc.into_bytes()
    }
}

impl Rule for SpawnDocs {
    fn id(&self) -> &'static str {
        SPAWN_DOCS
    }

    fn name(&self) -> &'static str {
        "Spawn documentation for complex tools"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn condition(&self, relation: &Relation) -> bool {
        tool_properties(relation).map_or(false, |props| props.transforms.len() >= Self::MIN_TRANSFORMS)
    }

    fn action(&self, relation: &Relation, _ctx: &RuleContext<'_>) -> Result<RuleOutcome, RuleError> {
        let props = tool_properties(relation)
            .ok_or_else(|| RuleError::Action(format!("{} is not a tool", relation.id)))?;

        let mut extensions = BTreeMap::new();
        extensions.insert(EXT_COMPANION_OF.to_string(), props.name.clone());

        Ok(RuleOutcome {
            spawn: vec![RelationDraft {
                properties: RelationProperties::Artifact(ArtifactProperties {
                    name: Self::docs_name(&props.name),
                    subtype: "documentation".to_string(),
                    format: "markdown".to_string(),
                    extensions,
                }),
                content: Some(Self::render_markdown(&props.name, &props.transforms)),
            }],
            links: Vec::new(),
        })
    }
}

/// Records `similar_to` edges between tools with overlapping transforms
pub struct LinkSimilar;

impl Rule for LinkSimilar {
    fn id(&self) -> &'static str {
        LINK_SIMILAR
    }

    fn name(&self) -> &'static str {
        "Link tools with overlapping transforms"
    }

    fn priority(&self) -> u32 {
        30
    }

    fn condition(&self, relation: &Relation) -> bool {
        relation.kind() == RelationKind::Tool && !relation.transforms().is_empty()
    }

    fn action(&self, relation: &Relation, ctx: &RuleContext<'_>) -> Result<RuleOutcome, RuleError> {
        let mine = relation.transforms();
        let links = ctx
            .index
            .live_tools()
            .into_iter()
            .filter(|other| other.id != relation.id)
            .filter(|other| similarity::is_similar(mine, other.transforms(), ctx.similarity_threshold))
            .map(|other| SimilarityLink {
                target: other.id.clone(),
                weight: similarity::jaccard(mine, other.transforms()),
                shared: similarity::shared_tags(mine, other.transforms()),
            })
            .collect();

        Ok(RuleOutcome {
            spawn: Vec::new(),
            links,
        })
    }
}
