//! Property-based tests for spawn ancestry

use chrono::Utc;
use proptest::prelude::*;
use proptest::sample::Index;
use reify::relation::{Relation, RelationProperties};
use reify::{RelationId, RelationshipIndex};

fn id(n: usize) -> RelationId {
    RelationId::parse(&format!("{:032x}", n + 1)).unwrap()
}

/// Random forest: relation `i` may have a parent among `0..i`
fn forest() -> impl Strategy<Value = Vec<Option<Index>>> {
    proptest::collection::vec(proptest::option::of(any::<Index>()), 1..40)
}

fn build(
    parents: &[Option<usize>],
    tombstoned: &[bool],
    depth: usize,
) -> RelationshipIndex {
    let mut index = RelationshipIndex::new(depth);
    for (i, parent) in parents.iter().enumerate() {
        let relation = Relation {
            id: id(i),
            properties: RelationProperties::tool(format!("tool-{}", i), &["t"]),
            parent_id: parent.map(id),
            auto_spawned: parent.is_some(),
            created_at: Utc::now(),
            content: None,
        };
        index.insert(relation, [i as u8; 32]);
    }
    for (i, dead) in tombstoned.iter().enumerate() {
        if *dead && i < parents.len() {
            index.mark_tombstoned(&id(i));
        }
    }
    index
}

proptest! {
    #[test]
    fn test_relation_never_its_own_ancestor(
        raw in forest(),
        tombstoned in proptest::collection::vec(any::<bool>(), 40),
        depth in 1usize..8,
    ) {
        let parents: Vec<Option<usize>> = raw
            .iter()
            .enumerate()
            .map(|(i, p)| if i == 0 { None } else { p.map(|idx| idx.index(i)) })
            .collect();
        let index = build(&parents, &tombstoned, depth);

        for i in 0..parents.len() {
            let me = id(i);
            prop_assert!(!index.ancestry_chain(&me).contains(&me));
            prop_assert!(index.ancestry_chain(&me).len() <= depth);

            let ancestors = index.ancestors(&me);
            prop_assert!(ancestors.len() <= depth);
            prop_assert!(ancestors.iter().all(|entry| entry.id() != &me && entry.live));

            // Walk the true chain, stopping at the first tombstoned ancestor
            let mut expected = Vec::new();
            let mut current = parents[i];
            while let Some(p) = current {
                if expected.len() == depth || tombstoned[p] {
                    break;
                }
                expected.push(id(p));
                current = parents[p];
            }
            let actual: Vec<RelationId> = ancestors.iter().map(|entry| entry.id().clone()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
