//! Property-based tests for content addressing and normalization

use proptest::prelude::*;
use reify::object::{compute_object_hash, ObjectStore};
use reify::relation::normalize_tags;
use tempfile::TempDir;

/// Hashing is a pure function of the bytes
#[test]
fn test_object_hash_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(any::<Vec<u8>>(), any::<Vec<u8>>()),
            |(content1, content2)| {
                let hash1 = compute_object_hash(&content1);
                let hash2 = compute_object_hash(&content2);

                if content1 == content2 {
                    prop_assert_eq!(hash1, hash2);
                } else {
                    // Collisions are astronomically unlikely
                    prop_assert_ne!(hash1, hash2);
                }
                prop_assert_eq!(hash1, compute_object_hash(&content1));
                Ok(())
            },
        )
        .unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Storing the same bytes twice yields one object with the same hash
    #[test]
    fn test_put_dedups(content in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let temp_dir = TempDir::new().unwrap();
        let store = ObjectStore::new(temp_dir.path()).unwrap();

        let first = store.put(&content).unwrap();
        let second = store.put(&content).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(first, compute_object_hash(&content));
        prop_assert_eq!(store.list().unwrap().len(), 1);
        prop_assert_eq!(store.get_verified(&first).unwrap(), content);
    }

    /// Tag normalization is idempotent and yields unique lowercase tags
    #[test]
    fn test_normalize_tags_idempotent(tags in proptest::collection::vec("[a-zA-Z0-9 _-]{0,12}", 0..8)) {
        let once = normalize_tags(&tags);
        let twice = normalize_tags(&once);
        prop_assert_eq!(&once, &twice);

        for (i, tag) in once.iter().enumerate() {
            prop_assert!(!tag.is_empty());
            prop_assert_eq!(tag.trim(), tag.as_str());
            prop_assert_eq!(tag.to_lowercase(), tag.clone());
            prop_assert!(!once[i + 1..].contains(tag));
        }
    }
}
