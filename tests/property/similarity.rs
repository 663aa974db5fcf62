//! Property-based tests for Jaccard similarity

use proptest::prelude::*;
use reify::similarity::{is_similar, jaccard, shared_tags, SIMILARITY_THRESHOLD};

fn tags() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-f]{1,2}", 0..6)
}

proptest! {
    #[test]
    fn test_jaccard_symmetric_and_bounded(a in tags(), b in tags()) {
        let ab = jaccard(&a, &b);
        let ba = jaccard(&b, &a);
        prop_assert_eq!(ab, ba);
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert_eq!(shared_tags(&a, &b), shared_tags(&b, &a));
        prop_assert_eq!(
            is_similar(&a, &b, SIMILARITY_THRESHOLD),
            is_similar(&b, &a, SIMILARITY_THRESHOLD)
        );
    }

    #[test]
    fn test_jaccard_identity(a in proptest::collection::vec("[a-f]{1,2}", 1..6)) {
        prop_assert_eq!(jaccard(&a, &a), 1.0);
        prop_assert!(is_similar(&a, &a, 1.0));
    }

    #[test]
    fn test_no_shared_tags_means_zero(a in tags(), b in tags()) {
        if shared_tags(&a, &b).is_empty() {
            prop_assert_eq!(jaccard(&a, &b), 0.0);
            prop_assert!(!is_similar(&a, &b, SIMILARITY_THRESHOLD));
        } else {
            prop_assert!(jaccard(&a, &b) > 0.0);
        }
    }
}
