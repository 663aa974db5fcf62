//! Transform-tag similarity
//!
//! Two tools are similar when the Jaccard coefficient of their transform-tag
//! sets reaches a threshold. Tags are compared trimmed and lowercased.

use std::collections::BTreeSet;

/// Default minimum Jaccard coefficient for a `similar_to` edge
///
/// `{csv, clean}` vs `{json, clean}` scores 1/3 and must link.
pub const SIMILARITY_THRESHOLD: f64 = 0.2;

fn tag_set<S: AsRef<str>>(tags: &[S]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// |A ∩ B| / |A ∪ B|, or 0.0 when either side is empty
pub fn jaccard<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> f64 {
    let a = tag_set(a);
    let b = tag_set(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}

/// Tags present on both sides, sorted
pub fn shared_tags<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B]) -> Vec<String> {
    let a = tag_set(a);
    let b = tag_set(b);
    a.intersection(&b).cloned().collect()
}

pub fn is_similar<A: AsRef<str>, B: AsRef<str>>(a: &[A], b: &[B], threshold: f64) -> bool {
    let score = jaccard(a, b);
    score > 0.0 && score >= threshold
}
