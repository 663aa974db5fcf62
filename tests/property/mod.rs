//! Property-based tests for storage, similarity and ancestry guarantees

mod ancestry;
mod determinism;
mod similarity;
