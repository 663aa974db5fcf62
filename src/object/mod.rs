//! Content-addressed object storage
//!
//! Immutable blobs keyed by their BLAKE3 hash, plus read-only access to the
//! metadata catalog written by earlier generations of the store.

pub mod legacy;
pub mod storage;

pub use legacy::{LegacyCatalog, LegacyObjectMeta};
pub use storage::{compute_object_hash, ObjectStore};
