//! Reify: declarative reality compilation
//!
//! Declared relations (tools, artifacts, memory links) are stored as
//! content-addressed objects, expanded by a rules engine, materialized as
//! executables and files, and projected through a virtual filesystem built
//! from a single relationship index.

pub mod compiler;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod materialize;
pub mod object;
pub mod relation;
pub mod rules;
pub mod similarity;
pub mod types;
pub mod vfs;

pub use compiler::{DeclareOutcome, RealityCompiler};
pub use config::{ConfigLoader, ReifyConfig};
pub use error::{ApiError, RuleError, StorageError};
pub use index::RelationshipIndex;
pub use materialize::{MaterializationStatus, MaterializedEntity};
pub use object::ObjectStore;
pub use relation::{Relation, RelationFilter, RelationKind, RelationProperties, RelationStore};
pub use rules::{Rule, RulesEngine, Warning};
pub use types::{Hash, RelationId};
pub use vfs::{VirtualFs, VirtualNode};
