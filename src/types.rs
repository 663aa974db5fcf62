//! Core identifier types shared across the store, index and resolver.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// BLAKE3 digest of raw object bytes
pub type Hash = [u8; 32];

/// Number of digest bytes kept in a relation ID (rendered as 32 hex chars)
pub const RELATION_ID_BYTES: usize = 16;

/// Render a hash as lowercase hex
pub fn hash_to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Parse a 64-char hex string back into a hash
pub fn parse_hash(value: &str) -> Result<Hash, StorageError> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(value.trim(), &mut out)
        .map_err(|_| StorageError::InvalidHash(value.to_string()))?;
    Ok(out)
}

/// Globally unique relation identifier.
///
/// Derived from a digest of the normalized properties plus a creation nonce,
/// see [`crate::relation::id::compute_relation_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(String);

impl RelationId {
    pub(crate) fn from_digest(digest: &Hash) -> Self {
        RelationId(hex::encode(&digest[..RELATION_ID_BYTES]))
    }

    /// Accepts only well-formed IDs (32 lowercase hex chars).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let well_formed = value.len() == RELATION_ID_BYTES * 2
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if well_formed {
            Some(RelationId(value.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serde adapter storing hashes as hex strings in JSON records.
pub mod hex_hash {
    use super::{hash_to_hex, parse_hash, Hash};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hash_to_hex(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse_hash(&value).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::super::{hash_to_hex, parse_hash, Hash};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            hash: &Option<Hash>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match hash {
                Some(hash) => serializer.serialize_some(&hash_to_hex(hash)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Hash>, D::Error> {
            let value = Option::<String>::deserialize(deserializer)?;
            value
                .map(|v| parse_hash(&v).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
