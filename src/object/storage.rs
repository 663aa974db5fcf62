//! Object storage implementation
//!
//! Objects are raw byte blobs stored under a path derived from their hash so
//! that identical content always lands at the same location.

use crate::error::StorageError;
use crate::types::{hash_to_hex, parse_hash, Hash};
use blake3::Hasher;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use walkdir::WalkDir;

/// Compute the content hash of a blob
pub fn compute_object_hash(bytes: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    *hasher.finalize().as_bytes()
}

/// Content-addressed object storage
///
/// Layout: `{root}/objects/{hex[0..2]}/{hex[2..4]}/{hex[4..]}`
///
/// - Writing the same bytes twice is a no-op
/// - Writes go to a unique temp file and are renamed into place, so readers
///   never observe a partial object
/// - Objects are never removed
pub struct ObjectStore {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl ObjectStore {
    /// Create a new ObjectStore rooted at the given data directory
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();

        let objects_dir = root.join("objects");
        fs::create_dir_all(&objects_dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to create objects directory at {:?}: {}", objects_dir, e),
            ))
        })?;

        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a blob and return its hash
    ///
    /// If an object with the same hash already exists nothing is written.
    pub fn put(&self, bytes: &[u8]) -> Result<Hash, StorageError> {
        let hash = compute_object_hash(bytes);

        if self.exists(&hash) {
            return Ok(hash);
        }

        let object_path = self.path_of(&hash);
        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to create parent directory {:?}: {}", parent, e),
                ))
            })?;
        }

        // Concurrent writers of the same blob each get their own temp file;
        // whichever rename lands last replaces identical bytes.
        let temp_path = object_path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&temp_path, bytes).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to write object to {:?}: {}", temp_path, e),
            ))
        })?;

        fs::rename(&temp_path, &object_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to rename temp file to {:?}: {}", object_path, e),
            ))
        })?;

        tracing::trace!(object = %hash_to_hex(&hash), size = bytes.len(), "Stored object");
        Ok(hash)
    }

    /// Retrieve a blob by hash
    pub fn get(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        let object_path = self.path_of(hash);
        match fs::read(&object_path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ObjectNotFound(*hash))
            }
            Err(e) => Err(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to read object from {:?}: {}", object_path, e),
            ))),
        }
    }

    /// Retrieve a blob and check that its bytes still hash to the key
    pub fn get_verified(&self, hash: &Hash) -> Result<Vec<u8>, StorageError> {
        let bytes = self.get(hash)?;
        let actual = compute_object_hash(&bytes);
        if actual != *hash {
            return Err(StorageError::HashMismatch {
                expected: *hash,
                actual,
            });
        }
        Ok(bytes)
    }

    pub fn exists(&self, hash: &Hash) -> bool {
        self.path_of(hash).is_file()
    }

    /// Filesystem location of an object, whether or not it exists yet
    pub fn path_of(&self, hash: &Hash) -> PathBuf {
        let hex = hash_to_hex(hash);
        self.root
            .join("objects")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex[4..])
    }

    /// All stored object hashes, sorted
    ///
    /// Temp files and anything that does not reassemble into a valid hash are
    /// skipped.
    pub fn list(&self) -> Result<Vec<Hash>, StorageError> {
        let objects_dir = self.root.join("objects");
        let mut hashes = Vec::new();

        for entry in WalkDir::new(&objects_dir).min_depth(3).max_depth(3) {
            let entry = entry.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to walk {:?}: {}", objects_dir, e),
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(&objects_dir) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let joined: String = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if let Ok(hash) = parse_hash(&joined) {
                hashes.push(hash);
            }
        }

        hashes.sort();
        Ok(hashes)
    }

    /// Re-hash every stored object and report the ones whose content drifted
    ///
    /// Objects written by earlier generations of the store are keyed by a
    /// different digest and can never re-hash to their key; pass their hashes
    /// in `legacy` to leave them out.
    pub fn verify(&self, legacy: &HashSet<Hash>) -> Result<Vec<Hash>, StorageError> {
        let mut corrupt = Vec::new();
        for hash in self.list()? {
            if legacy.contains(&hash) {
                continue;
            }
            if let Err(StorageError::HashMismatch { .. }) = self.get_verified(&hash) {
                tracing::warn!(object = %hash_to_hex(&hash), "Object content does not match its hash");
                corrupt.push(hash);
            }
        }
        Ok(corrupt)
    }
}
