//! Physical store contract
//!
//! The binary persistence format is an external collaborator. This module
//! pins down the only contract the backends require — a path-addressed
//! blob/group store — and ships [`MemoryStore`], the concurrent in-memory
//! reference implementation used by tests and single-process studies.

use crate::error::StorageError;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sweep_tree::Value;

/// Format version stamped into every store this library creates
pub const FORMAT_VERSION: &str = "1.0";

/// Attribute key carrying the format version
pub const VERSION_ATTR: &str = "sweep_format_version";

/// A typed leaf plus its attribute map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafData {
    /// The payload value
    pub value: Value,
    /// String attributes (comments, kinds, bookkeeping)
    pub attrs: IndexMap<String, String>,
}

impl LeafData {
    /// Leaf without attributes
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            attrs: IndexMap::new(),
        }
    }

    /// Builder-style attribute attachment
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

/// Path-addressed blob/group store
///
/// The sole contract the storage backends require from the excluded
/// persistence layer. Implementations must be safe to share across
/// threads; the single-writer discipline above them is the backends' job,
/// not the store's.
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    /// Create a group (directory-like) entry; idempotent
    ///
    /// # Errors
    /// Underlying I/O failure.
    fn create_group(&self, path: &str) -> Result<(), StorageError>;

    /// Write a typed leaf at a path, replacing any previous leaf
    ///
    /// # Errors
    /// Underlying I/O failure.
    fn write_leaf(&self, path: &str, data: LeafData) -> Result<(), StorageError>;

    /// Read the leaf at a path
    ///
    /// # Errors
    /// [`StorageError::NotFound`] when absent.
    fn read_leaf(&self, path: &str) -> Result<LeafData, StorageError>;

    /// Delete a leaf or group subtree; deleting an absent path is a no-op
    ///
    /// # Errors
    /// Underlying I/O failure.
    fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Whether a leaf or group exists at the path
    fn exists(&self, path: &str) -> bool;

    /// All leaf paths under a prefix (segment-aligned), sorted
    fn list(&self, prefix: &str) -> Vec<String>;

    /// Format version the store was written with
    fn format_version(&self) -> String;
}

/// Concurrent in-memory reference store
#[derive(Debug)]
pub struct MemoryStore {
    leaves: DashMap<String, LeafData>,
    groups: DashMap<String, ()>,
    meta: RwLock<IndexMap<String, String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Fresh store stamped with the current format version
    #[must_use]
    pub fn new() -> Self {
        Self::with_version(FORMAT_VERSION)
    }

    /// Store stamped with an explicit version (test hook for
    /// [`StorageError::VersionMismatch`] paths)
    #[must_use]
    pub fn with_version(version: &str) -> Self {
        let mut meta = IndexMap::new();
        meta.insert(VERSION_ATTR.to_string(), version.to_string());
        Self {
            leaves: DashMap::new(),
            groups: DashMap::new(),
            meta: RwLock::new(meta),
        }
    }

    /// Number of leaves
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Snapshot of every leaf, sorted by path
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, LeafData)> {
        let mut all: Vec<(String, LeafData)> = self
            .leaves
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

fn segment_prefix(prefix: &str) -> String {
    format!("{prefix}.")
}

impl BlobStore for MemoryStore {
    fn create_group(&self, path: &str) -> Result<(), StorageError> {
        self.groups.insert(path.to_string(), ());
        Ok(())
    }

    fn write_leaf(&self, path: &str, data: LeafData) -> Result<(), StorageError> {
        self.leaves.insert(path.to_string(), data);
        Ok(())
    }

    fn read_leaf(&self, path: &str) -> Result<LeafData, StorageError> {
        self.leaves
            .get(path)
            .map(|e| e.value().clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.leaves.remove(path);
        self.groups.remove(path);
        let prefix = segment_prefix(path);
        let doomed: Vec<String> = self
            .leaves
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(&prefix))
            .collect();
        for key in doomed {
            self.leaves.remove(&key);
        }
        let doomed: Vec<String> = self
            .groups
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(&prefix))
            .collect();
        for key in doomed {
            self.groups.remove(&key);
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.leaves.contains_key(path) || self.groups.contains_key(path)
    }

    fn list(&self, prefix: &str) -> Vec<String> {
        let dotted = segment_prefix(prefix);
        let mut out: Vec<String> = self
            .leaves
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k == prefix || k.starts_with(&dotted))
            .collect();
        out.sort();
        out
    }

    fn format_version(&self) -> String {
        self.meta
            .read()
            .get(VERSION_ATTR)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_read_round_trip() {
        let store = MemoryStore::new();
        let data = LeafData::new(Value::from(1.5)).with_attr("comment", "mass");
        store.write_leaf("parameters.m", data.clone()).unwrap();
        assert_eq!(store.read_leaf("parameters.m").unwrap(), data);
    }

    #[test]
    fn read_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read_leaf("nope"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn delete_removes_subtree_only() {
        let store = MemoryStore::new();
        store.write_leaf("a.b", LeafData::new(Value::from(1_i64))).unwrap();
        store.write_leaf("a.b.c", LeafData::new(Value::from(2_i64))).unwrap();
        store.write_leaf("a.bc", LeafData::new(Value::from(3_i64))).unwrap();

        store.delete("a.b").unwrap();
        assert!(!store.exists("a.b"));
        assert!(!store.exists("a.b.c"));
        // segment boundary respected
        assert!(store.exists("a.bc"));
    }

    #[test]
    fn list_is_segment_aligned_and_sorted() {
        let store = MemoryStore::new();
        store.write_leaf("r.b", LeafData::new(Value::from(1_i64))).unwrap();
        store.write_leaf("r.a", LeafData::new(Value::from(2_i64))).unwrap();
        store.write_leaf("rx.z", LeafData::new(Value::from(3_i64))).unwrap();

        assert_eq!(store.list("r"), vec!["r.a".to_string(), "r.b".to_string()]);
    }

    #[test]
    fn groups_exist_independently_of_leaves() {
        let store = MemoryStore::new();
        store.create_group("results.runs").unwrap();
        assert!(store.exists("results.runs"));
        assert!(store.list("results.runs").is_empty());
    }

    #[test]
    fn version_stamp() {
        let store = MemoryStore::new();
        assert_eq!(store.format_version(), FORMAT_VERSION);

        let old = MemoryStore::with_version("0.4");
        assert_eq!(old.format_version(), "0.4");
    }
}
