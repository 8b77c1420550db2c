use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use super::{hash_hierarchy, CacheError, Result, CACHE_VERSION};
use crate::lattice::ClassLattice;

/// Persisted encoding of a whole program, keyed by fully-qualified class name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidCache {
    /// Schema version for cache format
    pub version: u32,

    /// Hierarchy fingerprint at the time the cache was written
    pub fingerprint: String,

    pub entries: IndexMap<String, CidEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidEntry {
    pub key: u64,
    pub cid: u64,
}

impl CidCache {
    pub fn new() -> Self {
        Self {
            version: CACHE_VERSION,
            fingerprint: String::new(),
            entries: IndexMap::new(),
        }
    }

    /// Snapshot every encoded class of `lattice`
    pub fn from_lattice(lattice: &ClassLattice) -> Self {
        let entries = lattice
            .iter()
            .filter(|(_, node)| node.is_encoded())
            .map(|(_, node)| {
                (
                    node.name.clone(),
                    CidEntry {
                        key: node.key,
                        cid: node.cid,
                    },
                )
            })
            .collect();

        Self {
            version: CACHE_VERSION,
            fingerprint: hash_hierarchy(lattice),
            entries,
        }
    }

    pub fn cid_of(&self, class: &str) -> Option<u64> {
        self.entries.get(class).map(|e| e.cid)
    }

    pub fn key_of(&self, class: &str) -> Option<u64> {
        self.entries.get(class).map(|e| e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_version_compatible(&self) -> bool {
        self.version == CACHE_VERSION
    }

    /// `true` when `lattice` has the hierarchy shape this cache was built from
    pub fn matches_hierarchy(&self, lattice: &ClassLattice) -> bool {
        self.fingerprint == hash_hierarchy(lattice)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(CacheError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(CacheError::from)
    }

    /// Load a cache file, rejecting files written by another format version
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let cache = Self::from_bytes(&bytes).map_err(|e| {
            warn!("Corrupted cid cache {}: {}", path.display(), e);
            CacheError::CorruptedFile {
                path: path.to_path_buf(),
            }
        })?;

        if !cache.is_version_compatible() {
            warn!(
                "Cid cache version mismatch: expected {}, found {}",
                CACHE_VERSION, cache.version
            );
            return Err(CacheError::VersionMismatch {
                expected: CACHE_VERSION,
                found: cache.version,
            });
        }

        info!(
            "Loaded cid cache with {} classes from {}",
            cache.len(),
            path.display()
        );
        Ok(cache)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_bytes()?)?;
        info!("Saved cid cache with {} classes to {}", self.len(), path.display());
        Ok(())
    }
}
