//! In-memory cache backend for testing.

use super::{CacheStats, ImageCache};
use crate::core::hasher::ContentHash;
use crate::error::CacheError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::SystemTime;

struct MemoryEntry {
    png: Vec<u8>,
    stored_at: SystemTime,
}

/// In-memory cache backend
///
/// Useful for testing and scenarios where persistence isn't needed.
pub struct InMemoryCache {
    entries: RwLock<HashMap<ContentHash, MemoryEntry>>,
}

impl InMemoryCache {
    /// Create a new in-memory cache
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> CacheError {
        CacheError::Corrupted {
            path: PathBuf::from("memory"),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCache for InMemoryCache {
    fn lookup(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(hash).map(|e| e.png.clone()))
    }

    fn store(&self, hash: &ContentHash, png: &[u8]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(
            *hash,
            MemoryEntry {
                png: png.to_vec(),
                stored_at: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn remove(&self, hash: &ContentHash) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        Ok(entries.remove(hash).is_some())
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;

        Ok(CacheStats {
            total_entries: entries.len(),
            total_size_bytes: entries.values().map(|e| e.png.len() as u64).sum(),
            oldest_entry: entries.values().map(|e| e.stored_at).min(),
            newest_entry: entries.values().map(|e| e.stored_at).max(),
        })
    }
}
