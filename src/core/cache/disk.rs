//! Disk cache backend: one PNG file per content hash.

use super::{CacheStats, ImageCache, PIPELINE_VERSION};
use crate::core::hasher::ContentHash;
use crate::error::CacheError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const ENTRY_EXTENSION: &str = "png";

/// Persistent cache stored as `<dir>/<hex-hash>.png`
///
/// Writes go to a temporary file in the same directory and are renamed
/// into place, so a reader never sees a partially written entry and
/// concurrent writers of the same hash cannot interleave their bytes.
///
/// `clear` and `store` are not serialised against each other: a store
/// that renames in after a clear has scanned the directory survives it.
/// Since a hash always maps to the same content, that entry is still
/// correct.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Open or create a cache directory at the given path
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(dir).map_err(|e| CacheError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Open the cache under `root/v<PIPELINE_VERSION>`
    pub fn open_versioned(root: &Path) -> Result<Self, CacheError> {
        Self::open(&root.join(format!("v{}", PIPELINE_VERSION)))
    }

    /// Directory holding the entries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry file for a hash
    pub fn entry_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir
            .join(format!("{}.{}", hash.to_hex(), ENTRY_EXTENSION))
    }

    fn is_entry(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(ContentHash::from_hex)
                .is_some()
    }

    fn entries(&self) -> Result<Vec<PathBuf>, CacheError> {
        let read_dir = fs::read_dir(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut paths = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CacheError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.is_file() && Self::is_entry(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

impl ImageCache for DiskCache {
    fn lookup(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(hash);

        match fs::read(&path) {
            Ok(bytes) => {
                // PNG signature check catches truncated or foreign files
                if !bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
                    return Err(CacheError::Corrupted { path });
                }
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }

    fn store(&self, hash: &ContentHash, png: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(hash);

        let mut staged = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| CacheError::Io {
                path: self.dir.clone(),
                source: e,
            })?;

        staged
            .write_all(png)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| CacheError::Io {
                path: staged.path().to_path_buf(),
                source: e,
            })?;

        staged.persist(&path).map_err(|e| CacheError::Io {
            path,
            source: e.error,
        })?;

        Ok(())
    }

    fn remove(&self, hash: &ContentHash) -> Result<bool, CacheError> {
        let path = self.entry_path(hash);

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Io { path, source: e }),
        }
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;

        for path in self.entries()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // Someone else cleared it first
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::Io { path, source: e }),
            }
        }

        Ok(removed)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();

        for path in self.entries()? {
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::Io { path, source: e }),
            };

            stats.total_entries += 1;
            stats.total_size_bytes += metadata.len();

            if let Ok(modified) = metadata.modified() {
                stats.oldest_entry = Some(stats.oldest_entry.map_or(modified, |t| t.min(modified)));
                stats.newest_entry = Some(stats.newest_entry.map_or(modified, |t| t.max(modified)));
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::hash_of;
    use tempfile::TempDir;

    const FAKE_PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    #[test]
    fn store_then_lookup_returns_same_bytes() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let hash = hash_of(b"upload");

        cache.store(&hash, FAKE_PNG).unwrap();

        assert_eq!(cache.lookup(&hash).unwrap(), Some(FAKE_PNG.to_vec()));
        assert!(cache.entry_path(&hash).exists());
    }

    #[test]
    fn missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();

        assert!(cache.lookup(&hash_of(b"never stored")).unwrap().is_none());
    }

    #[test]
    fn store_leaves_no_staging_files() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();

        cache.store(&hash_of(b"a"), FAKE_PNG).unwrap();
        cache.store(&hash_of(b"a"), FAKE_PNG).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn corrupted_entry_is_reported() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let hash = hash_of(b"upload");

        fs::write(cache.entry_path(&hash), b"definitely not a png").unwrap();

        assert!(matches!(
            cache.lookup(&hash),
            Err(CacheError::Corrupted { .. })
        ));
    }

    #[test]
    fn clear_counts_only_entries() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();

        cache.store(&hash_of(b"a"), FAKE_PNG).unwrap();
        cache.store(&hash_of(b"b"), FAKE_PNG).unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.lookup(&hash_of(b"a")).unwrap().is_none());
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(cache.clear().unwrap(), 0);
    }

    #[test]
    fn stats_sum_entry_sizes() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();

        cache.store(&hash_of(b"a"), FAKE_PNG).unwrap();
        cache.store(&hash_of(b"b"), FAKE_PNG).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_size_bytes, 2 * FAKE_PNG.len() as u64);
        assert!(stats.newest_entry.is_some());
    }

    #[test]
    fn versioned_layout_uses_subdirectory() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open_versioned(dir.path()).unwrap();

        assert_eq!(
            cache.dir(),
            dir.path().join(format!("v{}", PIPELINE_VERSION))
        );
        assert!(cache.dir().is_dir());
    }

    #[test]
    fn remove_reports_presence() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let hash = hash_of(b"a");

        cache.store(&hash, FAKE_PNG).unwrap();
        assert!(cache.remove(&hash).unwrap());
        assert!(!cache.remove(&hash).unwrap());
    }
}
