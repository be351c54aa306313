//! Cache backend trait definition.

use super::CacheStats;
use crate::core::hasher::ContentHash;
use crate::error::CacheError;

/// Trait for result cache backends
///
/// Keys are content hashes of the original upload; values are the
/// lossless PNG bytes of the processed output.
pub trait ImageCache: Send + Sync {
    /// Get the cached output for a hash, if any
    ///
    /// Has no side effects. An `Err` means the storage could not be read;
    /// callers treat that as a miss.
    fn lookup(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store the output for a hash
    ///
    /// Storing the same hash twice is safe: the content is determined by
    /// the hash, so the second write replaces the entry with equal bytes.
    fn store(&self, hash: &ContentHash, png: &[u8]) -> Result<(), CacheError>;

    /// Remove a specific entry
    ///
    /// Returns whether an entry was present.
    fn remove(&self, hash: &ContentHash) -> Result<bool, CacheError>;

    /// Remove all entries
    ///
    /// Returns the number of entries removed.
    fn clear(&self) -> Result<usize, CacheError>;

    /// Get cache statistics
    fn stats(&self) -> Result<CacheStats, CacheError>;
}
