//! # Cache Module
//!
//! Persists processed images to avoid recomputation.
//!
//! ## Benefits
//! - Re-uploading the same file returns instantly
//! - Keys depend only on the uploaded bytes
//!
//! ## Backends
//! - `DiskCache` - One PNG file per content hash
//! - `InMemoryCache` - For testing

mod disk;
mod memory;
mod traits;

pub use disk::DiskCache;
pub use memory::InMemoryCache;
pub use traits::ImageCache;

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Version of the fixed pipeline constants.
///
/// Cache entries are keyed by input bytes only, so anything that changes
/// pipeline output must bump this to get a fresh namespace.
pub const PIPELINE_VERSION: u32 = 1;

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Total size of cached data in bytes
    pub total_size_bytes: u64,
    /// Oldest entry timestamp
    pub oldest_entry: Option<SystemTime>,
    /// Newest entry timestamp
    pub newest_entry: Option<SystemTime>,
}
