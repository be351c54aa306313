//! # Core Module
//!
//! The presentation-agnostic denoising engine.
//!
//! ## Modules
//! - `upload` - Validates, probes, decodes and stages uploads
//! - `hasher` - Computes the content hash used as the cache key
//! - `cache` - Persists processed images keyed by content hash
//! - `pipeline` - The fixed denoising pipeline and its execution device
//! - `service` - Ties the above together behind one request boundary

pub mod cache;
pub mod hasher;
pub mod pipeline;
pub mod service;
pub mod upload;

// Re-export commonly used types
pub use cache::{DiskCache, ImageCache, InMemoryCache};
pub use hasher::{hash_of, ContentHash};
pub use pipeline::{DenoisePipeline, Denoiser, DeviceChoice};
pub use service::{ImageService, ProcessingResult, UploadResponse};
pub use upload::{Upload, UploadPolicy};
