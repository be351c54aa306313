//! # Image Denoiser
//!
//! Content-addressed image denoising: non-local means, total variation
//! and edge-aware sharpening, with results cached by the hash of the
//! uploaded bytes.
//!
//! ## Architecture
//! The library is split into a core engine (presentation-agnostic) and
//! presentation layers:
//! - `core` - Upload validation, cache, pipeline and the request service
//! - `events` - Event-driven progress reporting
//! - `error` - Error types and the request-boundary taxonomy
//! - `cli` - Command-line interface (binary only)
//!
//! ## Example
//! ```rust,ignore
//! use image_denoiser::core::{DenoisePipeline, DiskCache, ImageService, Upload};
//! use std::sync::Arc;
//!
//! let service = ImageService::builder()
//!     .denoiser(Arc::new(DenoisePipeline::builder().build()?))
//!     .cache(Arc::new(DiskCache::open_versioned(&cache_root)?))
//!     .build()?;
//!
//! let result = service.handle_upload(Upload::new("photo.jpg", bytes))?;
//! ```

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{DenoiserError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. The filter
/// comes from `RUST_LOG`.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
