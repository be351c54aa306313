//! # Error Module
//!
//! Error types for the image denoiser.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, sizes, which stage failed
//! - **Keep internals internal** - the request boundary reports a generic
//!   message for processing failures and logs the detail instead

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum DenoiserError {
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Processing(#[from] ProcessingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Problems with an upload, detected before any processing starts
#[derive(Error, Debug, Clone)]
pub enum InputError {
    #[error("No image file provided")]
    MissingFile,

    #[error("No selected file")]
    EmptyFileName,

    #[error("Invalid file type '{extension}'. Allowed types: {allowed}")]
    DisallowedType { extension: String, allowed: String },

    #[error("File too large: {size} bytes. Maximum size: {}MB", .max / (1024 * 1024))]
    FileTooLarge { size: u64, max: u64 },

    #[error("Image too large ({width}x{height}). Maximum pixel count: {max_pixels}")]
    ImageTooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    #[error("Could not decode image: {reason}")]
    Undecodable { reason: String },
}

/// Failures inside the denoising pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed: {reason}")]
    Failed { stage: &'static str, reason: String },

    #[error("Unsupported channel count: buffer of {len} values for {width}x{height} RGB")]
    ChannelMismatch { width: u32, height: u32, len: usize },

    #[error("Insufficient device memory: {requested} bytes requested, budget {budget} bytes")]
    OutOfDeviceMemory { requested: u64, budget: u64 },
}

/// Errors that occur with the result cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache corruption detected at {path}. Delete this directory and try again.")]
    Corrupted { path: PathBuf },
}

/// Request-boundary failure taxonomy.
///
/// Cache unavailability never shows up here: it degrades to a miss.
#[derive(Error, Debug, Clone)]
pub enum ProcessingError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),

    #[error("Error processing image: {0}")]
    ProcessingFailure(String),

    #[error("Insufficient device memory: {0}")]
    ResourceExhaustion(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ProcessingError {
    /// Message that is safe to show to the caller.
    ///
    /// Invalid input explains itself; everything else stays generic.
    pub fn user_message(&self) -> String {
        match self {
            ProcessingError::InvalidInput(e) => e.to_string(),
            ProcessingError::ProcessingFailure(_) => "Error processing image".to_string(),
            ProcessingError::ResourceExhaustion(_) => {
                "Out of device memory. Try with a smaller image".to_string()
            }
            ProcessingError::Unexpected(_) => "Internal server error".to_string(),
        }
    }

    /// HTTP-style status code for the request layer
    pub fn status_code(&self) -> u16 {
        match self {
            ProcessingError::InvalidInput(InputError::FileTooLarge { .. }) => 413,
            ProcessingError::InvalidInput(_) => 400,
            ProcessingError::ResourceExhaustion(_) => 507,
            ProcessingError::ProcessingFailure(_) | ProcessingError::Unexpected(_) => 500,
        }
    }
}

impl From<PipelineError> for ProcessingError {
    fn from(error: PipelineError) -> Self {
        match &error {
            PipelineError::OutOfDeviceMemory { .. } => {
                ProcessingError::ResourceExhaustion(error.to_string())
            }
            _ => ProcessingError::ProcessingFailure(error.to_string()),
        }
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DenoiserError>;
