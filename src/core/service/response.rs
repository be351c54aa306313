//! Result types returned across the request boundary.

use crate::core::hasher::ContentHash;
use crate::error::ProcessingError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A processed image plus what the caller needs to report it
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Lossless PNG encoding of the output
    pub png: Vec<u8>,
    /// Content hash of the original upload
    pub hash: ContentHash,
    /// Whether the output came from the cache
    pub from_cache: bool,
    /// Wall time of the request; only present when the pipeline ran
    pub processing_time: Option<Duration>,
    pub width: u32,
    pub height: u32,
}

impl ProcessingResult {
    /// Processing time in seconds with two decimals, e.g. `"1.27"`
    pub fn processing_time_display(&self) -> Option<String> {
        self.processing_time
            .map(|elapsed| format!("{:.2}", elapsed.as_secs_f64()))
    }
}

/// Serializable outcome of one upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    /// HTTP-style status: 200, 400, 413, 500 or 507
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Output PNG; not serialized, the caller decides how to ship it
    #[serde(skip)]
    pub png: Option<Vec<u8>>,
    /// User-facing message; never carries internal detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn success(result: ProcessingResult) -> Self {
        Self {
            success: true,
            status: 200,
            hash: Some(result.hash.to_hex()),
            from_cache: result.from_cache,
            processing_time: result.processing_time_display(),
            width: Some(result.width),
            height: Some(result.height),
            png: Some(result.png),
            error: None,
        }
    }

    pub fn failure(error: &ProcessingError) -> Self {
        Self {
            success: false,
            status: error.status_code(),
            hash: None,
            from_cache: false,
            processing_time: None,
            width: None,
            height: None,
            png: None,
            error: Some(error.user_message()),
        }
    }
}

impl From<Result<ProcessingResult, ProcessingError>> for UploadResponse {
    fn from(result: Result<ProcessingResult, ProcessingError>) -> Self {
        match result {
            Ok(result) => Self::success(result),
            Err(error) => Self::failure(&error),
        }
    }
}
