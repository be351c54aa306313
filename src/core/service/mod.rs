//! # Service Module
//!
//! The request boundary: one upload in, one processed PNG (or one
//! classified failure) out.
//!
//! ## Request Flow
//! 1. **Validate** - file name, extension, byte size
//! 2. **Inspect** - image dimensions from the header, pixel limit
//! 3. **Hash** - XXH3-128 of the raw bytes
//! 4. **Lookup** - a cache hit returns immediately
//! 5. **Stage** - temporary copy of the upload, removed on every exit path
//! 6. **Process** - decode, run the injected [`Denoiser`], encode PNG
//! 7. **Store** - write the output under its hash
//!
//! Invalid input is rejected before the cache is touched. Steps 4 to 7
//! run at most once at a time per hash; concurrent callers
//! with the same bytes wait for the first one and share its result.

mod flight;
mod response;

pub use response::{ProcessingResult, UploadResponse};

use crate::core::cache::{CacheStats, ImageCache, InMemoryCache};
use crate::core::hasher::{hash_of, ContentHash};
use crate::core::pipeline::Denoiser;
use crate::core::upload::{read_file_bytes, FastDecoder, StagedUpload, Upload, UploadPolicy};
use crate::error::{CacheError, DenoiserError, InputError, ProcessingError};
use crate::events::{null_sender, CacheEvent, Event, EventSender, RequestEvent};
use flight::{Outcome, SingleFlight};
use image::RgbImage;
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

type Shared = Result<ProcessingResult, ProcessingError>;

/// Default directory for staged uploads
pub fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("image-denoiser-uploads")
}

/// Builder for [`ImageService`]
pub struct ServiceBuilder {
    denoiser: Option<Arc<dyn Denoiser>>,
    cache: Option<Arc<dyn ImageCache>>,
    policy: UploadPolicy,
    upload_dir: Option<PathBuf>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            denoiser: None,
            cache: None,
            policy: UploadPolicy::default(),
            upload_dir: None,
        }
    }

    /// The pipeline to run on cache misses (required)
    pub fn denoiser(mut self, denoiser: Arc<dyn Denoiser>) -> Self {
        self.denoiser = Some(denoiser);
        self
    }

    /// Result cache; defaults to an in-memory cache
    pub fn cache(mut self, cache: Arc<dyn ImageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Directory for staged uploads
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<ImageService, DenoiserError> {
        let denoiser = self
            .denoiser
            .ok_or_else(|| DenoiserError::Config("no denoiser configured".to_string()))?;

        Ok(ImageService {
            denoiser,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(InMemoryCache::new())),
            policy: self.policy,
            upload_dir: self.upload_dir.unwrap_or_else(default_upload_dir),
            flights: SingleFlight::new(),
        })
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache-fronted image denoising service
pub struct ImageService {
    denoiser: Arc<dyn Denoiser>,
    cache: Arc<dyn ImageCache>,
    policy: UploadPolicy,
    upload_dir: PathBuf,
    flights: SingleFlight<Shared>,
}

impl ImageService {
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Run the pipeline on encoded image bytes, bypassing cache and policy
    pub fn process_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, ProcessingError> {
        let image = FastDecoder::decode_rgb(bytes)?;
        let output = self.denoiser.process(&image)?;
        encode_png(&output)
    }

    /// Handle one upload
    pub fn handle_upload(&self, upload: Upload) -> Result<ProcessingResult, ProcessingError> {
        self.handle_upload_with_events(upload, &null_sender())
    }

    /// Handle one upload, reporting progress through `events`
    pub fn handle_upload_with_events(
        &self,
        upload: Upload,
        events: &EventSender,
    ) -> Result<ProcessingResult, ProcessingError> {
        let start = Instant::now();
        let result = self.handle(&upload, events, start);

        match &result {
            Ok(done) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                events.send(Event::Request(RequestEvent::Completed {
                    hash: done.hash.to_hex(),
                    from_cache: done.from_cache,
                    duration_ms,
                }));
            }
            Err(error) => {
                events.send(Event::Request(RequestEvent::Failed {
                    message: error.user_message(),
                }));
            }
        }
        result
    }

    /// Handle an upload and shape the outcome for the caller
    ///
    /// `None` means the request carried no file. Panics anywhere below
    /// this point are caught and reported as an unexpected error.
    pub fn respond(&self, upload: Option<Upload>, events: &EventSender) -> UploadResponse {
        let Some(upload) = upload else {
            return UploadResponse::failure(&InputError::MissingFile.into());
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handle_upload_with_events(upload, events)
        }));

        match outcome {
            Ok(result) => result.into(),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(error = %message, "unexpected error");
                UploadResponse::failure(&ProcessingError::Unexpected(message))
            }
        }
    }

    /// Remove every cached output
    pub fn clear_cache(&self, events: &EventSender) -> Result<usize, CacheError> {
        let removed = self.cache.clear()?;
        tracing::info!(removed, "cache cleared");
        events.send(Event::Cache(CacheEvent::Cleared { removed }));
        Ok(removed)
    }

    pub fn cache_stats(&self) -> Result<CacheStats, CacheError> {
        self.cache.stats()
    }

    fn handle(
        &self,
        upload: &Upload,
        events: &EventSender,
        start: Instant,
    ) -> Result<ProcessingResult, ProcessingError> {
        self.policy.check_upload(upload)?;
        let (width, height) = FastDecoder::probe_dimensions(&upload.bytes)?;
        self.policy.check_dimensions(width, height)?;

        let hash = hash_of(&upload.bytes);
        events.send(Event::Request(RequestEvent::Started {
            hash: hash.to_hex(),
        }));

        let outcome = self.flights.run(
            hash,
            || {
                tracing::debug!(%hash, "waiting for in-flight request");
                events.send(Event::Request(RequestEvent::Joined {
                    hash: hash.to_hex(),
                }));
            },
            || self.lookup_or_process(upload, hash, (width, height), events, start),
        );

        match outcome {
            Outcome::Led(result) | Outcome::Shared(result) => result,
        }
    }

    fn lookup_or_process(
        &self,
        upload: &Upload,
        hash: ContentHash,
        (width, height): (u32, u32),
        events: &EventSender,
        start: Instant,
    ) -> Shared {
        if let Some(hit) = self.lookup(hash, events) {
            return Ok(hit);
        }

        tracing::info!(%hash, "processing new image");

        let extension = upload.extension().unwrap_or_default();
        let staged = StagedUpload::create(&self.upload_dir, &extension, &upload.bytes)
            .map_err(|e| {
                tracing::error!(%hash, error = %e, "unexpected error");
                ProcessingError::Unexpected(e.to_string())
            })?;

        let png = self.process_staged(&staged, events).map_err(|e| {
            tracing::error!(%hash, error = %e, "error processing image");
            e
        })?;
        drop(staged);

        match self.cache.store(&hash, &png) {
            Ok(()) => events.send(Event::Cache(CacheEvent::Stored {
                hash: hash.to_hex(),
                bytes: png.len() as u64,
            })),
            Err(e) => {
                tracing::warn!(%hash, error = %e, "could not store result in cache");
                events.send(Event::Cache(CacheEvent::Unavailable {
                    hash: hash.to_hex(),
                    message: e.to_string(),
                }));
            }
        }

        let processing_time = start.elapsed();
        tracing::info!(
            %hash,
            seconds = %format!("{:.2}", processing_time.as_secs_f64()),
            "processing completed"
        );

        Ok(ProcessingResult {
            png,
            hash,
            from_cache: false,
            processing_time: Some(processing_time),
            width,
            height,
        })
    }

    /// Cache lookup where every failure degrades to a miss
    fn lookup(&self, hash: ContentHash, events: &EventSender) -> Option<ProcessingResult> {
        let key = hash.to_hex();

        let png = match self.cache.lookup(&hash) {
            Ok(Some(png)) => png,
            Ok(None) => {
                events.send(Event::Cache(CacheEvent::Miss { hash: key }));
                return None;
            }
            Err(e) => {
                tracing::warn!(%hash, error = %e, "cache unavailable, treating as a miss");
                events.send(Event::Cache(CacheEvent::Unavailable {
                    hash: key,
                    message: e.to_string(),
                }));
                return None;
            }
        };

        match FastDecoder::probe_dimensions(&png) {
            Ok((width, height)) => {
                tracing::info!(%hash, "image found in cache");
                events.send(Event::Cache(CacheEvent::Hit { hash: key }));
                Some(ProcessingResult {
                    png,
                    hash,
                    from_cache: true,
                    processing_time: None,
                    width,
                    height,
                })
            }
            Err(e) => {
                tracing::warn!(%hash, error = %e, "unreadable cache entry, treating as a miss");
                events.send(Event::Cache(CacheEvent::Unavailable {
                    hash: key,
                    message: e.to_string(),
                }));
                None
            }
        }
    }

    fn process_staged(
        &self,
        staged: &StagedUpload,
        events: &EventSender,
    ) -> Result<Vec<u8>, ProcessingError> {
        let bytes = read_file_bytes(staged.path())
            .map_err(|e| ProcessingError::ProcessingFailure(e.to_string()))?;
        let image = FastDecoder::decode_rgb(&bytes)
            .map_err(|e| ProcessingError::ProcessingFailure(e.to_string()))?;

        tracing::debug!(device = %self.denoiser.describe(), "running pipeline");
        let output = self.denoiser.process_with_events(&image, events)?;
        encode_png(&output)
    }
}

fn encode_png(output: &RgbImage) -> Result<Vec<u8>, ProcessingError> {
    let mut png = Vec::new();
    output
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| ProcessingError::ProcessingFailure(format!("PNG encoding failed: {}", e)))?;
    Ok(png)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
