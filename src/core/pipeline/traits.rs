//! The denoiser seam between the service and the numeric pipeline.

use crate::error::PipelineError;
use crate::events::{null_sender, EventSender};
use image::RgbImage;

/// Something that turns one RGB image into another of the same size
///
/// The service only talks to this trait, so tests can inject a cheap
/// fake in place of [`super::DenoisePipeline`].
pub trait Denoiser: Send + Sync {
    /// Process an image, reporting stage progress through `events`
    fn process_with_events(
        &self,
        image: &RgbImage,
        events: &EventSender,
    ) -> Result<RgbImage, PipelineError>;

    /// Process an image without progress reporting
    fn process(&self, image: &RgbImage) -> Result<RgbImage, PipelineError> {
        self.process_with_events(image, &null_sender())
    }

    /// Short description for logs, e.g. the execution device
    fn describe(&self) -> String {
        "denoiser".to_string()
    }
}
