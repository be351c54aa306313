//! Pipeline execution implementation.

use super::device::{Device, DeviceChoice, ExecutionDevice, DEFAULT_MEMORY_BUDGET};
use super::image::{FloatImage, CHANNELS};
use super::{gradient, nl_means, tv, Denoiser};
use crate::error::PipelineError;
use crate::events::{Event, EventSender, PipelineEvent, PipelineStage};
use image::RgbImage;
use std::time::Instant;

/// Full-size float buffers alive at the pipeline's peak (sharpening:
/// image, magnitude and two scratch buffers, plus slack for padding)
const WORKING_BUFFERS: u64 = 5;

/// Estimated working memory for an image, in bytes
pub fn working_set_bytes(width: u32, height: u32) -> u64 {
    u64::from(width)
        * u64::from(height)
        * CHANNELS as u64
        * std::mem::size_of::<f64>() as u64
        * WORKING_BUFFERS
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    device: DeviceChoice,
    memory_budget: u64,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            device: DeviceChoice::Auto,
            memory_budget: DEFAULT_MEMORY_BUDGET,
        }
    }

    /// Choose the execution device
    pub fn device(mut self, device: DeviceChoice) -> Self {
        self.device = device;
        self
    }

    /// Working-memory budget of the accelerated device, in bytes
    pub fn memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Select the device and build the pipeline
    pub fn build(self) -> Result<DenoisePipeline, PipelineError> {
        let kind = ExecutionDevice::select(self.device, self.memory_budget);
        tracing::info!(device = %kind, "denoise pipeline ready");
        Ok(DenoisePipeline {
            device: Device::new(kind)?,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed denoising pipeline
///
/// Normalize, non-local means, total variation, sharpen, quantize. All
/// parameters are constants; see the stage modules.
pub struct DenoisePipeline {
    device: Device,
}

impl DenoisePipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// The device selected at construction
    pub fn device(&self) -> ExecutionDevice {
        self.device.kind()
    }

    fn stage<T>(
        &self,
        events: &EventSender,
        stage: PipelineStage,
        op: impl FnOnce() -> Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        events.send(Event::Pipeline(PipelineEvent::StageStarted { stage }));
        let start = Instant::now();

        let result = op();

        match &result {
            Ok(_) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::debug!(stage = stage.as_str(), duration_ms, "stage completed");
                events.send(Event::Pipeline(PipelineEvent::StageCompleted {
                    stage,
                    duration_ms,
                }));
            }
            Err(e) => {
                events.send(Event::Pipeline(PipelineEvent::StageFailed {
                    stage,
                    message: e.to_string(),
                }));
            }
        }
        result
    }

    fn ensure_finite(stage: PipelineStage, image: &FloatImage) -> Result<(), PipelineError> {
        match image.find_non_finite() {
            Some(index) => Err(PipelineError::Failed {
                stage: stage.as_str(),
                reason: format!("non-finite value at index {}", index),
            }),
            None => Ok(()),
        }
    }

    fn run_stages(&self, image: &RgbImage, events: &EventSender) -> Result<RgbImage, PipelineError> {
        let (width, height) = image.dimensions();
        let len = image.as_raw().len();
        let device = &self.device;

        let input = self.stage(events, PipelineStage::Normalize, || {
            FloatImage::normalize_into(image, device.alloc(len)?)
        })?;

        let smoothed = self.stage(events, PipelineStage::NonLocalMeans, || {
            let mut out = device.alloc(len)?;
            nl_means::denoise(&input, &mut out);
            let smoothed = FloatImage::from_raw(width, height, out)?;
            Self::ensure_finite(PipelineStage::NonLocalMeans, &smoothed)?;
            Ok(smoothed)
        })?;
        device.recycle(input.into_raw());

        let mut flattened = self.stage(events, PipelineStage::TotalVariation, || {
            let mut out = device.alloc(len)?;
            let iterations = tv::denoise(&smoothed, &mut out);
            tracing::debug!(?iterations, "total variation converged");
            let flattened = FloatImage::from_raw(width, height, out)?;
            Self::ensure_finite(PipelineStage::TotalVariation, &flattened)?;
            Ok(flattened)
        })?;
        device.recycle(smoothed.into_raw());

        self.stage(events, PipelineStage::Sharpen, || {
            let mut magnitude = device.alloc(len)?;
            let mut a = device.alloc(len)?;
            let mut b = device.alloc(len)?;
            gradient::gradient_magnitude(&flattened, &mut magnitude, [&mut a, &mut b]);
            gradient::sharpen(&mut flattened, &magnitude);
            device.recycle(a);
            device.recycle(b);
            device.recycle(magnitude);
            Self::ensure_finite(PipelineStage::Sharpen, &flattened)
        })?;

        let output = self.stage(events, PipelineStage::Quantize, || flattened.quantize())?;
        device.recycle(flattened.into_raw());

        Ok(output)
    }
}

impl Denoiser for DenoisePipeline {
    fn process_with_events(
        &self,
        image: &RgbImage,
        events: &EventSender,
    ) -> Result<RgbImage, PipelineError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PipelineError::Failed {
                stage: PipelineStage::Normalize.as_str(),
                reason: "image has no pixels".to_string(),
            });
        }

        self.device.ensure_fits(working_set_bytes(width, height))?;
        self.device.install(|| self.run_stages(image, events))
    }

    fn describe(&self) -> String {
        self.device.kind().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventChannel;
    use image::Rgb;

    fn noisy_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let base = if x < w / 2 { 60 } else { 190 };
            let noise = ((x * 31 + y * 17) % 23) as u8;
            Rgb([base + noise, base, base - noise / 2])
        })
    }

    fn cpu_pipeline() -> DenoisePipeline {
        DenoisePipeline::builder()
            .device(DeviceChoice::Cpu)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_respects_device_choice() {
        assert_eq!(cpu_pipeline().device(), ExecutionDevice::Cpu);
        assert_eq!(cpu_pipeline().describe(), "cpu");
    }

    #[test]
    fn dimensions_are_preserved() {
        let image = noisy_image(23, 17);
        let output = cpu_pipeline().process(&image).unwrap();
        assert_eq!(output.dimensions(), (23, 17));
        assert_eq!(output.as_raw().len(), 23 * 17 * 3);
    }

    #[test]
    fn flat_gray_image_is_unchanged() {
        let image = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let output = cpu_pipeline().process(&image).unwrap();
        assert_eq!(output, image);
    }

    #[test]
    fn processing_is_deterministic() {
        let pipeline = cpu_pipeline();
        let image = noisy_image(20, 14);
        assert_eq!(
            pipeline.process(&image).unwrap(),
            pipeline.process(&image).unwrap()
        );
    }

    #[test]
    fn devices_agree_bit_for_bit() {
        let image = noisy_image(19, 13);
        let accelerated = DenoisePipeline::builder()
            .device(DeviceChoice::Accelerated)
            .build()
            .unwrap();

        assert_eq!(
            accelerated.process(&image).unwrap(),
            cpu_pipeline().process(&image).unwrap()
        );
    }

    #[test]
    fn over_budget_image_reports_device_memory() {
        let pipeline = DenoisePipeline::builder()
            .device(DeviceChoice::Accelerated)
            .memory_budget(10_000)
            .build()
            .unwrap();

        pipeline.process(&noisy_image(8, 8)).unwrap();
        assert!(pipeline.device.pooled_bytes() > 0);

        let error = pipeline.process(&noisy_image(32, 32)).unwrap_err();
        assert!(matches!(error, PipelineError::OutOfDeviceMemory { budget: 10_000, .. }));
        assert_eq!(pipeline.device.pooled_bytes(), 0);
    }

    #[test]
    fn stages_are_reported_in_order() {
        let (sender, receiver) = EventChannel::new();
        cpu_pipeline()
            .process_with_events(&noisy_image(8, 8), &sender)
            .unwrap();

        let completed: Vec<PipelineStage> = receiver
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                Event::Pipeline(PipelineEvent::StageCompleted { stage, .. }) => Some(stage),
                _ => None,
            })
            .collect();

        assert_eq!(completed, PipelineStage::ALL.to_vec());
    }

    #[test]
    fn working_set_scales_with_pixels() {
        assert_eq!(working_set_bytes(2, 2) * 4, working_set_bytes(4, 4));
        assert_eq!(working_set_bytes(1, 1), 3 * 8 * WORKING_BUFFERS);
    }
}
