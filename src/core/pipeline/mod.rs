//! # Pipeline Module
//!
//! The fixed image denoising pipeline.
//!
//! ## Pipeline Stages
//! 1. **Normalize** - 8-bit RGB to floats in `[0, 1]`
//! 2. **Non-local means** - patch 5, search distance 6, h = 0.1
//! 3. **Total variation** - Chambolle, weight 0.1
//! 4. **Sharpen** - add half the Gaussian gradient magnitude (sigma 1)
//! 5. **Quantize** - clip to `[0, 1]`, scale to 8-bit
//!
//! ## Parallelism
//! Every stage splits work by output row on the device's rayon pool.

mod device;
mod executor;
pub mod gradient;
mod image;
pub mod nl_means;
mod traits;
pub mod tv;

pub use device::{Device, DeviceChoice, ExecutionDevice, DEFAULT_MEMORY_BUDGET};
pub use executor::{working_set_bytes, DenoisePipeline, PipelineBuilder};
pub use image::{FloatImage, CHANNELS};
pub use traits::Denoiser;
