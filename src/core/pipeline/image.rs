//! Floating-point RGB image used between pipeline stages.

use crate::error::PipelineError;
use image::RgbImage;

/// Number of color channels carried through the pipeline
pub const CHANNELS: usize = 3;

/// Interleaved RGB image with values nominally in `[0, 1]`
///
/// Pixel `(x, y)` channel `c` lives at `(y * width + x) * 3 + c`.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    width: u32,
    height: u32,
    data: Vec<f64>,
}

impl FloatImage {
    /// Wrap an interleaved buffer, checking it holds exactly 3 channels
    pub fn from_raw(width: u32, height: u32, data: Vec<f64>) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize * CHANNELS {
            return Err(PipelineError::ChannelMismatch {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Normalize 8-bit channels into `[0, 1]`, writing into `buffer`
    pub fn normalize_into(image: &RgbImage, mut buffer: Vec<f64>) -> Result<Self, PipelineError> {
        buffer.clear();
        buffer.extend(image.as_raw().iter().map(|&v| f64::from(v) / 255.0));
        Self::from_raw(image.width(), image.height(), buffer)
    }

    /// Normalize 8-bit channels into `[0, 1]`
    pub fn normalize(image: &RgbImage) -> Result<Self, PipelineError> {
        Self::normalize_into(image, Vec::with_capacity(image.as_raw().len()))
    }

    /// Clip to `[0, 1]` and map back to 8-bit, rounding half to even
    pub fn quantize(&self) -> Result<RgbImage, PipelineError> {
        let bytes = self
            .data
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round_ties_even() as u8)
            .collect();

        RgbImage::from_raw(self.width, self.height, bytes).ok_or(PipelineError::ChannelMismatch {
            width: self.width,
            height: self.height,
            len: self.data.len(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Give up the buffer, e.g. to recycle it
    pub fn into_raw(self) -> Vec<f64> {
        self.data
    }

    /// Floats in one row (`width * 3`)
    pub fn row_len(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// First non-finite value, if any
    pub fn find_non_finite(&self) -> Option<usize> {
        self.data.iter().position(|v| !v.is_finite())
    }
}

/// Mirror an index into `0..n` without repeating the edge sample
/// (`... 2 1 | 0 1 2 ... n-1 | n-2 ...`).
pub(crate) fn reflect(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - m) as usize
    }
}

/// Mirror an index into `0..n` repeating the edge sample
/// (`... 1 0 | 0 1 2 ... n-1 | n-1 n-2 ...`).
pub(crate) fn reflect_half_sample(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}
