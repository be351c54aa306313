//! Gaussian gradient magnitude and edge-aware sharpening.
//!
//! The gradient is taken over the whole `height x width x channel` volume:
//! for each of the three axes, the image is filtered with a Gaussian
//! derivative along that axis and a plain Gaussian along the other two.
//! The magnitude is the root of the summed squares. Kernels are truncated
//! at four sigma and borders mirror with the edge sample repeated.

use super::image::{reflect_half_sample, FloatImage, CHANNELS};
use rayon::prelude::*;

/// Gaussian sigma for the gradient
pub const SIGMA: f64 = 1.0;

/// How much of the gradient magnitude is added back
pub const SHARPEN_AMOUNT: f64 = 0.5;

const TRUNCATE: f64 = 4.0;

/// Correlation weights for a Gaussian (`order` 0) or its first derivative
/// (`order` 1), indexed from `-radius` to `radius`.
pub fn gaussian_kernel(sigma: f64, order: u8) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let sigma2 = sigma * sigma;

    let phi: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / sigma2).exp())
        .collect();
    let total: f64 = phi.iter().sum();

    (-radius..=radius)
        .zip(&phi)
        .map(|(x, &p)| {
            let p = p / total;
            match order {
                0 => p,
                _ => x as f64 / sigma2 * p,
            }
        })
        .collect()
}

/// Shape of an interleaved image as (rows, columns, channels)
#[derive(Debug, Clone, Copy)]
struct Volume {
    rows: usize,
    cols: usize,
}

impl Volume {
    fn len(&self, axis: usize) -> usize {
        match axis {
            0 => self.rows,
            1 => self.cols,
            _ => CHANNELS,
        }
    }

    fn stride(&self, axis: usize) -> usize {
        match axis {
            0 => self.cols * CHANNELS,
            1 => CHANNELS,
            _ => 1,
        }
    }
}

/// Correlate `src` with `kernel` along one axis into `dst`
fn correlate_axis(src: &[f64], dst: &mut [f64], volume: Volume, axis: usize, kernel: &[f64]) {
    let radius = (kernel.len() / 2) as isize;
    let n = volume.len(axis);
    let stride = volume.stride(axis);
    let row_len = volume.cols * CHANNELS;

    dst.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, dst_row)| {
            for x in 0..volume.cols {
                for c in 0..CHANNELS {
                    let index = y * row_len + x * CHANNELS + c;
                    let position = [y, x, c][axis];
                    // Start of this line along `axis`
                    let base = index - position * stride;

                    let mut acc = 0.0f64;
                    for (k, &weight) in kernel.iter().enumerate() {
                        let offset = position as isize + k as isize - radius;
                        let j = reflect_half_sample(offset, n);
                        acc += weight * src[base + j * stride];
                    }
                    dst_row[x * CHANNELS + c] = acc;
                }
            }
        });
}

/// Gaussian gradient magnitude of `image`, written into `out`
///
/// `scratch` must hold two buffers of the image's length.
pub fn gradient_magnitude(image: &FloatImage, out: &mut [f64], scratch: [&mut [f64]; 2]) {
    let volume = Volume {
        rows: image.height() as usize,
        cols: image.width() as usize,
    };
    let smooth = gaussian_kernel(SIGMA, 0);
    let derivative = gaussian_kernel(SIGMA, 1);
    let [a, b] = scratch;

    out.iter_mut().for_each(|v| *v = 0.0);

    for derivative_axis in 0..3 {
        let kernel_for = |axis: usize| {
            if axis == derivative_axis {
                &derivative
            } else {
                &smooth
            }
        };

        correlate_axis(image.as_slice(), a, volume, 0, kernel_for(0));
        correlate_axis(a, b, volume, 1, kernel_for(1));
        correlate_axis(b, a, volume, 2, kernel_for(2));

        out.par_iter_mut()
            .zip(a.par_iter())
            .for_each(|(m, &g)| *m += g * g);
    }

    out.par_iter_mut().for_each(|m| *m = m.sqrt());
}

/// Add `SHARPEN_AMOUNT` times the gradient magnitude onto `image`
pub fn sharpen(image: &mut FloatImage, magnitude: &[f64]) {
    image
        .as_mut_slice()
        .par_iter_mut()
        .zip(magnitude.par_iter())
        .for_each(|(v, &m)| *v += SHARPEN_AMOUNT * m);
}
