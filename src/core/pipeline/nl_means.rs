//! Non-local means denoising, fast variant.
//!
//! Every pixel becomes a weighted average of the pixels within
//! `PATCH_DISTANCE` of it. A candidate's weight depends on how similar the
//! 5x5 patch around it is to the 5x5 patch around the target:
//!
//! ```text
//! dist   = sum over patch and channels of (p - q)^2 / (channels * h^2 * patch_size^2)
//! weight = exp(-max(dist, 0))
//! ```
//!
//! Candidates whose distance exceeds `DISTANCE_CUTOFF` are skipped. The
//! centre offset always has distance zero, so every pixel keeps a weight.
//!
//! The fast variant uses a flat patch kernel and evaluates one offset at a
//! time, so patch distances come from running column sums instead of a full
//! patch comparison per candidate.
//!
//! Borders are handled by mirroring the image (no edge repeat).

use super::image::{reflect, FloatImage, CHANNELS};
use rayon::prelude::*;

/// Side of the square patch compared between pixels
pub const PATCH_SIZE: usize = 5;

/// Maximum offset searched in each direction
pub const PATCH_DISTANCE: usize = 6;

/// Smoothing parameter; larger values average more aggressively
pub const H: f64 = 0.1;

/// Patch distance beyond which a candidate contributes nothing
pub const DISTANCE_CUTOFF: f64 = 5.0;

const PATCH_RADIUS: usize = PATCH_SIZE / 2;
const PAD: usize = PATCH_RADIUS + PATCH_DISTANCE;

/// Mirror-padded copy of the image with `PAD` pixels on every side
struct Padded {
    width: usize,
    data: Vec<f64>,
}

impl Padded {
    fn new(image: &FloatImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let pw = w + 2 * PAD;
        let ph = h + 2 * PAD;
        let src = image.as_slice();

        let mut data = Vec::with_capacity(pw * ph * CHANNELS);
        for py in 0..ph {
            let y = reflect(py as isize - PAD as isize, h);
            for px in 0..pw {
                let x = reflect(px as isize - PAD as isize, w);
                let i = (y * w + x) * CHANNELS;
                data.extend_from_slice(&src[i..i + CHANNELS]);
            }
        }

        Self { width: pw, data }
    }

    #[inline]
    fn pixel(&self, x: usize, y: usize) -> &[f64] {
        let i = (y * self.width + x) * CHANNELS;
        &self.data[i..i + CHANNELS]
    }
}

/// Denoise `image` into `out`, which must have the same length.
///
/// Rows are independent, and each row visits offsets in a fixed order,
/// so the result does not depend on how rows are scheduled.
pub fn denoise(image: &FloatImage, out: &mut [f64]) {
    let w = image.width() as usize;
    let padded = Padded::new(image);
    let h2s2 = CHANNELS as f64 * H * H * (PATCH_SIZE * PATCH_SIZE) as f64;
    let d = PATCH_DISTANCE as isize;

    out.par_chunks_mut(image.row_len())
        .enumerate()
        .for_each(|(y, out_row)| {
            let mut acc = vec![0.0f64; w * CHANNELS];
            let mut weight_sum = vec![0.0f64; w];
            // Column sums over the patch height, for padded columns
            // PAD - r ..= PAD + w - 1 + r
            let mut column = vec![0.0f64; w + 2 * PATCH_RADIUS];

            let center_y = y + PAD;

            for dy in -d..=d {
                for dx in -d..=d {
                    for (k, sum) in column.iter_mut().enumerate() {
                        let px = PAD - PATCH_RADIUS + k;
                        let qx = (px as isize + dx) as usize;
                        let mut s = 0.0f64;
                        for py in center_y - PATCH_RADIUS..=center_y + PATCH_RADIUS {
                            let qy = (py as isize + dy) as usize;
                            let p = padded.pixel(px, py);
                            let q = padded.pixel(qx, qy);
                            for c in 0..CHANNELS {
                                let diff = p[c] - q[c];
                                s += diff * diff;
                            }
                        }
                        *sum = s;
                    }

                    let mut window: f64 = column[..PATCH_SIZE].iter().sum();
                    for x in 0..w {
                        if x > 0 {
                            window += column[x + PATCH_SIZE - 1] - column[x - 1];
                        }
                        let distance = window.max(0.0) / h2s2;
                        if distance > DISTANCE_CUTOFF {
                            continue;
                        }
                        let weight = (-distance).exp();

                        let sx = (x + PAD) as isize + dx;
                        let sy = center_y as isize + dy;
                        let source = padded.pixel(sx as usize, sy as usize);
                        for c in 0..CHANNELS {
                            acc[x * CHANNELS + c] += weight * source[c];
                        }
                        weight_sum[x] += weight;
                    }
                }
            }

            for x in 0..w {
                for c in 0..CHANNELS {
                    out_row[x * CHANNELS + c] = acc[x * CHANNELS + c] / weight_sum[x];
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> [f64; 3]) -> FloatImage {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&f(x, y));
            }
        }
        FloatImage::from_raw(w, h, data).unwrap()
    }

    fn run(image: &FloatImage) -> Vec<f64> {
        let mut out = vec![0.0; image.as_slice().len()];
        denoise(image, &mut out);
        out
    }

    #[test]
    fn constant_image_is_unchanged() {
        let image = image_from_fn(12, 9, |_, _| [0.25, 0.5, 0.75]);
        let out = run(&image);
        for (a, b) in out.iter().zip(image.as_slice()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn noise_is_reduced() {
        // Deterministic salt-and-pepper style noise on mid gray
        let image = image_from_fn(24, 24, |x, y| {
            let n = if (x * 7 + y * 13) % 5 == 0 { 0.1 } else { 0.0 };
            [0.5 + n, 0.5 + n, 0.5 + n]
        });

        let variance = |data: &[f64]| {
            let mean = data.iter().sum::<f64>() / data.len() as f64;
            data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / data.len() as f64
        };

        let out = run(&image);
        assert!(variance(&out) < variance(image.as_slice()));
    }

    #[test]
    fn strong_edge_survives() {
        let image = image_from_fn(20, 10, |x, _| if x < 10 { [0.0; 3] } else { [1.0; 3] });
        let out = run(&image);

        let at = |x: usize, y: usize| out[(y * 20 + x) * CHANNELS];
        assert!(at(2, 5) < 0.05);
        assert!(at(17, 5) > 0.95);
    }

    #[test]
    fn tiny_images_are_supported() {
        let image = image_from_fn(1, 1, |_, _| [0.3, 0.6, 0.9]);
        let out = run(&image);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[2] - 0.9).abs() < 1e-6);
    }

    fn checkerboard(a: f64, b: f64) -> FloatImage {
        image_from_fn(16, 16, move |x, y| if (x + y) % 2 == 0 { [a; 3] } else { [b; 3] })
    }

    #[test]
    fn dissimilar_patches_beyond_cutoff_are_ignored() {
        // Odd offsets compare opposite patches: distance 100 * 0.25^2 = 6.25
        let image = checkerboard(0.5, 0.25);
        let out = run(&image);
        for (a, b) in out.iter().zip(image.as_slice()) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn dissimilar_patches_within_cutoff_still_contribute() {
        // Distance 100 * 0.2^2 = 4, below the cutoff
        let image = checkerboard(0.5, 0.3);
        let out = run(&image);
        assert!((out[0] - 0.5).abs() > 1e-3, "{}", out[0]);
        assert!(out[0] > 0.3 && out[0] < 0.5);
    }

    #[test]
    fn output_is_deterministic() {
        let image = image_from_fn(15, 11, |x, y| {
            [(x as f64 * 0.07) % 1.0, (y as f64 * 0.11) % 1.0, 0.5]
        });
        assert_eq!(run(&image), run(&image));
    }
}
