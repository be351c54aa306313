//! Total-variation denoising (Chambolle's projection algorithm).
//!
//! Each channel is solved on its own. The dual field `p` is updated with a
//! fixed step until the normalised energy
//!
//! ```text
//! E = (sum(d^2) + WEIGHT * sum(|grad(out)|)) / pixels
//! ```
//!
//! changes by less than `EPS * E_initial` between iterations, or
//! `MAX_ITERATIONS` is reached. `d` is the negative divergence of `p` and
//! `out = input + d`.

use super::image::{FloatImage, CHANNELS};
use rayon::prelude::*;

/// Denoising weight: larger values smooth more at the expense of fidelity
pub const WEIGHT: f64 = 0.1;

/// Relative energy change that counts as converged
pub const EPS: f64 = 2.0e-4;

/// Upper bound on iterations per channel
pub const MAX_ITERATIONS: usize = 200;

/// Step size, `1 / (2 * ndim)` for 2-D images
const TAU: f64 = 0.25;

/// Denoise every channel of `image` into `out`, which must have the same length.
///
/// Returns the number of iterations each channel ran.
pub fn denoise(image: &FloatImage, out: &mut [f64]) -> [usize; CHANNELS] {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let src = image.as_slice();

    let mut iterations = [0; CHANNELS];
    let mut channel = vec![0.0f64; w * h];
    for (c, count) in iterations.iter_mut().enumerate() {
        for (dst, px) in channel.iter_mut().zip(src.chunks_exact(CHANNELS)) {
            *dst = px[c];
        }

        let (result, ran) = denoise_channel(&channel, w, h);
        *count = ran;

        for (px, v) in out.chunks_exact_mut(CHANNELS).zip(&result) {
            px[c] = *v;
        }
    }
    iterations
}

/// Chambolle iterations for one `w x h` channel
fn denoise_channel(input: &[f64], w: usize, h: usize) -> (Vec<f64>, usize) {
    let n = w * h;
    let mut p_rows = vec![0.0f64; n];
    let mut p_cols = vec![0.0f64; n];
    let mut d = vec![0.0f64; n];
    let mut out = input.to_vec();

    let mut e_initial = 0.0f64;
    let mut e_previous = 0.0f64;
    let mut iteration = 0;
    let mut passes = 0;

    while iteration < MAX_ITERATIONS {
        passes += 1;
        if iteration > 0 {
            d.par_chunks_mut(w)
                .zip(out.par_chunks_mut(w))
                .enumerate()
                .for_each(|(y, (d_row, out_row))| {
                    for x in 0..w {
                        let i = y * w + x;
                        let mut v = -p_rows[i] - p_cols[i];
                        if y > 0 {
                            v += p_rows[i - w];
                        }
                        if x > 0 {
                            v += p_cols[i - 1];
                        }
                        d_row[x] = v;
                        out_row[x] = input[i] + v;
                    }
                });
        }

        // Per-row partial sums, added up in row order below
        let fidelity: Vec<f64> = d
            .par_chunks(w)
            .map(|row| row.iter().map(|&v| v * v).sum::<f64>())
            .collect();

        let out_ref = &out;
        let variation: Vec<f64> = p_rows
            .par_chunks_mut(w)
            .zip(p_cols.par_chunks_mut(w))
            .enumerate()
            .map(|(y, (pr, pc))| {
                let mut row_sum = 0.0f64;
                for x in 0..w {
                    let i = y * w + x;
                    let g_rows = if y + 1 < h { out_ref[i + w] - out_ref[i] } else { 0.0 };
                    let g_cols = if x + 1 < w { out_ref[i + 1] - out_ref[i] } else { 0.0 };
                    let norm = (g_rows * g_rows + g_cols * g_cols).sqrt();
                    row_sum += norm;

                    let scale = 1.0 + norm * TAU / WEIGHT;
                    pr[x] = (pr[x] - TAU * g_rows) / scale;
                    pc[x] = (pc[x] - TAU * g_cols) / scale;
                }
                row_sum
            })
            .collect();

        let energy = (fidelity.iter().sum::<f64>()
            + WEIGHT * variation.iter().sum::<f64>())
            / n as f64;

        if iteration == 0 {
            e_initial = energy;
            e_previous = energy;
        } else {
            // `<=` also stops a flat image, whose energy stays at zero
            if (e_previous - energy).abs() <= EPS * e_initial {
                break;
            }
            e_previous = energy;
        }
        iteration += 1;
    }

    (out, passes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(w: u32, h: u32, f: impl Fn(u32, u32) -> f64) -> FloatImage {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let v = f(x, y);
                data.extend_from_slice(&[v, v, v]);
            }
        }
        FloatImage::from_raw(w, h, data).unwrap()
    }

    fn total_variation(data: &[f64], w: usize, h: usize) -> f64 {
        let mut tv = 0.0;
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * CHANNELS;
                if x + 1 < w {
                    tv += (data[i + CHANNELS] - data[i]).abs();
                }
                if y + 1 < h {
                    tv += (data[i + w * CHANNELS] - data[i]).abs();
                }
            }
        }
        tv
    }

    #[test]
    fn flat_image_stops_immediately() {
        let image = gray(8, 8, |_, _| 0.4);
        let mut out = vec![0.0; image.as_slice().len()];
        let iterations = denoise(&image, &mut out);

        assert_eq!(iterations, [2, 2, 2]);
        assert_eq!(out, image.as_slice());
    }

    #[test]
    fn checkerboard_variation_is_reduced() {
        let image = gray(16, 16, |x, y| if (x + y) % 2 == 0 { 0.4 } else { 0.6 });
        let mut out = vec![0.0; image.as_slice().len()];
        denoise(&image, &mut out);

        assert!(total_variation(&out, 16, 16) < total_variation(image.as_slice(), 16, 16));
    }

    #[test]
    fn mean_is_preserved() {
        let image = gray(12, 10, |x, y| ((x * 3 + y * 5) % 7) as f64 / 7.0);
        let mut out = vec![0.0; image.as_slice().len()];
        denoise(&image, &mut out);

        let mean = |d: &[f64]| d.iter().sum::<f64>() / d.len() as f64;
        assert!((mean(&out) - mean(image.as_slice())).abs() < 1e-4);
    }

    #[test]
    fn channels_are_independent() {
        let mut data = Vec::new();
        for y in 0..6u32 {
            for x in 0..6u32 {
                let v = ((x + y) % 2) as f64;
                data.extend_from_slice(&[v, 0.5, 1.0 - v]);
            }
        }
        let image = FloatImage::from_raw(6, 6, data).unwrap();
        let mut out = vec![0.0; image.as_slice().len()];
        denoise(&image, &mut out);

        for px in out.chunks_exact(CHANNELS) {
            assert_eq!(px[1], 0.5);
        }
    }

    #[test]
    fn single_row_image_is_supported() {
        let image = gray(9, 1, |x, _| if x % 2 == 0 { 0.0 } else { 1.0 });
        let mut out = vec![0.0; image.as_slice().len()];
        let iterations = denoise(&image, &mut out);

        assert!(iterations.iter().all(|&i| i >= 1 && i <= MAX_ITERATIONS));
        assert!(out.iter().all(|v| v.is_finite()));
    }
}
