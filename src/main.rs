//! # denoise CLI
//!
//! Command-line interface for the image denoiser.
//!
//! ## Usage
//! ```bash
//! denoise process photo.jpg -o clean.png
//! denoise process photo.jpg --device cpu --output json
//! denoise clear-cache
//! ```

mod cli;

use image_denoiser::Result;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    cli::run()
}
