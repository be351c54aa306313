//! # CLI Module
//!
//! Command-line interface for the image denoiser.
//!
//! ## Usage
//! ```bash
//! # Denoise an image (writes photo.denoised.png)
//! denoise process photo.jpg
//!
//! # Choose the output file and force the single-threaded device
//! denoise process photo.jpg -o clean.png --device cpu
//!
//! # JSON output
//! denoise process photo.jpg --output json
//!
//! # Cache maintenance
//! denoise stats
//! denoise clear-cache
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use image_denoiser::core::cache::{CacheStats, DiskCache};
use image_denoiser::core::pipeline::{DeviceChoice, DenoisePipeline, DEFAULT_MEMORY_BUDGET};
use image_denoiser::core::service::{ImageService, UploadResponse};
use image_denoiser::core::upload::{read_file_bytes, Upload};
use image_denoiser::error::{DenoiserError, Result};
use image_denoiser::events::{CacheEvent, Event, EventChannel, PipelineEvent, RequestEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

/// Image Denoiser - non-local means, total variation and edge-aware sharpening
#[derive(Parser, Debug)]
#[command(name = "denoise")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Denoise an image, reusing a cached result when the bytes match
    Process {
        /// Image to process (png, jpg, jpeg or gif)
        file: PathBuf,

        /// Where to write the PNG output
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,

        /// Execution device
        #[arg(short, long, default_value = "auto")]
        device: Device,

        /// Working-memory budget of the accelerated device, in MiB
        #[arg(long)]
        memory_budget: Option<u64>,

        /// Output format
        #[arg(long, default_value = "pretty")]
        output: OutputFormat,

        /// Cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Remove every cached result
    ClearCache {
        /// Cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Show cache statistics
    Stats {
        /// Output format
        #[arg(long, default_value = "pretty")]
        output: OutputFormat,

        /// Cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Device {
    /// Accelerated when more than one core is available
    Auto,
    /// Multi-threaded with a memory budget
    Accelerated,
    /// Single-threaded fallback
    Cpu,
}

impl From<Device> for DeviceChoice {
    fn from(device: Device) -> Self {
        match device {
            Device::Auto => DeviceChoice::Auto,
            Device::Accelerated => DeviceChoice::Accelerated,
            Device::Cpu => DeviceChoice::Cpu,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    image_denoiser::init_tracing();

    match cli.command {
        Commands::Process {
            file,
            out,
            device,
            memory_budget,
            output,
            cache_dir,
            verbose,
        } => run_process(
            &file,
            out,
            device.into(),
            memory_budget,
            output,
            cache_dir,
            verbose,
        ),
        Commands::ClearCache { cache_dir } => run_clear_cache(cache_dir),
        Commands::Stats { output, cache_dir } => run_stats(output, cache_dir),
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("image-denoiser")
}

fn open_cache(cache_dir: Option<PathBuf>) -> Result<DiskCache> {
    let root = cache_dir.unwrap_or_else(default_cache_root);
    Ok(DiskCache::open_versioned(&root)?)
}

fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("denoised.png")
}

fn run_process(
    file: &Path,
    out: Option<PathBuf>,
    device: DeviceChoice,
    memory_budget_mib: Option<u64>,
    output: OutputFormat,
    cache_dir: Option<PathBuf>,
    verbose: bool,
) -> Result<ExitCode> {
    let term = Term::stderr();

    if matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Image Denoiser").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let bytes = read_file_bytes(file)?.into_vec();
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let pipeline = DenoisePipeline::builder()
        .device(device)
        .memory_budget(budget_bytes(memory_budget_mib))
        .build()?;

    if verbose {
        term.write_line(&format!(
            "  {} {}",
            style("Device:").dim(),
            pipeline.device()
        ))
        .ok();
    }

    let service = ImageService::builder()
        .denoiser(Arc::new(pipeline))
        .cache(Arc::new(open_cache(cache_dir)?))
        .build()?;

    let (sender, receiver) = EventChannel::new();

    let progress = if matches!(output, OutputFormat::Pretty) {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();

    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            let Some(pb) = progress_clone.as_ref() else {
                continue;
            };
            match event {
                Event::Request(RequestEvent::Started { hash }) => {
                    pb.set_message(format!("Checking cache for {}", &hash[..12]));
                }
                Event::Request(RequestEvent::Joined { .. }) => {
                    pb.set_message("Waiting for identical request");
                }
                Event::Cache(CacheEvent::Unavailable { message, .. }) if verbose => {
                    pb.println(format!("  {} {}", style("Cache unavailable:").yellow(), message));
                }
                Event::Pipeline(PipelineEvent::StageStarted { stage }) => {
                    pb.set_message(format!("{}...", stage));
                }
                Event::Pipeline(PipelineEvent::StageCompleted { stage, duration_ms }) if verbose => {
                    pb.println(format!(
                        "  {} {} ({} ms)",
                        style("✓").green(),
                        stage,
                        duration_ms
                    ));
                }
                Event::Request(RequestEvent::Completed { .. })
                | Event::Request(RequestEvent::Failed { .. }) => {
                    pb.finish_and_clear();
                }
                _ => {}
            }
        }
    });

    let response = service.respond(Some(Upload::new(file_name, bytes)), &sender);

    drop(sender);
    event_thread.join().ok();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let written = match &response.png {
        Some(png) => {
            let path = out.unwrap_or_else(|| default_output_path(file));
            std::fs::write(&path, png).map_err(|e| DenoiserError::Io {
                path: path.clone(),
                source: e,
            })?;
            Some(path)
        }
        None => None,
    };

    match output {
        OutputFormat::Pretty => print_pretty_response(&term, &response, written.as_deref()),
        OutputFormat::Json => print_json_response(&response, written.as_deref()),
    }

    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_pretty_response(term: &Term, response: &UploadResponse, written: Option<&Path>) {
    if !response.success {
        term.write_line(&format!(
            "{} {} {}",
            style("✗").red().bold(),
            response.error.as_deref().unwrap_or("Unknown error"),
            style(format!("({})", response.status)).dim()
        ))
        .ok();
        return;
    }

    term.write_line(&format!("{} Image processed", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    if let (Some(width), Some(height)) = (response.width, response.height) {
        term.write_line(&format!(
            "  {} {}x{}",
            style("Size:").dim(),
            width,
            height
        ))
        .ok();
    }

    if response.from_cache {
        term.write_line(&format!("  {} served from cache", style("⚡").yellow()))
            .ok();
    } else if let Some(seconds) = &response.processing_time {
        term.write_line(&format!(
            "  {} processed in {}s",
            style("⏱").cyan(),
            style(seconds).cyan()
        ))
        .ok();
    }

    if let Some(hash) = &response.hash {
        term.write_line(&format!("  {} {}", style("Hash:").dim(), style(hash).dim()))
            .ok();
    }

    if let Some(path) = written {
        term.write_line(&format!(
            "  {} {}",
            style("Output:").dim(),
            style(path.display()).bold()
        ))
        .ok();
    }
}

fn print_json_response(response: &UploadResponse, written: Option<&Path>) {
    let mut value = match serde_json::to_value(response) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "could not serialize response");
            return;
        }
    };

    if let (Some(path), Some(object)) = (written, value.as_object_mut()) {
        object.insert(
            "output".to_string(),
            serde_json::Value::String(path.display().to_string()),
        );
    }

    match serde_json::to_string_pretty(&value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!(error = %e, "could not serialize response"),
    }
}

fn run_clear_cache(cache_dir: Option<PathBuf>) -> Result<ExitCode> {
    use image_denoiser::core::cache::ImageCache;

    let term = Term::stderr();
    let cache = open_cache(cache_dir)?;
    let removed = cache.clear()?;

    term.write_line(&format!(
        "{} Cache cleared. {} files removed.",
        style("✓").green().bold(),
        style(removed).cyan()
    ))
    .ok();

    Ok(ExitCode::SUCCESS)
}

fn run_stats(output: OutputFormat, cache_dir: Option<PathBuf>) -> Result<ExitCode> {
    use image_denoiser::core::cache::ImageCache;

    let cache = open_cache(cache_dir)?;
    let stats = cache.stats()?;

    match output {
        OutputFormat::Pretty => print_pretty_stats(&Term::stderr(), cache.dir(), &stats),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "directory": cache.dir().display().to_string(),
                "total_entries": stats.total_entries,
                "total_size_bytes": stats.total_size_bytes,
                "oldest_entry": stats.oldest_entry.map(format_time),
                "newest_entry": stats.newest_entry.map(format_time),
            });
            match serde_json::to_string_pretty(&value) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!(error = %e, "could not serialize stats"),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_pretty_stats(term: &Term, dir: &Path, stats: &CacheStats) {
    term.write_line(&format!("{}", style("Cache").bold().underlined()))
        .ok();
    term.write_line(&format!("  {} {}", style("Directory:").dim(), dir.display()))
        .ok();
    term.write_line(&format!(
        "  {} cached images, {}",
        style(stats.total_entries).cyan(),
        style(format_bytes(stats.total_size_bytes)).yellow()
    ))
    .ok();

    if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
        term.write_line(&format!(
            "  {} {} to {}",
            style("Stored:").dim(),
            format_time(oldest),
            format_time(newest)
        ))
        .ok();
    }
}

/// `--memory-budget` in bytes; huge values saturate instead of wrapping
fn budget_bytes(mib: Option<u64>) -> u64 {
    mib.map(|mib| mib.saturating_mul(1024 * 1024))
        .unwrap_or(DEFAULT_MEMORY_BUDGET)
}

fn format_time(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_sits_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("/tmp/photo.jpg")),
            PathBuf::from("/tmp/photo.denoised.png")
        );
    }

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn memory_budget_is_converted_from_mib() {
        assert_eq!(budget_bytes(None), DEFAULT_MEMORY_BUDGET);
        assert_eq!(budget_bytes(Some(3)), 3 * 1024 * 1024);
        assert_eq!(budget_bytes(Some(u64::MAX)), u64::MAX);
    }

    #[test]
    fn cli_parses_process_flags() {
        let cli = Cli::try_parse_from([
            "denoise", "process", "in.png", "-o", "out.png", "--device", "cpu", "--output", "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Process {
                file, out, device, ..
            } => {
                assert_eq!(file, PathBuf::from("in.png"));
                assert_eq!(out, Some(PathBuf::from("out.png")));
                assert!(matches!(device, Device::Cpu));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
