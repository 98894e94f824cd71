use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Args;

/// Highest accepted `--jobs` value
pub const MAX_JOBS: usize = 64;

/// Create a styled progress bar
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg} ({eta})",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 60 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else if total_secs > 0 {
        format!("{}.{:03}s", total_secs, millis)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Validate command line arguments before any work starts
pub fn validate_inputs(args: &Args) -> Result<()> {
    let input = args
        .input
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("No input directory given"))?;

    if !input.exists() {
        return Err(anyhow::anyhow!(
            "Input path does not exist: {}",
            input.display()
        ));
    }

    // A single file is only accepted for bit-depth inspection
    if !input.is_dir() && !(args.chk_bit && input.is_file()) {
        return Err(anyhow::anyhow!(
            "Input path is not a directory: {}",
            input.display()
        ));
    }

    if let Some(output) = &args.output_dir {
        if output.exists() && !output.is_dir() {
            return Err(anyhow::anyhow!(
                "Output path is not a directory: {}",
                output.display()
            ));
        }
    }

    if args.jobs > MAX_JOBS {
        return Err(anyhow::anyhow!(
            "Job count too high (max {}), got: {}",
            MAX_JOBS,
            args.jobs
        ));
    }

    if args.batch_size_mib == 0 {
        return Err(anyhow::anyhow!("Batch size must be at least 1 MiB"));
    }

    Ok(())
}

/// Get file extension in lowercase
pub fn get_file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Check if a file has one of the specified extensions (case-insensitive)
pub fn has_valid_extension(path: &Path, extensions: &[&str]) -> bool {
    match get_file_extension(path) {
        Some(ext) => extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// Map the `--log` level (0..=4) to a tracing filter
pub fn log_level_filter(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `level` when set. Logs go to stderr, or are appended
/// to `log_file` without ANSI colors.
pub fn init_logging(level: u8, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(log_level_filter(level).into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()
                .context("Failed to initialize logging")?;
        }
        None => {
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to initialize logging")?;
        }
    }

    Ok(())
}

/// Print a status line unless running silently
pub fn status_println(silent: bool, message: &str) {
    if !silent {
        println!("{} {}", style("[INFO]").dim(), message);
    }
}

/// Print warning message
pub fn warn_println(message: &str) {
    println!("{} {}", style("[WARNING]").yellow().bold(), message);
}

/// Print error message
pub fn error_println(message: &str) {
    eprintln!("{} {}", style("[ERROR]").red().bold(), message);
}
