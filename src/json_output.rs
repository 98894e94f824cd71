//! JSON output for GUI integration
//!
//! When --json-progress flag is enabled, all progress and status information
//! is emitted as JSON lines to stdout, suppressing all other output.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::image_processing::{ConversionResult, RunSummary};

/// Minimum time between two progress lines (~25 FPS)
pub const PROGRESS_INTERVAL_MS: u64 = 40;

/// Last progress emission timestamp (milliseconds since epoch)
static LAST_PROGRESS_MS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// Progress update
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    /// Bit depth measured for a converted file
    BitDepth {
        input_path: String,
        output_path: String,
        colors: usize,
        bits: u32,
    },
    /// File conversion failed
    FileFailed { input_path: String, error: String },
    /// Run aborted before any file was converted
    Error { message: String },
    /// Conversion summary
    Summary {
        total_files: usize,
        succeeded: usize,
        failed: usize,
        cancelled: usize,
        duration_secs: f64,
    },
}

impl JsonMessage {
    /// Emit JSON message to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Create and emit progress message (throttled to ~25 FPS for smooth GUI updates)
    ///
    /// The final progress (current == total) is always emitted.
    pub fn progress(current: usize, total: usize, message: impl Into<String>) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let last_ms = LAST_PROGRESS_MS.load(Ordering::Relaxed);

        if should_emit_progress(now_ms, last_ms, current, total) {
            LAST_PROGRESS_MS.store(now_ms, Ordering::Relaxed);
            Self::Progress {
                current,
                total,
                message: message.into(),
            }
            .emit();
        }
    }

    /// Emit the per-file messages for a finished conversion
    pub fn file_result(result: &ConversionResult) {
        if let Some(error) = &result.error {
            Self::file_failed(&result.source, error.clone());
        } else if let Some(report) = result.bit_depth {
            Self::BitDepth {
                input_path: result.source.display().to_string(),
                output_path: result.output.display().to_string(),
                colors: report.colors,
                bits: report.bits,
            }
            .emit();
        }
    }

    /// Create and emit file failed message
    pub fn file_failed(input_path: &Path, error: impl Into<String>) {
        Self::FileFailed {
            input_path: input_path.display().to_string(),
            error: error.into(),
        }
        .emit();
    }

    /// Create and emit a fatal error message
    pub fn error(message: impl Into<String>) {
        Self::Error {
            message: message.into(),
        }
        .emit();
    }

    /// Create and emit summary message
    pub fn summary(summary: &RunSummary) {
        Self::Summary {
            total_files: summary.total(),
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
            duration_secs: summary.duration.as_secs_f64(),
        }
        .emit();
    }
}

/// Emit when the interval elapsed, or always for the final update
fn should_emit_progress(now_ms: u64, last_ms: u64, current: usize, total: usize) -> bool {
    now_ms.saturating_sub(last_ms) >= PROGRESS_INTERVAL_MS || current == total
}
