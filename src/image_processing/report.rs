//! Conversion report printed after a run with `--report`
//!
//! Groups the per-file results by detected image type and lists failures
//! separately, followed by a short summary.
use prettytable::{format, Cell, Row, Table};
use std::time::Duration;

use super::{ConversionResult, ImageType, RunSummary};

/// One converted (or failed) file in the report
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub input_filename: String,
    pub output_filename: String,
    pub image_type: Option<ImageType>,
    pub action: String,
    pub colors: Option<usize>,
    pub bits: Option<u32>,
    pub error: Option<String>,
}

impl From<&ConversionResult> for ReportEntry {
    fn from(result: &ConversionResult) -> Self {
        Self {
            input_filename: result.file_name().to_string(),
            output_filename: result
                .output
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("unknown")
                .to_string(),
            image_type: result.image_type,
            action: result
                .action
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string()),
            colors: result.bit_depth.map(|b| b.colors),
            bits: result.bit_depth.map(|b| b.bits),
            error: result.error.clone(),
        }
    }
}

/// Complete conversion report
#[derive(Debug, Default)]
pub struct ConversionReport {
    pub grayscale: Vec<ReportEntry>,
    pub accent: Vec<ReportEntry>,
    pub color: Vec<ReportEntry>,
    pub failed: Vec<ReportEntry>,
    pub cancelled: usize,
    pub duration: Duration,
}

impl ConversionReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report from a finished run
    pub fn from_summary(summary: &RunSummary) -> Self {
        let mut report = Self::new();
        for result in &summary.results {
            report.add(result);
        }
        report.cancelled = summary.cancelled;
        report.duration = summary.duration;
        report
    }

    /// Add one result to the matching section
    pub fn add(&mut self, result: &ConversionResult) {
        let entry = ReportEntry::from(result);
        if !result.succeeded {
            self.failed.push(entry);
            return;
        }
        match result.image_type {
            Some(ImageType::Grayscale) => self.grayscale.push(entry),
            Some(ImageType::GrayscalePlusAccent) => self.accent.push(entry),
            Some(ImageType::Color) | None => self.color.push(entry),
        }
    }

    pub fn converted(&self) -> usize {
        self.grayscale.len() + self.accent.len() + self.color.len()
    }

    /// Print the complete report as formatted tables
    pub fn print(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════════════════╗");
        println!("║                                  REPORT                                  ║");
        println!("╚══════════════════════════════════════════════════════════════════════════╝\n");

        for (title, entries) in [
            ("GRAYSCALE", &self.grayscale),
            ("GRAYSCALE + ACCENT", &self.accent),
            ("COLOR", &self.color),
        ] {
            if entries.is_empty() {
                continue;
            }
            println!("{} ({} total)\n", title, entries.len());
            conversion_table(entries).printstd();
            println!();
        }

        if !self.failed.is_empty() {
            println!("FAILED ({} total)\n", self.failed.len());
            failure_table(&self.failed).printstd();
            println!();
        }

        let total = self.converted() + self.failed.len() + self.cancelled;
        println!("Summary:");
        println!("   • Total files: {}", total);
        println!(
            "   • Converted: {} ({:.1}%)",
            self.converted(),
            percent(self.converted(), total)
        );
        println!("   • Failed: {}", self.failed.len());
        if self.cancelled > 0 {
            println!("   • Cancelled: {}", self.cancelled);
        }
        println!("   • Elapsed: {:.2}s", self.duration.as_secs_f64());
        println!();
    }
}

fn conversion_table(entries: &[ReportEntry]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    table.add_row(Row::new(vec![
        Cell::new("Input"),
        Cell::new("Output"),
        Cell::new("Action"),
        Cell::new("Colors"),
        Cell::new("Bits"),
    ]));

    for entry in entries {
        table.add_row(Row::new(vec![
            Cell::new(&truncate(&entry.input_filename, 30)),
            Cell::new(&truncate(&entry.output_filename, 30)),
            Cell::new(&entry.action),
            Cell::new(&optional(entry.colors)),
            Cell::new(&optional(entry.bits)),
        ]));
    }

    table
}

fn failure_table(entries: &[ReportEntry]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    table.add_row(Row::new(vec![
        Cell::new("Input"),
        Cell::new("Type"),
        Cell::new("Error"),
    ]));

    for entry in entries {
        table.add_row(Row::new(vec![
            Cell::new(&truncate(&entry.input_filename, 30)),
            Cell::new(
                &entry
                    .image_type
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(&truncate(entry.error.as_deref().unwrap_or(""), 60)),
        ]));
    }

    table
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Truncate string to fit in column
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}
