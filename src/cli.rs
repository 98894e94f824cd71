use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::image_processing::{
    ConversionConfig, DitherMode, QuantizationSpec, QuantizeMethod, TypeSpecs,
    DEFAULT_MAX_WORKERS,
};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodArg {
    /// Median cut: split the box with the widest channel range
    #[value(name = "median-cut")]
    MedianCut,
    /// Maximum coverage: split the most populated box
    #[value(name = "max-coverage")]
    MaxCoverage,
    /// Octree reduction (fastest)
    #[default]
    #[value(name = "fast-octree")]
    FastOctree,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitherArg {
    /// Map each pixel to the nearest palette color
    #[value(name = "none")]
    None,
    /// Floyd-Steinberg error diffusion
    #[default]
    #[value(name = "floyd-steinberg")]
    FloydSteinberg,
}

impl From<MethodArg> for QuantizeMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::MedianCut => QuantizeMethod::MedianCut,
            MethodArg::MaxCoverage => QuantizeMethod::MaxCoverage,
            MethodArg::FastOctree => QuantizeMethod::FastOctree,
        }
    }
}

impl From<DitherArg> for DitherMode {
    fn from(dither: DitherArg) -> Self {
        match dither {
            DitherArg::None => DitherMode::None,
            DitherArg::FloydSteinberg => DitherMode::FloydSteinberg,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "avif2png",
    version,
    about = "Batch converter from AVIF to palette-optimized PNG",
    long_about = "
AVIF to PNG batch converter

Converts every .avif file in a directory to PNG. Each image is classified as
grayscale, grayscale plus one accent color, or color, and can be reduced to a
palette of 2^N colors per type. Grayscale images without an explicit bit depth
are always reduced to 16 gray levels.

Files are grouped into size-bounded batches and converted in parallel.

Example Usage:
  # Convert a folder in place
  avif2png ~/Scans

  # Mirror a whole tree into another folder, 2-bit grayscale, 4-bit color
  avif2png ~/Scans -r -o ~/Converted --qb-gray 2 --qb-color 4

  # Delete the sources after successful conversion, print only the summary
  avif2png ~/Scans --remove --silent

  # Report the real bit depth of a single image
  avif2png ~/Converted/page_001.png --chk-bit

  # Save the current options for later runs, then reuse them
  avif2png --qb-gray 3 --method median-cut --save-config options.json
  avif2png ~/Scans --config options.json"
)]
pub struct Args {
    /// Input directory (or a single image with --chk-bit)
    #[arg(value_name = "INPUT", required_unless_present = "save_config")]
    pub input: Option<PathBuf>,

    /// Output directory (default: next to the sources)
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Descend into subdirectories and mirror them in the output
    #[arg(short = 'r', long = "recursive")]
    pub recursive: bool,

    /// Delete each source file after it was converted successfully
    #[arg(long = "remove")]
    pub remove: bool,

    /// Print only the final summary line
    #[arg(long = "silent")]
    pub silent: bool,

    /// Quantization bits (1-8) for color images
    #[arg(long = "qb-color", value_name = "BITS", value_parser = clap::value_parser!(u8).range(1..=8))]
    pub qb_color: Option<u8>,

    /// Quantization bits (1-8) for grayscale images with one accent color
    #[arg(long = "qb-gray-color", value_name = "BITS", value_parser = clap::value_parser!(u8).range(1..=8))]
    pub qb_gray_color: Option<u8>,

    /// Quantization bits (1-8) for grayscale images
    #[arg(long = "qb-gray", value_name = "BITS", value_parser = clap::value_parser!(u8).range(1..=8))]
    pub qb_gray: Option<u8>,

    /// Palette construction method
    #[arg(long = "method", default_value = "fast-octree", value_name = "METHOD")]
    pub method: MethodArg,

    /// Dithering applied when mapping to the palette
    #[arg(long = "dither", default_value = "floyd-steinberg", value_name = "MODE")]
    pub dither: DitherArg,

    /// Number of parallel workers (0 = auto-detect CPU cores)
    #[arg(short = 'j', long = "jobs", default_value_t = DEFAULT_MAX_WORKERS, value_name = "N")]
    pub jobs: usize,

    /// Maximum combined size of one batch, in MiB
    #[arg(long = "batch-size-mib", default_value_t = 5, value_name = "MIB")]
    pub batch_size_mib: u64,

    /// Measure the real bit depth of every output (or of INPUT when it is a file)
    #[arg(long = "chk-bit")]
    pub chk_bit: bool,

    /// Print a table with every converted file at the end
    #[arg(long = "report")]
    pub report: bool,

    /// Emit progress as JSON lines on stdout (for GUI wrappers)
    #[arg(long = "json-progress")]
    pub json_progress: bool,

    /// Log level: 0 off, 1 error, 2 warn, 3 info, 4 debug (RUST_LOG overrides)
    #[arg(long = "log", default_value_t = 2, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=4))]
    pub log: u8,

    /// Append logs to this file instead of stderr
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Load options from a JSON file (command-line values win)
    #[arg(long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Write the effective options to a JSON file and exit
    #[arg(long = "save-config", value_name = "FILE")]
    pub save_config: Option<PathBuf>,
}

impl Args {
    /// Worker count with `0` resolved to the number of CPU cores
    pub fn worker_count(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }

    /// Batch threshold in bytes
    pub fn batch_threshold(&self) -> u64 {
        self.batch_size_mib.saturating_mul(1024 * 1024)
    }

    /// Per-type quantization settings; method and dither are shared
    pub fn type_specs(&self) -> TypeSpecs {
        let method = QuantizeMethod::from(self.method);
        let dither = DitherMode::from(self.dither);
        TypeSpecs {
            gray: QuantizationSpec::new(self.qb_gray, method, dither),
            accent: QuantizationSpec::new(self.qb_gray_color, method, dither),
            color: QuantizationSpec::new(self.qb_color, method, dither),
        }
    }

    /// Build the run parameters handed to the conversion engine
    pub fn to_conversion_config(&self) -> Result<ConversionConfig> {
        let input = self
            .input
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No input directory given"))?;

        let mut config = ConversionConfig::new(input);
        config.output_dir = self.output_dir.clone();
        config.recursive = self.recursive;
        config.specs = self.type_specs();
        config.remove_originals = self.remove;
        config.check_bit_depth = self.chk_bit;
        config.max_workers = self.worker_count();
        config.batch_threshold = self.batch_threshold();
        Ok(config)
    }
}
