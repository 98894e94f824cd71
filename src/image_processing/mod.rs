pub mod batch;
pub mod bit_depth;
pub mod classify;
pub mod convert;
pub mod dithering;
pub mod encode;
pub mod paths;
pub mod quantize;
pub mod report;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConvertError;

pub use batch::{convert_all, partition_batches, CancellationToken, ProgressEvent};
pub use bit_depth::BitDepthReport;
pub use classify::classify;
pub use convert::convert_one;
pub use encode::{render_output, RenderAction};
pub use paths::{remove_original, resolve_output_path};

/// Smallest and largest accepted quantization bit depth
pub const MIN_BIT_DEPTH: u8 = 1;
pub const MAX_BIT_DEPTH: u8 = 8;

/// Default number of parallel workers when the caller does not choose one
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default cumulative byte size of one batch (5 MiB)
pub const DEFAULT_BATCH_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Visual category assigned to every decoded source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum ImageType {
    #[strum(serialize = "grayscale")]
    Grayscale,
    #[strum(serialize = "grayscale+accent")]
    GrayscalePlusAccent,
    #[strum(serialize = "color")]
    Color,
}

/// Palette construction algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "kebab-case")]
pub enum QuantizeMethod {
    #[strum(serialize = "median-cut")]
    MedianCut,
    #[strum(serialize = "max-coverage")]
    MaxCoverage,
    #[default]
    #[strum(serialize = "fast-octree")]
    FastOctree,
}

/// Error diffusion applied when mapping pixels onto the palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "kebab-case")]
pub enum DitherMode {
    #[strum(serialize = "none")]
    None,
    #[default]
    #[strum(serialize = "floyd-steinberg")]
    FloydSteinberg,
}

/// Quantization settings for one image type.
///
/// `bit_depth` is kept unvalidated so that out-of-range values coming from a
/// configuration source fail the affected files instead of being clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuantizationSpec {
    pub bit_depth: Option<u8>,
    pub method: QuantizeMethod,
    pub dither: DitherMode,
}

impl QuantizationSpec {
    pub fn new(bit_depth: Option<u8>, method: QuantizeMethod, dither: DitherMode) -> Self {
        Self {
            bit_depth,
            method,
            dither,
        }
    }

    /// Reject a bit depth outside `MIN_BIT_DEPTH..=MAX_BIT_DEPTH`
    pub fn validate(&self, image_type: ImageType) -> Result<(), ConvertError> {
        match self.bit_depth {
            Some(bits) if !(MIN_BIT_DEPTH..=MAX_BIT_DEPTH).contains(&bits) => {
                Err(ConvertError::InvalidBitDepth { image_type, bits })
            }
            _ => Ok(()),
        }
    }

    /// Target palette size (2^bits), if a bit depth was requested
    pub fn palette_size(&self) -> Option<usize> {
        self.bit_depth.map(|bits| 1usize << bits)
    }
}

/// One quantization spec per image type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeSpecs {
    pub gray: QuantizationSpec,
    pub accent: QuantizationSpec,
    pub color: QuantizationSpec,
}

impl TypeSpecs {
    pub fn for_type(&self, image_type: ImageType) -> &QuantizationSpec {
        match image_type {
            ImageType::Grayscale => &self.gray,
            ImageType::GrayscalePlusAccent => &self.accent,
            ImageType::Color => &self.color,
        }
    }
}

/// Parameters of one conversion run, supplied by the front-end
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub input_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub recursive: bool,
    pub specs: TypeSpecs,
    pub remove_originals: bool,
    pub check_bit_depth: bool,
    pub max_workers: usize,
    pub batch_threshold: u64,
    pub cancel: CancellationToken,
}

impl ConversionConfig {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: None,
            recursive: false,
            specs: TypeSpecs::default(),
            remove_originals: false,
            check_bit_depth: false,
            max_workers: DEFAULT_MAX_WORKERS,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            cancel: CancellationToken::new(),
        }
    }
}

/// Outcome of converting one source file
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub source: PathBuf,
    pub output: PathBuf,
    pub succeeded: bool,
    pub error: Option<String>,
    pub image_type: Option<ImageType>,
    pub action: Option<RenderAction>,
    pub bit_depth: Option<BitDepthReport>,
}

impl ConversionResult {
    pub fn success(
        source: &Path,
        output: &Path,
        image_type: ImageType,
        action: RenderAction,
        bit_depth: Option<BitDepthReport>,
    ) -> Self {
        Self {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            succeeded: true,
            error: None,
            image_type: Some(image_type),
            action: Some(action),
            bit_depth,
        }
    }

    pub fn failure(
        source: &Path,
        output: &Path,
        image_type: Option<ImageType>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            succeeded: false,
            error: Some(error.into()),
            image_type,
            action: None,
            bit_depth: None,
        }
    }

    pub fn file_name(&self) -> &str {
        self.source
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
    }
}

impl fmt::Display for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.image_type, &self.action) {
            (Some(error), _, _) => write!(f, "{}: {}", self.file_name(), error),
            (None, Some(image_type), Some(action)) => {
                write!(f, "[{} {}] {}", image_type, action, self.file_name())
            }
            _ => write!(f, "{}", self.file_name()),
        }
    }
}

/// Aggregated outcome of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub results: Vec<ConversionResult>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConversionResult> {
        self.results.iter().filter(|r| !r.succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_validate_bit_depth_range() {
        for bits in 1..=8 {
            let spec = QuantizationSpec::new(Some(bits), QuantizeMethod::MedianCut, DitherMode::None);
            assert!(spec.validate(ImageType::Color).is_ok());
            assert_eq!(spec.palette_size(), Some(1usize << bits));
        }

        for bits in [0u8, 9, 255] {
            let spec = QuantizationSpec::new(Some(bits), QuantizeMethod::MedianCut, DitherMode::None);
            let err = spec.validate(ImageType::Grayscale).unwrap_err();
            assert!(err.to_string().contains("between 1 and 8"));
            assert!(err.to_string().contains(&bits.to_string()));
        }

        assert!(QuantizationSpec::default().validate(ImageType::Color).is_ok());
    }

    #[test]
    fn test_type_specs_lookup() {
        let specs = TypeSpecs {
            gray: QuantizationSpec::new(Some(2), QuantizeMethod::MedianCut, DitherMode::None),
            accent: QuantizationSpec::new(Some(3), QuantizeMethod::MaxCoverage, DitherMode::None),
            color: QuantizationSpec::new(Some(5), QuantizeMethod::FastOctree, DitherMode::FloydSteinberg),
        };

        assert_eq!(specs.for_type(ImageType::Grayscale).bit_depth, Some(2));
        assert_eq!(specs.for_type(ImageType::GrayscalePlusAccent).bit_depth, Some(3));
        assert_eq!(specs.for_type(ImageType::Color).bit_depth, Some(5));
    }

    #[test]
    fn test_enum_labels() {
        assert_eq!(ImageType::GrayscalePlusAccent.to_string(), "grayscale+accent");
        assert_eq!(QuantizeMethod::default(), QuantizeMethod::FastOctree);
        assert_eq!(DitherMode::default().to_string(), "floyd-steinberg");
        assert_eq!(ImageType::iter().count(), 3);
    }
}
