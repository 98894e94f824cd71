use std::path::PathBuf;

use crate::image_processing::ImageType;

/// Errors raised by the conversion core.
///
/// Only the structural variants (`InputDirMissing`, `InputNotDirectory`,
/// `ThreadPool`) ever escape [`crate::image_processing::batch::convert_all`].
/// `InvalidBitDepth` and codec or IO failures are captured per file into a
/// `ConversionResult` message.
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("Input directory does not exist: {0}")]
    InputDirMissing(PathBuf),

    #[error("Input path is not a directory: {0}")]
    InputNotDirectory(PathBuf),

    #[error("Quantization bits for {image_type} images must be between 1 and 8 (got {bits})")]
    InvalidBitDepth { image_type: ImageType, bits: u8 },

    #[error("Failed to initialize worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
