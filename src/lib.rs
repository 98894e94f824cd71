// Library exports for reuse by GUI and other front-ends
pub mod cli;
pub mod config_file;
pub mod error;
pub mod image_processing;
pub mod json_output;
pub mod utils;

// Re-export commonly used types
pub use cli::{Args, DitherArg, MethodArg};
pub use error::ConvertError;
pub use image_processing::{
    convert_all, convert_one, CancellationToken, ConversionConfig, ConversionResult, DitherMode,
    ImageType, ProgressEvent, QuantizationSpec, QuantizeMethod, RunSummary, TypeSpecs,
};
pub use json_output::JsonMessage;
