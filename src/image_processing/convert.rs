use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, info, warn};

use super::bit_depth::{measure_bit_depth, BitDepthReport};
use super::classify::classify;
use super::encode::render_output;
use super::paths::ensure_parent_dir;
use super::{ConversionResult, ImageType, TypeSpecs};

/// Convert one source file to one PNG.
///
/// Never fails and never panics across this boundary: decode, classify and
/// encode problems are all reported through the returned `ConversionResult`.
pub fn convert_one(
    source: &Path,
    output: &Path,
    specs: &TypeSpecs,
    check_bit_depth: bool,
) -> ConversionResult {
    let mut image_type = None;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let img = open_image(source)?;
        let detected = classify(&img);
        image_type = Some(detected);

        let spec = specs.for_type(detected);
        spec.validate(detected)?;

        ensure_parent_dir(output)?;
        let action = render_output(&img, detected, spec, output)?;
        // Release the decoded pixels before re-reading the output
        drop(img);

        Ok::<_, anyhow::Error>((detected, action))
    }));

    let outcome = match outcome {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!(
            "Conversion panicked: {}",
            panic_message(payload.as_ref())
        )),
    };

    match outcome {
        Ok((detected, action)) => {
            let bit_depth = if check_bit_depth {
                inspect_output(output)
            } else {
                None
            };
            debug!(
                source = %source.display(),
                output = %output.display(),
                image_type = %detected,
                action = %action,
                "Converted"
            );
            ConversionResult::success(source, output, detected, action, bit_depth)
        }
        Err(e) => {
            // Front-ends report the failure from the result
            info!(source = %source.display(), error = %format!("{:#}", e), "Conversion failed");
            ConversionResult::failure(source, output, image_type, format!("{:#}", e))
        }
    }
}

/// Decode an image, detecting the format from its content rather than its extension
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read image header: {}", path.display()))?
        .decode()
        .with_context(|| format!("Failed to decode image: {}", path.display()))
}

fn inspect_output(output: &Path) -> Option<BitDepthReport> {
    match measure_bit_depth(output) {
        Ok(report) => {
            info!(output = %output.display(), colors = report.colors, bits = report.bits, "Measured bit depth");
            Some(report)
        }
        Err(e) => {
            warn!(output = %output.display(), error = %format!("{:#}", e), "Failed to measure bit depth");
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Short label used in console output for each image type
pub fn type_label(image_type: Option<ImageType>) -> String {
    image_type
        .map(|t| t.to_string().to_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}
