use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Output extension for every converted file
pub const OUTPUT_EXTENSION: &str = "png";

/// Compute where the PNG for `source` goes.
///
/// - recursive with an output root: mirror the sub-path below `input_root`
/// - recursive without an output root: beside the source file
/// - not recursive: directly in the output root, or in `input_root`
pub fn resolve_output_path(
    source: &Path,
    input_root: &Path,
    output_root: Option<&Path>,
    recursive: bool,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "image".into());
    let mut file_name = stem;
    file_name.push(".");
    file_name.push(OUTPUT_EXTENSION);

    match (recursive, output_root) {
        (true, Some(root)) => {
            let relative_dir = source
                .strip_prefix(input_root)
                .ok()
                .and_then(|rel| rel.parent())
                .unwrap_or_else(|| Path::new(""));
            root.join(relative_dir).join(file_name)
        }
        (true, None) => source.with_file_name(file_name),
        (false, root) => root.unwrap_or(input_root).join(file_name),
    }
}

/// Create the parent directory of `output_path` if it is missing
pub fn ensure_parent_dir(output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Delete a converted source file; failures are logged, never fatal
pub fn remove_original(source: &Path) -> bool {
    match fs::remove_file(source) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %source.display(), error = %e, "Failed to remove original file");
            false
        }
    }
}
