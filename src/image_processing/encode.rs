use anyhow::{Context, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, RgbImage};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::dithering::map_to_palette;
use super::quantize::build_palette;
use super::{DitherMode, ImageType, QuantizationSpec, QuantizeMethod};

/// Palette size of the built-in grayscale reduction (4 bits)
pub const DEFAULT_GRAY_LEVELS: usize = 16;

/// Method/dither pair of the built-in grayscale reduction
pub const DEFAULT_GRAY_METHOD: QuantizeMethod = QuantizeMethod::FastOctree;
pub const DEFAULT_GRAY_DITHER: DitherMode = DitherMode::FloydSteinberg;

/// What the policy did with an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderAction {
    /// Reduced to a palette of `colors` entries on request
    Quantized { colors: usize },
    /// Grayscale image without an explicit bit depth, reduced to 16 levels
    DefaultGrayscale { colors: usize },
    /// Written as-is
    Unmodified,
}

impl fmt::Display for RenderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderAction::Quantized { colors } => write!(f, "{} colors", colors),
            RenderAction::DefaultGrayscale { colors } => write!(f, "{} levels (default)", colors),
            RenderAction::Unmodified => write!(f, "unmodified"),
        }
    }
}

/// Render `img` to `output_path` following the quantization policy:
///
/// | type      | bit depth | action                                   |
/// |-----------|-----------|------------------------------------------|
/// | any       | 1..=8     | palette of 2^bits, spec method/dither    |
/// | grayscale | none      | 16-level palette, octree + Floyd-Steinberg |
/// | other     | none      | unmodified PNG                           |
///
/// An out-of-range bit depth fails before anything is written.
pub fn render_output(
    img: &DynamicImage,
    image_type: ImageType,
    spec: &QuantizationSpec,
    output_path: &Path,
) -> Result<RenderAction> {
    spec.validate(image_type)?;

    match (spec.palette_size(), image_type) {
        (Some(colors), _) => {
            let written = save_quantized(img, colors, spec.method, spec.dither, output_path)?;
            Ok(RenderAction::Quantized { colors: written })
        }
        (None, ImageType::Grayscale) => {
            let written = save_quantized(
                img,
                DEFAULT_GRAY_LEVELS,
                DEFAULT_GRAY_METHOD,
                DEFAULT_GRAY_DITHER,
                output_path,
            )?;
            Ok(RenderAction::DefaultGrayscale { colors: written })
        }
        (None, _) => {
            save_png(img, output_path)?;
            Ok(RenderAction::Unmodified)
        }
    }
}

/// Quantize to at most `max_colors` and write an indexed PNG; returns the palette size
pub fn save_quantized(
    img: &DynamicImage,
    max_colors: usize,
    method: QuantizeMethod,
    dither: DitherMode,
    output_path: &Path,
) -> Result<usize> {
    let rgb = img.to_rgb8();
    let palette = build_palette(&rgb, max_colors, method);
    let indices = map_to_palette(&rgb, &palette, dither);

    write_atomically(output_path, |writer| {
        write_indexed_png(writer, &rgb, &palette, &indices)
    })?;

    Ok(palette.len())
}

/// Write `img` as a regular (non-palette) PNG with maximum compression
pub fn save_png(img: &DynamicImage, output_path: &Path) -> Result<()> {
    // PNG has no float samples
    let converted;
    let img = match img.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => {
            converted = DynamicImage::ImageRgba16(img.to_rgba16());
            &converted
        }
        _ => img,
    };

    write_atomically(output_path, |writer| {
        let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
        img.write_with_encoder(encoder)
            .context("Failed to encode PNG")
    })
}

/// Write through a temporary file next to `output_path` and rename it into
/// place only once the encoder succeeded.
fn write_atomically<F>(output_path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> Result<()>,
{
    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix(".avif2png-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // tempfile defaults to 0600; the umask still applies to this mode
        builder.permissions(fs::Permissions::from_mode(0o666));
    }

    let mut tmp = builder
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush().context("Failed to flush PNG data")?;
    }

    tmp.persist(output_path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to save PNG: {}", output_path.display()))?;

    Ok(())
}

fn write_indexed_png<W: Write>(
    writer: W,
    rgb: &RgbImage,
    palette: &[[u8; 3]],
    indices: &[u8],
) -> Result<()> {
    let (width, height) = rgb.dimensions();
    let depth = palette_bit_depth(palette.len());

    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(depth);
    encoder.set_palette(palette.iter().flatten().copied().collect::<Vec<u8>>());
    encoder.set_compression(png::Compression::Best);

    let mut png_writer = encoder.write_header().context("Failed to write PNG header")?;
    let data = pack_indices(indices, width as usize, depth as u8);
    png_writer
        .write_image_data(&data)
        .context("Failed to write PNG image data")?;
    png_writer.finish().context("Failed to finish PNG stream")?;

    Ok(())
}

/// Smallest PNG bit depth able to address `palette_len` entries
fn palette_bit_depth(palette_len: usize) -> png::BitDepth {
    match palette_len {
        0..=2 => png::BitDepth::One,
        3..=4 => png::BitDepth::Two,
        5..=16 => png::BitDepth::Four,
        _ => png::BitDepth::Eight,
    }
}

/// Pack one-byte indices into rows of `bits`-wide samples, MSB first
fn pack_indices(indices: &[u8], width: usize, bits: u8) -> Vec<u8> {
    if bits == 8 || width == 0 {
        return indices.to_vec();
    }

    let bits = bits as usize;
    let per_byte = 8 / bits;
    let stride = width.div_ceil(per_byte);
    let rows = indices.len() / width;
    let mut packed = vec![0u8; stride * rows];

    for (row, samples) in indices.chunks(width).enumerate() {
        let out = &mut packed[row * stride..(row + 1) * stride];
        for (x, &index) in samples.iter().enumerate() {
            let shift = 8 - bits * (x % per_byte + 1);
            out[x / per_byte] |= index << shift;
        }
    }

    packed
}
