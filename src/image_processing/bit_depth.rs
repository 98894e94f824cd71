use anyhow::{Context, Result};
use image::{ImageFormat, ImageReader};
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Upper bound on distinct colors counted for non-palette images (full 24-bit RGB)
pub const MAX_COUNTED_COLORS: usize = 1 << 24;

/// Measured ("real") bit depth of an image file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitDepthReport {
    /// Distinct colors in use
    pub colors: usize,
    /// `ceil(log2(colors))`, 0 for zero or one color
    pub bits: u32,
    /// True when counted from an indexed PNG palette
    pub palette: bool,
}

impl BitDepthReport {
    pub fn from_colors(colors: usize, palette: bool) -> Self {
        Self {
            colors,
            bits: bits_for_colors(colors),
            palette,
        }
    }
}

impl fmt::Display for BitDepthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} colors, ~{} bits", self.colors, self.bits)
    }
}

/// `ceil(log2(colors))`
pub fn bits_for_colors(colors: usize) -> u32 {
    if colors <= 1 {
        0
    } else {
        usize::BITS - (colors - 1).leading_zeros()
    }
}

/// Count the colors actually used by the image at `path`.
///
/// Indexed PNGs count the distinct palette colors referenced by pixels; any
/// other image counts distinct RGB triples up to `MAX_COUNTED_COLORS`.
pub fn measure_bit_depth(path: &Path) -> Result<BitDepthReport> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read image header: {}", path.display()))?;

    if reader.format() == Some(ImageFormat::Png) {
        if let Some(colors) = count_palette_colors(path)? {
            return Ok(BitDepthReport::from_colors(colors, true));
        }
    }

    let img = reader
        .decode()
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;

    let mut distinct: HashSet<[u8; 3]> = HashSet::new();
    for pixel in img.to_rgb8().pixels() {
        distinct.insert(pixel.0);
        if distinct.len() >= MAX_COUNTED_COLORS {
            break;
        }
    }

    Ok(BitDepthReport::from_colors(distinct.len(), false))
}

/// Distinct palette colors referenced by an indexed PNG, `None` for other PNG color types
fn count_palette_colors(path: &Path) -> Result<Option<usize>> {
    let file = File::open(path).with_context(|| format!("Failed to open PNG: {}", path.display()))?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("Failed to read PNG header: {}", path.display()))?;

    if reader.info().color_type != png::ColorType::Indexed {
        return Ok(None);
    }
    let palette: Vec<u8> = reader
        .info()
        .palette
        .as_ref()
        .map(|p| p.to_vec())
        .unwrap_or_default();

    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .with_context(|| format!("Failed to decode PNG data: {}", path.display()))?;

    let depth = frame.bit_depth as usize;
    let width = frame.width as usize;
    let mask = ((1u16 << depth) - 1) as u8;

    let mut used = [false; 256];
    for row in buf.chunks(frame.line_size).take(frame.height as usize) {
        for x in 0..width {
            let bit = x * depth;
            let shift = 8 - depth - bit % 8;
            let index = (row[bit / 8] >> shift) & mask;
            used[index as usize] = true;
        }
    }

    let colors: HashSet<&[u8]> = used
        .iter()
        .enumerate()
        .filter(|&(_, &in_use)| in_use)
        .filter_map(|(index, _)| palette.get(index * 3..index * 3 + 3))
        .collect();

    Ok(Some(colors.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_bits_for_colors() {
        assert_eq!(bits_for_colors(0), 0);
        assert_eq!(bits_for_colors(1), 0);
        assert_eq!(bits_for_colors(2), 1);
        assert_eq!(bits_for_colors(3), 2);
        assert_eq!(bits_for_colors(8), 3);
        assert_eq!(bits_for_colors(16), 4);
        assert_eq!(bits_for_colors(128), 7);
        assert_eq!(bits_for_colors(256), 8);
        assert_eq!(bits_for_colors(257), 9);
    }

    #[test]
    fn test_measure_rgb_levels() {
        let dir = TempDir::new().unwrap();
        for (levels, expected_bits) in [(2u32, 1u32), (16, 4), (128, 7), (256, 8)] {
            let img = RgbImage::from_fn(levels, 16, |x, _| {
                let v = (x * 255 / (levels - 1)) as u8;
                Rgb([v, v, v])
            });
            let path = dir.path().join(format!("levels_{}.png", levels));
            img.save(&path).unwrap();

            let report = measure_bit_depth(&path).unwrap();
            assert_eq!(report.colors, levels as usize);
            assert_eq!(report.bits, expected_bits);
            assert!(!report.palette);
        }
    }

    #[test]
    fn test_measure_luma() {
        let dir = TempDir::new().unwrap();
        let img = GrayImage::from_fn(8, 16, |x, _| Luma([(x * 32) as u8]));
        let path = dir.path().join("luma.png");
        img.save(&path).unwrap();

        let report = measure_bit_depth(&path).unwrap();
        assert_eq!(report.colors, 8);
        assert_eq!(report.bits, 3);
    }

    #[test]
    fn test_measure_counts_only_used_palette_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pal.png");

        // 256-entry palette, only 4 entries referenced
        let mut palette = vec![0u8, 0, 0, 64, 64, 64, 128, 128, 128, 255, 255, 255];
        palette.resize(256 * 3, 0);
        let indices: Vec<u8> = (0..100).map(|i| ((i % 10) / 2 % 4) as u8).collect();

        let file = File::create(&path).unwrap();
        let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), 10, 10);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&indices).unwrap();
        writer.finish().unwrap();

        let report = measure_bit_depth(&path).unwrap();
        assert_eq!(report.colors, 4);
        assert_eq!(report.bits, 2);
        assert!(report.palette);
        assert_eq!(report.to_string(), "4 colors, ~2 bits");
    }

    #[test]
    fn test_measure_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(measure_bit_depth(&path).is_err());
    }
}
