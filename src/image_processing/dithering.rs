//! Mapping of RGB pixels onto a fixed palette
//!
//! Produces one palette index per pixel (row-major), ready to be written as an
//! indexed PNG. Floyd-Steinberg diffusion uses the classic 7/16, 3/16, 5/16,
//! 1/16 kernel.
use image::RgbImage;
use std::collections::HashMap;

use super::DitherMode;

/// Map every pixel of `img` to an index into `palette`
pub fn map_to_palette(img: &RgbImage, palette: &[[u8; 3]], dither: DitherMode) -> Vec<u8> {
    debug_assert!(!palette.is_empty() && palette.len() <= 256);
    match dither {
        DitherMode::None => map_nearest(img, palette),
        DitherMode::FloydSteinberg => map_floyd_steinberg(img, palette),
    }
}

/// Index of the palette entry closest to `color` (squared Euclidean distance)
pub fn find_closest_index(color: [f32; 3], palette: &[[u8; 3]]) -> u8 {
    let mut min_distance = f32::MAX;
    let mut closest = 0usize;

    for (index, entry) in palette.iter().enumerate() {
        let dr = color[0] - entry[0] as f32;
        let dg = color[1] - entry[1] as f32;
        let db = color[2] - entry[2] as f32;
        let distance = dr * dr + dg * dg + db * db;

        if distance < min_distance {
            min_distance = distance;
            closest = index;
        }
    }

    closest as u8
}

fn map_nearest(img: &RgbImage, palette: &[[u8; 3]]) -> Vec<u8> {
    let mut cache: HashMap<[u8; 3], u8> = HashMap::new();
    img.pixels()
        .map(|pixel| {
            *cache.entry(pixel.0).or_insert_with(|| {
                find_closest_index(
                    [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32],
                    palette,
                )
            })
        })
        .collect()
}

fn map_floyd_steinberg(img: &RgbImage, palette: &[[u8; 3]]) -> Vec<u8> {
    let (width, height) = img.dimensions();
    let (width, height) = (width as usize, height as usize);
    let mut indices = Vec::with_capacity(width * height);

    // Working buffer keeps the original values plus accumulated error
    let mut working: Vec<Vec<[f32; 3]>> = img
        .rows()
        .map(|row| {
            row.map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
                .collect()
        })
        .collect();

    for y in 0..height {
        for x in 0..width {
            let current = working[y][x].map(|v| v.clamp(0.0, 255.0));
            let index = find_closest_index(current, palette);
            indices.push(index);

            let chosen = palette[index as usize];
            let error = [
                current[0] - chosen[0] as f32,
                current[1] - chosen[1] as f32,
                current[2] - chosen[2] as f32,
            ];

            distribute_error_floyd_steinberg(&mut working, x, y, width, height, error);
        }
    }

    indices
}

fn distribute_error_floyd_steinberg(
    working: &mut [Vec<[f32; 3]>],
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    error: [f32; 3],
) {
    //     * 7/16
    // 3/16 5/16 1/16
    let mut spread = |tx: usize, ty: usize, weight: f32| {
        for c in 0..3 {
            working[ty][tx][c] += error[c] * weight;
        }
    };

    if x + 1 < width {
        spread(x + 1, y, 7.0 / 16.0);
    }

    if y + 1 < height {
        if x > 0 {
            spread(x - 1, y + 1, 3.0 / 16.0);
        }
        spread(x, y + 1, 5.0 / 16.0);
        if x + 1 < width {
            spread(x + 1, y + 1, 1.0 / 16.0);
        }
    }
}
