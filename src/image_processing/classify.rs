use image::{DynamicImage, RgbImage};
use std::collections::HashSet;

use super::ImageType;

/// Classify a decoded image by its pixel data.
///
/// - Grayscale: R == G == B for every pixel (a uniform image is always grayscale)
/// - GrayscalePlusAccent: not grayscale, exactly two distinct RGB triples,
///   one of them a gray tone
/// - Color: anything else
pub fn classify(img: &DynamicImage) -> ImageType {
    if matches!(
        img,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
    ) {
        return ImageType::Grayscale;
    }

    classify_rgb(&img.to_rgb8())
}

/// Classify an 8-bit RGB buffer
pub fn classify_rgb(rgb: &RgbImage) -> ImageType {
    if is_grayscale(rgb) {
        return ImageType::Grayscale;
    }

    // Stop counting as soon as a third color shows up
    let mut distinct: HashSet<[u8; 3]> = HashSet::with_capacity(3);
    for pixel in rgb.pixels() {
        distinct.insert(pixel.0);
        if distinct.len() > 2 {
            return ImageType::Color;
        }
    }

    // Two non-gray colors are not an accent on a gray page
    if distinct.len() == 2 && distinct.iter().any(|c| is_gray_triple(*c)) {
        ImageType::GrayscalePlusAccent
    } else {
        ImageType::Color
    }
}

fn is_gray_triple([r, g, b]: [u8; 3]) -> bool {
    r == g && g == b
}

/// True when all three channels are identical for every pixel
pub fn is_grayscale(rgb: &RgbImage) -> bool {
    rgb.pixels().all(|p| is_gray_triple(p.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbaImage};

    #[test]
    fn test_uniform_images() {
        let gray = RgbImage::from_pixel(8, 8, Rgb([128, 128, 128]));
        assert_eq!(classify_rgb(&gray), ImageType::Grayscale);

        let single = RgbImage::from_pixel(1, 1, Rgb([7, 7, 7]));
        assert_eq!(classify_rgb(&single), ImageType::Grayscale);

        // One non-gray color only: a single distinct triple is not an accent pair
        let red = RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        assert_eq!(classify_rgb(&red), ImageType::Color);
    }

    #[test]
    fn test_gradient_is_grayscale() {
        let img = RgbImage::from_fn(16, 16, |x, y| {
            let v = (x * 16 + y) as u8;
            Rgb([v, v, v])
        });
        assert_eq!(classify_rgb(&img), ImageType::Grayscale);
    }

    #[test]
    fn test_gray_plus_one_accent() {
        let img = RgbImage::from_fn(8, 8, |x, _| {
            if x < 6 {
                Rgb([200, 200, 200])
            } else {
                Rgb([0, 0, 255])
            }
        });
        assert_eq!(classify_rgb(&img), ImageType::GrayscalePlusAccent);
    }

    #[test]
    fn test_two_accents_fall_through_to_color() {
        let img = RgbImage::from_fn(9, 1, |x, _| match x % 3 {
            0 => Rgb([50, 50, 50]),
            1 => Rgb([255, 0, 0]),
            _ => Rgb([0, 255, 0]),
        });
        assert_eq!(classify_rgb(&img), ImageType::Color);
    }

    #[test]
    fn test_two_non_gray_colors_are_color() {
        let img = RgbImage::from_fn(4, 1, |x, _| {
            if x < 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        assert_eq!(classify_rgb(&img), ImageType::Color);

        // Black and white count as gray tones
        let img = RgbImage::from_fn(4, 1, |x, _| {
            if x == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 0, 0])
            }
        });
        assert_eq!(classify_rgb(&img), ImageType::GrayscalePlusAccent);
    }

    #[test]
    fn test_dynamic_variants() {
        let luma = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([90])));
        assert_eq!(classify(&luma), ImageType::Grayscale);

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_fn(4, 4, |x, y| {
            image::Rgba([(x * 60) as u8, (y * 60) as u8, 10, 255])
        }));
        assert_eq!(classify(&rgba), ImageType::Color);

        // Deterministic: same input, same answer
        assert_eq!(classify(&rgba), classify(&rgba));
    }
}
