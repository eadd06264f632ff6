use image::{Rgba, RgbaImage};

use crate::recognition::{ColorMatch, ColorSpace};

/// Luma with the same Rec. 709 weights `image::imageops::grayscale` uses
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((2126 * r as u32 + 7152 * g as u32 + 722 * b as u32) / 10000) as u8
}

/// 8-bit HSV (hue halved into 0..180)
pub(crate) fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = max - min;

    let s = if max > 0.0 { 255.0 * diff / max } else { 0.0 };
    let h = if diff == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / diff
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        ((h / 2.0).round() as u32 % 180) as u8,
        s.round() as u8,
        max as u8,
    ]
}

pub(crate) fn convert(px: &Rgba<u8>, space: ColorSpace) -> [u8; 3] {
    let [r, g, b, _] = px.0;
    match space {
        ColorSpace::Rgb => [r, g, b],
        ColorSpace::Hsv => rgb_to_hsv(r, g, b),
        ColorSpace::Gray => {
            let l = luma(r, g, b);
            [l, l, l]
        }
    }
}

pub(crate) fn in_range(px: &Rgba<u8>, color: &ColorMatch) -> bool {
    let value = convert(px, color.space);
    let channels = if color.space == ColorSpace::Gray { 1 } else { 3 };
    (0..channels).all(|c| value[c] >= color.lower[c] && value[c] <= color.upper[c])
}

pub(crate) fn count_in_range(region: &RgbaImage, color: &ColorMatch) -> u32 {
    region.pixels().filter(|px| in_range(px, color)).count() as u32
}

/// In-range pixels become black, everything else white, ready for OCR
pub(crate) fn binarize(region: &RgbaImage, color: &ColorMatch) -> RgbaImage {
    RgbaImage::from_fn(region.width(), region.height(), |x, y| {
        if in_range(region.get_pixel(x, y), color) {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
        assert_eq!(rgb_to_hsv(128, 128, 128), [0, 0, 128]);
    }

    #[test]
    fn test_luma_matches_image_crate() {
        let img = RgbaImage::from_fn(16, 16, |x, y| {
            Rgba([(x * 16) as u8, (y * 16) as u8, 77, 255])
        });
        let gray = image::imageops::grayscale(&img);
        for (x, y, px) in img.enumerate_pixels() {
            let ours = luma(px[0], px[1], px[2]) as i32;
            let theirs = gray.get_pixel(x, y)[0] as i32;
            assert!((ours - theirs).abs() <= 1, "({}, {}): {} vs {}", x, y, ours, theirs);
        }
    }

    #[test]
    fn test_gray_uses_first_bound_only() {
        let color = ColorMatch::new(ColorSpace::Gray, [200, 0, 0], [255, 0, 0]);
        assert!(in_range(&Rgba([250, 250, 250, 255]), &color));
        assert!(!in_range(&Rgba([20, 20, 20, 255]), &color));
    }

    #[test]
    fn test_binarize() {
        let img = RgbaImage::from_fn(4, 1, |x, _| {
            if x < 2 {
                Rgba([250, 250, 250, 255])
            } else {
                Rgba([10, 10, 10, 255])
            }
        });
        let color = ColorMatch::new(ColorSpace::Rgb, [200, 200, 200], [255, 255, 255]);
        let out = binarize(&img, &color);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(3, 0).0, [255, 255, 255, 255]);
    }
}
