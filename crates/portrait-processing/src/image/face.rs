use image::{imageops, DynamicImage, GenericImageView, RgbImage};
use portrait_core::constants::{DEFAULT_FACE_MIN_SKIN_RATIO, DEFAULT_FACE_SCALE_FACTOR};

use super::integral::SummedAreaTable;
use super::{analysis_scale, CropRect, FaceDetector, DEFAULT_ANALYSIS_SIZE};

/// Smallest window side, in working-copy pixels, the search goes down to.
const MIN_WINDOW: u32 = 12;

/// Face locator based on skin-tone density.
///
/// Square windows are slid over a skin mask, largest first; each pass shrinks the window
/// by the scale factor. The first pass that finds a window whose skin ratio reaches
/// `min_skin_ratio` wins, and within that pass the densest window is returned.
#[derive(Debug, Clone)]
pub struct SkinToneFaceDetector {
    min_skin_ratio: f32,
    analysis_size: u32,
}

impl Default for SkinToneFaceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_FACE_MIN_SKIN_RATIO)
    }
}

impl SkinToneFaceDetector {
    pub fn new(min_skin_ratio: f32) -> Self {
        Self {
            min_skin_ratio: min_skin_ratio.clamp(f32::EPSILON, 1.0),
            analysis_size: DEFAULT_ANALYSIS_SIZE,
        }
    }

    /// YCbCr skin range (Chai and Ngan).
    fn is_skin(r: u8, g: u8, b: u8) -> bool {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
    }

    fn search(&self, small: &RgbImage, scale_factor: f32) -> Option<CropRect> {
        let (width, height) = small.dimensions();
        let table = SummedAreaTable::from_fn(width, height, |x, y| {
            let p = small.get_pixel(x, y);
            if Self::is_skin(p[0], p[1], p[2]) {
                1.0
            } else {
                0.0
            }
        });

        let mut side = width.min(height);
        while side >= MIN_WINDOW.min(width.min(height)) && side > 0 {
            let stride = (side / 8).max(1) as usize;
            let area = (side as f64) * (side as f64);
            let mut best: Option<(CropRect, f64)> = None;

            for y in (0..=height - side).step_by(stride) {
                for x in (0..=width - side).step_by(stride) {
                    let ratio = table.sum(x, y, side, side) / area;
                    if ratio >= self.min_skin_ratio as f64
                        && best.is_none_or(|(_, best_ratio)| ratio > best_ratio)
                    {
                        best = Some((CropRect::new(x, y, side, side), ratio));
                    }
                }
            }

            if let Some((rect, _)) = best {
                return Some(rect);
            }

            let next = (side as f32 * scale_factor).floor() as u32;
            side = if next >= side { side - 1 } else { next };
        }

        None
    }
}

impl FaceDetector for SkinToneFaceDetector {
    fn detect(&self, image: &DynamicImage, scale_factor: f32) -> Option<CropRect> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let scale_factor = if scale_factor > 0.0 && scale_factor < 1.0 {
            scale_factor
        } else {
            DEFAULT_FACE_SCALE_FACTOR
        };

        let scale = analysis_scale(width, height, self.analysis_size);
        let small_w = ((width as f64 / scale).round() as u32).max(1);
        let small_h = ((height as f64 / scale).round() as u32).max(1);
        let small = imageops::resize(
            &image.to_rgb8(),
            small_w,
            small_h,
            imageops::FilterType::Triangle,
        );

        self.search(&small, scale_factor)
            .map(|rect| rect.upscale(scale, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SKIN: Rgb<u8> = Rgb([224, 172, 140]);
    const BACKGROUND: Rgb<u8> = Rgb([30, 60, 200]);

    fn portrait(width: u32, height: u32, cx: f32, cy: f32, rx: f32, ry: f32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
        for y in 0..height {
            for x in 0..width {
                let dx = (x as f32 - cx) / rx;
                let dy = (y as f32 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 {
                    img.put_pixel(x, y, SKIN);
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_skin_classifier() {
        assert!(SkinToneFaceDetector::is_skin(SKIN[0], SKIN[1], SKIN[2]));
        assert!(!SkinToneFaceDetector::is_skin(
            BACKGROUND[0],
            BACKGROUND[1],
            BACKGROUND[2]
        ));
        assert!(!SkinToneFaceDetector::is_skin(20, 200, 40));
    }

    #[test]
    fn test_detects_face_region() {
        let img = portrait(200, 200, 140.0, 80.0, 25.0, 32.0);
        let rect = SkinToneFaceDetector::default()
            .detect(&img, 0.9)
            .expect("face expected");

        let (cx, cy) = rect.center();
        assert!((cx - 140.0).abs() < 15.0, "centre x {}", cx);
        assert!((cy - 80.0).abs() < 15.0, "centre y {}", cy);
        assert!(rect.width < 100, "window too large: {}", rect.width);
    }

    #[test]
    fn test_detects_face_on_large_image() {
        let img = portrait(1000, 800, 300.0, 300.0, 110.0, 140.0);
        let rect = SkinToneFaceDetector::default()
            .detect(&img, 0.9)
            .expect("face expected");

        let (cx, cy) = rect.center();
        assert!((cx - 300.0).abs() < 60.0, "centre x {}", cx);
        assert!((cy - 300.0).abs() < 60.0, "centre y {}", cy);
        assert!(rect.x + rect.width <= 1000 && rect.y + rect.height <= 800);
    }

    #[test]
    fn test_no_face_without_skin() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(160, 120, BACKGROUND));
        assert_eq!(SkinToneFaceDetector::default().detect(&img, 0.9), None);
    }

    #[test]
    fn test_invalid_scale_factor_falls_back() {
        let img = portrait(120, 120, 60.0, 60.0, 20.0, 25.0);
        assert!(SkinToneFaceDetector::default().detect(&img, 1.5).is_some());
    }
}
