use image::{imageops, DynamicImage, GenericImageView, GrayImage};

use super::integral::SummedAreaTable;
use super::{analysis_scale, CropRect, SaliencyDetector, DEFAULT_ANALYSIS_SIZE};

const EDGE_WEIGHT: f32 = 0.6;
const VARIANCE_WEIGHT: f32 = 0.4;

/// Saliency from edge strength and local variance.
///
/// The map is computed on a working copy whose longest side is `analysis_size`. Every
/// placement of the largest crop with the requested aspect is scored through a
/// summed-area table; ties go to the placement closest to the centre, so a featureless
/// image gets a centred crop.
#[derive(Debug, Clone)]
pub struct EdgeSaliencyDetector {
    analysis_size: u32,
}

impl Default for EdgeSaliencyDetector {
    fn default() -> Self {
        Self {
            analysis_size: DEFAULT_ANALYSIS_SIZE,
        }
    }
}

impl EdgeSaliencyDetector {
    pub fn new(analysis_size: u32) -> Self {
        Self {
            analysis_size: analysis_size.max(1),
        }
    }

    /// Per-pixel saliency of `gray`, row-major. Border pixels score zero.
    fn saliency_map(gray: &GrayImage) -> Vec<f32> {
        let (width, height) = gray.dimensions();
        let mut saliency = vec![0.0f32; width as usize * height as usize];

        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                let right = gray.get_pixel(x + 1, y)[0] as i32;
                let left = gray.get_pixel(x - 1, y)[0] as i32;
                let bottom = gray.get_pixel(x, y + 1)[0] as i32;
                let top = gray.get_pixel(x, y - 1)[0] as i32;

                let gx = (right - left).abs();
                let gy = (bottom - top).abs();
                let edge_strength = ((gx * gx + gy * gy) as f32).sqrt();

                let mut sum = 0i32;
                let mut sum_sq = 0i32;
                for dy in 0..3 {
                    for dx in 0..3 {
                        let px = gray.get_pixel(x + dx - 1, y + dy - 1)[0] as i32;
                        sum += px;
                        sum_sq += px * px;
                    }
                }
                let mean = sum as f32 / 9.0;
                let variance = (sum_sq as f32 / 9.0) - (mean * mean);

                saliency[(y * width + x) as usize] =
                    edge_strength * EDGE_WEIGHT + variance.max(0.0) * VARIANCE_WEIGHT;
            }
        }

        saliency
    }
}

impl SaliencyDetector for EdgeSaliencyDetector {
    fn best_crop(&self, image: &DynamicImage, aspect_w: u32, aspect_h: u32) -> Option<CropRect> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let (crop_w, crop_h) = CropRect::largest_with_aspect(width, height, aspect_w, aspect_h);
        if crop_w == width && crop_h == height {
            return Some(CropRect::new(0, 0, width, height));
        }

        let scale = analysis_scale(width, height, self.analysis_size);
        let small_w = ((width as f64 / scale).round() as u32).max(1);
        let small_h = ((height as f64 / scale).round() as u32).max(1);
        let small = imageops::resize(
            &image.to_luma8(),
            small_w,
            small_h,
            imageops::FilterType::Triangle,
        );

        let saliency = Self::saliency_map(&small);
        let table = SummedAreaTable::from_fn(small_w, small_h, |x, y| {
            saliency[(y * small_w + x) as usize] as f64
        });

        let win_w = ((crop_w as f64 / scale).round() as u32).clamp(1, small_w);
        let win_h = ((crop_h as f64 / scale).round() as u32).clamp(1, small_h);
        let (range_x, range_y) = (small_w - win_w, small_h - win_h);
        let (center_x, center_y) = (range_x as f64 / 2.0, range_y as f64 / 2.0);

        let mut best = (0u32, 0u32);
        let mut best_score = f64::NEG_INFINITY;
        let mut best_distance = f64::INFINITY;
        for y in 0..=range_y {
            for x in 0..=range_x {
                let score = table.sum(x, y, win_w, win_h);
                let distance = (x as f64 - center_x).abs() + (y as f64 - center_y).abs();
                let tolerance = 1e-6 * best_score.abs().max(1.0);
                let better = score > best_score + tolerance
                    || ((score - best_score).abs() <= tolerance && distance < best_distance);
                if better {
                    best = (x, y);
                    best_score = score;
                    best_distance = distance;
                }
            }
        }

        let x = ((best.0 as f64 * scale).round() as u32).min(width - crop_w);
        let y = ((best.1 as f64 * scale).round() as u32).min(height - crop_h);
        Some(CropRect::new(x, y, crop_w, crop_h))
    }
}
