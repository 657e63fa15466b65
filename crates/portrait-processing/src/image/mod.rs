//! Crop detection for derivatives.
//!
//! Both detectors work on a downscaled copy of the image and answer with a rectangle in
//! the coordinates of the full-size image.

mod encode;
mod face;
mod integral;
mod saliency;

pub use encode::{output_format, write_atomic};
pub use face::SkinToneFaceDetector;
pub use saliency::EdgeSaliencyDetector;

use image::DynamicImage;

/// Longest side of the working copy the detectors analyse.
pub const DEFAULT_ANALYSIS_SIZE: u32 = 256;

/// Rectangle in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Size of the largest `aspect_w:aspect_h` rectangle that fits in `width`×`height`.
    pub fn largest_with_aspect(width: u32, height: u32, aspect_w: u32, aspect_h: u32) -> (u32, u32) {
        if aspect_w == 0 || aspect_h == 0 {
            return (width, height);
        }
        let (w, h) = (width as u64, height as u64);
        let (aw, ah) = (aspect_w as u64, aspect_h as u64);
        if w * ah >= h * aw {
            let crop_w = (h * aw / ah).clamp(1, w.max(1));
            (crop_w as u32, height)
        } else {
            let crop_h = (w * ah / aw).clamp(1, h.max(1));
            (width, crop_h as u32)
        }
    }

    /// The largest rectangle of the given aspect, centred in the image.
    pub fn centered(width: u32, height: u32, aspect_w: u32, aspect_h: u32) -> Self {
        let (crop_w, crop_h) = Self::largest_with_aspect(width, height, aspect_w, aspect_h);
        Self::new(
            (width - crop_w) / 2,
            (height - crop_h) / 2,
            crop_w,
            crop_h,
        )
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Grow the rectangle around its centre by `factor`, then fit it inside
    /// `bounds_w`×`bounds_h`. The rectangle is moved before it is shrunk.
    pub fn padded(&self, factor: f32, bounds_w: u32, bounds_h: u32) -> Self {
        let (cx, cy) = self.center();
        let width = ((self.width as f32 * factor).round() as u32).clamp(1, bounds_w.max(1));
        let height = ((self.height as f32 * factor).round() as u32).clamp(1, bounds_h.max(1));

        let max_x = bounds_w.saturating_sub(width) as f32;
        let max_y = bounds_h.saturating_sub(height) as f32;
        let x = (cx - width as f32 / 2.0).round().clamp(0.0, max_x) as u32;
        let y = (cy - height as f32 / 2.0).round().clamp(0.0, max_y) as u32;

        Self::new(x, y, width, height)
    }

    /// Map a rectangle found on a working copy back to full-size coordinates.
    pub(crate) fn upscale(&self, scale: f64, bounds_w: u32, bounds_h: u32) -> Self {
        let up = |v: u32| (v as f64 * scale).round() as u32;
        let width = up(self.width).clamp(1, bounds_w.max(1));
        let height = up(self.height).clamp(1, bounds_h.max(1));
        let x = up(self.x).min(bounds_w.saturating_sub(width));
        let y = up(self.y).min(bounds_h.saturating_sub(height));
        Self::new(x, y, width, height)
    }
}

/// Finds the most interesting region of an image for a target aspect ratio.
pub trait SaliencyDetector: Send + Sync {
    /// Best crop of aspect `aspect_w:aspect_h`, or `None` for an empty image.
    fn best_crop(&self, image: &DynamicImage, aspect_w: u32, aspect_h: u32) -> Option<CropRect>;
}

/// Locates a face. The window search shrinks by `scale_factor` between passes.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage, scale_factor: f32) -> Option<CropRect>;
}

/// Downscale factor that brings the longest side to at most `analysis_size`.
pub(crate) fn analysis_scale(width: u32, height: u32, analysis_size: u32) -> f64 {
    let longest = width.max(height) as f64;
    (longest / analysis_size.max(1) as f64).max(1.0)
}
