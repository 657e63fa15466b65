//! Thumbnail and face-crop generation.
//!
//! `DerivativeGenerator::generate` never fails as a whole. Each step reports its own
//! result in the `DerivativeReport`; a missing face or a failing face crop does not
//! affect the thumbnail and vice versa.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat, ImageReader};
use portrait_core::{DerivativeConfig, PipelineError};
use portrait_storage::DerivativeRoots;
use uuid::Uuid;

use crate::image::{
    output_format, write_atomic, CropRect, EdgeSaliencyDetector, FaceDetector, SaliencyDetector,
    SkinToneFaceDetector,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum DerivativeError {
    #[error("Failed to read original {path}: {reason}")]
    Source { path: String, reason: String },

    #[error("Failed to decode original: {0}")]
    Decode(String),

    #[error("Failed to encode derivative: {0}")]
    Encode(String),

    #[error("Failed to write derivative {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Derivative task failed: {0}")]
    Task(String),
}

impl From<DerivativeError> for PipelineError {
    fn from(err: DerivativeError) -> Self {
        PipelineError::Derivative(err.to_string())
    }
}

/// A derivative written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeFile {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceCropOutcome {
    Written(DerivativeFile),
    NoFace,
}

#[derive(Debug, Clone)]
pub struct DerivativeReport {
    pub asset_id: Uuid,
    pub thumbnail: Result<DerivativeFile, DerivativeError>,
    pub face_crop: Result<FaceCropOutcome, DerivativeError>,
}

impl DerivativeReport {
    fn failed(asset_id: Uuid, err: DerivativeError) -> Self {
        Self {
            asset_id,
            thumbnail: Err(err.clone()),
            face_crop: Err(err),
        }
    }

    pub fn thumbnail_written(&self) -> bool {
        self.thumbnail.is_ok()
    }

    pub fn face_crop_written(&self) -> bool {
        matches!(self.face_crop, Ok(FaceCropOutcome::Written(_)))
    }

    pub fn errors(&self) -> Vec<&DerivativeError> {
        let mut errors = Vec::new();
        if let Err(e) = &self.thumbnail {
            errors.push(e);
        }
        if let Err(e) = &self.face_crop {
            errors.push(e);
        }
        errors
    }
}

#[derive(Clone)]
pub struct DerivativeGenerator {
    thumbnail_width: u32,
    thumbnail_height: u32,
    face_scale_factor: f32,
    face_padding: f32,
    saliency: Arc<dyn SaliencyDetector>,
    faces: Arc<dyn FaceDetector>,
}

impl std::fmt::Debug for DerivativeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivativeGenerator")
            .field("thumbnail_width", &self.thumbnail_width)
            .field("thumbnail_height", &self.thumbnail_height)
            .field("face_scale_factor", &self.face_scale_factor)
            .field("face_padding", &self.face_padding)
            .finish_non_exhaustive()
    }
}

impl DerivativeGenerator {
    /// Generator with the built-in saliency and skin-tone detectors.
    pub fn new(config: &DerivativeConfig) -> Self {
        Self::with_detectors(
            config,
            Arc::new(EdgeSaliencyDetector::default()),
            Arc::new(SkinToneFaceDetector::new(config.face_min_skin_ratio)),
        )
    }

    pub fn with_detectors(
        config: &DerivativeConfig,
        saliency: Arc<dyn SaliencyDetector>,
        faces: Arc<dyn FaceDetector>,
    ) -> Self {
        Self {
            thumbnail_width: config.thumbnail_width.max(1),
            thumbnail_height: config.thumbnail_height.max(1),
            face_scale_factor: config.face_scale_factor,
            face_padding: config.face_padding,
            saliency,
            faces,
        }
    }

    /// Regenerate both derivatives of `asset_id` from the original at `original`.
    #[tracing::instrument(skip(self, roots), fields(asset_id = %asset_id, original = %original.display()))]
    pub async fn generate(
        &self,
        original: &Path,
        roots: &DerivativeRoots,
        asset_id: Uuid,
        mimetype: &str,
    ) -> DerivativeReport {
        let start = Instant::now();

        let (image, sniffed) = match decode(original).await {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(asset_id = %asset_id, error = %e, "Original could not be decoded");
                return DerivativeReport::failed(asset_id, e);
            }
        };
        let format = output_format(mimetype, sniffed);

        let thumbnail_task = {
            let image = Arc::clone(&image);
            let saliency = Arc::clone(&self.saliency);
            let target = roots.thumbnail_path(asset_id);
            let (width, height) = (self.thumbnail_width, self.thumbnail_height);
            tokio::task::spawn_blocking(move || {
                render_thumbnail(&image, saliency.as_ref(), width, height, &target, format)
            })
        };

        let face_task = {
            let image = Arc::clone(&image);
            let faces = Arc::clone(&self.faces);
            let target = roots.facecrop_path(asset_id);
            let (scale_factor, padding) = (self.face_scale_factor, self.face_padding);
            tokio::task::spawn_blocking(move || {
                render_face_crop(&image, faces.as_ref(), scale_factor, padding, &target, format)
            })
        };

        let (thumbnail, face_crop) = tokio::join!(thumbnail_task, face_task);
        let report = DerivativeReport {
            asset_id,
            thumbnail: thumbnail.unwrap_or_else(|e| Err(DerivativeError::Task(e.to_string()))),
            face_crop: face_crop.unwrap_or_else(|e| Err(DerivativeError::Task(e.to_string()))),
        };

        match &report.thumbnail {
            Ok(file) => tracing::debug!(
                asset_id = %asset_id,
                width = file.width,
                height = file.height,
                "Thumbnail written"
            ),
            Err(e) => tracing::warn!(asset_id = %asset_id, error = %e, "Thumbnail failed"),
        }
        match &report.face_crop {
            Ok(FaceCropOutcome::Written(file)) => tracing::debug!(
                asset_id = %asset_id,
                width = file.width,
                height = file.height,
                "Face crop written"
            ),
            Ok(FaceCropOutcome::NoFace) => {
                tracing::info!(asset_id = %asset_id, "No face found, face crop skipped")
            }
            Err(e) => tracing::warn!(asset_id = %asset_id, error = %e, "Face crop failed"),
        }

        tracing::info!(
            asset_id = %asset_id,
            format = ?format,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Derivatives generated"
        );

        report
    }
}

async fn decode(original: &Path) -> Result<(Arc<DynamicImage>, Option<ImageFormat>), DerivativeError> {
    let data = tokio::fs::read(original)
        .await
        .map_err(|e| DerivativeError::Source {
            path: original.display().to_string(),
            reason: e.to_string(),
        })?;

    tokio::task::spawn_blocking(move || {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| DerivativeError::Decode(e.to_string()))?;
        let format = reader.format();
        let image = reader
            .decode()
            .map_err(|e| DerivativeError::Decode(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(DerivativeError::Decode("image has no pixels".to_string()));
        }
        Ok((Arc::new(image), format))
    })
    .await
    .map_err(|e| DerivativeError::Task(e.to_string()))?
}

fn render_thumbnail(
    image: &DynamicImage,
    saliency: &dyn SaliencyDetector,
    width: u32,
    height: u32,
    target: &Path,
    format: ImageFormat,
) -> Result<DerivativeFile, DerivativeError> {
    let (img_w, img_h) = image.dimensions();
    let rect = saliency
        .best_crop(image, width, height)
        .unwrap_or_else(|| CropRect::centered(img_w, img_h, width, height));

    let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
    let out_h = ((rect.height as f64 * width as f64) / rect.width.max(1) as f64)
        .round()
        .max(1.0) as u32;
    let thumbnail = cropped.resize_exact(width, out_h, FilterType::Lanczos3);

    write_atomic(&thumbnail, target, format)?;

    Ok(DerivativeFile {
        path: target.to_path_buf(),
        width,
        height: out_h,
        format,
    })
}

fn render_face_crop(
    image: &DynamicImage,
    faces: &dyn FaceDetector,
    scale_factor: f32,
    padding: f32,
    target: &Path,
    format: ImageFormat,
) -> Result<FaceCropOutcome, DerivativeError> {
    let (img_w, img_h) = image.dimensions();
    let Some(face) = faces.detect(image, scale_factor) else {
        return Ok(FaceCropOutcome::NoFace);
    };

    let rect = face.padded(padding, img_w, img_h);
    let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
    write_atomic(&cropped, target, format)?;

    Ok(FaceCropOutcome::Written(DerivativeFile {
        path: target.to_path_buf(),
        width: rect.width,
        height: rect.height,
        format,
    }))
}
