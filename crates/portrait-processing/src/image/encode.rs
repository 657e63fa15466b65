use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use uuid::Uuid;

use crate::derivative::DerivativeError;

/// Formats derivatives may be written in.
const WRITABLE: [ImageFormat; 6] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Output format for a derivative: the recorded mimetype if encodable, then the format
/// sniffed from the original, then PNG.
pub fn output_format(mimetype: &str, sniffed: Option<ImageFormat>) -> ImageFormat {
    ImageFormat::from_mime_type(mimetype)
        .filter(|f| WRITABLE.contains(f))
        .or(sniffed.filter(|f| WRITABLE.contains(f)))
        .unwrap_or(ImageFormat::Png)
}

/// Encode `image` and move it over `target` in one rename. A failed write never leaves a
/// partial file at `target`.
pub fn write_atomic(
    image: &DynamicImage,
    target: &Path,
    format: ImageFormat,
) -> Result<u64, DerivativeError> {
    // JPEG has no alpha channel; the other writers take 8-bit RGBA.
    let prepared = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => DynamicImage::ImageRgba8(image.to_rgba8()),
    };

    let mut buffer = Cursor::new(Vec::new());
    prepared
        .write_to(&mut buffer, format)
        .map_err(|e| DerivativeError::Encode(format!("{:?}: {}", format, e)))?;
    let data = buffer.into_inner();

    let write_error = |e: std::io::Error| DerivativeError::Write {
        path: target.display().to_string(),
        reason: e.to_string(),
    };

    let tmp = temp_sibling(target);
    std::fs::write(&tmp, &data).map_err(write_error)?;
    if let Err(e) = std::fs::rename(&tmp, target) {
        if let Err(cleanup) = std::fs::remove_file(&tmp) {
            tracing::warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temporary derivative");
        }
        return Err(write_error(e));
    }

    Ok(data.len() as u64)
}

fn temp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{}.tmp-{}", name, Uuid::new_v4().simple()))
}
