//! Content type detection from file bytes.
//!
//! Declared `Content-Type` headers and multipart metadata are never trusted; the type
//! comes from the magic bytes at the start of the file.

use std::path::Path;

use tokio::io::AsyncReadExt;

/// Enough for every signature `image::guess_format` knows about.
const SNIFF_LEN: usize = 64;

/// Detect the MIME type of `data`. `None` for empty or unrecognised content.
pub fn sniff_bytes(data: &[u8]) -> Option<&'static str> {
    if data.is_empty() {
        return None;
    }
    image::guess_format(data).ok().map(|f| f.to_mime_type())
}

/// Detect the MIME type of the file at `path` from its first bytes.
pub async fn sniff_file(path: &Path) -> std::io::Result<Option<&'static str>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut header).await?;
    Ok(sniff_bytes(&header))
}

pub fn is_image_mimetype(mimetype: &str) -> bool {
    mimetype.starts_with("image/")
}
