//! Portrait Processing Library
//!
//! Everything that touches image bytes:
//! - remote fetch with content sniffing (fetch, sniff)
//! - crop rectangle detection (image::saliency, image::face)
//! - derivative generation (derivative)

pub mod derivative;
pub mod fetch;
pub mod image;
pub mod sniff;

pub use derivative::{
    DerivativeError, DerivativeFile, DerivativeGenerator, DerivativeReport, FaceCropOutcome,
};
pub use fetch::{FetchError, FetchedFile, RemoteFetcher};
pub use crate::image::{CropRect, EdgeSaliencyDetector, FaceDetector, SaliencyDetector, SkinToneFaceDetector};
pub use sniff::{is_image_mimetype, sniff_bytes, sniff_file};
