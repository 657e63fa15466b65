//! Constants shared across the pipeline.

/// Directory (below the storage root) holding original files.
pub const ORIGINALS_DIR: &str = "originals";

/// Directory (below the storage root) holding saliency thumbnails.
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Directory (below the storage root) holding face crops.
pub const FACECROPS_DIR: &str = "facecrops";

/// Bytes of entropy in a provisional file name (hex encoded to twice this length).
pub const PROVISIONAL_NAME_BYTES: usize = 20;

/// Thumbnail size on the constrained axis.
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 200;
pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 200;

/// Face detector window shrink per scale step.
pub const DEFAULT_FACE_SCALE_FACTOR: f32 = 0.9;

/// Expansion applied around a detected face box.
pub const DEFAULT_FACE_PADDING: f32 = 1.7;

/// Minimum share of skin-tone pixels for a window to count as a face.
pub const DEFAULT_FACE_MIN_SKIN_RATIO: f32 = 0.55;

/// Source name recorded for images pulled from Wikimedia Commons.
pub const COMMONS_SOURCE_NAME: &str = "commons.wikimedia.org";

/// Wikidata property holding an entity's image claim.
pub const IMAGE_PROPERTY: &str = "P18";

/// Cap on related entities forwarded to the multi-upload overview.
pub const DEFAULT_RELATED_ENTITY_LIMIT: usize = 50;

/// Default MIME type assumed when nothing better is known.
pub const FALLBACK_MIMETYPE: &str = "image/jpeg";
