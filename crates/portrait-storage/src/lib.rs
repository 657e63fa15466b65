//! Portrait Storage Library
//!
//! Local filesystem layout for originals and their derivatives, and the two-phase
//! naming used while an asset has no canonical id yet.
//!
//! # Layout
//!
//! Three parallel directories below the storage root, keyed by the same id:
//!
//! - `originals/{id}` (or `originals/{provisional-name}` during the creation window)
//! - `thumbnails/{id}`
//! - `facecrops/{id}`
//!
//! Keys are canonical ids or provisional names; neither can contain path separators.

pub mod error;
pub mod layout;
pub mod naming;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use layout::{AssetStore, DerivativeRoots};
pub use naming::{generate_provisional_name, ProvisionalName};
