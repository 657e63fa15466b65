//! Domain models

pub mod asset;
pub mod entity;

pub use asset::{Asset, AssetFilter, AssetSort, AssetState, NewAsset, UploadContext};
pub use entity::{EntityId, EntityInfo, EntitySummary};
