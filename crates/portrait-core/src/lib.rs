//! Portrait Core Library
//!
//! Domain models, the pipeline error taxonomy and configuration shared by every
//! Portrait crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{
    Config, DerivativeConfig, EntityConfig, FetchConfig, ServerConfig, StorageConfig,
};
pub use error::{ErrorMetadata, LogLevel, PipelineError};
pub use models::{
    Asset, AssetFilter, AssetSort, AssetState, EntityId, EntityInfo, EntitySummary, NewAsset,
    UploadContext,
};
