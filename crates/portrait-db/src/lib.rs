//! Asset record persistence.
//!
//! `AssetRepository` is the seam the acquisition workflows persist through. Two
//! implementations ship: `SqliteAssetRepository` (sqlx) and `InMemoryAssetRepository`
//! (tests and `DATABASE_URL=memory`).

pub mod error;
pub mod memory;
pub mod repository;
pub mod sqlite;

pub use error::{RepositoryError, RepositoryResult};
pub use memory::{InMemoryAssetRepository, RepositoryOperation};
pub use repository::AssetRepository;
pub use sqlite::SqliteAssetRepository;
