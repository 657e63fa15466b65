//! Portrait Services Library
//!
//! Clients for external services the acquisition pipeline depends on.

pub mod entity;

pub use entity::{EntityResolver, ResolverError, ResolverResult, WikidataClient};
