//! Configuration module
//!
//! Configuration is read from the process environment (optionally seeded from a `.env`
//! file) into a flat structure, then split into per-component sections so each crate
//! only sees the settings it needs.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::constants::{
    DEFAULT_FACE_MIN_SKIN_RATIO, DEFAULT_FACE_PADDING, DEFAULT_FACE_SCALE_FACTOR,
    DEFAULT_RELATED_ENTITY_LIMIT, DEFAULT_THUMBNAIL_HEIGHT, DEFAULT_THUMBNAIL_WIDTH,
};

const SERVER_PORT: u16 = 3000;
const FETCH_TIMEOUT_SECS: u64 = 60;
const FETCH_MAX_BYTES: u64 = 50 * 1024 * 1024;
const DERIVATIVE_WORKERS: usize = 2;

/// Environment variables, one field per key (envy maps `SERVER_PORT` to `server_port`).
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_server_port")]
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    #[serde(default = "default_storage_root")]
    storage_root: String,
    #[serde(default = "default_fetch_timeout_secs")]
    fetch_timeout_secs: u64,
    #[serde(default = "default_fetch_max_bytes")]
    fetch_max_bytes: u64,
    #[serde(default = "default_thumbnail_width")]
    thumbnail_width: u32,
    #[serde(default = "default_thumbnail_height")]
    thumbnail_height: u32,
    #[serde(default = "default_face_scale_factor")]
    face_scale_factor: f32,
    #[serde(default = "default_face_padding")]
    face_padding: f32,
    #[serde(default = "default_face_min_skin_ratio")]
    face_min_skin_ratio: f32,
    #[serde(default = "default_derivative_workers")]
    derivative_workers: usize,
    #[serde(default = "default_wikidata_api_url")]
    wikidata_api_url: String,
    #[serde(default = "default_wikidata_sparql_url")]
    wikidata_sparql_url: String,
    #[serde(default = "default_commons_file_path_url")]
    commons_file_path_url: String,
    #[serde(default = "default_entity_language")]
    entity_language: String,
    #[serde(default = "default_related_entity_limit")]
    related_entity_limit: usize,
    admin_token: Option<String>,
    #[serde(default = "default_environment")]
    environment: String,
    #[serde(default = "default_log_format")]
    log_format: String,
}

fn default_server_port() -> u16 {
    SERVER_PORT
}
fn default_database_url() -> String {
    "sqlite://portrait.db?mode=rwc".to_string()
}
fn default_storage_root() -> String {
    "uploads".to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    FETCH_TIMEOUT_SECS
}
fn default_fetch_max_bytes() -> u64 {
    FETCH_MAX_BYTES
}
fn default_thumbnail_width() -> u32 {
    DEFAULT_THUMBNAIL_WIDTH
}
fn default_thumbnail_height() -> u32 {
    DEFAULT_THUMBNAIL_HEIGHT
}
fn default_face_scale_factor() -> f32 {
    DEFAULT_FACE_SCALE_FACTOR
}
fn default_face_padding() -> f32 {
    DEFAULT_FACE_PADDING
}
fn default_face_min_skin_ratio() -> f32 {
    DEFAULT_FACE_MIN_SKIN_RATIO
}
fn default_derivative_workers() -> usize {
    DERIVATIVE_WORKERS
}
fn default_wikidata_api_url() -> String {
    "https://www.wikidata.org/w/api.php".to_string()
}
fn default_wikidata_sparql_url() -> String {
    "https://query.wikidata.org/sparql".to_string()
}
fn default_commons_file_path_url() -> String {
    "https://commons.wikimedia.org/wiki/Special:FilePath".to_string()
}
fn default_entity_language() -> String {
    "en".to_string()
}
fn default_related_entity_limit() -> usize {
    DEFAULT_RELATED_ENTITY_LIMIT
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

/// HTTP server settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: String,
    pub log_format: String,
    /// Bearer token for the administrative endpoints. `None` disables them.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: SERVER_PORT,
            environment: default_environment(),
            log_format: default_log_format(),
            admin_token: None,
        }
    }
}

/// Storage layout and persistence settings.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(default_storage_root()),
            database_url: default_database_url(),
        }
    }
}

/// Remote fetch limits.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            max_bytes: FETCH_MAX_BYTES,
        }
    }
}

/// Thumbnail and face-crop tuning.
#[derive(Clone, Debug)]
pub struct DerivativeConfig {
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub face_scale_factor: f32,
    pub face_padding: f32,
    pub face_min_skin_ratio: f32,
    pub workers: usize,
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            thumbnail_height: DEFAULT_THUMBNAIL_HEIGHT,
            face_scale_factor: DEFAULT_FACE_SCALE_FACTOR,
            face_padding: DEFAULT_FACE_PADDING,
            face_min_skin_ratio: DEFAULT_FACE_MIN_SKIN_RATIO,
            workers: DERIVATIVE_WORKERS,
        }
    }
}

/// Entity-resolution endpoints.
#[derive(Clone, Debug)]
pub struct EntityConfig {
    pub wikidata_api_url: String,
    pub wikidata_sparql_url: String,
    pub commons_file_path_url: String,
    pub language: String,
    pub related_limit: usize,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            wikidata_api_url: default_wikidata_api_url(),
            wikidata_sparql_url: default_wikidata_sparql_url(),
            commons_file_path_url: default_commons_file_path_url(),
            language: default_entity_language(),
            related_limit: DEFAULT_RELATED_ENTITY_LIMIT,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub derivatives: DerivativeConfig,
    pub entities: EntityConfig,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded");
        }
        let raw: RawConfig = envy::from_env()
            .map_err(|e| anyhow::anyhow!("Invalid environment configuration: {}", e))?;
        let config = Self::from_raw(raw);
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Self {
        Config {
            server: ServerConfig {
                port: raw.server_port,
                environment: raw.environment,
                log_format: raw.log_format,
                admin_token: raw.admin_token.filter(|t| !t.trim().is_empty()),
            },
            storage: StorageConfig {
                root: PathBuf::from(raw.storage_root),
                database_url: raw.database_url,
            },
            fetch: FetchConfig {
                timeout: Duration::from_secs(raw.fetch_timeout_secs),
                max_bytes: raw.fetch_max_bytes,
            },
            derivatives: DerivativeConfig {
                thumbnail_width: raw.thumbnail_width,
                thumbnail_height: raw.thumbnail_height,
                face_scale_factor: raw.face_scale_factor,
                face_padding: raw.face_padding,
                face_min_skin_ratio: raw.face_min_skin_ratio,
                workers: raw.derivative_workers,
            },
            entities: EntityConfig {
                wikidata_api_url: raw.wikidata_api_url,
                wikidata_sparql_url: raw.wikidata_sparql_url,
                commons_file_path_url: raw.commons_file_path_url,
                language: raw.entity_language,
                related_limit: raw.related_entity_limit,
            },
        }
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.server.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.fetch.timeout.is_zero() {
            anyhow::bail!("FETCH_TIMEOUT_SECS must be greater than 0");
        }
        if self.fetch.max_bytes == 0 {
            anyhow::bail!("FETCH_MAX_BYTES must be greater than 0");
        }
        if self.derivatives.thumbnail_width == 0 || self.derivatives.thumbnail_height == 0 {
            anyhow::bail!("THUMBNAIL_WIDTH and THUMBNAIL_HEIGHT must be greater than 0");
        }
        let scale = self.derivatives.face_scale_factor;
        if !(scale > 0.0 && scale < 1.0) {
            anyhow::bail!("FACE_SCALE_FACTOR must be in (0, 1), got {}", scale);
        }
        if self.derivatives.face_padding < 1.0 {
            anyhow::bail!(
                "FACE_PADDING must be at least 1.0, got {}",
                self.derivatives.face_padding
            );
        }
        let ratio = self.derivatives.face_min_skin_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            anyhow::bail!("FACE_MIN_SKIN_RATIO must be in (0, 1], got {}", ratio);
        }
        if self.derivatives.workers == 0 {
            anyhow::bail!("DERIVATIVE_WORKERS must be greater than 0");
        }
        if self.is_production() && self.server.admin_token.is_none() {
            tracing::warn!("ADMIN_TOKEN is not set; administrative endpoints are disabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_from(pairs: &[(&str, &str)]) -> RawConfig {
        envy::from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_raw(raw_from(&[]));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.fetch.timeout, Duration::from_secs(60));
        assert_eq!(config.derivatives.thumbnail_width, 200);
        assert!((config.derivatives.face_scale_factor - 0.9).abs() < f32::EPSILON);
        assert!((config.derivatives.face_padding - 1.7).abs() < f32::EPSILON);
        assert_eq!(config.entities.related_limit, 50);
        assert!(config.server.admin_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_raw(raw_from(&[
            ("SERVER_PORT", "8080"),
            ("FETCH_TIMEOUT_SECS", "5"),
            ("STORAGE_ROOT", "/tmp/portrait"),
            ("ADMIN_TOKEN", "secret"),
        ]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.fetch.timeout, Duration::from_secs(5));
        assert_eq!(config.storage.root, PathBuf::from("/tmp/portrait"));
        assert_eq!(config.server.admin_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_blank_admin_token_disables_admin() {
        let config = Config::from_raw(raw_from(&[("ADMIN_TOKEN", "  ")]));
        assert!(config.server.admin_token.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_face_parameters() {
        let mut config = Config::default();
        config.derivatives.face_scale_factor = 1.2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.derivatives.face_padding = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.fetch.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
