//! Test helpers: build AppState and router for integration tests.
//!
//! Every test app gets its own temporary storage root, an in-memory repository and a
//! stub entity resolver, so no test touches the network beyond the mockito servers it
//! starts itself.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use image::{ImageBuffer, ImageFormat, Rgb};
use portrait_api::setup::{routes, services};
use portrait_api::state::AppState;
use portrait_core::{Config, EntityId, EntityInfo};
use portrait_db::{AssetRepository, InMemoryAssetRepository};
use portrait_services::{EntityResolver, ResolverError, ResolverResult};
use portrait_storage::AssetStore;
use tempfile::TempDir;

pub const ADMIN_TOKEN: &str = "test-admin-token-0123456789";
pub const TEST_HOST: &str = "photos.example.org";

/// Entity resolver answering from a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StubResolver {
    entities: HashMap<EntityId, EntityInfo>,
    related: HashMap<EntityId, Vec<EntityId>>,
    unavailable: bool,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, id: &str, label: &str, images: &[&str]) -> Self {
        let id: EntityId = id.parse().unwrap();
        self.entities.insert(
            id.clone(),
            EntityInfo {
                id,
                labels: HashMap::from([("en".to_string(), label.to_string())]),
                image_claims: images.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_related(mut self, id: &str, related: &[&str]) -> Self {
        self.related.insert(
            id.parse().unwrap(),
            related.iter().map(|s| s.parse().unwrap()).collect(),
        );
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check(&self) -> ResolverResult<()> {
        if self.unavailable {
            return Err(ResolverError::Status {
                endpoint: "stub".to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EntityResolver for StubResolver {
    async fn resolve_entities(
        &self,
        ids: &[EntityId],
        _language: &str,
    ) -> ResolverResult<HashMap<EntityId, EntityInfo>> {
        self.check()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.entities.get(id).map(|info| (id.clone(), info.clone())))
            .collect())
    }

    async fn resolve_related_entities(
        &self,
        id: &EntityId,
        limit: usize,
    ) -> ResolverResult<Vec<EntityId>> {
        self.check()?;
        let mut ids = vec![id.clone()];
        for related in self.related.get(id).into_iter().flatten() {
            if !ids.contains(related) {
                ids.push(related.clone());
            }
        }
        ids.truncate(limit);
        Ok(ids)
    }
}

/// Test application: server, state, and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub repository: InMemoryAssetRepository,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn store(&self) -> &AssetStore {
        &self.state.store
    }

    pub fn root(&self) -> &Path {
        self.state.store.root()
    }

    /// File names currently in `originals/`.
    pub fn originals(&self) -> Vec<String> {
        list_dir(&self.root().join("originals"))
    }
}

pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn test_config(root: PathBuf, commons_base: &str) -> Config {
    let mut config = Config::default();
    config.storage.root = root;
    config.storage.database_url = "memory".to_string();
    config.fetch.timeout = Duration::from_secs(5);
    config.server.admin_token = Some(ADMIN_TOKEN.to_string());
    config.entities.commons_file_path_url = format!("{}/wiki/Special:FilePath", commons_base);
    config
}

pub async fn setup_test_app(resolver: StubResolver, commons_base: &str) -> TestApp {
    setup_test_app_with(resolver, commons_base, |_| {}).await
}

pub async fn setup_test_app_with(
    resolver: StubResolver,
    commons_base: &str,
    customize: impl FnOnce(&mut Config),
) -> TestApp {
    build_test_app(resolver, commons_base, customize, |repository, _| {
        Arc::new(repository)
    })
    .await
}

/// Like [`setup_test_app`], but the services see the repository returned by `wrap`.
/// `wrap` receives the in-memory repository and the storage root.
pub async fn setup_test_app_with_repository(
    resolver: StubResolver,
    commons_base: &str,
    wrap: impl FnOnce(InMemoryAssetRepository, PathBuf) -> Arc<dyn AssetRepository>,
) -> TestApp {
    build_test_app(resolver, commons_base, |_| {}, wrap).await
}

async fn build_test_app(
    resolver: StubResolver,
    commons_base: &str,
    customize: impl FnOnce(&mut Config),
    wrap: impl FnOnce(InMemoryAssetRepository, PathBuf) -> Arc<dyn AssetRepository>,
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut config = test_config(temp_dir.path().to_path_buf(), commons_base);
    customize(&mut config);

    let repository = InMemoryAssetRepository::new();
    let store = AssetStore::new(temp_dir.path())
        .await
        .expect("Failed to create asset store");

    let state = services::initialize_services(
        &config,
        wrap(repository.clone(), temp_dir.path().to_path_buf()),
        store,
        Arc::new(resolver),
    )
    .expect("Failed to initialize services");

    let router = routes::setup_routes(&config, state.clone());
    let server = TestServer::new(router).expect("Failed to start test server");

    TestApp {
        server,
        state,
        repository,
        _temp_dir: temp_dir,
    }
}

/// A small PNG without skin-coloured pixels.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, _| Rgb([40u8, (x % 256) as u8, 200u8]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Serve a 64x48 PNG at `path`.
pub async fn serve_png(server: &mut mockito::ServerGuard, path: &str) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(png_bytes(64, 48))
        .create_async()
        .await
}

/// HTML that claims to be a PNG.
pub async fn serve_html(server: &mut mockito::ServerGuard, path: &str) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body("<!doctype html><html><body>not an image</body></html>")
        .create_async()
        .await
}

pub async fn serve_missing(server: &mut mockito::ServerGuard, path: &str) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(404)
        .with_body("not found")
        .create_async()
        .await
}
