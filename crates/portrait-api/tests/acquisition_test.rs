//! Acquisition workflow tests against the service layer.
//!
//! Run with: `cargo test -p portrait-api --test acquisition_test`

mod helpers;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use helpers::{
    png_bytes, serve_html, serve_missing, serve_png, setup_test_app,
    setup_test_app_with_repository, StubResolver,
};
use portrait_api::services::{BatchEntry, DirectUploadForm, StoredUpload};
use portrait_core::{
    Asset, AssetFilter, AssetSort, AssetState, EntityId, NewAsset, PipelineError, UploadContext,
};
use portrait_db::{
    AssetRepository, InMemoryAssetRepository, RepositoryOperation, RepositoryResult,
};
use uuid::Uuid;

fn ctx() -> UploadContext {
    UploadContext::new(helpers::TEST_HOST)
}

fn form(entity: &str) -> DirectUploadForm {
    DirectUploadForm {
        wikidata_entity_id: entity.to_string(),
        name: Some("Portrait".to_string()),
        recorded_date: None,
    }
}

async fn unused_mock(server: &mut mockito::ServerGuard, path: &str) -> mockito::Mock {
    server.mock("GET", path).expect(0).create_async().await
}

/// Repository that occupies `originals/{id}` with a non-empty directory as soon as a
/// record is created, so the original can never be moved into place.
struct OccupiedOriginals {
    inner: InMemoryAssetRepository,
    originals: PathBuf,
}

#[async_trait]
impl AssetRepository for OccupiedOriginals {
    async fn create(&self, asset: NewAsset) -> RepositoryResult<Asset> {
        let asset = self.inner.create(asset).await?;
        std::fs::create_dir_all(self.originals.join(asset.id.to_string()).join("occupied"))
            .unwrap();
        Ok(asset)
    }

    async fn find(
        &self,
        filter: &AssetFilter,
        sort: AssetSort,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<Asset>> {
        self.inner.find(filter, sort, limit).await
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Asset>> {
        self.inner.get(id).await
    }

    async fn mark_finalized(&self, id: Uuid) -> RepositoryResult<Asset> {
        self.inner.mark_finalized(id).await
    }

    async fn delete_one(&self, id: Uuid) -> RepositoryResult<bool> {
        self.inner.delete_one(id).await
    }
}

fn resolver() -> StubResolver {
    StubResolver::new()
        .with_entity("Q1", "Ada Lovelace", &["Ada_Lovelace.png"])
        .with_entity("Q2", "Charles Babbage", &[])
}

#[tokio::test]
async fn test_url_upload_finalizes_record_and_original() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/ada.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;

    let url = format!("{}/ada.png", remote.url());
    let acquired = app
        .state
        .acquisition
        .upload_from_url(&ctx(), &url, form("Q1"))
        .await
        .unwrap();

    let asset = &acquired.asset;
    assert_eq!(asset.state, AssetState::Finalized);
    assert_eq!(asset.mimetype, "image/png");
    assert_eq!(asset.wikidata_entity, Some(1));
    assert_eq!(asset.wikidata_label.as_deref(), Some("Ada Lovelace"));
    assert_eq!(asset.source_url.as_deref(), Some(url.as_str()));
    assert_eq!(asset.upload_site, helpers::TEST_HOST);

    // Exactly one original, named after the record.
    assert_eq!(app.originals(), vec![asset.id.to_string()]);
    let provisional = asset.internal_file_name.clone().unwrap();
    assert!(!app.root().join("originals").join(provisional).exists());

    let report = acquired.derivatives.unwrap().wait().await.unwrap();
    assert!(report.thumbnail_written());
    assert!(app.store().thumbnail_path(asset.id).exists());
}

#[tokio::test]
async fn test_non_image_url_creates_no_record() {
    let mut remote = mockito::Server::new_async().await;
    serve_html(&mut remote, "/page").await;
    let app = setup_test_app(resolver(), &remote.url()).await;

    let url = format!("{}/page", remote.url());
    let result = app
        .state
        .acquisition
        .upload_from_url(&ctx(), &url, form("Q1"))
        .await;

    assert!(matches!(result, Err(PipelineError::Validation(_))));
    assert!(app.repository.is_empty().await);
    assert!(app.originals().is_empty());
}

#[tokio::test]
async fn test_invalid_entity_is_rejected_before_fetching() {
    let mut remote = mockito::Server::new_async().await;
    let mock = unused_mock(&mut remote, "/ada.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;

    let url = format!("{}/ada.png", remote.url());
    let result = app
        .state
        .acquisition
        .upload_from_url(&ctx(), &url, form("X1"))
        .await;

    assert!(matches!(result, Err(PipelineError::InvalidEntity(id)) if id == "X1"));
    mock.assert_async().await;
    assert!(app.repository.is_empty().await);
}

#[tokio::test]
async fn test_direct_upload_sniffs_and_renames() {
    let app = setup_test_app(resolver(), "http://unused.invalid").await;

    let provisional = app.store().write_provisional(&png_bytes(32, 32)).await.unwrap();
    let upload = StoredUpload {
        provisional: provisional.clone(),
        original_filename: Some("ada.png".to_string()),
    };
    let acquired = app
        .state
        .acquisition
        .upload_file(&ctx(), upload, form("Q1"))
        .await
        .unwrap();

    assert_eq!(acquired.asset.original_filename.as_deref(), Some("ada.png"));
    assert_eq!(
        acquired.asset.internal_file_name.as_deref(),
        Some(provisional.as_str())
    );
    assert_eq!(app.originals(), vec![acquired.asset.id.to_string()]);
    acquired.derivatives.unwrap().wait().await.unwrap();
}

#[tokio::test]
async fn test_direct_upload_of_non_image_discards_provisional_file() {
    let app = setup_test_app(resolver(), "http://unused.invalid").await;

    let provisional = app
        .store()
        .write_provisional(b"%PDF-1.4 definitely not an image")
        .await
        .unwrap();
    let upload = StoredUpload {
        provisional,
        original_filename: Some("paper.pdf".to_string()),
    };
    let result = app
        .state
        .acquisition
        .upload_file(&ctx(), upload, form("Q1"))
        .await;

    assert!(matches!(result, Err(PipelineError::Validation(_))));
    assert!(app.originals().is_empty());
    assert!(app.repository.is_empty().await);
}

#[tokio::test]
async fn test_direct_upload_with_unknown_entity_discards_provisional_file() {
    let app = setup_test_app(resolver(), "http://unused.invalid").await;

    let provisional = app.store().write_provisional(&png_bytes(8, 8)).await.unwrap();
    let upload = StoredUpload {
        provisional,
        original_filename: None,
    };
    let result = app
        .state
        .acquisition
        .upload_file(&ctx(), upload, form("Q999"))
        .await;

    assert!(matches!(result, Err(PipelineError::InvalidEntity(_))));
    assert!(app.originals().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_leaves_nothing_behind() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/ada.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;
    app.repository.fail(RepositoryOperation::Create).await;

    let url = format!("{}/ada.png", remote.url());
    let result = app
        .state
        .acquisition
        .upload_from_url(&ctx(), &url, form("Q1"))
        .await;

    assert!(matches!(result, Err(PipelineError::Persistence(_))));
    assert!(app.originals().is_empty());
    assert!(app.repository.is_empty().await);
}

#[tokio::test]
async fn test_finalize_failure_rolls_back_record_and_original() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/ada.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;
    app.repository
        .fail(RepositoryOperation::MarkFinalized)
        .await;

    let url = format!("{}/ada.png", remote.url());
    let result = app
        .state
        .acquisition
        .upload_from_url(&ctx(), &url, form("Q1"))
        .await;

    assert!(matches!(result, Err(PipelineError::Persistence(_))));
    assert!(app.repository.is_empty().await);
    assert!(app.originals().is_empty());
}

#[tokio::test]
async fn test_rename_failure_rolls_back_record_and_keeps_provisional_file() {
    let app = setup_test_app_with_repository(resolver(), "http://unused.invalid", |inner, root| {
        Arc::new(OccupiedOriginals {
            inner,
            originals: root.join("originals"),
        })
    })
    .await;

    let provisional = app.store().write_provisional(&png_bytes(32, 32)).await.unwrap();
    let upload = StoredUpload {
        provisional: provisional.clone(),
        original_filename: Some("ada.png".to_string()),
    };
    let result = app
        .state
        .acquisition
        .upload_file(&ctx(), upload, form("Q1"))
        .await;

    assert!(matches!(result, Err(PipelineError::Rename(_))));
    assert!(app.repository.is_empty().await);
    assert!(app.store().provisional_path(&provisional).exists());
}

#[tokio::test]
async fn test_entity_without_image_claim_creates_nothing() {
    let app = setup_test_app(resolver(), "http://unused.invalid").await;

    let entity: EntityId = "Q2".parse().unwrap();
    let result = app
        .state
        .acquisition
        .upload_from_entity(&ctx(), &entity)
        .await
        .unwrap();

    assert!(result.is_none());
    assert!(app.repository.is_empty().await);
}

#[tokio::test]
async fn test_entity_upload_fetches_from_commons() {
    let mut commons = mockito::Server::new_async().await;
    serve_png(&mut commons, "/wiki/Special:FilePath/Ada_Lovelace.png").await;
    let app = setup_test_app(resolver(), &commons.url()).await;

    let entity: EntityId = "Q1".parse().unwrap();
    let acquired = app
        .state
        .acquisition
        .upload_from_entity(&ctx(), &entity)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        acquired.asset.source_name.as_deref(),
        Some("commons.wikimedia.org")
    );
    assert_eq!(
        acquired.asset.original_filename.as_deref(),
        Some("Ada_Lovelace.png")
    );
    assert_eq!(acquired.asset.wikidata_entity, Some(1));
}

#[tokio::test]
async fn test_import_entities_isolates_failures() {
    let mut commons = mockito::Server::new_async().await;
    serve_png(&mut commons, "/wiki/Special:FilePath/Ada_Lovelace.png").await;
    let app = setup_test_app(resolver(), &commons.url()).await;

    let ids = EntityId::parse_list("Q404,Q1,Q2").unwrap();
    let report = app.state.acquisition.import_entities(&ctx(), &ids).await;

    assert_eq!(report.imported.len(), 1);
    assert_eq!(report.skipped, vec!["Q2".parse::<EntityId>().unwrap()]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, PipelineError::InvalidEntity(_)));
}

#[tokio::test]
async fn test_batch_stops_at_first_failure() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/q1.png").await;
    serve_missing(&mut remote, "/q2.png").await;
    let never = unused_mock(&mut remote, "/q3.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;

    let entries = vec![
        BatchEntry {
            entity: "Q1".parse().unwrap(),
            url: format!("{}/q1.png", remote.url()),
        },
        BatchEntry {
            entity: "Q2".parse().unwrap(),
            url: format!("{}/q2.png", remote.url()),
        },
        BatchEntry {
            entity: "Q3".parse().unwrap(),
            url: format!("{}/q3.png", remote.url()),
        },
    ];
    let report = app
        .state
        .acquisition
        .upload_batch(&ctx(), entries)
        .await
        .unwrap();

    assert_eq!(report.success_count(), 1);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.entity.as_str(), "Q2");
    assert!(matches!(failure.error, PipelineError::Fetch(_)));
    assert!(report.rollback_failure.is_none());
    never.assert_async().await;

    let q1 = app
        .repository
        .find(&AssetFilter::finalized().with_entity(1), AssetSort::default(), None)
        .await
        .unwrap();
    assert_eq!(q1.len(), 1);
    assert_eq!(q1[0].wikidata_label.as_deref(), Some("Ada Lovelace"));

    let q2 = app
        .repository
        .find(&AssetFilter::default().with_entity(2), AssetSort::default(), None)
        .await
        .unwrap();
    assert!(q2.is_empty());
    assert_eq!(app.originals(), vec![q1[0].id.to_string()]);
}

#[tokio::test]
async fn test_batch_skips_empty_urls() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/q1.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;

    let entries = vec![
        BatchEntry {
            entity: "Q2".parse().unwrap(),
            url: "  ".to_string(),
        },
        BatchEntry {
            entity: "Q1".parse().unwrap(),
            url: format!("{}/q1.png", remote.url()),
        },
    ];
    let report = app
        .state
        .acquisition
        .upload_batch(&ctx(), entries)
        .await
        .unwrap();

    assert_eq!(report.success_count(), 1);
    assert_eq!(report.skipped, 1);
    assert!(report.failure.is_none());
}

#[tokio::test]
async fn test_batch_reports_rollback_failure() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/q1.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;
    app.repository
        .fail(RepositoryOperation::MarkFinalized)
        .await;
    app.repository.fail(RepositoryOperation::Delete).await;

    let entries = vec![BatchEntry {
        entity: "Q1".parse().unwrap(),
        url: format!("{}/q1.png", remote.url()),
    }];
    let report = app
        .state
        .acquisition
        .upload_batch(&ctx(), entries)
        .await
        .unwrap();

    assert_eq!(report.success_count(), 0);
    assert!(report.failure.is_some());
    let rollback = report.rollback_failure.unwrap();
    // The record that could not be deleted is still there, provisional.
    let left = app.repository.all().await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, rollback.asset_id);
    assert_eq!(left[0].state, AssetState::Provisional);
}

#[tokio::test]
async fn test_batch_fails_whole_when_labels_cannot_be_resolved() {
    let mut remote = mockito::Server::new_async().await;
    let mock = unused_mock(&mut remote, "/q1.png").await;
    let app = setup_test_app(StubResolver::new().unavailable(), &remote.url()).await;

    let entries = vec![BatchEntry {
        entity: "Q1".parse().unwrap(),
        url: format!("{}/q1.png", remote.url()),
    }];
    let result = app.state.acquisition.upload_batch(&ctx(), entries).await;

    assert!(matches!(result, Err(PipelineError::Resolution(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_concurrent_uploads_use_distinct_paths() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/q1.png").await;
    serve_png(&mut remote, "/q2.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;

    let url1 = format!("{}/q1.png", remote.url());
    let url2 = format!("{}/q2.png", remote.url());
    let ctx = ctx();
    let (a, b) = tokio::join!(
        app.state
            .acquisition
            .upload_from_url(&ctx, &url1, form("Q1")),
        app.state
            .acquisition
            .upload_from_url(&ctx, &url2, form("Q2")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.asset.id, b.asset.id);
    let store = app.store();
    assert_ne!(store.original_path(a.asset.id), store.original_path(b.asset.id));
    assert_ne!(store.thumbnail_path(a.asset.id), store.thumbnail_path(b.asset.id));
    assert_ne!(store.facecrop_path(a.asset.id), store.facecrop_path(b.asset.id));
    assert_eq!(app.originals().len(), 2);

    a.derivatives.unwrap().wait().await.unwrap();
    b.derivatives.unwrap().wait().await.unwrap();
}

#[tokio::test]
async fn test_entity_overview_and_related() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/ada.png").await;
    let resolver = resolver().with_related("Q1", &["Q2", "Q3", "Q2"]);
    let app = setup_test_app(resolver, &remote.url()).await;

    let url = format!("{}/ada.png", remote.url());
    let acquired = app
        .state
        .acquisition
        .upload_from_url(&ctx(), &url, form("Q1"))
        .await
        .unwrap();

    let ids = EntityId::parse_list("Q2,Q1,Q77").unwrap();
    let overview = app.state.acquisition.entity_overview(&ids).await.unwrap();
    assert_eq!(overview.len(), 2);
    assert_eq!(overview[0].id.as_str(), "Q2");
    assert!(overview[0].existing.is_none());
    assert_eq!(overview[1].label.as_deref(), Some("Ada Lovelace"));
    assert_eq!(overview[1].images, vec!["Ada_Lovelace.png".to_string()]);
    assert_eq!(overview[1].link, "https://www.wikidata.org/wiki/Q1");
    assert_eq!(overview[1].existing.as_ref().unwrap().id, acquired.asset.id);

    let related = app
        .state
        .acquisition
        .related_entities(&"Q1".parse().unwrap())
        .await
        .unwrap();
    let related: Vec<&str> = related.iter().map(EntityId::as_str).collect();
    assert_eq!(related, vec!["Q1", "Q2", "Q3"]);
}

#[tokio::test]
async fn test_reload_thumbnails_regenerates_for_site() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/ada.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;

    let url = format!("{}/ada.png", remote.url());
    let ours = app
        .state
        .acquisition
        .upload_from_url(&ctx(), &url, form("Q1"))
        .await
        .unwrap();
    ours.derivatives.unwrap().wait().await.unwrap();
    let other = app
        .state
        .acquisition
        .upload_from_url(&UploadContext::new("other.example.org"), &url, form("Q1"))
        .await
        .unwrap();
    other.derivatives.unwrap().wait().await.unwrap();

    let thumbnail = app.store().thumbnail_path(ours.asset.id);
    std::fs::remove_file(&thumbnail).unwrap();
    let other_thumbnail = app.store().thumbnail_path(other.asset.id);
    std::fs::remove_file(&other_thumbnail).unwrap();

    let report = app
        .state
        .maintenance
        .reload_thumbnails(helpers::TEST_HOST)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.thumbnails, 1);
    assert!(report.failures.is_empty());
    assert!(thumbnail.exists());
    assert!(!other_thumbnail.exists());
}

#[tokio::test]
async fn test_reload_thumbnails_reports_missing_original() {
    let mut remote = mockito::Server::new_async().await;
    serve_png(&mut remote, "/ada.png").await;
    let app = setup_test_app(resolver(), &remote.url()).await;

    let url = format!("{}/ada.png", remote.url());
    let acquired = app
        .state
        .acquisition
        .upload_from_url(&ctx(), &url, form("Q1"))
        .await
        .unwrap();
    acquired.derivatives.unwrap().wait().await.unwrap();
    std::fs::remove_file(app.store().original_path(acquired.asset.id)).unwrap();

    let report = app
        .state
        .maintenance
        .reload_thumbnails(helpers::TEST_HOST)
        .await
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.thumbnails, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].asset_id, acquired.asset.id);
}
