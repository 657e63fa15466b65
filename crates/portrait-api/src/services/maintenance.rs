//! Administrative maintenance over finalized assets.

use std::sync::Arc;

use portrait_core::{AssetFilter, AssetSort, PipelineError};
use portrait_db::AssetRepository;
use portrait_storage::AssetStore;
use portrait_worker::{DerivativeJob, DerivativeQueue};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReloadFailure {
    pub asset_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub processed: usize,
    pub thumbnails: usize,
    pub face_crops: usize,
    pub failures: Vec<ReloadFailure>,
}

#[derive(Clone)]
pub struct MaintenanceService {
    repository: Arc<dyn AssetRepository>,
    store: AssetStore,
    queue: DerivativeQueue,
}

impl MaintenanceService {
    pub fn new(repository: Arc<dyn AssetRepository>, store: AssetStore, queue: DerivativeQueue) -> Self {
        Self {
            repository,
            store,
            queue,
        }
    }

    /// Regenerate both derivatives of every finalized asset uploaded through `site`.
    ///
    /// Assets are processed one at a time, oldest first. A failing asset is recorded in
    /// the report and the run continues.
    #[tracing::instrument(skip(self))]
    pub async fn reload_thumbnails(&self, site: &str) -> Result<ReloadReport, PipelineError> {
        let assets = self
            .repository
            .find(
                &AssetFilter::finalized().with_site(site),
                AssetSort::CreatedAsc,
                None,
            )
            .await?;

        let mut report = ReloadReport::default();
        for asset in assets {
            report.processed += 1;

            let original = self.store.original_path(asset.id);
            if !self.store.exists(&original).await {
                tracing::warn!(asset_id = %asset.id, "Original missing, skipping");
                report.failures.push(ReloadFailure {
                    asset_id: asset.id,
                    reason: format!("original missing at {}", original.display()),
                });
                continue;
            }

            let job = DerivativeJob {
                asset_id: asset.id,
                original,
                mimetype: asset.mimetype.clone(),
            };
            let outcome = match self.queue.submit(job).await {
                Ok(ticket) => ticket.wait().await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(derivatives) => {
                    if derivatives.thumbnail_written() {
                        report.thumbnails += 1;
                    }
                    if derivatives.face_crop_written() {
                        report.face_crops += 1;
                    }
                    if let Some(err) = derivatives.errors().first() {
                        report.failures.push(ReloadFailure {
                            asset_id: asset.id,
                            reason: err.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(asset_id = %asset.id, error = %e, "Derivative job did not run");
                    report.failures.push(ReloadFailure {
                        asset_id: asset.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            site = %site,
            processed = report.processed,
            thumbnails = report.thumbnails,
            face_crops = report.face_crops,
            failures = report.failures.len(),
            "Thumbnail reload finished"
        );
        Ok(report)
    }
}
