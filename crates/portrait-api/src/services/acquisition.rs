//! Acquisition workflows: direct upload, single URL, entity-sourced and batch URL.
//!
//! Every workflow runs the same sequence once the original is on disk under a
//! provisional name: create the record, rename the original to `originals/{id}`, mark
//! the record finalized, then queue derivative generation. A failure after the record
//! exists runs the matching [`Compensation`] so that no record outlives its original.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use portrait_core::constants::COMMONS_SOURCE_NAME;
use portrait_core::{
    Asset, AssetFilter, AssetSort, EntityConfig, EntityId, EntityInfo, EntitySummary, NewAsset,
    PipelineError, UploadContext,
};
use portrait_db::AssetRepository;
use portrait_processing::{is_image_mimetype, sniff_file, RemoteFetcher};
use portrait_services::EntityResolver;
use portrait_storage::{generate_provisional_name, AssetStore, ProvisionalName};
use portrait_worker::{DerivativeJob, DerivativeQueue, DerivativeTicket};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Descriptive fields submitted with a single upload.
#[derive(Debug, Clone, Default)]
pub struct DirectUploadForm {
    /// Raw entity id as typed by the user; validated by the workflow.
    pub wikidata_entity_id: String,
    pub name: Option<String>,
    pub recorded_date: Option<NaiveDate>,
}

/// Bytes the HTTP layer already wrote to `originals/{provisional}`.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub provisional: ProvisionalName,
    pub original_filename: Option<String>,
}

/// A finalized asset and the completion signal of its derivative job.
#[derive(Debug)]
pub struct Acquired {
    pub asset: Asset,
    /// `None` when the queue refused the job. The asset is kept either way.
    pub derivatives: Option<DerivativeTicket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub entity: EntityId,
    #[serde(default)]
    pub url: String,
}

/// A compensating action that could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackFailure {
    pub asset_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub entity: EntityId,
    pub url: String,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub uploaded: Vec<Acquired>,
    /// Entries without a URL.
    pub skipped: usize,
    /// The entry that stopped the batch.
    pub failure: Option<BatchFailure>,
    pub rollback_failure: Option<RollbackFailure>,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.uploaded.len()
    }
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<Acquired>,
    /// Entities without an image claim.
    pub skipped: Vec<EntityId>,
    pub failed: Vec<(EntityId, PipelineError)>,
}

/// What to undo after a workflow failed part way.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Compensation {
    record: Option<Uuid>,
    provisional: Option<ProvisionalName>,
    original: Option<Uuid>,
}

impl Compensation {
    fn discard(provisional: &ProvisionalName) -> Self {
        Self {
            provisional: Some(provisional.clone()),
            ..Self::default()
        }
    }

    /// Delete the record but leave the provisional file where it is.
    fn delete_record(id: Uuid) -> Self {
        Self {
            record: Some(id),
            ..Self::default()
        }
    }

    fn delete_record_and_original(id: Uuid) -> Self {
        Self {
            record: Some(id),
            original: Some(id),
            ..Self::default()
        }
    }
}

struct Failed {
    error: PipelineError,
    compensation: Compensation,
}

impl Failed {
    fn new(error: impl Into<PipelineError>, compensation: Compensation) -> Self {
        Self {
            error: error.into(),
            compensation,
        }
    }
}

#[derive(Clone)]
pub struct AcquisitionService {
    repository: Arc<dyn AssetRepository>,
    store: AssetStore,
    fetcher: RemoteFetcher,
    resolver: Arc<dyn EntityResolver>,
    queue: DerivativeQueue,
    entities: EntityConfig,
}

impl AcquisitionService {
    pub fn new(
        repository: Arc<dyn AssetRepository>,
        store: AssetStore,
        fetcher: RemoteFetcher,
        resolver: Arc<dyn EntityResolver>,
        queue: DerivativeQueue,
        entities: EntityConfig,
    ) -> Self {
        Self {
            repository,
            store,
            fetcher,
            resolver,
            queue,
            entities,
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Register a file that arrived with the request.
    ///
    /// The provisional file is removed when the entity id is invalid, the content is not
    /// an image or the entity cannot be resolved.
    #[tracing::instrument(
        skip(self, ctx, upload, form),
        fields(upload_site = %ctx.upload_site, provisional = %upload.provisional)
    )]
    pub async fn upload_file(
        &self,
        ctx: &UploadContext,
        upload: StoredUpload,
        form: DirectUploadForm,
    ) -> Result<Acquired, PipelineError> {
        let provisional = upload.provisional;
        let (entity, mimetype, label) = match self.inspect_upload(&provisional, &form).await {
            Ok(inspected) => inspected,
            Err(e) => {
                self.discard(&provisional).await;
                return Err(e);
            }
        };

        let asset = NewAsset {
            name: form.name,
            original_filename: upload.original_filename,
            internal_file_name: Some(provisional.to_string()),
            mimetype,
            wikidata_entity: Some(entity.numeric()),
            wikidata_label: label,
            recorded_date: form.recorded_date,
            ..Self::draft(ctx)
        };

        let outcome = self.persist(&provisional, asset).await;
        self.settle(outcome).await
    }

    /// Fetch `url` and register it for the entity named in `form`.
    ///
    /// Nothing is persisted when the fetch or the content check fails.
    #[tracing::instrument(skip(self, ctx, form), fields(upload_site = %ctx.upload_site))]
    pub async fn upload_from_url(
        &self,
        ctx: &UploadContext,
        url: &str,
        form: DirectUploadForm,
    ) -> Result<Acquired, PipelineError> {
        let entity: EntityId = form.wikidata_entity_id.parse()?;
        let info = self.entity_info(&entity).await?;

        let draft = NewAsset {
            name: form.name,
            source_url: Some(url.to_string()),
            wikidata_entity: Some(entity.numeric()),
            wikidata_label: self.label_of(&info),
            recorded_date: form.recorded_date,
            ..Self::draft(ctx)
        };

        let outcome = self.acquire_remote(url, draft).await;
        self.settle(outcome).await
    }

    /// Import the first image claim of `entity` from Commons.
    ///
    /// Returns `Ok(None)` without creating anything when the entity has no image claim.
    #[tracing::instrument(skip(self, ctx, entity), fields(upload_site = %ctx.upload_site, entity = %entity))]
    pub async fn upload_from_entity(
        &self,
        ctx: &UploadContext,
        entity: &EntityId,
    ) -> Result<Option<Acquired>, PipelineError> {
        let info = self.entity_info(entity).await?;
        let Some(claim) = info.first_image() else {
            tracing::info!(entity = %entity, "Entity has no image claim, nothing to import");
            return Ok(None);
        };

        let url = self.commons_url(claim);
        let draft = NewAsset {
            source_url: Some(url.clone()),
            source_name: Some(COMMONS_SOURCE_NAME.to_string()),
            original_filename: Some(claim.to_string()),
            wikidata_entity: Some(entity.numeric()),
            wikidata_label: self.label_of(&info),
            ..Self::draft(ctx)
        };

        let outcome = self.acquire_remote(&url, draft).await;
        self.settle(outcome).await.map(Some)
    }

    /// Run [`Self::upload_from_entity`] for each id in turn. A failed entity does not
    /// stop the others.
    pub async fn import_entities(&self, ctx: &UploadContext, ids: &[EntityId]) -> ImportReport {
        let mut report = ImportReport::default();
        for id in ids {
            match self.upload_from_entity(ctx, id).await {
                Ok(Some(acquired)) => report.imported.push(acquired),
                Ok(None) => report.skipped.push(id.clone()),
                Err(e) => {
                    tracing::warn!(entity = %id, error = %e, "Entity import failed");
                    report.failed.push((id.clone(), e));
                }
            }
        }

        tracing::info!(
            imported = report.imported.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Entity import finished"
        );
        report
    }

    /// Fetch one URL per entity, in input order, stopping at the first failure.
    ///
    /// Labels for all entities are resolved before any download starts; a resolver
    /// failure fails the whole batch before anything is written.
    #[tracing::instrument(skip(self, ctx, entries), fields(upload_site = %ctx.upload_site, entries = entries.len()))]
    pub async fn upload_batch(
        &self,
        ctx: &UploadContext,
        entries: Vec<BatchEntry>,
    ) -> Result<BatchReport, PipelineError> {
        let mut seen = HashSet::new();
        let ids: Vec<EntityId> = entries
            .iter()
            .filter(|e| !e.url.trim().is_empty())
            .filter(|e| seen.insert(e.entity.clone()))
            .map(|e| e.entity.clone())
            .collect();

        let labels = if ids.is_empty() {
            Default::default()
        } else {
            self.resolver
                .resolve_entities(&ids, &self.entities.language)
                .await?
        };

        let mut report = BatchReport::default();
        for entry in entries {
            let url = entry.url.trim();
            if url.is_empty() {
                report.skipped += 1;
                continue;
            }

            let draft = NewAsset {
                source_url: Some(url.to_string()),
                wikidata_entity: Some(entry.entity.numeric()),
                wikidata_label: labels.get(&entry.entity).and_then(|i| self.label_of(i)),
                ..Self::draft(ctx)
            };

            match self.acquire_remote(url, draft).await {
                Ok(acquired) => report.uploaded.push(acquired),
                Err(failed) => {
                    tracing::warn!(
                        entity = %entry.entity,
                        url = %url,
                        error = %failed.error,
                        uploaded = report.uploaded.len(),
                        "Batch entry failed, aborting batch"
                    );
                    report.rollback_failure = self.compensate(failed.compensation).await;
                    report.failure = Some(BatchFailure {
                        entity: entry.entity,
                        url: url.to_string(),
                        error: failed.error,
                    });
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Label, sitelink, image claims and the first existing asset of each entity.
    ///
    /// Entities the resolver does not know are left out; input order is kept.
    pub async fn entity_overview(
        &self,
        ids: &[EntityId],
    ) -> Result<Vec<EntitySummary>, PipelineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let resolved = self
            .resolver
            .resolve_entities(ids, &self.entities.language)
            .await?;

        let mut seen = HashSet::new();
        let mut summaries = Vec::with_capacity(resolved.len());
        for id in ids {
            let Some(info) = resolved.get(id) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }

            let existing = self
                .repository
                .find(
                    &AssetFilter::finalized().with_entity(id.numeric()),
                    AssetSort::NameAsc,
                    Some(1),
                )
                .await?
                .into_iter()
                .next();

            summaries.push(EntitySummary {
                id: id.clone(),
                link: id.sitelink(),
                label: self.label_of(info),
                images: info.image_claims.clone(),
                existing,
            });
        }
        Ok(summaries)
    }

    /// `id` and its family relations, capped at the configured limit.
    pub async fn related_entities(&self, id: &EntityId) -> Result<Vec<EntityId>, PipelineError> {
        let related = self
            .resolver
            .resolve_related_entities(id, self.entities.related_limit)
            .await?;
        tracing::debug!(entity = %id, related = related.len(), "Related entities resolved");
        Ok(related)
    }

    fn draft(ctx: &UploadContext) -> NewAsset {
        NewAsset {
            upload_site: ctx.upload_site.clone(),
            created_by: ctx.created_by.clone(),
            ..NewAsset::default()
        }
    }

    fn label_of(&self, info: &EntityInfo) -> Option<String> {
        info.label(&self.entities.language).map(str::to_string)
    }

    fn commons_url(&self, claim: &str) -> String {
        format!(
            "{}/{}",
            self.entities.commons_file_path_url.trim_end_matches('/'),
            claim.replace(' ', "_")
        )
    }

    async fn entity_info(&self, entity: &EntityId) -> Result<EntityInfo, PipelineError> {
        let mut resolved = self
            .resolver
            .resolve_entities(std::slice::from_ref(entity), &self.entities.language)
            .await?;
        resolved
            .remove(entity)
            .ok_or_else(|| PipelineError::InvalidEntity(entity.to_string()))
    }

    async fn inspect_upload(
        &self,
        provisional: &ProvisionalName,
        form: &DirectUploadForm,
    ) -> Result<(EntityId, String, Option<String>), PipelineError> {
        let entity: EntityId = form.wikidata_entity_id.parse()?;

        let path = self.store.provisional_path(provisional);
        let mimetype = match sniff_file(&path).await? {
            Some(mimetype) if is_image_mimetype(mimetype) => mimetype.to_string(),
            other => {
                return Err(PipelineError::Validation(format!(
                    "uploaded file detected as {}",
                    other.unwrap_or("unknown")
                )))
            }
        };

        let info = self.entity_info(&entity).await?;
        Ok((entity, mimetype, self.label_of(&info)))
    }

    async fn acquire_remote(&self, url: &str, draft: NewAsset) -> Result<Acquired, Failed> {
        let provisional = generate_provisional_name();
        let destination = self.store.provisional_path(&provisional);

        let fetched = self
            .fetcher
            .fetch(url, &destination)
            .await
            .map_err(|e| Failed::new(e, Compensation::discard(&provisional)))?;

        let asset = NewAsset {
            mimetype: fetched.mimetype,
            internal_file_name: Some(provisional.to_string()),
            ..draft
        };
        self.persist(&provisional, asset).await
    }

    async fn persist(
        &self,
        provisional: &ProvisionalName,
        asset: NewAsset,
    ) -> Result<Acquired, Failed> {
        let asset = self
            .repository
            .create(asset)
            .await
            .map_err(|e| Failed::new(e, Compensation::discard(provisional)))?;

        let original = match self.store.finalize(provisional, asset.id).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(
                    asset_id = %asset.id,
                    provisional = %provisional,
                    error = %e,
                    "Original could not be renamed, provisional file left orphaned"
                );
                return Err(Failed::new(e, Compensation::delete_record(asset.id)));
            }
        };

        let asset = self
            .repository
            .mark_finalized(asset.id)
            .await
            .map_err(|e| Failed::new(e, Compensation::delete_record_and_original(asset.id)))?;

        tracing::info!(
            asset_id = %asset.id,
            entity = ?asset.wikidata_entity,
            mimetype = %asset.mimetype,
            "Asset finalized"
        );

        let job = DerivativeJob {
            asset_id: asset.id,
            original,
            mimetype: asset.mimetype.clone(),
        };
        let derivatives = match self.queue.submit(job).await {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                tracing::warn!(asset_id = %asset.id, error = %e, "Derivative job not queued");
                None
            }
        };

        Ok(Acquired { asset, derivatives })
    }

    async fn settle(&self, outcome: Result<Acquired, Failed>) -> Result<Acquired, PipelineError> {
        match outcome {
            Ok(acquired) => Ok(acquired),
            Err(failed) => {
                self.compensate(failed.compensation).await;
                Err(failed.error)
            }
        }
    }

    /// Run the undo steps. Only a record that could not be deleted is reported; file
    /// cleanup is advisory and merely logged.
    async fn compensate(&self, compensation: Compensation) -> Option<RollbackFailure> {
        let mut failure = None;

        if let Some(id) = compensation.record {
            match self.repository.delete_one(id).await {
                Ok(true) => tracing::info!(asset_id = %id, "Asset record rolled back"),
                Ok(false) => tracing::warn!(asset_id = %id, "No asset record left to roll back"),
                Err(e) => {
                    tracing::error!(asset_id = %id, error = %e, "Asset record rollback failed");
                    failure = Some(RollbackFailure {
                        asset_id: id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(id) = compensation.original {
            if let Err(e) = self.store.remove_original(id).await {
                tracing::warn!(asset_id = %id, error = %e, "Failed to remove original");
            }
        }

        if let Some(provisional) = compensation.provisional {
            self.discard(&provisional).await;
        }

        failure
    }

    async fn discard(&self, provisional: &ProvisionalName) {
        if let Err(e) = self.store.discard_provisional(provisional).await {
            tracing::warn!(provisional = %provisional, error = %e, "Failed to remove provisional file");
        }
    }
}
