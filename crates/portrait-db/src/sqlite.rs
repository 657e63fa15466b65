//! SQLite asset repository: CRUD for the assets table.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use portrait_core::{Asset, AssetFilter, AssetSort, AssetState, NewAsset};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::AssetRepository;

const COLUMNS: &str = "id, state, name, source_url, source_name, original_filename, \
     internal_file_name, mimetype, upload_site, wikidata_entity, wikidata_label, \
     recorded_date, created_by, view_count, created_at";

const MAX_CONNECTIONS: u32 = 5;

/// Row type for the assets table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub struct AssetRow {
    pub id: Uuid,
    pub state: String,
    pub name: Option<String>,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
    pub original_filename: Option<String>,
    pub internal_file_name: Option<String>,
    pub mimetype: String,
    pub upload_site: String,
    pub wikidata_entity: Option<i64>,
    pub wikidata_label: Option<String>,
    pub recorded_date: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

impl AssetRow {
    pub fn into_asset(self) -> RepositoryResult<Asset> {
        let state = self
            .state
            .parse::<AssetState>()
            .map_err(RepositoryError::Corrupt)?;
        let wikidata_entity = self
            .wikidata_entity
            .map(|e| {
                u64::try_from(e).map_err(|_| {
                    RepositoryError::Corrupt(format!("negative entity id {} on {}", e, self.id))
                })
            })
            .transpose()?;

        Ok(Asset {
            id: self.id,
            state,
            name: self.name,
            source_url: self.source_url,
            source_name: self.source_name,
            original_filename: self.original_filename,
            internal_file_name: self.internal_file_name,
            mimetype: self.mimetype,
            upload_site: self.upload_site,
            wikidata_entity,
            wikidata_label: self.wikidata_label,
            recorded_date: self.recorded_date,
            created_by: self.created_by,
            view_count: self.view_count,
            created_at: self.created_at,
        })
    }
}

fn entity_to_db(entity: Option<u64>) -> RepositoryResult<Option<i64>> {
    entity
        .map(|e| {
            i64::try_from(e)
                .map_err(|_| RepositoryError::Corrupt(format!("entity id {} out of range", e)))
        })
        .transpose()
}

#[derive(Clone)]
pub struct SqliteAssetRepository {
    pool: SqlitePool,
}

impl SqliteAssetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and apply migrations.
    ///
    /// An in-memory URL gets a single connection that is never recycled, since every
    /// SQLite connection to `:memory:` opens its own database.
    pub async fn connect(url: &str) -> RepositoryResult<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        let pool = options.connect(url).await?;
        let repository = Self::new(pool);
        repository.migrate().await?;

        tracing::info!(in_memory, "Asset database ready");
        Ok(repository)
    }

    pub async fn migrate(&self) -> RepositoryResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AssetRepository for SqliteAssetRepository {
    #[tracing::instrument(skip(self, asset), fields(db.table = "assets", upload_site = %asset.upload_site))]
    async fn create(&self, asset: NewAsset) -> RepositoryResult<Asset> {
        let id = Uuid::new_v4();
        let query = format!(
            r#"
            INSERT INTO assets (id, state, name, source_url, source_name, original_filename,
                internal_file_name, mimetype, upload_site, wikidata_entity, wikidata_label,
                recorded_date, created_by, view_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            RETURNING {COLUMNS}
            "#
        );

        let row: AssetRow = sqlx::query_as::<Sqlite, AssetRow>(&query)
            .bind(id)
            .bind(AssetState::Provisional.as_str())
            .bind(&asset.name)
            .bind(&asset.source_url)
            .bind(&asset.source_name)
            .bind(&asset.original_filename)
            .bind(&asset.internal_file_name)
            .bind(&asset.mimetype)
            .bind(&asset.upload_site)
            .bind(entity_to_db(asset.wikidata_entity)?)
            .bind(&asset.wikidata_label)
            .bind(asset.recorded_date)
            .bind(&asset.created_by)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        tracing::debug!(asset_id = %id, "Asset record created");
        row.into_asset()
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets"))]
    async fn find(
        &self,
        filter: &AssetFilter,
        sort: AssetSort,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<Asset>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM assets WHERE 1 = 1"));

        if let Some(site) = &filter.upload_site {
            qb.push(" AND upload_site = ").push_bind(site.clone());
        }
        if let Some(entity) = entity_to_db(filter.wikidata_entity)? {
            qb.push(" AND wikidata_entity = ").push_bind(entity);
        }
        if let Some(state) = filter.state {
            qb.push(" AND state = ").push_bind(state.as_str());
        }

        qb.push(match sort {
            AssetSort::CreatedAsc => " ORDER BY created_at ASC, rowid ASC",
            AssetSort::CreatedDesc => " ORDER BY created_at DESC, rowid DESC",
            AssetSort::NameAsc => " ORDER BY name ASC, rowid ASC",
        });

        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<AssetRow> = qb.build_query_as::<AssetRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(AssetRow::into_asset).collect()
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Asset>> {
        let row: Option<AssetRow> = sqlx::query_as::<Sqlite, AssetRow>(&format!(
            "SELECT {COLUMNS} FROM assets WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssetRow::into_asset).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.record_id = %id))]
    async fn mark_finalized(&self, id: Uuid) -> RepositoryResult<Asset> {
        let row: Option<AssetRow> = sqlx::query_as::<Sqlite, AssetRow>(&format!(
            "UPDATE assets SET state = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(AssetState::Finalized.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound(id))?.into_asset()
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.record_id = %id))]
    async fn delete_one(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
