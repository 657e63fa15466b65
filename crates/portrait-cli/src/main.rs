//! Portrait CLI: run acquisition workflows and maintenance without the HTTP server.
//!
//! Reads the same environment configuration as the API (`STORAGE_ROOT`,
//! `DATABASE_URL`, ...).

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use portrait_api::services::DirectUploadForm;
use portrait_api::setup;
use portrait_cli::{parse_ids, print_json, wait_for_derivatives, AcquiredSummary, FailureSummary};
use portrait_core::{Config, EntityId, UploadContext};
use serde_json::json;

#[derive(Parser)]
#[command(name = "portrait", about = "Portrait image acquisition CLI")]
struct Cli {
    /// Site the records are stored for
    #[arg(long, global = true, default_value = "localhost")]
    site: String,

    /// Recorded as the creator of new records
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the first Commons image of each entity
    Import {
        /// Entity ids, e.g. `Q42 Q1339` or `Q42,Q1339`
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Fetch an image from a URL for one entity
    UploadUrl {
        url: String,
        /// Entity the image shows
        #[arg(long)]
        entity: String,
        #[arg(long)]
        name: Option<String>,
        /// Date the photo was taken (YYYY-MM-DD)
        #[arg(long)]
        recorded_date: Option<NaiveDate>,
    },
    /// Labels, image claims and stored assets of entities
    Overview {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// An entity and its family relations
    Related { id: String },
    /// Regenerate thumbnails and face crops for every asset of the site
    ReloadThumbnails,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let state = setup::initialize_state(&config).await?;

    let mut ctx = UploadContext::new(cli.site.as_str());
    if let Some(user) = cli.user {
        ctx = ctx.with_user(user);
    }

    let result = run(cli.command, &ctx, &state).await;
    state.queue.shutdown().await;
    result
}

async fn run(
    command: Commands,
    ctx: &UploadContext,
    state: &portrait_api::AppState,
) -> anyhow::Result<()> {
    match command {
        Commands::Import { ids } => {
            let ids = parse_ids(&ids)?;
            let mut report = state.acquisition.import_entities(ctx, &ids).await;

            let imported: Vec<AcquiredSummary> =
                report.imported.iter().map(AcquiredSummary::from).collect();
            let failed: Vec<FailureSummary> = report
                .failed
                .iter()
                .map(|(id, e)| FailureSummary::new(id, e))
                .collect();
            let skipped: Vec<String> = report.skipped.iter().map(ToString::to_string).collect();

            wait_for_derivatives(report.imported.iter_mut().filter_map(|a| a.derivatives.take()))
                .await;
            print_json(&json!({
                "imported": imported,
                "skipped": skipped,
                "failed": failed,
            }))?;
        }
        Commands::UploadUrl {
            url,
            entity,
            name,
            recorded_date,
        } => {
            let form = DirectUploadForm {
                wikidata_entity_id: entity,
                name,
                recorded_date,
            };
            let acquired = state
                .acquisition
                .upload_from_url(ctx, &url, form)
                .await
                .with_context(|| format!("Upload of {} failed", url))?;

            let summary = AcquiredSummary::from(&acquired);
            wait_for_derivatives(acquired.derivatives).await;
            print_json(&summary)?;
        }
        Commands::Overview { ids } => {
            let ids = parse_ids(&ids)?;
            let summaries = state.acquisition.entity_overview(&ids).await?;
            print_json(&summaries)?;
        }
        Commands::Related { id } => {
            let id: EntityId = id.parse()?;
            let related = state.acquisition.related_entities(&id).await?;
            print_json(&related)?;
        }
        Commands::ReloadThumbnails => {
            let report = state.maintenance.reload_thumbnails(&ctx.upload_site).await?;
            print_json(&report)?;
        }
    }

    Ok(())
}
