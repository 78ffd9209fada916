#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the dataset sync jobs.

use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use forest_pipelines_source::registry;
use forest_pipelines_storage::from_env as store_from_env;
use forest_pipelines_sync::{RunOutcome, SyncContext, enabled_datasets, sync_dataset};

#[derive(Parser)]
#[command(
    name = "forest_pipelines_sync",
    about = "Mirror public open-data releases into object storage"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one dataset and publish its manifest
    Sync {
        /// Dataset identifier (e.g., "`cvm_fi_inf_diario`")
        dataset: String,
        /// Number of most recent periods to keep, in the dataset's own unit
        /// (months or years). Overrides the dataset default.
        #[arg(long)]
        latest: Option<usize>,
    },
    /// Sync every registered dataset, one after another
    SyncAll {
        /// Comma-separated list of dataset IDs to sync (overrides `FOREST_DATASETS`)
        #[arg(long, env = "FOREST_DATASETS")]
        datasets: Option<String>,
        /// Number of most recent periods to keep for every dataset
        #[arg(long)]
        latest: Option<usize>,
    },
    /// List all registered datasets
    Datasets,
    /// Print the public manifest URL of a dataset
    ManifestUrl {
        /// Dataset identifier
        dataset: String,
    },
}

fn init_logging() {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();
}

fn summarize(outcome: &RunOutcome) {
    log::info!(
        "{}: {} ({}/{} data files{}) -> {}",
        outcome.manifest.dataset_id,
        outcome.status(),
        outcome.published,
        outcome.discovered,
        if outcome.republished { ", unchanged" } else { "" },
        outcome.manifest_url,
    );
    for failed in &outcome.failed {
        log::warn!(
            "  not published: {} ({})",
            failed.source_url,
            failed.error
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Datasets => {
            println!("{:<28} {:<18} {:<10} PREFIX", "ID", "LISTER", "DEFAULT");
            println!("{}", "-".repeat(90));
            for id in registry::ids() {
                let config = registry::find(id)?;
                println!(
                    "{:<28} {:<18} {:<10} {}",
                    config.id,
                    config.lister.kind(),
                    config.recency.to_string(),
                    config.bucket_prefix
                );
            }
        }
        Commands::ManifestUrl { dataset } => {
            let config = registry::find(&dataset)?;
            let store = store_from_env()?;
            println!("{}", store.public_url(&config.identity().manifest_path()));
        }
        Commands::Sync { dataset, latest } => {
            let ctx = SyncContext::from_env()?;
            let start = Instant::now();
            let outcome = sync_dataset(&ctx, &dataset, latest).await?;
            summarize(&outcome);
            log::info!("Done in {:.1}s", start.elapsed().as_secs_f64());
        }
        Commands::SyncAll { datasets, latest } => {
            let configs = enabled_datasets(datasets.as_deref())?;
            let ctx = SyncContext::from_env()?;
            log::info!(
                "Syncing {} dataset(s): {}",
                configs.len(),
                configs
                    .iter()
                    .map(|c| c.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let start = Instant::now();
            let mut failures = 0usize;
            for config in &configs {
                match forest_pipelines_sync::run(&ctx, config, latest).await {
                    Ok(outcome) => summarize(&outcome),
                    Err(e) => {
                        failures += 1;
                        log::error!("Failed to sync {}: {e}", config.id);
                    }
                }
            }

            log::info!(
                "{} of {} dataset(s) synced in {:.1}s",
                configs.len() - failures,
                configs.len(),
                start.elapsed().as_secs_f64()
            );
            if failures > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
