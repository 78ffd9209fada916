#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dataset sync jobs.
//!
//! A job scrapes a dataset's listing page, selects the most recent periods,
//! streams each selected file to the local cache while hashing it, uploads
//! it to the blob store and finally publishes a manifest describing what
//! was published.
//!
//! Configuration, listing and manifest-publish failures abort the job
//! ([`SyncError`]). A failure to fetch or upload a single resource is a
//! [`ResourceError`]: it is logged, recorded in the manifest `meta` object
//! and the job carries on, reporting `partial_success`.

pub mod incremental;
pub mod items;
pub mod job;
pub mod meta;

use std::path::PathBuf;

use forest_pipelines_fetch::{FetchError, Fetcher, RetryPolicy};
use forest_pipelines_manifest::ManifestError;
use forest_pipelines_source::{ConfigError, DatasetConfig, ListingError, Phase, registry};
use forest_pipelines_storage::{BlobStore, StorageError};

pub use job::{RunOutcome, run};
pub use meta::FailedResource;

/// Cache directory used when `FOREST_DATA_DIR` is unset.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Errors that abort a job. No manifest is published.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The dataset definition is invalid or unknown.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listing page could not be fetched or parsed.
    #[error(transparent)]
    Listing(ListingError),

    /// The listing page no longer has the expected structure, or yielded
    /// no data files at all.
    #[error("Structural drift at {url}: expected {expected}")]
    StructuralDrift {
        /// Listing page URL.
        url: String,
        /// What was looked for.
        expected: String,
    },

    /// The manifest could not be published.
    #[error("Failed to publish manifest: {0}")]
    Publish(#[from] ManifestError),

    /// The storage backend could not be configured.
    #[error("Storage backend: {0}")]
    Storage(#[from] StorageError),

    /// The HTTP client could not be built.
    #[error("HTTP client: {0}")]
    Client(#[from] FetchError),
}

impl From<ListingError> for SyncError {
    fn from(e: ListingError) -> Self {
        match e {
            ListingError::StructuralDrift { url, expected } => {
                Self::StructuralDrift { url, expected }
            }
            other => Self::Listing(other),
        }
    }
}

/// A failure confined to one resource. Never aborts the job.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Download failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Upload failed.
    #[error("upload failed: {0}")]
    Upload(#[from] StorageError),
}

impl ResourceError {
    /// Phase the failure happened in.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Fetch(_) => Phase::Fetch,
            Self::Upload(_) => Phase::Upload,
        }
    }
}

/// Everything a job needs besides its dataset config.
pub struct SyncContext {
    /// Where files and manifests are published.
    pub store: Box<dyn BlobStore>,
    /// HTTP client shared by listers, downloads and probes.
    pub fetcher: Fetcher,
    /// Local cache root for downloaded files.
    pub data_dir: PathBuf,
}

impl SyncContext {
    /// Creates a context.
    #[must_use]
    pub fn new(store: Box<dyn BlobStore>, fetcher: Fetcher, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            fetcher,
            data_dir: data_dir.into(),
        }
    }

    /// Creates a context from the environment: the storage backend named by
    /// `FOREST_STORAGE_BACKEND`, the default retry policy and the cache dir
    /// `FOREST_DATA_DIR`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the backend is misconfigured and
    /// [`SyncError::Client`] if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, SyncError> {
        let store = forest_pipelines_storage::from_env()?;
        let fetcher = Fetcher::new(RetryPolicy::default())?;
        let data_dir = std::env::var("FOREST_DATA_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        log::debug!(
            "Sync context: {} storage, {} attempts per request, cache in {data_dir}",
            store.backend(),
            fetcher.policy().max_attempts
        );
        Ok(Self::new(store, fetcher, data_dir))
    }
}

/// Resolves the datasets to run.
///
/// `filter` is a comma-separated list of dataset ids; `None` selects every
/// registered dataset in registry order.
///
/// # Errors
///
/// Returns [`ConfigError`] if an id is unknown or a definition is invalid.
pub fn enabled_datasets(filter: Option<&str>) -> Result<Vec<DatasetConfig>, ConfigError> {
    let ids: Vec<String> = filter.map_or_else(
        || registry::ids().into_iter().map(ToString::to_string).collect(),
        |list| {
            list.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
                .collect()
        },
    );

    ids.iter().map(|id| registry::find(id)).collect()
}

/// Looks up `dataset_id` and runs its job.
///
/// # Errors
///
/// Returns [`SyncError`] if the dataset is unknown or the job aborts.
pub async fn sync_dataset(
    ctx: &SyncContext,
    dataset_id: &str,
    latest: Option<usize>,
) -> Result<RunOutcome, SyncError> {
    let config = registry::find(dataset_id)?;
    run(ctx, &config, latest).await
}
