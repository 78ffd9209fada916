#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dataset definitions and resource discovery.
//!
//! Each dataset is described by an embedded TOML file (see [`registry`])
//! naming the [`ResourceLister`] that knows how to scrape its listing page.
//! Listers return [`Candidate`]s; the [`selection`] policy then picks the
//! ones to sync this run.

pub mod ckan;
pub mod dataset_def;
pub mod directory_index;
pub mod eia_release_table;
pub mod eia_series_select;
pub mod eia_series_table;
pub mod html;
pub mod period;
pub mod registry;
pub mod report;
pub mod selection;

use async_trait::async_trait;
use forest_pipelines_fetch::{FetchError, Fetcher};
use forest_pipelines_source_models::{Candidate, ListingResult};

pub use dataset_def::{DatasetConfig, DatasetDefinition, ListerConfig, Recency};
pub use report::{Phase, Reporter};

/// Errors in dataset configuration. Raised before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No dataset with this id is registered.
    #[error("Unknown dataset: {id}")]
    UnknownDataset {
        /// Requested id.
        id: String,
    },

    /// None of `source_dataset_url`, `source_url` or `dataset_slug` is set.
    #[error("{id}: set 'source_dataset_url', 'source_url' or 'dataset_slug'")]
    MissingSourceUrl {
        /// Dataset id.
        id: String,
    },

    /// `bucket_prefix` is missing or empty.
    #[error("{id}: missing 'bucket_prefix'")]
    MissingBucketPrefix {
        /// Dataset id.
        id: String,
    },

    /// The definition is not valid TOML or has the wrong shape.
    #[error("Failed to parse {name}.toml: {source}")]
    Toml {
        /// Registry entry name.
        name: String,
        /// Parser error.
        source: toml::de::Error,
    },

    /// A file-name pattern does not compile or lacks a required group.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The lister table is inconsistent (e.g. nothing identifies data files).
    #[error("{id}: invalid lister config: {reason}")]
    InvalidLister {
        /// Dataset id.
        id: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors while scraping a listing page. Always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    /// The page could not be fetched.
    #[error("Listing fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The page no longer has the structure the lister expects.
    #[error("Structural drift at {url}: expected {expected}")]
    StructuralDrift {
        /// Listing page URL.
        url: String,
        /// What was looked for.
        expected: String,
    },

    /// A CSS selector or URL could not be parsed.
    #[error("Invalid selector or URL '{pattern}': {message}")]
    Pattern {
        /// The selector or URL.
        pattern: String,
        /// Parser message.
        message: String,
    },
}

/// Scrapes one kind of listing page into candidates.
///
/// Implementations are chosen from a dataset's `[lister]` table by
/// [`dataset_def::build_lister`].
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// Lister kind, as written in the `type` key of the `[lister]` table.
    fn kind(&self) -> &'static str;

    /// Fetches `page_url` (and any sub-pages) and returns what was found.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError`] if the page cannot be fetched or no longer
    /// matches the expected structure.
    async fn list(
        &self,
        page_url: &str,
        fetcher: &Fetcher,
        reporter: &Reporter,
    ) -> Result<ListingResult, ListingError>;
}

/// Keeps the first candidate per identity, preserving order.
#[must_use]
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::BTreeSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.key()))
        .collect()
}
