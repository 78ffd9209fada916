#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Manifest document types.
//!
//! A [`Manifest`] describes the currently published set of files for one
//! dataset. It is serialized to `{bucket_prefix}/manifest.json` and
//! overwritten on every run, so downstream consumers can diff successive
//! versions of the same document.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Digest sentinel recorded for items that link to the upstream source
/// without being mirrored into the bucket.
pub const EXTERNAL_DIGEST: &str = "external";

/// File name of the manifest object under a dataset's bucket prefix.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Whether an item is a dataset payload or a data dictionary.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemKind {
    /// A data file (one period of the dataset).
    Data,
    /// A metadata file (field dictionary, layout description).
    Meta,
}

/// Outcome of a run, recorded under `meta.status`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// Every selected data resource was published.
    Success,
    /// At least one selected data resource failed and was left out.
    PartialSuccess,
}

impl RunStatus {
    /// Derives the status from the number of published vs discovered
    /// data resources.
    #[must_use]
    pub const fn from_counts(published: usize, discovered: usize) -> Self {
        if published < discovered {
            Self::PartialSuccess
        } else {
            Self::Success
        }
    }
}

/// Identity fields shared by every manifest of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetIdentity {
    /// Stable dataset identifier (e.g. `"cvm_fi_inf_diario"`).
    pub dataset_id: String,
    /// Human-readable title.
    pub title: String,
    /// Landing page the resources were discovered on.
    pub source_dataset_url: String,
    /// Root path of the dataset inside the bucket.
    pub bucket_prefix: String,
}

impl DatasetIdentity {
    /// Object path of this dataset's manifest.
    #[must_use]
    pub fn manifest_path(&self) -> String {
        manifest_path(&self.bucket_prefix)
    }
}

/// Builds `{bucket_prefix}/manifest.json`, trimming trailing slashes from
/// the prefix first.
#[must_use]
pub fn manifest_path(bucket_prefix: &str) -> String {
    format!("{}/{MANIFEST_FILENAME}", bucket_prefix.trim_end_matches('/'))
}

/// One published resource.
///
/// Items are immutable once placed in a manifest. A later run produces a
/// new item with the same identity rather than editing this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    /// Data file or metadata file.
    pub kind: ItemKind,
    /// Period key (`YYYY`, `YYYY-MM`, `YYYY-MM-DD` or `Atual`). Absent on
    /// metadata items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Sub-key for sources that publish several files per period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Display title supplied by the listing page, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Last path segment of the published file.
    pub filename: String,
    /// Hex SHA-256 of the mirrored bytes, or [`EXTERNAL_DIGEST`].
    pub sha256: String,
    /// Byte length (measured while streaming, or probed for external items).
    pub size_bytes: u64,
    /// Object path inside the bucket. Absent for external items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    /// Where consumers download the file from.
    pub public_url: String,
    /// Where the file was found upstream.
    pub source_url: String,
}

impl ManifestItem {
    /// Returns `true` if the item only links to the upstream source.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.storage_path.is_none() || self.sha256 == EXTERNAL_DIGEST
    }

    /// Identity used to match items across runs.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            kind: self.kind,
            period: self.period.clone(),
            slot: self.slot.clone(),
        }
    }
}

/// `(kind, period, slot)` identity of a manifest item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    /// Item kind.
    pub kind: ItemKind,
    /// Period key, if any.
    pub period: Option<String>,
    /// Per-period slot, if any.
    pub slot: Option<String>,
}

/// The unit of publication: one dataset's current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Stable dataset identifier.
    pub dataset_id: String,
    /// Human-readable title.
    pub title: String,
    /// Landing page the resources were discovered on.
    pub source_dataset_url: String,
    /// Build time, ISO-8601 UTC with a literal `Z` suffix.
    pub generated_at: String,
    /// Root path of the dataset inside the bucket.
    pub bucket_prefix: String,
    /// Published items, recency-first.
    pub items: Vec<ManifestItem>,
    /// Free-form dataset metadata (status, counts, upstream release dates).
    pub meta: Option<serde_json::Value>,
}

impl Manifest {
    /// Identity fields of this manifest.
    #[must_use]
    pub fn identity(&self) -> DatasetIdentity {
        DatasetIdentity {
            dataset_id: self.dataset_id.clone(),
            title: self.title.clone(),
            source_dataset_url: self.source_dataset_url.clone(),
            bucket_prefix: self.bucket_prefix.clone(),
        }
    }

    /// Object path this manifest is published to.
    #[must_use]
    pub fn manifest_path(&self) -> String {
        manifest_path(&self.bucket_prefix)
    }

    /// Iterates over the data items only.
    pub fn data_items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter().filter(|i| i.kind == ItemKind::Data)
    }

    /// `meta.status`, if present and recognised.
    #[must_use]
    pub fn status(&self) -> Option<RunStatus> {
        self.meta
            .as_ref()?
            .get("status")?
            .as_str()?
            .parse()
            .ok()
    }
}
