//! The manifest `meta` object.

use forest_pipelines_manifest_models::RunStatus;
use serde::Serialize;
use serde_json::{Map, Value};

/// A resource that was discovered but not published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedResource {
    /// Period of the resource, if it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Download URL or the page that could not be resolved.
    pub source_url: String,
    /// What went wrong.
    pub error: String,
}

/// Counts of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunCounts {
    /// Data items published.
    pub published: usize,
    /// Data resources attempted.
    pub discovered: usize,
}

impl RunCounts {
    /// Status implied by the counts.
    #[must_use]
    pub const fn status(self) -> RunStatus {
        RunStatus::from_counts(self.published, self.discovered)
    }
}

/// Builds the meta object.
///
/// Static dataset facts come first, then page facts from the lister; the
/// run fields (`status`, `total_items`, `discovered`, `failed`) always win.
#[must_use]
pub fn build_meta(
    counts: RunCounts,
    failed: &[FailedResource],
    listing_meta: &Map<String, Value>,
    static_meta: &Map<String, Value>,
) -> Value {
    let mut meta = static_meta.clone();
    meta.extend(listing_meta.iter().map(|(k, v)| (k.clone(), v.clone())));

    meta.insert("status".to_string(), Value::String(counts.status().to_string()));
    meta.insert("total_items".to_string(), Value::from(counts.published));
    meta.insert("discovered".to_string(), Value::from(counts.discovered));
    if failed.is_empty() {
        meta.remove("failed");
    } else {
        meta.insert(
            "failed".to_string(),
            serde_json::to_value(failed).unwrap_or(Value::Null),
        );
    }

    Value::Object(meta)
}
