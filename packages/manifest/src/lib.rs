#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Manifest building and publication.
//!
//! [`build_manifest`] assembles the document for one run without touching
//! the network. [`publish`] serializes it with [`to_canonical_json`] and
//! upserts it to `{bucket_prefix}/manifest.json`, so the object at that path
//! is always the dataset's current state.

use chrono::{DateTime, SecondsFormat, Utc};
use forest_pipelines_manifest_models::{
    DatasetIdentity, Manifest, ManifestItem, manifest_path,
};
use forest_pipelines_storage::{BlobStore, StorageError, UploadBody};

/// Content type the manifest is uploaded with.
pub const MANIFEST_CONTENT_TYPE: &str = "application/json";

/// Errors that can occur while encoding or publishing a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// JSON encoding or decoding failed.
    #[error("Manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store rejected the upload or read.
    #[error("Manifest storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Current UTC instant as ISO-8601 with a literal `Z` suffix.
#[must_use]
pub fn now_iso() -> String {
    format_timestamp(Utc::now())
}

/// Formats `at` the way `generated_at` is recorded.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Builds a manifest stamped with the current time.
///
/// Items are kept in the order given.
#[must_use]
pub fn build_manifest(
    identity: &DatasetIdentity,
    items: Vec<ManifestItem>,
    meta: Option<serde_json::Value>,
) -> Manifest {
    build_manifest_at(identity, items, meta, Utc::now())
}

/// Builds a manifest stamped with `at`.
#[must_use]
pub fn build_manifest_at(
    identity: &DatasetIdentity,
    items: Vec<ManifestItem>,
    meta: Option<serde_json::Value>,
    at: DateTime<Utc>,
) -> Manifest {
    Manifest {
        dataset_id: identity.dataset_id.clone(),
        title: identity.title.clone(),
        source_dataset_url: identity.source_dataset_url.clone(),
        generated_at: format_timestamp(at),
        bucket_prefix: identity.bucket_prefix.clone(),
        items,
        meta,
    }
}

/// Encodes a manifest as indented UTF-8 JSON. Non-ASCII characters are
/// written as-is.
///
/// # Errors
///
/// Returns [`ManifestError::Json`] if serialization fails.
pub fn to_canonical_json(manifest: &Manifest) -> Result<Vec<u8>, ManifestError> {
    let mut bytes = serde_json::to_vec_pretty(manifest)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes a manifest previously written by [`to_canonical_json`].
///
/// # Errors
///
/// Returns [`ManifestError::Json`] if the bytes are not a valid manifest.
pub fn from_json(bytes: &[u8]) -> Result<Manifest, ManifestError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Uploads the manifest to `{bucket_prefix}/manifest.json` (upsert) and
/// returns its public URL.
///
/// # Errors
///
/// Returns [`ManifestError`] if encoding or the upload fails.
pub async fn publish(store: &dyn BlobStore, manifest: &Manifest) -> Result<String, ManifestError> {
    let bytes = to_canonical_json(manifest)?;
    republish_bytes(store, &manifest.bucket_prefix, bytes).await
}

/// Uploads already-encoded manifest bytes unchanged. Used to republish a
/// prior manifest byte-for-byte.
///
/// # Errors
///
/// Returns [`ManifestError::Storage`] if the upload fails.
pub async fn republish_bytes(
    store: &dyn BlobStore,
    bucket_prefix: &str,
    bytes: Vec<u8>,
) -> Result<String, ManifestError> {
    let path = manifest_path(bucket_prefix);
    store
        .upload(&path, UploadBody::Bytes(bytes), MANIFEST_CONTENT_TYPE, true)
        .await?;

    let url = store.public_url(&path);
    log::info!("Manifest published: {url}");
    Ok(url)
}

/// A manifest read back from the store together with its raw bytes.
#[derive(Debug, Clone)]
pub struct PublishedManifest {
    /// Decoded document.
    pub manifest: Manifest,
    /// Bytes exactly as stored.
    pub raw: Vec<u8>,
}

/// Reads the manifest currently published under `bucket_prefix`.
///
/// Returns `None` if nothing has been published yet.
///
/// # Errors
///
/// Returns [`ManifestError::Storage`] if the read fails and
/// [`ManifestError::Json`] if the stored object is not a manifest.
pub async fn load_published(
    store: &dyn BlobStore,
    bucket_prefix: &str,
) -> Result<Option<PublishedManifest>, ManifestError> {
    let Some(raw) = store.get(&manifest_path(bucket_prefix)).await? else {
        return Ok(None);
    };
    let manifest = from_json(&raw)?;
    Ok(Some(PublishedManifest { manifest, raw }))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use forest_pipelines_manifest_models::{ItemKind, RunStatus};
    use forest_pipelines_storage::LocalStore;

    use super::*;

    fn identity() -> DatasetIdentity {
        DatasetIdentity {
            dataset_id: "cvm_fi_inf_diario".to_string(),
            title: "Informe Diário de Fundos de Investimento".to_string(),
            source_dataset_url: "https://dados.cvm.gov.br/dataset/fi-doc-inf_diario".to_string(),
            bucket_prefix: "cvm/fi/doc/inf_diario/".to_string(),
        }
    }

    fn item(period: &str, sha: &str) -> ManifestItem {
        ManifestItem {
            kind: ItemKind::Data,
            period: Some(period.to_string()),
            slot: None,
            title: None,
            filename: format!("inf_diario_fi_{}.zip", period.replace('-', "")),
            sha256: sha.to_string(),
            size_bytes: 1000,
            storage_path: Some(format!("cvm/fi/doc/inf_diario/data/{period}/x.zip")),
            public_url: format!("https://cdn.example.com/{period}.zip"),
            source_url: format!("https://dados.cvm.gov.br/{period}.zip"),
        }
    }

    #[test]
    fn generated_at_ends_in_z() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let manifest = build_manifest_at(&identity(), vec![], None, at);
        assert_eq!(manifest.generated_at, "2025-01-02T03:04:05.000000Z");
        assert!(now_iso().ends_with('Z'));
    }

    #[test]
    fn builder_is_deterministic_apart_from_timestamp() {
        let items = vec![item("2024-03", "aa"), item("2024-02", "bb")];
        let meta = Some(serde_json::json!({ "status": "success" }));

        let a = build_manifest_at(
            &identity(),
            items.clone(),
            meta.clone(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );
        let mut b = build_manifest_at(
            &identity(),
            items,
            meta,
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        );
        assert_ne!(a.generated_at, b.generated_at);
        b.generated_at.clone_from(&a.generated_at);
        assert_eq!(a, b);
    }

    #[test]
    fn builder_preserves_item_order() {
        let items = vec![item("2023-01", "a"), item("2024-05", "b"), item("2022-12", "c")];
        let manifest = build_manifest(&identity(), items.clone(), None);
        assert_eq!(manifest.items, items);
    }

    #[test]
    fn json_round_trip_keeps_digests_and_non_ascii() {
        let manifest = build_manifest(
            &identity(),
            vec![item("2024-01", "external"), item("2023-12", "0f3a")],
            Some(serde_json::json!({ "status": RunStatus::Success, "fonte": "Comissão de Valores Mobiliários" })),
        );

        let bytes = to_canonical_json(&manifest).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("Informe Diário"));
        assert!(text.contains("Comissão"));
        assert!(text.contains("\n  \"dataset_id\""));

        let parsed = from_json(&bytes).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.items[0].sha256, "external");
    }

    #[tokio::test]
    async fn publish_is_an_idempotent_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), Some("https://cdn.example.com"));
        let manifest = build_manifest(&identity(), vec![item("2024-01", "aa")], None);

        let url = publish(&store, &manifest).await.unwrap();
        assert_eq!(url, "https://cdn.example.com/cvm/fi/doc/inf_diario/manifest.json");
        publish(&store, &manifest).await.unwrap();

        let loaded = load_published(&store, "cvm/fi/doc/inf_diario")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.manifest, manifest);
        assert_eq!(loaded.raw, to_canonical_json(&manifest).unwrap());
    }

    #[tokio::test]
    async fn load_published_is_none_before_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), None);
        assert!(load_published(&store, "inmet").await.unwrap().is_none());
    }
}
