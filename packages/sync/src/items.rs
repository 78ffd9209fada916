//! Object paths, cache paths and manifest items for candidates.

use std::path::{Path, PathBuf};

use forest_pipelines_fetch::DownloadResult;
use forest_pipelines_manifest_models::{EXTERNAL_DIGEST, ItemKey, ItemKind, ManifestItem};
use forest_pipelines_source_models::{CURRENT_PERIOD, Candidate, Role};

/// Folder name of a period inside `data/`. The current-file sentinel is
/// stored lowercase.
#[must_use]
pub fn period_folder(period_key: &str) -> String {
    if period_key == CURRENT_PERIOD {
        period_key.to_ascii_lowercase()
    } else {
        period_key.to_string()
    }
}

/// Object path of a candidate: `{prefix}/data/{period}/{slot or filename}`
/// for data, `{prefix}/meta/{filename}` for metadata.
#[must_use]
pub fn object_path(bucket_prefix: &str, candidate: &Candidate) -> String {
    let prefix = bucket_prefix.trim_end_matches('/');
    match candidate.role {
        Role::Data => format!(
            "{prefix}/data/{}/{}",
            period_folder(&candidate.period_key),
            candidate.relative_path()
        ),
        Role::Metadata => format!("{prefix}/meta/{}", candidate.filename),
    }
}

/// Local cache file of a candidate under `{data_dir}/{local_dir}`.
#[must_use]
pub fn cache_path(data_dir: &Path, local_dir: &str, candidate: &Candidate) -> PathBuf {
    let dir = data_dir.join(local_dir);
    match candidate.role {
        Role::Data => dir.join(candidate.relative_path()),
        Role::Metadata => dir.join("meta").join(&candidate.filename),
    }
}

/// Manifest item kind of a candidate role.
#[must_use]
pub const fn kind_of(role: Role) -> ItemKind {
    match role {
        Role::Data => ItemKind::Data,
        Role::Metadata => ItemKind::Meta,
    }
}

/// Period of the item a candidate becomes. Metadata items have none.
#[must_use]
pub fn item_period(candidate: &Candidate) -> Option<String> {
    match candidate.role {
        Role::Data => Some(candidate.period_key.clone()),
        Role::Metadata => None,
    }
}

/// Identity the candidate's item will have in the manifest.
#[must_use]
pub fn item_key(candidate: &Candidate) -> ItemKey {
    ItemKey {
        kind: kind_of(candidate.role),
        period: item_period(candidate),
        slot: candidate.slot.clone(),
    }
}

/// Item for a file mirrored into the bucket.
#[must_use]
pub fn mirrored_item(
    candidate: &Candidate,
    download: &DownloadResult,
    storage_path: String,
    public_url: String,
) -> ManifestItem {
    ManifestItem {
        kind: kind_of(candidate.role),
        period: item_period(candidate),
        slot: candidate.slot.clone(),
        title: candidate.title.clone(),
        filename: candidate.filename.clone(),
        sha256: download.sha256.clone(),
        size_bytes: download.size_bytes,
        storage_path: Some(storage_path),
        public_url,
        source_url: candidate.url.clone(),
    }
}

/// Item that only links to the upstream file.
#[must_use]
pub fn external_item(candidate: &Candidate, size_bytes: u64) -> ManifestItem {
    ManifestItem {
        kind: kind_of(candidate.role),
        period: item_period(candidate),
        slot: candidate.slot.clone(),
        title: candidate.title.clone(),
        filename: candidate.filename.clone(),
        sha256: EXTERNAL_DIGEST.to_string(),
        size_bytes,
        storage_path: None,
        public_url: candidate.url.clone(),
        source_url: candidate
            .source_url
            .clone()
            .unwrap_or_else(|| candidate.url.clone()),
    }
}
