#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Object storage for published dataset files and manifests.
//!
//! Every backend implements [`BlobStore`]: an upsert-capable upload, a
//! deterministic public URL, and a read used to fetch previously published
//! manifests.
//!
//! # Environment Variables
//!
//! | Variable | Backend | Description |
//! |---|---|---|
//! | `FOREST_STORAGE_BACKEND` | all | `supabase` (default), `s3` or `local` |
//! | `SUPABASE_URL` | supabase | Project URL |
//! | `SUPABASE_SERVICE_ROLE_KEY` | supabase | Service role key |
//! | `SUPABASE_BUCKET_OPEN_DATA` | supabase | Bucket name (default `open-data`) |
//! | `S3_ENDPOINT_URL` | s3 | S3-compatible endpoint |
//! | `S3_ACCESS_KEY_ID` / `S3_SECRET_ACCESS_KEY` | s3 | Credentials |
//! | `S3_BUCKET` | s3 | Bucket name |
//! | `S3_PUBLIC_BASE_URL` | s3 | Base URL objects are publicly served from |
//! | `S3_REGION` | s3 | Region (default `auto`) |
//! | `FOREST_LOCAL_STORE_DIR` | local | Root directory (default `data/store`) |
//! | `FOREST_LOCAL_PUBLIC_BASE_URL` | local | Public base URL (default `file://{dir}`) |

pub mod local;
pub mod s3;
pub mod supabase;

use std::path::PathBuf;

use async_trait::async_trait;
use strum_macros::{AsRefStr, Display, EnumString};

pub use local::LocalStore;
pub use s3::S3Store;
pub use supabase::SupabaseStore;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// Unrecognised `FOREST_STORAGE_BACKEND` value.
    #[error("Unknown storage backend: {value}")]
    UnknownBackend {
        /// The rejected value.
        value: String,
    },

    /// Upload request could not be sent or completed.
    #[error("Failed to upload {key}: {source}")]
    Upload {
        /// Object path.
        key: String,
        /// Underlying client error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Read request could not be sent or completed.
    #[error("Failed to download {key}: {source}")]
    Download {
        /// Object path.
        key: String,
        /// Underlying client error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend answered with a non-success status.
    #[error("Storage returned HTTP {status} for {key}: {body}")]
    Status {
        /// Object path.
        key: String,
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// Object exists and the upload did not ask for an upsert.
    #[error("Object {key} already exists")]
    Conflict {
        /// Object path.
        key: String,
    },

    /// I/O error reading or writing local files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload of an upload: in-memory bytes or a local file streamed from disk.
#[derive(Debug, Clone)]
pub enum UploadBody {
    /// Bytes already in memory (manifests).
    Bytes(Vec<u8>),
    /// A downloaded file.
    File(PathBuf),
}

impl UploadBody {
    /// Byte length of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if a file payload cannot be stat'ed.
    pub async fn len(&self) -> Result<u64, StorageError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.len() as u64),
            Self::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Object path written.
    pub object_path: String,
    /// Bytes written.
    pub size_bytes: u64,
}

/// An object store datasets are published to.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend label used in log messages (e.g. `"supabase"`).
    fn backend(&self) -> &str;

    /// Uploads `body` to `object_path`.
    ///
    /// With `upsert = true` an existing object is overwritten; otherwise an
    /// existing object is an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the upload fails.
    async fn upload(
        &self,
        object_path: &str,
        body: UploadBody,
        content_type: &str,
        upsert: bool,
    ) -> Result<UploadReceipt, StorageError>;

    /// Public URL of `object_path`. Computed locally, no round trip.
    fn public_url(&self, object_path: &str) -> String;

    /// Reads an object, returning `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on any failure other than "not found".
    async fn get(&self, object_path: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Storage backends selectable through `FOREST_STORAGE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StorageBackend {
    /// Supabase Storage REST API.
    Supabase,
    /// Any S3-compatible object store.
    S3,
    /// A local directory.
    Local,
}

/// Builds the configured store from environment variables.
///
/// # Errors
///
/// Returns [`StorageError::UnknownBackend`] for an unrecognised backend and
/// [`StorageError::MissingEnv`] if a required variable is unset.
pub fn from_env() -> Result<Box<dyn BlobStore>, StorageError> {
    let backend = match std::env::var("FOREST_STORAGE_BACKEND") {
        Ok(value) => value
            .trim()
            .parse::<StorageBackend>()
            .map_err(|_| StorageError::UnknownBackend { value })?,
        Err(_) => StorageBackend::Supabase,
    };

    log::debug!("Using {backend} storage backend");

    Ok(match backend {
        StorageBackend::Supabase => Box::new(SupabaseStore::from_env()?),
        StorageBackend::S3 => Box::new(S3Store::from_env()?),
        StorageBackend::Local => Box::new(LocalStore::from_env()?),
    })
}

/// Content type for an uploaded file, chosen by extension.
#[must_use]
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "zip" => "application/zip",
        "csv" => "text/csv; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "tif" | "tiff" => "image/tiff",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Reads a required environment variable.
pub(crate) fn require_env(name: &str) -> Result<String, StorageError> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StorageError::MissingEnv {
            name: name.to_string(),
        })
}
