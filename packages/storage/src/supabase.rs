//! Supabase Storage backend over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};

use crate::{BlobStore, StorageError, UploadBody, UploadReceipt, require_env};

/// Bucket used when `SUPABASE_BUCKET_OPEN_DATA` is unset.
pub const DEFAULT_BUCKET: &str = "open-data";

/// Upload timeout. Large archives can take minutes.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

/// Client for one Supabase Storage bucket.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    service_role_key: String,
    bucket: String,
}

impl SupabaseStore {
    /// Creates a store for `bucket` on the project at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Upload`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        service_role_key: &str,
        bucket: &str,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Upload {
                key: String::new(),
                source: Box::new(e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    /// Creates a store from `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY` and
    /// `SUPABASE_BUCKET_OPEN_DATA`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] if the URL or key is unset.
    pub fn from_env() -> Result<Self, StorageError> {
        let url = require_env("SUPABASE_URL")?;
        let key = require_env("SUPABASE_SERVICE_ROLE_KEY")?;
        let bucket = require_env("SUPABASE_BUCKET_OPEN_DATA")
            .unwrap_or_else(|_| DEFAULT_BUCKET.to_string());

        Self::new(&url, &key, &bucket)
    }

    fn object_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            object_path.trim_start_matches('/')
        )
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Bearer {}", self.service_role_key))
            .header("apikey", &self.service_role_key)
    }
}

#[async_trait]
impl BlobStore for SupabaseStore {
    fn backend(&self) -> &str {
        "supabase"
    }

    async fn upload(
        &self,
        object_path: &str,
        body: UploadBody,
        content_type: &str,
        upsert: bool,
    ) -> Result<UploadReceipt, StorageError> {
        let size_bytes = body.len().await?;
        let payload = match body {
            UploadBody::Bytes(bytes) => reqwest::Body::from(bytes),
            UploadBody::File(path) => reqwest::Body::from(tokio::fs::File::open(&path).await?),
        };

        let request = self
            .authed(self.client.post(self.object_url(object_path)))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, size_bytes)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(payload);

        let resp = request.send().await.map_err(|e| StorageError::Upload {
            key: object_path.to_string(),
            source: Box::new(e),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::CONFLICT || body.contains("Duplicate") {
                return Err(StorageError::Conflict {
                    key: object_path.to_string(),
                });
            }
            return Err(StorageError::Status {
                key: object_path.to_string(),
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        log::debug!("Uploaded {object_path} to supabase bucket {}", self.bucket);

        Ok(UploadReceipt {
            object_path: object_path.to_string(),
            size_bytes,
        })
    }

    fn public_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            object_path.trim_start_matches('/')
        )
    }

    async fn get(&self, object_path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let resp = self
            .authed(self.client.get(self.object_url(object_path)))
            .send()
            .await
            .map_err(|e| StorageError::Download {
                key: object_path.to_string(),
                source: Box::new(e),
            })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // Missing objects come back as 400 with a not_found error code.
            if status == StatusCode::BAD_REQUEST
                && (body.contains("not_found") || body.contains("Object not found"))
            {
                return Ok(None);
            }
            return Err(StorageError::Status {
                key: object_path.to_string(),
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| StorageError::Download {
            key: object_path.to_string(),
            source: Box::new(e),
        })?;

        Ok(Some(bytes.to_vec()))
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}
