//! S3-compatible backend (AWS S3, Cloudflare R2, `MinIO`).

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;

use crate::{BlobStore, StorageError, UploadBody, UploadReceipt, require_env};

/// Client for one bucket of an S3-compatible store.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3Store {
    /// Creates a store from `S3_ENDPOINT_URL`, `S3_ACCESS_KEY_ID`,
    /// `S3_SECRET_ACCESS_KEY`, `S3_BUCKET`, `S3_PUBLIC_BASE_URL` and
    /// `S3_REGION`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] if a required variable is unset.
    pub fn from_env() -> Result<Self, StorageError> {
        let endpoint = require_env("S3_ENDPOINT_URL")?;
        let access_key = require_env("S3_ACCESS_KEY_ID")?;
        let secret_key = require_env("S3_SECRET_ACCESS_KEY")?;
        let bucket = require_env("S3_BUCKET")?;
        let public_base_url = require_env("S3_PUBLIC_BASE_URL")?;
        let region = require_env("S3_REGION").unwrap_or_else(|_| "auto".to_string());

        let creds = Credentials::new(&access_key, &secret_key, None, None, "forest-env");

        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(&endpoint)
            .region(Region::new(region))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for S3Store {
    fn backend(&self) -> &str {
        "s3"
    }

    async fn upload(
        &self,
        object_path: &str,
        body: UploadBody,
        content_type: &str,
        upsert: bool,
    ) -> Result<UploadReceipt, StorageError> {
        let key = object_path.trim_start_matches('/');
        let size_bytes = body.len().await?;

        let stream = match body {
            UploadBody::Bytes(bytes) => ByteStream::from(bytes),
            UploadBody::File(path) => {
                ByteStream::from_path(&path)
                    .await
                    .map_err(|e| StorageError::Upload {
                        key: key.to_string(),
                        source: Box::new(e),
                    })?
            }
        };

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(stream)
            .content_type(content_type);

        if !upsert {
            request = request.if_none_match("*");
        }

        request.send().await.map_err(|e| {
            if e.raw_response()
                .is_some_and(|r| r.status().as_u16() == 412)
            {
                StorageError::Conflict {
                    key: key.to_string(),
                }
            } else {
                StorageError::Upload {
                    key: key.to_string(),
                    source: Box::new(e),
                }
            }
        })?;

        log::debug!("Uploaded s3://{}/{key}", self.bucket);

        Ok(UploadReceipt {
            object_path: key.to_string(),
            size_bytes,
        })
    }

    fn public_url(&self, object_path: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url,
            object_path.trim_start_matches('/')
        )
    }

    async fn get(&self, object_path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = object_path.trim_start_matches('/');
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetObjectError::is_no_such_key)
                {
                    return Ok(None);
                }
                return Err(StorageError::Download {
                    key: key.to_string(),
                    source: Box::new(err),
                });
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Download {
                key: key.to_string(),
                source: Box::new(e),
            })?;

        Ok(Some(bytes.into_bytes().to_vec()))
    }
}
