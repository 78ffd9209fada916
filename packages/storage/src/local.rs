//! Local directory backend, used for dry runs and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{BlobStore, StorageError, UploadBody, UploadReceipt};

/// Directory used when `FOREST_LOCAL_STORE_DIR` is unset.
pub const DEFAULT_DIR: &str = "data/store";

/// A bucket backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    /// Creates a store rooted at `root`. Public URLs default to `file://`
    /// links into the directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<&str>) -> Self {
        let root = root.into();
        let public_base_url = public_base_url.map_or_else(
            || format!("file://{}", root.display()),
            |url| url.trim_end_matches('/').to_string(),
        );
        Self {
            root,
            public_base_url,
        }
    }

    /// Creates a store from `FOREST_LOCAL_STORE_DIR` and
    /// `FOREST_LOCAL_PUBLIC_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Infallible today; kept fallible to match the other backends.
    pub fn from_env() -> Result<Self, StorageError> {
        let root = std::env::var("FOREST_LOCAL_STORE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIR.to_string());
        let public = std::env::var("FOREST_LOCAL_PUBLIC_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let store = Self::new(root, public.as_deref());
        log::debug!("Local store rooted at {}", store.root().display());
        Ok(store)
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path an object lives at.
    #[must_use]
    pub fn object_file(&self, object_path: &str) -> PathBuf {
        self.root.join(object_path.trim_start_matches('/'))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    fn backend(&self) -> &str {
        "local"
    }

    async fn upload(
        &self,
        object_path: &str,
        body: UploadBody,
        _content_type: &str,
        upsert: bool,
    ) -> Result<UploadReceipt, StorageError> {
        let dest = self.object_file(object_path);

        if !upsert && tokio::fs::try_exists(&dest).await? {
            return Err(StorageError::Conflict {
                key: object_path.to_string(),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let size_bytes = match body {
            UploadBody::Bytes(bytes) => {
                tokio::fs::write(&dest, &bytes).await?;
                bytes.len() as u64
            }
            UploadBody::File(path) => tokio::fs::copy(&path, &dest).await?,
        };

        log::debug!("Stored {object_path} at {}", dest.display());

        Ok(UploadReceipt {
            object_path: object_path.to_string(),
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
        match tokio::fs::read(self.object_file(object_path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
