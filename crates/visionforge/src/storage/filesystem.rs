use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::services::{ObjectStorage, ServiceError};

/// Copy `src` to `dst` through a temporary sibling so readers never see a
/// partially written object.
fn copy_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    let tmp = dst.with_extension(format!(
        "{}.part",
        dst.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));

    std::fs::copy(src, &tmp).map_err(|e| StorageError::CopyFile {
        from: src.to_path_buf(),
        to: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, dst).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        StorageError::WriteFile {
            path: dst.to_path_buf(),
            source: e,
        }
    })?;
    Ok(())
}

/// Checks an object key is a plain relative path.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.trim().is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.contains('\\') {
        return Err(invalid("key contains a backslash"));
    }
    let path = Path::new(key);
    if path.is_absolute() {
        return Err(invalid("key is an absolute path"));
    }
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(invalid("key contains path traversal"));
    }
    Ok(())
}

/// Object storage backed by a local directory.
///
/// Objects are copied to `<root>/<key>`. URLs are `<base_url>/<key>`, or a
/// `file://` URL of the stored copy when `base_url` is `file://`.
pub struct LocalObjectStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStorage {
    pub fn new<P: AsRef<Path>>(root: P, base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies `local` under `key`, replacing any existing object.
    pub fn store(&self, local: &Path, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        if !local.is_file() {
            return Err(StorageError::MissingSource(local.to_path_buf()));
        }

        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            self.ensure_directory(parent)?;
        }
        copy_file(local, &dest)?;
        Ok(dest)
    }

    pub fn url_for(&self, key: &str, stored: &Path) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base == "file:" {
            format!("file://{}", stored.display())
        } else {
            format!("{}/{}", base, key)
        }
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

fn to_service_error(err: StorageError) -> ServiceError {
    match err {
        StorageError::InvalidKey { .. } | StorageError::MissingSource(_) => {
            ServiceError::rejected(err.to_string())
        }
        other => ServiceError::unavailable(other.to_string()),
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        local: &Path,
        key: &str,
        _content_type: &str,
    ) -> Result<String, ServiceError> {
        let root = self.root.clone();
        let base_url = self.base_url.clone();
        let local = local.to_path_buf();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let storage = LocalObjectStorage::new(root, base_url);
            let stored = storage.store(&local, &key).map_err(to_service_error)?;
            Ok(storage.url_for(&key, &stored))
        })
        .await
        .map_err(|e| ServiceError::unavailable(format!("upload task failed: {}", e)))?
    }
}
