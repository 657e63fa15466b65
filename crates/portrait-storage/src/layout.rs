use std::path::{Path, PathBuf};

use portrait_core::constants::{FACECROPS_DIR, ORIGINALS_DIR, THUMBNAILS_DIR};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::naming::{generate_provisional_name, ProvisionalName};

/// Target directories for the two derivative kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeRoots {
    pub thumbnails: PathBuf,
    pub facecrops: PathBuf,
}

impl DerivativeRoots {
    pub fn thumbnail_path(&self, id: Uuid) -> PathBuf {
        self.thumbnails.join(id.to_string())
    }

    pub fn facecrop_path(&self, id: Uuid) -> PathBuf {
        self.facecrops.join(id.to_string())
    }
}

/// Local filesystem store for originals, thumbnails and face crops.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
    originals: PathBuf,
    roots: DerivativeRoots,
}

impl AssetStore {
    /// Create the store, making sure all three directories exist.
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        let originals = root.join(ORIGINALS_DIR);
        let roots = DerivativeRoots {
            thumbnails: root.join(THUMBNAILS_DIR),
            facecrops: root.join(FACECROPS_DIR),
        };

        for dir in [&originals, &roots.thumbnails, &roots.facecrops] {
            fs::create_dir_all(dir).await.map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        tracing::info!(root = %root.display(), "Asset store ready");

        Ok(AssetStore {
            root,
            originals,
            roots,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn derivative_roots(&self) -> &DerivativeRoots {
        &self.roots
    }

    pub fn original_path(&self, id: Uuid) -> PathBuf {
        self.originals.join(id.to_string())
    }

    pub fn thumbnail_path(&self, id: Uuid) -> PathBuf {
        self.roots.thumbnail_path(id)
    }

    pub fn facecrop_path(&self, id: Uuid) -> PathBuf {
        self.roots.facecrop_path(id)
    }

    pub fn provisional_path(&self, name: &ProvisionalName) -> PathBuf {
        self.originals.join(name.as_str())
    }

    /// Write bytes that arrived with a request under a fresh provisional name.
    ///
    /// The file is opened with `create_new`, so a name collision fails instead of
    /// overwriting; another name is drawn in that case.
    pub async fn write_provisional(&self, data: &[u8]) -> StorageResult<ProvisionalName> {
        let start = std::time::Instant::now();
        let (name, mut file) = loop {
            let name = generate_provisional_name();
            let path = self.provisional_path(&name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (name, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::warn!(path = %path.display(), "Provisional name collision, retrying");
                }
                Err(e) => {
                    return Err(StorageError::WriteFailed(format!(
                        "Failed to create file {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        };

        file.write_all(data).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to write provisional file {}: {}", name, e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to sync provisional file {}: {}", name, e))
        })?;

        tracing::debug!(
            provisional = %name,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Provisional original written"
        );

        Ok(name)
    }

    /// Atomically move `originals/{provisional}` to `originals/{id}`.
    #[tracing::instrument(skip(self), fields(provisional = %provisional, asset_id = %id))]
    pub async fn finalize(&self, provisional: &ProvisionalName, id: Uuid) -> StorageResult<PathBuf> {
        let from = self.provisional_path(provisional);
        let to = self.original_path(id);

        let rename_error = |reason: String| StorageError::Rename {
            from: from.display().to_string(),
            to: to.display().to_string(),
            reason,
        };

        if !fs::try_exists(&from).await.unwrap_or(false) {
            return Err(rename_error("provisional file is missing".to_string()));
        }

        fs::rename(&from, &to)
            .await
            .map_err(|e| rename_error(e.to_string()))?;

        tracing::info!(path = %to.display(), "Original finalized");
        Ok(to)
    }

    /// Remove a provisional file if it is still there. Returns whether a file was removed.
    pub async fn discard_provisional(&self, provisional: &ProvisionalName) -> StorageResult<bool> {
        let path = self.provisional_path(provisional);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Provisional file discarded");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    /// Remove `originals/{id}`. Used when the record it belonged to is rolled back.
    pub async fn remove_original(&self, id: Uuid) -> StorageResult<bool> {
        let path = self.original_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Original removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    pub async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}
