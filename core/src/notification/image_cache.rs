// Image cache: full-size images for notifications, one file per notification id.

use super::NotificationId;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File names are keyed by notification id, so concurrent writes never share a file.
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(id: NotificationId) -> String {
        format!("{}.png", id)
    }

    fn path_for(&self, id: NotificationId) -> PathBuf {
        self.dir.join(Self::file_name(id))
    }

    pub async fn store(&self, id: NotificationId, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.path_for(id);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?;
        debug!("Cached {} bytes at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Remove the image for `id`. Returns `false` if there was none.
    pub async fn release(&self, id: NotificationId) -> Result<bool, CacheError> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Released {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => {
                warn!("Failed to release {}: {}", path.display(), source);
                Err(CacheError::Io { path, source })
            }
        }
    }
}
