use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::{PersistenceSink, SessionSnapshot};
use crate::error::AppError;

/// Writes each snapshot as pretty JSON to `<dir>/session-<id>.json`.
pub struct JsonFileSink {
    directory: PathBuf,
}

impl JsonFileSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, snapshot: &SessionSnapshot) -> PathBuf {
        self.directory.join(format!("session-{}.json", snapshot.id))
    }
}

#[async_trait]
impl PersistenceSink for JsonFileSink {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<PathBuf, AppError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(snapshot);
        let body = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&path, body).await?;
        info!("Saved session {} to {}", snapshot.id, path.display());
        Ok(path)
    }
}
