//! Single-slot JSON publication of the latest response, with atomic writes.

use std::{
    io,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use {tokio::fs, tracing::debug};

use crate::{Result, response::AggregatedResponse};

/// File name of the published document inside the temp root.
pub const RESPONSE_FILE_NAME: &str = "respuestas.json";

/// Latest-value slot for [`AggregatedResponse`] documents.
///
/// Readers always see either the previous complete document or the new one.
pub struct Publisher {
    path: PathBuf,
}

impl Publisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Publisher for `dir/respuestas.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(RESPONSE_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Atomic write: write to a sibling temp file, rename over target.
    pub async fn write(&self, response: &AggregatedResponse) -> Result<()> {
        let json = serde_json::to_string_pretty(response)?;
        let tmp = self.tmp_path();

        fs::write(&tmp, json.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), "response published");
        Ok(())
    }

    /// The published document, or `None` if nothing has been published yet.
    pub async fn read(&self) -> Result<Option<AggregatedResponse>> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Modification time of the document in whole seconds since the epoch.
    pub async fn modified_epoch(&self) -> Result<Option<u64>> {
        let meta = match fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let secs = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Ok(Some(secs))
    }
}
