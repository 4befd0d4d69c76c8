//! Retention sweep for downloaded artifacts.

use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use {
    tokio::fs,
    tracing::{debug, info, warn},
};

/// Files older than this are removed from the temp root.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// File names that were deleted.
    pub removed: Vec<String>,
    /// Entries that could not be inspected or deleted.
    pub failed: usize,
}

pub struct TempJanitor {
    root: PathBuf,
    retention: Duration,
}

impl TempJanitor {
    pub fn new(root: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete regular files older than the retention window. Never fails.
    pub async fn sweep(&self) -> SweepReport {
        match self.try_sweep(SystemTime::now()).await {
            Ok(report) => {
                if !report.removed.is_empty() {
                    info!(removed = report.removed.len(), "temp sweep finished");
                }
                report
            },
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "temp sweep failed");
                SweepReport::default()
            },
        }
    }

    async fn try_sweep(&self, now: SystemTime) -> io::Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "temp root missing, nothing to sweep");
                return Ok(report);
            },
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let modified = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            let modified = match modified {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(file = %name, error = %e, "cannot stat temp file");
                    report.failed += 1;
                    continue;
                },
            };

            let expired = now
                .duration_since(modified)
                .is_ok_and(|age| age > self.retention);
            if !expired {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    info!(file = %name, "stale temp file removed");
                    report.removed.push(name);
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {},
                Err(e) => {
                    warn!(file = %name, error = %e, "failed to remove stale temp file");
                    report.failed += 1;
                },
            }
        }

        Ok(report)
    }
}
