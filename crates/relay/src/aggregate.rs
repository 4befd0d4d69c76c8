//! Merge captured replies into one [`AggregatedResponse`].

use std::path::{Path, PathBuf};

use {
    chrono::Utc,
    tracing::{info, warn},
};

use crate::{response::AggregatedResponse, transport::RemoteMessage};

/// Extension used when the remote gives no hint about the attachment type.
pub const FALLBACK_EXTENSION: &str = ".bin";

/// Name under which the attachment of the `index`-th captured message is stored.
#[must_use]
pub fn stored_file_name(unix_secs: i64, index: usize, extension: Option<&str>) -> String {
    format!(
        "respuesta_{unix_secs}_{index}{}",
        extension.unwrap_or(FALLBACK_EXTENSION)
    )
}

pub struct ResponseAggregator {
    temp_root: PathBuf,
}

impl ResponseAggregator {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }

    #[must_use]
    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Build the response for `captured`, which must already be in ascending
    /// identifier order.
    ///
    /// Attachments are downloaded into the temp root; one that fails is logged
    /// and left out without affecting the rest. When no message carries text,
    /// the command itself is echoed back.
    pub async fn build(&self, command: &str, captured: &[RemoteMessage]) -> AggregatedResponse {
        let mut fragments: Vec<&str> = Vec::new();
        let mut files = Vec::new();

        for (index, message) in captured.iter().enumerate() {
            if let Some(text) = message.text() {
                fragments.push(text.trim());
            }

            let Some(attachment) = &message.attachment else {
                continue;
            };
            let name = stored_file_name(Utc::now().timestamp(), index, attachment.extension());
            let dest = self.temp_root.join(&name);
            match attachment.download(&dest).await {
                Ok(true) => {
                    info!(message_id = message.id, file = %dest.display(), "attachment saved");
                    files.push(name);
                },
                Ok(false) => {
                    warn!(message_id = message.id, file = %name, "attachment had nothing to save");
                },
                Err(e) => {
                    warn!(message_id = message.id, file = %name, error = %e, "failed to save attachment");
                },
            }
        }

        let text = if fragments.is_empty() {
            command.to_string()
        } else {
            fragments.join("\n\n").trim().to_string()
        };

        AggregatedResponse::ok(text, files)
    }
}
