//! Transport seam between the relay and the chat client library.
//!
//! A [`Connector`] produces an authenticated [`Transport`]; the transport can
//! send text to a peer and list the peer's most recent messages. Attachments
//! carry their own download handle so the relay never needs to know how the
//! client library addresses media.

use std::{error::Error as StdError, fmt, io, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;

/// Errors surfaced by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote asked the caller to wait before retrying.
    #[error("rate limited by remote, retry after {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    /// The persisted credentials are unusable and must be regenerated.
    #[error("stored credentials are invalid: {reason}")]
    CorruptedCredentials { reason: String },

    /// The session exists but no user is logged in.
    #[error("session is not authorized: {message}")]
    Unauthorized { message: String },

    /// The remote rejected the request.
    #[error("{message}")]
    Protocol { code: i32, message: String },

    /// Connecting to the remote failed.
    #[error("{context}: {source}")]
    Connect {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    #[must_use]
    pub fn rate_limited(wait: Duration) -> Self {
        Self::RateLimited { wait }
    }

    #[must_use]
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Self::CorruptedCredentials {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connect(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Connect {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Something that can write a message's media to a local path.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Download to `dest`. Returns `false` when the remote had nothing to save.
    async fn download(&self, dest: &Path) -> Result<bool, TransportError>;
}

/// Media attached to a [`RemoteMessage`].
#[derive(Clone)]
pub struct RemoteAttachment {
    extension: Option<String>,
    source: Arc<dyn AttachmentSource>,
}

impl RemoteAttachment {
    /// `extension` is a hint such as `pdf` or `.pdf`; blank hints are dropped.
    pub fn new(extension: Option<&str>, source: Arc<dyn AttachmentSource>) -> Self {
        let extension = extension
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"));
        Self { extension, source }
    }

    /// Extension including the leading dot, when known.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub async fn download(&self, dest: &Path) -> Result<bool, TransportError> {
        self.source.download(dest).await
    }
}

impl fmt::Debug for RemoteAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAttachment")
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

/// One message from a peer's history.
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    /// Per-peer identifier, monotonically increasing.
    pub id: i64,
    /// `true` for messages this session sent itself.
    pub outgoing: bool,
    pub text: Option<String>,
    pub attachment: Option<RemoteAttachment>,
}

impl RemoteMessage {
    #[must_use]
    pub fn inbound(id: i64) -> Self {
        Self {
            id,
            outgoing: false,
            text: None,
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: RemoteAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Text body, if the message has any non-blank text.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// An authenticated connection to the chat network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the underlying connection is still usable.
    fn is_connected(&self) -> bool;

    /// Send `text` as a new message to `peer`.
    async fn send_text(&self, peer: &str, text: &str) -> Result<(), TransportError>;

    /// Up to `limit` most recent messages exchanged with `peer`, newest first.
    async fn fetch_recent(
        &self,
        peer: &str,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, TransportError>;
}

/// Builds transports from static credentials.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Transport>, TransportError>;

    /// Delete the persisted credential artifact so the next connect starts fresh.
    async fn discard_credentials(&self) -> io::Result<()>;
}

/// Remove a credential file, treating "not found" as success.
pub async fn remove_credential_file(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
