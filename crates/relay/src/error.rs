use std::time::Duration;

use crate::transport::TransportError;

/// Crate-wide result type for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures of the relay.
///
/// Everything recoverable is folded into an `error`-status
/// [`AggregatedResponse`](crate::AggregatedResponse) instead; only these
/// variants escape [`CorrelationEngine::dispatch`](crate::CorrelationEngine::dispatch).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote session could not be established.
    #[error("remote session unavailable: {source}")]
    Session {
        #[source]
        source: TransportError,
    },

    /// Stored credentials kept failing after every allowed regeneration.
    #[error("session credentials still invalid after {attempts} regeneration(s): {reason}")]
    SessionRegenerationExhausted { attempts: usize, reason: String },

    /// The remote kept asking us to back off.
    #[error("remote kept rate limiting after {retries} retries (last wait {}s)", wait.as_secs())]
    RateLimitExhausted { retries: usize, wait: Duration },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn session(source: TransportError) -> Self {
        Self::Session { source }
    }

    /// Wait requested by the remote when this error is a rate limit.
    #[must_use]
    pub fn rate_limit_wait(&self) -> Option<Duration> {
        match self {
            Self::Session {
                source: TransportError::RateLimited { wait },
            }
            | Self::Transport(TransportError::RateLimited { wait }) => Some(*wait),
            _ => None,
        }
    }

    /// Whether the failure must be returned to the caller instead of being
    /// folded into an error response.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Session { .. }
                | Self::SessionRegenerationExhausted { .. }
                | Self::RateLimitExhausted { .. }
                | Self::Transport(TransportError::Unauthorized { .. })
        )
    }
}
