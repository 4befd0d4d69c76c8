//! Lifecycle of the single remote session.

use std::sync::Arc;

use {
    serde::Serialize,
    tokio::sync::Mutex,
    tracing::{error, info, warn},
};

use crate::{
    Error, Result,
    transport::{Connector, Transport, TransportError},
};

/// Default number of times corrupted credentials are regenerated per acquire.
pub const DEFAULT_MAX_REGENERATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connected,
    Corrupted,
}

struct SessionSlot {
    transport: Option<Arc<dyn Transport>>,
    state: SessionState,
}

/// Owns the one connection to the remote peer's network.
///
/// Callers get a shared handle for the duration of a dispatch; only the
/// manager replaces or drops the connection.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    max_regenerations: usize,
    slot: Mutex<SessionSlot>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, max_regenerations: usize) -> Self {
        Self {
            connector,
            max_regenerations,
            slot: Mutex::new(SessionSlot {
                transport: None,
                state: SessionState::Disconnected,
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.slot.lock().await.state
    }

    /// Return the live session, establishing it first if needed.
    ///
    /// Corrupted credentials are discarded and the connection retried, at
    /// most `max_regenerations` times. Any other connect failure is returned
    /// as [`Error::Session`] without retrying.
    pub async fn acquire(&self) -> Result<Arc<dyn Transport>> {
        let mut slot = self.slot.lock().await;
        if let Some(transport) = slot.transport.as_ref()
            && transport.is_connected()
        {
            return Ok(Arc::clone(transport));
        }

        if slot.transport.take().is_some() {
            info!("remote session dropped, reconnecting");
            slot.state = SessionState::Disconnected;
        }

        let mut regenerations = 0usize;
        loop {
            info!(regenerations, "connecting to remote transport");
            match self.connector.connect().await {
                Ok(transport) => {
                    slot.transport = Some(Arc::clone(&transport));
                    slot.state = SessionState::Connected;
                    info!("remote session established");
                    return Ok(transport);
                },
                Err(TransportError::CorruptedCredentials { reason }) => {
                    slot.state = SessionState::Corrupted;
                    if regenerations >= self.max_regenerations {
                        error!(
                            regenerations,
                            max_regenerations = self.max_regenerations,
                            %reason,
                            "stored session still corrupted, giving up"
                        );
                        return Err(Error::SessionRegenerationExhausted {
                            attempts: regenerations,
                            reason,
                        });
                    }
                    regenerations += 1;
                    warn!(
                        regenerations,
                        max_regenerations = self.max_regenerations,
                        %reason,
                        "stored session is corrupted, regenerating"
                    );
                    self.connector.discard_credentials().await?;
                },
                Err(e) => {
                    slot.state = SessionState::Disconnected;
                    error!(error = %e, "failed to connect to remote transport");
                    return Err(Error::session(e));
                },
            }
        }
    }

    /// Drop the current connection so the next [`acquire`](Self::acquire)
    /// reconnects.
    pub async fn invalidate(&self, state: SessionState) {
        let mut slot = self.slot.lock().await;
        slot.transport = None;
        slot.state = state;
    }

    /// Drop the connection and its stored credentials after the remote
    /// rejected them during use.
    pub async fn regenerate(&self) -> Result<()> {
        self.invalidate(SessionState::Corrupted).await;
        self.connector.discard_credentials().await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::{FakeConnector, FakeTransport},
        std::time::Duration,
    };

    #[tokio::test]
    async fn acquire_is_idempotent_while_connected() {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let sessions = SessionManager::new(connector.clone(), DEFAULT_MAX_REGENERATIONS);

        assert_eq!(sessions.state().await, SessionState::Disconnected);
        sessions.acquire().await.unwrap();
        sessions.acquire().await.unwrap();

        assert_eq!(connector.connects(), 1);
        assert_eq!(sessions.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn reconnects_after_transport_drops() {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let sessions = SessionManager::new(connector.clone(), DEFAULT_MAX_REGENERATIONS);

        sessions.acquire().await.unwrap();
        transport.set_connected(false);
        sessions.acquire().await.unwrap();

        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn corrupted_credentials_are_discarded_and_retried() {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        connector.fail_next_connect(TransportError::corrupted("AUTH_KEY_UNREGISTERED"));

        let sessions = SessionManager::new(connector.clone(), DEFAULT_MAX_REGENERATIONS);
        sessions.acquire().await.unwrap();

        assert_eq!(connector.discards(), 1);
        assert_eq!(connector.connects(), 2);
        assert_eq!(sessions.state().await, SessionState::Connected);
    }

    #[tokio::test]
    async fn regeneration_budget_is_bounded() {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        for _ in 0..5 {
            connector.fail_next_connect(TransportError::corrupted("AUTH_KEY_INVALID"));
        }

        let sessions = SessionManager::new(connector.clone(), 2);
        let err = sessions.acquire().await.err().unwrap();

        assert!(matches!(
            err,
            Error::SessionRegenerationExhausted { attempts: 2, .. }
        ));
        assert_eq!(connector.connects(), 3);
        assert_eq!(connector.discards(), 2);
        assert_eq!(sessions.state().await, SessionState::Corrupted);
    }

    #[tokio::test]
    async fn other_connect_failures_are_fatal() {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        connector.fail_next_connect(TransportError::connect(
            "dial telegram",
            std::io::Error::other("network unreachable"),
        ));

        let sessions = SessionManager::new(connector.clone(), DEFAULT_MAX_REGENERATIONS);
        let err = sessions.acquire().await.err().unwrap();

        assert!(matches!(err, Error::Session { .. }));
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.discards(), 0);
        assert_eq!(sessions.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn rate_limit_while_connecting_exposes_wait() {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        connector.fail_next_connect(TransportError::rate_limited(Duration::from_secs(7)));

        let sessions = SessionManager::new(connector, DEFAULT_MAX_REGENERATIONS);
        let err = sessions.acquire().await.err().unwrap();
        assert_eq!(err.rate_limit_wait(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn invalidate_forces_reconnect() {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let sessions = SessionManager::new(connector.clone(), DEFAULT_MAX_REGENERATIONS);

        sessions.acquire().await.unwrap();
        sessions.invalidate(SessionState::Corrupted).await;
        assert_eq!(sessions.state().await, SessionState::Corrupted);
        sessions.acquire().await.unwrap();
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn regenerate_discards_credentials() {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let sessions = SessionManager::new(connector.clone(), DEFAULT_MAX_REGENERATIONS);

        sessions.acquire().await.unwrap();
        sessions.regenerate().await.unwrap();

        assert_eq!(connector.discards(), 1);
        assert_eq!(sessions.state().await, SessionState::Corrupted);
    }
}
