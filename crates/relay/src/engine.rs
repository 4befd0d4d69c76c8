//! Command dispatch and reply correlation.
//!
//! The remote peer cannot echo a correlation token, so a reply is attributed
//! to a command purely by position: anything the peer posts after the
//! watermark taken just before sending belongs to that command. Dispatches
//! are serialized so that two commands never share a polling window.

use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    tokio::{
        sync::Mutex,
        time::{Instant, sleep, timeout},
    },
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    aggregate::ResponseAggregator,
    command::{Command, DEFAULT_STRUCTURED_PREFIX},
    janitor::TempJanitor,
    publish::Publisher,
    response::AggregatedResponse,
    session::{SessionManager, SessionState},
    transport::{RemoteMessage, Transport, TransportError},
};

/// Returned when the peer stays silent for the whole polling window.
pub const NO_REPLY_MESSAGE: &str = "⚠️ El bot no respondió dentro del tiempo esperado.";

/// Returned when no target peer is configured.
pub const PEER_NOT_CONFIGURED_MESSAGE: &str = "BOT_USERNAME no configurado.";

pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Total time spent waiting for replies.
    pub timeout: Duration,
    pub interval: Duration,
    /// Polling stops once this many replies are captured.
    pub capture_cap: usize,
    /// How many recent messages each poll fetches.
    pub fetch_window: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            interval: Duration::from_secs(5),
            capture_cap: 5,
            fetch_window: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Username of the peer commands are sent to.
    pub peer: String,
    pub structured_prefix: String,
    pub max_rate_limit_retries: usize,
    pub max_session_regenerations: usize,
    pub poll: PollSettings,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            peer: String::new(),
            structured_prefix: DEFAULT_STRUCTURED_PREFIX.to_string(),
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
            max_session_regenerations: crate::session::DEFAULT_MAX_REGENERATIONS,
            poll: PollSettings::default(),
        }
    }
}

/// Replies accumulated during one dispatch.
struct ReplyCapture {
    watermark: i64,
    seen: HashSet<i64>,
    messages: Vec<RemoteMessage>,
}

impl ReplyCapture {
    fn new(watermark: i64) -> Self {
        Self {
            watermark,
            seen: HashSet::new(),
            messages: Vec::new(),
        }
    }

    /// Record every unseen inbound message newer than the watermark.
    /// Returns how many were new.
    fn absorb(&mut self, batch: Vec<RemoteMessage>) -> usize {
        let before = self.messages.len();
        for message in batch {
            if message.id <= self.watermark || message.outgoing {
                continue;
            }
            if self.seen.insert(message.id) {
                self.messages.push(message);
            }
        }
        self.messages.len() - before
    }

    fn len(&self) -> usize {
        self.messages.len()
    }

    fn into_ordered(mut self) -> Vec<RemoteMessage> {
        self.messages.sort_by_key(|m| m.id);
        self.messages
    }
}

/// Sends commands to the peer and turns whatever it answers into one
/// published [`AggregatedResponse`].
pub struct CorrelationEngine {
    sessions: Arc<SessionManager>,
    aggregator: ResponseAggregator,
    publisher: Publisher,
    janitor: TempJanitor,
    settings: RelaySettings,
    flight: Mutex<()>,
}

impl CorrelationEngine {
    pub fn new(
        sessions: Arc<SessionManager>,
        aggregator: ResponseAggregator,
        publisher: Publisher,
        janitor: TempJanitor,
        settings: RelaySettings,
    ) -> Self {
        Self {
            sessions,
            aggregator,
            publisher,
            janitor,
            settings,
            flight: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    #[must_use]
    pub fn janitor(&self) -> &TempJanitor {
        &self.janitor
    }

    #[must_use]
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub async fn session_state(&self) -> SessionState {
        self.sessions.state().await
    }

    /// Send `raw` to the peer and wait for its reply.
    ///
    /// Invalid commands, silence, protocol errors and publish failures come
    /// back as `Ok` with an error-status response. Only an unusable session
    /// and an exhausted rate-limit budget return `Err`.
    pub async fn dispatch(&self, raw: &str) -> Result<AggregatedResponse> {
        let command = match Command::parse(raw, &self.settings.structured_prefix) {
            Ok(command) => command,
            Err(e) => {
                info!(command = raw, error = %e, "command rejected");
                return Ok(AggregatedResponse::error(e.to_string()));
            },
        };
        if self.settings.peer.trim().is_empty() {
            warn!("no target peer configured");
            return Ok(AggregatedResponse::error(PEER_NOT_CONFIGURED_MESSAGE));
        }

        let _flight = self.flight.lock().await;

        let mut rate_limit_retries = 0usize;
        let mut regenerations = 0usize;
        loop {
            let err = match self.attempt(&command).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if let Some(wait) = err.rate_limit_wait() {
                if rate_limit_retries >= self.settings.max_rate_limit_retries {
                    warn!(
                        retries = rate_limit_retries,
                        wait_secs = wait.as_secs(),
                        "rate limit retries exhausted"
                    );
                    return Err(Error::RateLimitExhausted {
                        retries: rate_limit_retries,
                        wait,
                    });
                }
                rate_limit_retries += 1;
                warn!(
                    attempt = rate_limit_retries,
                    wait_secs = wait.as_secs(),
                    "rate limited by remote, retrying dispatch"
                );
                sleep(wait).await;
                continue;
            }

            match err {
                Error::Transport(TransportError::CorruptedCredentials { reason }) => {
                    if regenerations >= self.settings.max_session_regenerations {
                        return Err(Error::SessionRegenerationExhausted {
                            attempts: regenerations,
                            reason,
                        });
                    }
                    regenerations += 1;
                    warn!(regenerations, %reason, "session rejected mid-dispatch, regenerating");
                    self.sessions.regenerate().await?;
                },
                Error::Transport(TransportError::Unauthorized { message }) => {
                    self.sessions.invalidate(SessionState::Disconnected).await;
                    return Err(Error::session(TransportError::unauthorized(message)));
                },
                e if e.is_fatal() => return Err(e),
                Error::Transport(TransportError::Protocol { code, message }) => {
                    warn!(code, %message, "remote rejected command");
                    return Ok(AggregatedResponse::error(format!("Error RPC: {message}")));
                },
                e => {
                    warn!(error = %e, "dispatch failed");
                    return Ok(AggregatedResponse::error(e.to_string()));
                },
            }
        }
    }

    /// One full send-and-collect cycle.
    async fn attempt(&self, command: &Command) -> Result<AggregatedResponse> {
        self.janitor.sweep().await;

        let transport = self.sessions.acquire().await?;
        let peer = self.settings.peer.as_str();

        let watermark = match transport.fetch_recent(peer, 1).await {
            Ok(latest) => latest.iter().map(|m| m.id).max().unwrap_or(0),
            Err(e) => {
                warn!(peer, error = %e, "could not read latest message, capturing from start");
                0
            },
        };

        info!(command = command.as_str(), peer, watermark, "sending command");
        transport.send_text(peer, command.as_str()).await?;

        let captured = self.poll(transport.as_ref(), watermark).await;
        if captured.is_empty() {
            info!(command = command.as_str(), "no reply before timeout");
            return Ok(AggregatedResponse::error(NO_REPLY_MESSAGE));
        }

        info!(
            command = command.as_str(),
            replies = captured.len(),
            "reply captured"
        );
        let response = self.aggregator.build(command.as_str(), &captured).await;
        self.publisher.write(&response).await?;
        Ok(response)
    }

    /// Collect replies newer than `watermark` until the cap or the timeout.
    ///
    /// The whole batch of the poll that reaches the cap is kept.
    async fn poll(&self, transport: &dyn Transport, watermark: i64) -> Vec<RemoteMessage> {
        let poll = &self.settings.poll;
        let peer = self.settings.peer.as_str();
        let started = Instant::now();
        let mut capture = ReplyCapture::new(watermark);

        while started.elapsed() < poll.timeout {
            sleep(poll.interval).await;
            let remaining = poll.timeout.saturating_sub(started.elapsed());
            match timeout(remaining, transport.fetch_recent(peer, poll.fetch_window)).await {
                Ok(Ok(batch)) => {
                    let fresh = capture.absorb(batch);
                    if fresh > 0 {
                        debug!(fresh, total = capture.len(), "new replies");
                    }
                },
                Ok(Err(e)) => warn!(peer, error = %e, "poll fetch failed"),
                Err(_) => warn!(
                    peer,
                    elapsed_secs = started.elapsed().as_secs(),
                    "poll fetch still pending at timeout, abandoning it"
                ),
            }
            if capture.len() >= poll.capture_cap {
                break;
            }
        }

        capture.into_ordered()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            response::{ResponseKind, ResponseStatus},
            testing::{FakeConnector, FakeEvent, FakeTransport, Reply, StaticAttachment},
        },
        std::path::Path,
    };

    fn settings() -> RelaySettings {
        RelaySettings {
            peer: "ConsultaBot".into(),
            ..RelaySettings::default()
        }
    }

    fn engine_with(
        dir: &Path,
        connector: Arc<FakeConnector>,
        settings: RelaySettings,
    ) -> CorrelationEngine {
        let sessions = Arc::new(SessionManager::new(
            connector,
            settings.max_session_regenerations,
        ));
        CorrelationEngine::new(
            sessions,
            ResponseAggregator::new(dir),
            Publisher::in_dir(dir),
            TempJanitor::new(dir, crate::janitor::DEFAULT_RETENTION),
            settings,
        )
    }

    fn setup(dir: &Path) -> (Arc<FakeTransport>, Arc<FakeConnector>, CorrelationEngine) {
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let engine = engine_with(dir, Arc::clone(&connector), settings());
        (transport, connector, engine)
    }

    #[test]
    fn capture_skips_stale_outgoing_and_duplicates() {
        let mut capture = ReplyCapture::new(10);
        let mut own = RemoteMessage::inbound(11);
        own.outgoing = true;

        let fresh = capture.absorb(vec![
            RemoteMessage::inbound(13),
            RemoteMessage::inbound(12),
            own,
            RemoteMessage::inbound(10),
            RemoteMessage::inbound(3),
        ]);
        assert_eq!(fresh, 2);

        let fresh = capture.absorb(vec![RemoteMessage::inbound(14), RemoteMessage::inbound(13)]);
        assert_eq!(fresh, 1);

        let ids: Vec<i64> = capture.into_ordered().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![12, 13, 14]);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_structured_command_never_touches_transport() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, connector, engine) = setup(dir.path());

        let resp = engine.dispatch("/nm").await.unwrap();

        assert_eq!(resp.status, ResponseStatus::Error);
        assert!(resp.text.starts_with("⚠️ Formato inválido. Usa: /nm"));
        assert_eq!(connector.connects(), 0);
        assert!(transport.events().is_empty());
        assert!(engine.publisher().read().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_peer_is_an_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let engine = engine_with(dir.path(), connector.clone(), RelaySettings::default());

        let resp = engine.dispatch("/dni 12345678").await.unwrap();
        assert_eq!(resp.text, PEER_NOT_CONFIGURED_MESSAGE);
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_text_reply_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        transport.push_inbound("respuesta vieja");
        transport.reply_on_send(vec![Reply::text("Nombre: JUAN PEREZ LOPEZ")]);

        let resp = engine.dispatch("/nm Juan|Perez|Lopez").await.unwrap();

        assert_eq!(resp.status, ResponseStatus::Ok);
        assert_eq!(resp.text, "Nombre: JUAN PEREZ LOPEZ");
        assert!(resp.files.is_empty());
        assert_eq!(resp.primary_file, None);
        assert_eq!(resp.kind, ResponseKind::Text);
        assert_eq!(transport.sent(), vec!["/nm Juan|Perez|Lopez".to_string()]);
        assert_eq!(engine.publisher().read().await.unwrap(), Some(resp));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_sleeps_and_retries_whole_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        transport.fail_next_send(TransportError::rate_limited(Duration::from_secs(10)));
        transport.reply_on_send(vec![Reply::text("segundo intento")]);

        let started = Instant::now();
        let resp = engine.dispatch("/dni 12345678").await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(resp.text, "segundo intento");
        assert_eq!(transport.send_attempts(), 2);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_budget_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        for _ in 0..10 {
            transport.fail_next_send(TransportError::rate_limited(Duration::from_secs(3)));
        }

        let err = engine.dispatch("/dni 12345678").await.unwrap_err();

        assert!(matches!(err, Error::RateLimitExhausted { retries: 4, .. }));
        assert_eq!(transport.send_attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_with_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());

        let started = Instant::now();
        let resp = engine.dispatch("/dni 12345678").await.unwrap();

        assert_eq!(resp.status, ResponseStatus::Error);
        assert_eq!(resp.text, NO_REPLY_MESSAGE);
        assert!(started.elapsed() >= Duration::from_secs(90));
        // watermark fetch plus one fetch per 5s interval
        assert_eq!(transport.fetches(), 1 + 18);
        assert!(engine.publisher().read().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_fetch_cannot_outlast_poll_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        transport.stall_fetches(1, Duration::from_secs(600));

        let started = Instant::now();
        let resp = engine.dispatch("/dni 12345678").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(resp.text, NO_REPLY_MESSAGE);
        assert!(elapsed >= Duration::from_secs(90));
        assert!(elapsed <= Duration::from_secs(95), "poll ran for {elapsed:?}");
        // only the watermark fetch ever completed
        assert_eq!(transport.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_sweeps_expired_temp_files_first() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        transport.reply_on_send(vec![Reply::text("ok")]);

        let stale = dir.path().join("1600000000_0.pdf");
        let fresh = dir.path().join("reciente.pdf");
        std::fs::write(&stale, b"old").unwrap();
        std::fs::write(&fresh, b"new").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(25 * 60 * 60))
            .unwrap();

        engine.dispatch("/dni 12345678").await.unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn replies_are_ordered_and_attachment_saved() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        transport.reply_on_send(vec![
            Reply::text("Ficha RENIEC"),
            Reply::attachment(StaticAttachment::new(Some("pdf"), b"%PDF".to_vec())),
        ]);

        let resp = engine.dispatch("/dni 12345678").await.unwrap();

        assert_eq!(resp.text, "Ficha RENIEC");
        assert_eq!(resp.kind, ResponseKind::File);
        assert_eq!(resp.files.len(), 1);
        let file = resp.primary_file.clone().unwrap();
        assert!(file.ends_with("_1.pdf"), "attachment is the second capture: {file}");
        assert!(dir.path().join(&file).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn replies_spread_over_polls_are_captured_once() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        transport.reply_on_send(vec![
            Reply::text("uno"),
            Reply::text("dos").after_fetches(2),
            Reply::text("tres").after_fetches(4),
        ]);

        let resp = engine.dispatch("/dni 12345678").await.unwrap();

        assert_eq!(resp.text, "uno\n\ndos\n\ntres");
        assert!(!resp.text.contains("/dni"), "own command must not be captured");
    }

    #[tokio::test(start_paused = true)]
    async fn cap_stops_polling_but_keeps_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let mut settings = settings();
        settings.poll.capture_cap = 2;
        let engine = engine_with(dir.path(), connector, settings);
        transport.reply_on_send(vec![Reply::text("a"), Reply::text("b"), Reply::text("c")]);

        let resp = engine.dispatch("/dni 1").await.unwrap();

        assert_eq!(resp.text, "a\n\nb\n\nc");
        assert_eq!(transport.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_errors_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        transport.fail_next_fetch(TransportError::protocol(500, "RPC_CALL_FAIL"));
        transport.fail_next_fetch(TransportError::protocol(500, "RPC_CALL_FAIL"));
        transport.reply_on_send(vec![Reply::text("ok")]);

        let resp = engine.dispatch("/dni 1").await.unwrap();
        assert_eq!(resp.status, ResponseStatus::Ok);
        assert_eq!(resp.text, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_error_on_send_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        transport.fail_next_send(TransportError::protocol(400, "PEER_ID_INVALID"));

        let resp = engine.dispatch("/dni 1").await.unwrap();
        assert_eq!(resp.status, ResponseStatus::Error);
        assert_eq!(resp.text, "Error RPC: PEER_ID_INVALID");
        assert_eq!(transport.send_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_becomes_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let settings = settings();
        let sessions = Arc::new(SessionManager::new(connector, 2));
        let engine = CorrelationEngine::new(
            sessions,
            ResponseAggregator::new(dir.path()),
            Publisher::in_dir(&dir.path().join("missing")),
            TempJanitor::new(dir.path(), crate::janitor::DEFAULT_RETENTION),
            settings,
        );
        transport.reply_on_send(vec![Reply::text("ok")]);

        let resp = engine.dispatch("/dni 1").await.unwrap();
        assert_eq!(resp.status, ResponseStatus::Error);
        assert!(!resp.text.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn session_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, connector, engine) = setup(dir.path());
        connector.fail_next_connect(TransportError::unauthorized("no user logged in"));

        let err = engine.dispatch("/dni 1").await.unwrap_err();
        assert!(matches!(err, Error::Session { .. }));
        assert!(transport.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_session_mid_dispatch_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, connector, engine) = setup(dir.path());
        transport.fail_next_send(TransportError::corrupted("AUTH_KEY_UNREGISTERED"));
        transport.reply_on_send(vec![Reply::text("ok")]);

        let resp = engine.dispatch("/dni 1").await.unwrap();

        assert_eq!(resp.text, "ok");
        assert_eq!(connector.discards(), 1);
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_session_budget_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _connector, engine) = setup(dir.path());
        for _ in 0..5 {
            transport.fail_next_send(TransportError::corrupted("AUTH_KEY_UNREGISTERED"));
        }

        let err = engine.dispatch("/dni 1").await.unwrap_err();
        assert!(matches!(
            err,
            Error::SessionRegenerationExhausted { attempts: 2, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FakeTransport::new();
        let connector = FakeConnector::new(Arc::clone(&transport));
        let mut settings = settings();
        settings.poll.capture_cap = 1;
        let engine = engine_with(dir.path(), connector, settings);
        transport.reply_on_send(vec![Reply::text("r1")]);
        transport.reply_on_send(vec![Reply::text("r2")]);

        let (a, b) = tokio::join!(engine.dispatch("/a"), engine.dispatch("/b"));
        let (a, b) = (a.unwrap(), b.unwrap());

        let kinds: Vec<&str> = transport
            .events()
            .iter()
            .map(|e| match e {
                FakeEvent::Fetch { .. } => "fetch",
                FakeEvent::Send { .. } => "send",
            })
            .collect();
        assert_eq!(kinds, vec!["fetch", "send", "fetch", "fetch", "send", "fetch"]);
        assert_eq!(a.text, "r1");
        assert_eq!(b.text, "r2");
    }
}
