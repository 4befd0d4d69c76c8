//! In-memory transport fakes for exercising the relay without a network.

use std::{
    collections::VecDeque,
    io,
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::transport::{
    AttachmentSource, Connector, RemoteAttachment, RemoteMessage, Transport, TransportError,
};

/// Attachment that writes fixed bytes; empty bytes mean "nothing to save".
pub struct StaticAttachment {
    bytes: Vec<u8>,
}

impl StaticAttachment {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(extension: Option<&str>, bytes: Vec<u8>) -> RemoteAttachment {
        RemoteAttachment::new(extension, Arc::new(Self { bytes }))
    }

    pub fn empty() -> RemoteAttachment {
        Self::new(None, Vec::new())
    }
}

#[async_trait]
impl AttachmentSource for StaticAttachment {
    async fn download(&self, dest: &Path) -> Result<bool, TransportError> {
        if self.bytes.is_empty() {
            return Ok(false);
        }
        tokio::fs::write(dest, &self.bytes).await?;
        Ok(true)
    }
}

/// Attachment whose download always fails.
pub struct FailingAttachment;

impl FailingAttachment {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> RemoteAttachment {
        RemoteAttachment::new(Some("pdf"), Arc::new(Self))
    }
}

#[async_trait]
impl AttachmentSource for FailingAttachment {
    async fn download(&self, _dest: &Path) -> Result<bool, TransportError> {
        Err(TransportError::protocol(400, "FILE_REFERENCE_EXPIRED"))
    }
}

/// A reply the fake peer posts after a command is sent.
#[derive(Debug, Clone)]
pub struct Reply {
    text: Option<String>,
    attachment: Option<RemoteAttachment>,
    after_fetches: usize,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment: None,
            after_fetches: 0,
        }
    }

    pub fn attachment(attachment: RemoteAttachment) -> Self {
        Self {
            text: None,
            attachment: Some(attachment),
            after_fetches: 0,
        }
    }

    /// Only becomes visible once `n` fetches have happened since the send.
    #[must_use]
    pub fn after_fetches(mut self, n: usize) -> Self {
        self.after_fetches = n;
        self
    }
}

/// What the fake observed, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Fetch { limit: usize },
    Send { text: String },
}

#[derive(Default)]
struct FakeState {
    /// Ascending by id.
    history: Vec<RemoteMessage>,
    next_id: i64,
    scripts: VecDeque<Vec<Reply>>,
    pending: Vec<Reply>,
    fetches_since_send: usize,
    send_failures: VecDeque<TransportError>,
    fetch_failures: VecDeque<TransportError>,
    /// Fetches asking for more than this many messages hang for the delay.
    stall: Option<(usize, Duration)>,
    send_attempts: usize,
    events: Vec<FakeEvent>,
}

impl FakeState {
    fn push(&mut self, mut message: RemoteMessage) -> i64 {
        self.next_id += 1;
        message.id = self.next_id;
        self.history.push(message);
        self.next_id
    }
}

/// Scripted chat peer.
///
/// Every successful send consumes the next script queued with
/// [`reply_on_send`](Self::reply_on_send); its replies become visible to
/// later fetches according to [`Reply::after_fetches`].
pub struct FakeTransport {
    connected: AtomicBool,
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            state: Mutex::new(FakeState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Add an inbound message that predates any dispatch. Returns its id.
    pub fn push_inbound(&self, text: &str) -> i64 {
        self.state().push(RemoteMessage::inbound(0).with_text(text))
    }

    pub fn reply_on_send(&self, replies: Vec<Reply>) {
        self.state().scripts.push_back(replies);
    }

    pub fn fail_next_send(&self, err: TransportError) {
        self.state().send_failures.push_back(err);
    }

    pub fn fail_next_fetch(&self, err: TransportError) {
        self.state().fetch_failures.push_back(err);
    }

    /// Make every fetch with a limit above `over` hang for `delay` before
    /// answering.
    pub fn stall_fetches(&self, over: usize, delay: Duration) {
        self.state().stall = Some((over, delay));
    }

    /// Commands that reached the peer.
    pub fn sent(&self) -> Vec<String> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Send { text } => Some(text.clone()),
                FakeEvent::Fetch { .. } => None,
            })
            .collect()
    }

    pub fn send_attempts(&self) -> usize {
        self.state().send_attempts
    }

    pub fn fetches(&self) -> usize {
        self.state()
            .events
            .iter()
            .filter(|e| matches!(e, FakeEvent::Fetch { .. }))
            .count()
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.state().events.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_text(&self, _peer: &str, text: &str) -> Result<(), TransportError> {
        let mut state = self.state();
        state.send_attempts += 1;
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }

        state.events.push(FakeEvent::Send {
            text: text.to_string(),
        });
        let mut own = RemoteMessage::inbound(0).with_text(text);
        own.outgoing = true;
        state.push(own);

        let script = state.scripts.pop_front().unwrap_or_default();
        state.pending.extend(script);
        state.fetches_since_send = 0;
        Ok(())
    }

    async fn fetch_recent(
        &self,
        _peer: &str,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, TransportError> {
        let stall = self
            .state()
            .stall
            .filter(|(over, _)| limit > *over)
            .map(|(_, delay)| delay);
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.events.push(FakeEvent::Fetch { limit });
        if let Some(err) = state.fetch_failures.pop_front() {
            return Err(err);
        }

        let due = state.fetches_since_send;
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|r| r.after_fetches <= due);
        state.pending = waiting;
        for reply in ready {
            state.push(RemoteMessage {
                id: 0,
                outgoing: false,
                text: reply.text,
                attachment: reply.attachment,
            });
        }
        state.fetches_since_send += 1;

        Ok(state.history.iter().rev().take(limit).cloned().collect())
    }
}

/// Connector handing out one shared [`FakeTransport`].
pub struct FakeConnector {
    transport: Arc<FakeTransport>,
    failures: Mutex<VecDeque<TransportError>>,
    connects: AtomicUsize,
    discards: AtomicUsize,
}

impl FakeConnector {
    pub fn new(transport: Arc<FakeTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            failures: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
            discards: AtomicUsize::new(0),
        })
    }

    pub fn fail_next_connect(&self, err: TransportError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(err);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        self.transport.set_connected(true);
        Ok(Arc::clone(&self.transport) as Arc<dyn Transport>)
    }

    async fn discard_credentials(&self) -> io::Result<()> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
