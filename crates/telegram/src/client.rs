//! grammers-backed [`Connector`] and [`Transport`].

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    grammers_client::{
        Client, Config, InitParams,
        types::{Media, Message},
    },
    grammers_mtsender::InvocationError,
    grammers_session::{PackedChat, Session},
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use registra_relay::{
    AttachmentSource, Connector, RemoteAttachment, RemoteMessage, Transport, TransportError,
    transport::remove_credential_file,
};

use crate::{config::TelegramCredentials, media::extension_for_mime, rpc::classify_rpc};

/// Connection parameters used for every client this crate builds.
///
/// Flood waits are never slept on inside grammers; the relay decides how to
/// back off.
pub(crate) fn init_params() -> InitParams {
    InitParams {
        flood_sleep_threshold: 0,
        ..InitParams::default()
    }
}

/// Open the session file and connect, without checking authorization.
pub(crate) async fn open_client(creds: &TelegramCredentials) -> Result<Client, TransportError> {
    let path = creds.session_path();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let session = Session::load_file_or_create(&path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "session file unreadable");
        TransportError::corrupted(format!("{}: {e}", path.display()))
    })?;

    Client::connect(Config {
        session,
        api_id: creds.api_id,
        api_hash: creds.api_hash().to_string(),
        params: init_params(),
    })
    .await
    .map_err(|e| TransportError::connect("connect to telegram", e))
}

pub(crate) fn map_invocation(context: &str, err: InvocationError) -> TransportError {
    match err {
        InvocationError::Rpc(rpc) => classify_rpc(rpc.code, &rpc.name, rpc.value),
        other => TransportError::connect(context, other),
    }
}

/// Builds authorized [`MtprotoTransport`]s from stored credentials.
pub struct MtprotoConnector {
    creds: TelegramCredentials,
}

impl MtprotoConnector {
    pub fn new(creds: TelegramCredentials) -> Self {
        Self { creds }
    }

    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.creds.session_path()
    }
}

#[async_trait]
impl Connector for MtprotoConnector {
    async fn connect(&self) -> Result<Arc<dyn Transport>, TransportError> {
        let client = open_client(&self.creds).await?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| map_invocation("check authorization", e))?;
        if !authorized {
            return Err(TransportError::unauthorized(format!(
                "no user logged in to {}, run `registra login`",
                self.session_path().display()
            )));
        }

        client
            .session()
            .save_to_file(self.session_path())
            .map_err(TransportError::from)?;
        info!(session = %self.session_path().display(), "telegram user session ready");

        Ok(Arc::new(MtprotoTransport::new(client)))
    }

    async fn discard_credentials(&self) -> io::Result<()> {
        let path = self.session_path();
        info!(session = %path.display(), "discarding telegram session file");
        remove_credential_file(&path).await
    }
}

/// One connected user client.
pub struct MtprotoTransport {
    client: Client,
    connected: AtomicBool,
    peers: Mutex<HashMap<String, PackedChat>>,
}

impl MtprotoTransport {
    fn new(client: Client) -> Self {
        Self {
            client,
            connected: AtomicBool::new(true),
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure, marking the connection dead unless the remote
    /// answered with an RPC error.
    fn fail(&self, context: &str, err: InvocationError) -> TransportError {
        if !matches!(err, InvocationError::Rpc(_)) {
            self.connected.store(false, Ordering::SeqCst);
        }
        map_invocation(context, err)
    }

    async fn resolve(&self, peer: &str) -> Result<PackedChat, TransportError> {
        let username = peer.trim().trim_start_matches('@');
        if let Some(chat) = self.peers.lock().await.get(username) {
            return Ok(*chat);
        }

        let chat = self
            .client
            .resolve_username(username)
            .await
            .map_err(|e| self.fail("resolve username", e))?
            .ok_or_else(|| TransportError::protocol(400, "USERNAME_NOT_OCCUPIED"))?
            .pack();
        debug!(peer = username, "peer resolved");
        self.peers.lock().await.insert(username.to_string(), chat);
        Ok(chat)
    }
}

#[async_trait]
impl Transport for MtprotoTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_text(&self, peer: &str, text: &str) -> Result<(), TransportError> {
        let chat = self.resolve(peer).await?;
        self.client
            .send_message(chat, text)
            .await
            .map_err(|e| self.fail("send message", e))?;
        Ok(())
    }

    async fn fetch_recent(
        &self,
        peer: &str,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, TransportError> {
        let chat = self.resolve(peer).await?;
        let mut iter = self.client.iter_messages(chat).limit(limit);
        let mut out = Vec::with_capacity(limit);
        while let Some(message) = iter
            .next()
            .await
            .map_err(|e| self.fail("fetch history", e))?
        {
            out.push(to_remote(message));
        }
        Ok(out)
    }
}

fn to_remote(message: Message) -> RemoteMessage {
    let text = Some(message.text().to_string()).filter(|t| !t.is_empty());
    let attachment = message.media().map(|media| {
        let extension = media_extension(&media);
        RemoteAttachment::new(
            extension.as_deref(),
            Arc::new(MessageMedia {
                message: message.clone(),
            }),
        )
    });
    RemoteMessage {
        id: i64::from(message.id()),
        outgoing: message.outgoing(),
        text,
        attachment,
    }
}

fn media_extension(media: &Media) -> Option<String> {
    match media {
        Media::Photo(_) => Some("jpg".into()),
        Media::Document(doc) => Path::new(doc.name())
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .or_else(|| doc.mime_type().and_then(extension_for_mime).map(String::from)),
        _ => None,
    }
}

struct MessageMedia {
    message: Message,
}

#[async_trait]
impl AttachmentSource for MessageMedia {
    async fn download(&self, dest: &Path) -> Result<bool, TransportError> {
        Ok(self.message.download_media(dest).await?)
    }
}
