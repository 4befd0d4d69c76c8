//! Config schema types.

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration (`registra.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistraConfig {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

/// MTProto user-session credentials and the peer commands go to.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_id: i32,
    #[serde(serialize_with = "serialize_secret")]
    pub api_hash: Secret<String>,
    /// Base name of the session file inside `session_dir`.
    pub session_name: String,
    pub session_dir: PathBuf,
    /// Username of the bot that answers commands.
    pub bot_username: String,
}

impl TelegramConfig {
    #[must_use]
    pub fn api_hash(&self) -> &str {
        self.api_hash.expose_secret()
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .field("session_name", &self.session_name)
            .field("session_dir", &self.session_dir)
            .field("bot_username", &self.bot_username)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: Secret::new(String::new()),
            session_name: "SistemaBot".into(),
            session_dir: PathBuf::from("sessions"),
            bot_username: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Downloaded attachments and `respuestas.json`.
    pub temp_dir: PathBuf,
    /// Web frontend served at `/` and `/static`.
    pub frontend_dir: PathBuf,
    /// Command catalog (`comandos.json`).
    pub catalog_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("Data/temp_files"),
            frontend_dir: PathBuf::from("Frontend"),
            catalog_path: PathBuf::from("data/comandos.json"),
        }
    }
}

/// Polling and retry knobs of the correlation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub capture_cap: usize,
    pub fetch_window: usize,
    pub retention_hours: u64,
    pub max_rate_limit_retries: usize,
    pub max_session_regenerations: usize,
    pub structured_prefix: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 90,
            poll_interval_secs: 5,
            capture_cap: 5,
            fetch_window: 20,
            retention_hours: 24,
            max_rate_limit_retries: 4,
            max_session_regenerations: 2,
            structured_prefix: "/nm".into(),
        }
    }
}
