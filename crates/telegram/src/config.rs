use std::path::{Path, PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Extension of the persisted session file.
pub const SESSION_FILE_EXTENSION: &str = "session";

/// Static credentials for the MTProto user session.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramCredentials {
    /// Application id from my.telegram.org.
    pub api_id: i32,

    /// Application hash from my.telegram.org.
    #[serde(serialize_with = "serialize_secret")]
    pub api_hash: Secret<String>,

    /// Base name of the session file.
    pub session_name: String,

    /// Directory holding the session file.
    pub session_dir: PathBuf,
}

impl TelegramCredentials {
    /// `<session_dir>/<session_name>.session`
    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.session_dir
            .join(format!("{}.{SESSION_FILE_EXTENSION}", self.session_name))
    }

    #[must_use]
    pub fn api_hash(&self) -> &str {
        self.api_hash.expose_secret()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.api_id != 0 && !self.api_hash().is_empty() && !self.session_name.is_empty()
    }

    #[must_use]
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }
}

impl std::fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .field("session_name", &self.session_name)
            .field("session_dir", &self.session_dir)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramCredentials {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: Secret::new(String::new()),
            session_name: "SistemaBot".into(),
            session_dir: PathBuf::from("sessions"),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_path_joins_dir_and_name() {
        let creds = TelegramCredentials {
            session_dir: PathBuf::from("/var/lib/registra"),
            ..Default::default()
        };
        assert_eq!(
            creds.session_path(),
            PathBuf::from("/var/lib/registra/SistemaBot.session")
        );
    }

    #[test]
    fn debug_redacts_hash() {
        let creds = TelegramCredentials {
            api_id: 12345,
            api_hash: Secret::new("0123456789abcdef".into()),
            ..Default::default()
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("0123456789abcdef"));
    }

    #[test]
    fn deserialize_fills_defaults() {
        let creds: TelegramCredentials =
            serde_json::from_str(r#"{"api_id": 42, "api_hash": "abc"}"#).unwrap();
        assert_eq!(creds.api_id, 42);
        assert_eq!(creds.api_hash(), "abc");
        assert_eq!(creds.session_name, "SistemaBot");
        assert!(creds.is_complete());
        assert!(!TelegramCredentials::default().is_complete());
    }
}
