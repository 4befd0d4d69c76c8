use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("comandos.json not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid command catalog in section '{section}': {message}")]
    InvalidCatalog { section: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCatalog {
            section: section.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
