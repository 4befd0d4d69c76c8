//! Syntactic validation of outgoing commands.

/// Prefix that marks a structured command (`/nm nombre|paterno|materno`).
pub const DEFAULT_STRUCTURED_PREFIX: &str = "/nm";

/// Number of pipe-separated fields a structured command must carry.
pub const STRUCTURED_FIELD_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("⚠️ Comando vacío.")]
    Empty,

    #[error("⚠️ Formato inválido. Usa: {prefix} nombre|apellidopaterno|apellidomaterno")]
    InvalidStructure { prefix: String, fields: usize },
}

/// A command that passed validation and may be sent to the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    raw: String,
    structured: bool,
}

impl Command {
    /// Validate `raw`.
    ///
    /// Commands starting with `prefix` must split into exactly three non-empty
    /// pipe-separated fields (the first one counted after the prefix). Any
    /// other non-blank text is accepted verbatim.
    pub fn parse(raw: &str, prefix: &str) -> Result<Self, CommandError> {
        if raw.trim().is_empty() {
            return Err(CommandError::Empty);
        }

        let structured = !prefix.is_empty() && raw.starts_with(prefix);
        if structured {
            let fields: Vec<&str> = raw[prefix.len()..].split('|').map(str::trim).collect();
            if fields.len() != STRUCTURED_FIELD_COUNT || fields.iter().any(|f| f.is_empty()) {
                return Err(CommandError::InvalidStructure {
                    prefix: prefix.to_string(),
                    fields: fields.len(),
                });
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            structured,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn is_structured(&self) -> bool {
        self.structured
    }
}
