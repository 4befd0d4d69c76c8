//! Configuration validation.
//!
//! Two layers: [`validate_file`] checks a raw file for syntax errors and
//! unknown or misspelled keys; [`validate`] checks the loaded config for
//! values the relay cannot run with.

use std::path::{Path, PathBuf};

use crate::{loader::parse_config, schema::RegistraConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "missing" or "value".
    pub category: &'static str,
    /// Dotted path, e.g. "relay.capture_cap"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: {}", self.severity, self.message)
        } else {
            write!(f, "{}: {}: {}", self.severity, self.path, self.message)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn extend(&mut self, other: Self) {
        self.diagnostics.extend(other.diagnostics);
        if self.config_path.is_none() {
            self.config_path = other.config_path;
        }
    }
}

/// Known keys per section, mirroring `schema.rs`.
const SCHEMA: &[(&str, &[&str])] = &[
    ("server", &["bind", "port"]),
    (
        "telegram",
        &[
            "api_id",
            "api_hash",
            "session_name",
            "session_dir",
            "bot_username",
        ],
    ),
    (
        "storage",
        &["temp_dir", "frontend_dir", "catalog_path"],
    ),
    (
        "relay",
        &[
            "timeout_secs",
            "poll_interval_secs",
            "capture_cap",
            "fetch_window",
            "retention_hours",
            "max_rate_limit_retries",
            "max_session_regenerations",
            "structured_prefix",
        ],
    ),
];

/// Semantic checks on a loaded config.
#[must_use]
pub fn validate(cfg: &RegistraConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let mut missing = |path: &str, what: &str| {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing",
            path,
            format!("{what} is not set"),
        ));
    };

    if cfg.telegram.api_id == 0 {
        missing("telegram.api_id", "API id (TELEGRAM_API_ID)");
    }
    if cfg.telegram.api_hash().is_empty() {
        missing("telegram.api_hash", "API hash (TELEGRAM_API_HASH)");
    }
    if cfg.telegram.session_name.trim().is_empty() {
        missing("telegram.session_name", "session name (TELEGRAM_SESSION)");
    }
    if cfg.telegram.bot_username.trim().is_empty() {
        missing("telegram.bot_username", "target bot (BOT_USERNAME)");
    }

    let relay = &cfg.relay;
    if relay.poll_interval_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "relay.poll_interval_secs",
            "poll interval must be at least 1 second",
        ));
    }
    if relay.capture_cap == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "relay.capture_cap",
            "capture cap must be at least 1",
        ));
    }
    if relay.fetch_window < relay.capture_cap {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "relay.fetch_window",
            format!(
                "fetch window ({}) is smaller than the capture cap ({}), replies may be missed",
                relay.fetch_window, relay.capture_cap
            ),
        ));
    }
    if relay.poll_interval_secs > relay.timeout_secs {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "relay.poll_interval_secs",
            format!(
                "poll interval ({}s) exceeds the timeout ({}s), only one poll will run",
                relay.poll_interval_secs, relay.timeout_secs
            ),
        ));
    }
    if relay.retention_hours == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "relay.retention_hours",
            "zero retention deletes downloads before clients can fetch them",
        ));
    }
    if cfg.server.port == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "value",
            "server.port",
            "port 0 binds a random free port",
        ));
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Syntax and unknown-field checks on a config file.
#[must_use]
pub fn validate_file(path: &Path) -> ValidationResult {
    let mut result = match std::fs::read_to_string(path) {
        Ok(raw) => validate_str(&raw, path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("cannot read {}: {e}", path.display()),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(path.to_path_buf());
    result
}

/// Same as [`validate_file`] for already-read contents; `path` selects the
/// format by extension.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let tree = match parse_tree(raw, path) {
        Ok(tree) => tree,
        Err(message) => {
            diagnostics.push(Diagnostic::new(Severity::Error, "syntax", "", message));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };
    check_unknown_fields(&tree, &mut diagnostics);

    if let Err(e) = parse_config(raw, path) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "syntax",
            "",
            format!("type error: {e}"),
        ));
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn parse_tree(raw: &str, path: &Path) -> Result<serde_json::Value, String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parsed = match ext {
        "toml" => toml::from_str::<toml::Value>(raw)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str::<serde_json::Value>(raw).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(raw).map_err(|e| e.to_string()),
        _ => Err(format!("unsupported config format: .{ext}")),
    };
    parsed.map_err(|e| format!("{ext} syntax error: {e}"))
}

fn check_unknown_fields(tree: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = tree.as_object() else {
        return;
    };
    let sections: Vec<&str> = SCHEMA.iter().map(|(name, _)| *name).collect();

    for (key, value) in root {
        let Some((_, fields)) = SCHEMA.iter().find(|(name, _)| name == key) else {
            diagnostics.push(unknown(key, "at top level ", suggest(key, &sections, 3)));
            continue;
        };
        let Some(table) = value.as_object() else {
            continue;
        };
        for field in table.keys() {
            if !fields.contains(&field.as_str()) {
                diagnostics.push(unknown(&format!("{key}.{field}"), "", suggest(field, fields, 3)));
            }
        }
    }
}

fn unknown(path: &str, level: &str, suggestion: Option<&str>) -> Diagnostic {
    let message = match suggestion {
        Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
        None => format!("unknown field {level}"),
    };
    Diagnostic::new(Severity::Error, "unknown-field", path, message.trim())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}
