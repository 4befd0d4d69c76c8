//! `registra doctor`: config validation and environment audit.
//!
//! Prints one `[ok]`, `[warn]`, `[fail]` or `[info]` line per check and exits
//! non-zero when any check fails.

use std::path::Path;

use {
    anyhow::Result,
    registra_config::{RegistraConfig, Severity, ValidationResult},
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

impl From<Severity> for Status {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }

    fn count(&self, status: Status) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

fn print_report(sections: &[Section]) -> (usize, usize) {
    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
        }
        eprintln!();
    }

    let errors = sections.iter().map(|s| s.count(Status::Fail)).sum();
    let warnings = sections.iter().map(|s| s.count(Status::Warn)).sum();
    (errors, warnings)
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn handle_doctor(explicit: Option<&Path>) -> Result<()> {
    eprintln!("{BOLD}registra doctor{RESET}");
    eprintln!("{BOLD}==============={RESET}\n");

    let path = explicit
        .map(Path::to_path_buf)
        .or_else(registra_config::find_config_file);
    let config = match registra_config::load_from(explicit) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{RED}cannot load config:{RESET} {e}");
            std::process::exit(1);
        },
    };

    let sections = vec![
        check_config(path.as_deref(), &config),
        check_directories(&config),
        check_session(&config),
    ];
    let (errors, warnings) = print_report(&sections);

    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

// ── Checks ──────────────────────────────────────────────────────────────────

fn config_diagnostics(path: Option<&Path>, config: &RegistraConfig) -> ValidationResult {
    let mut result = path.map(registra_config::validate_file).unwrap_or_default();
    result.extend(registra_config::validate(config));
    result
}

fn check_config(path: Option<&Path>, config: &RegistraConfig) -> Section {
    let label = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults + environment".into());
    let mut section = Section::new(format!("Config ({label})"));

    let result = config_diagnostics(path, config);
    if result.diagnostics.is_empty() {
        section.push(Status::Ok, "No problems found");
    }
    for d in &result.diagnostics {
        let message = if d.path.is_empty() {
            d.message.clone()
        } else {
            format!("{}: {}", d.path, d.message)
        };
        section.push(d.severity.into(), message);
    }
    section
}

fn check_directories(config: &RegistraConfig) -> Section {
    let storage = &config.storage;
    let mut section = Section::new("Directories");

    if storage.temp_dir.is_dir() {
        section.push(
            Status::Ok,
            format!("Temp directory: {}", storage.temp_dir.display()),
        );
    } else {
        section.push(
            Status::Info,
            format!(
                "Temp directory {} will be created on first request",
                storage.temp_dir.display()
            ),
        );
    }

    let index = storage.frontend_dir.join("index.html");
    if index.is_file() {
        section.push(Status::Ok, format!("Frontend: {}", index.display()));
    } else {
        section.push(
            Status::Warn,
            format!("Frontend index missing: {}", index.display()),
        );
    }

    match std::fs::read_to_string(&storage.catalog_path) {
        Ok(raw) => match registra_catalog::catalog::parse_catalog(&raw) {
            Ok(sections) => section.push(
                Status::Ok,
                format!(
                    "Command catalog: {} section(s) in {}",
                    sections.len(),
                    storage.catalog_path.display()
                ),
            ),
            Err(e) => section.push(Status::Fail, format!("Command catalog invalid: {e}")),
        },
        Err(e) => section.push(
            Status::Warn,
            format!(
                "Command catalog unreadable ({}): {e}",
                storage.catalog_path.display()
            ),
        ),
    }

    section
}

fn check_session(config: &RegistraConfig) -> Section {
    let mut section = Section::new("Telegram session");
    let creds = crate::transport::credentials(config);
    let path = creds.session_path();

    if path.is_file() {
        section.push(Status::Ok, format!("Session file: {}", path.display()));
    } else {
        section.push(
            Status::Warn,
            format!(
                "Session file {} not found, run `registra login`",
                path.display()
            ),
        );
    }

    if cfg!(feature = "mtproto") {
        section.push(Status::Ok, "MTProto transport compiled in");
    } else {
        section.push(Status::Fail, "Built without the `mtproto` feature");
    }
    section
}
