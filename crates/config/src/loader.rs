use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::RegistraConfig,
};

/// Standard config file names, checked in order.
pub const CONFIG_FILENAMES: &[&str] = &[
    "registra.toml",
    "registra.yaml",
    "registra.yml",
    "registra.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<RegistraConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations, then apply
/// environment overrides.
///
/// Search order:
/// 1. `./registra.{toml,yaml,yml,json}`
/// 2. `<user config dir>/registra/registra.{toml,yaml,yml,json}`
///
/// Falls back to [`RegistraConfig::default()`] when nothing is found or the
/// file fails to parse.
pub fn discover_and_load() -> RegistraConfig {
    let mut cfg = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                RegistraConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            RegistraConfig::default()
        },
    };
    apply_env_overrides(&mut cfg);
    cfg
}

/// Load an explicit file, or discover one when `path` is `None`.
pub fn load_from(path: Option<&Path>) -> Result<RegistraConfig> {
    match path {
        Some(path) => {
            let mut cfg = load_config(path)?;
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        },
        None => Ok(discover_and_load()),
    }
}

/// First config file present in the standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .chain(config_dir().into_iter().flat_map(|dir| {
            CONFIG_FILENAMES
                .iter()
                .map(move |name| dir.join(name))
        }))
        .find(|p| p.exists())
}

/// User-global config directory (`~/.config/registra/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "registra").map(|d| d.config_dir().to_path_buf())
}

/// Apply the environment variables the deployment scripts set.
pub fn apply_env_overrides(cfg: &mut RegistraConfig) {
    apply_overrides_with(cfg, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides_with(
    cfg: &mut RegistraConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(raw) = get("TELEGRAM_API_ID") {
        match raw.trim().parse() {
            Ok(id) => cfg.telegram.api_id = id,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid TELEGRAM_API_ID"),
        }
    }
    if let Some(hash) = get("TELEGRAM_API_HASH") {
        cfg.telegram.api_hash = secrecy::Secret::new(hash);
    }
    if let Some(name) = get("TELEGRAM_SESSION") {
        cfg.telegram.session_name = name;
    }
    if let Some(bot) = get("BOT_USERNAME") {
        cfg.telegram.bot_username = bot;
    }
    if let Some(dir) = get("TEMP_PATH") {
        cfg.storage.temp_dir = PathBuf::from(dir);
    }
}

/// Parse `raw` according to the extension of `path`.
pub fn parse_config(raw: &str, path: &Path) -> Result<RegistraConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            ext: ext.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn parses_every_supported_format() {
        let toml = parse_config("[server]\nport = 9000\n", Path::new("registra.toml")).unwrap();
        assert_eq!(toml.server.port, 9000);

        let yaml = parse_config("server:\n  port: 9001\n", Path::new("registra.yaml")).unwrap();
        assert_eq!(yaml.server.port, 9001);

        let json = parse_config(r#"{"server":{"port":9002}}"#, Path::new("registra.json")).unwrap();
        assert_eq!(json.server.port, 9002);
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = parse_config("", Path::new("registra.ini")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { ext } if ext == "ini"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("registra.toml")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registra.toml");
        std::fs::write(&path, "[telegram]\nbot_username = \"ConsultaBot\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.telegram.bot_username, "ConsultaBot");
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = RegistraConfig::default();
        cfg.telegram.bot_username = "FromFile".into();
        apply_overrides_with(&mut cfg, |name| match name {
            "TELEGRAM_API_ID" => Some("777".into()),
            "TELEGRAM_API_HASH" => Some("hash".into()),
            "TELEGRAM_SESSION" => Some("Otra".into()),
            "BOT_USERNAME" => Some("ConsultaBot".into()),
            "TEMP_PATH" => Some("/tmp/registra".into()),
            _ => None,
        });
        assert_eq!(cfg.telegram.api_id, 777);
        assert_eq!(cfg.telegram.api_hash.expose_secret(), "hash");
        assert_eq!(cfg.telegram.session_name, "Otra");
        assert_eq!(cfg.telegram.bot_username, "ConsultaBot");
        assert_eq!(cfg.storage.temp_dir, PathBuf::from("/tmp/registra"));
    }

    #[test]
    fn invalid_or_blank_overrides_are_ignored() {
        let mut cfg = RegistraConfig::default();
        cfg.telegram.api_id = 5;
        apply_overrides_with(&mut cfg, |name| match name {
            "TELEGRAM_API_ID" => Some("not-a-number".into()),
            "BOT_USERNAME" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(cfg.telegram.api_id, 5);
        assert!(cfg.telegram.bot_username.is_empty());
    }
}
