//! Configuration loading, validation and env substitution.
//!
//! Config files: `registra.toml`, `registra.yaml`, or `registra.json`,
//! searched in `./` then the user config dir. `${ENV_VAR}` placeholders are
//! expanded before parsing and a fixed set of environment variables
//! (`TELEGRAM_API_ID`, `BOT_USERNAME`, `TEMP_PATH`, ...) override file values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config,
        load_from,
    },
    schema::{RegistraConfig, RelayConfig, ServerConfig, StorageConfig, TelegramConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
