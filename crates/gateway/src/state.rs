use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    registra_catalog::CommandCatalog,
    registra_config::RegistraConfig,
    registra_relay::{
        Connector, CorrelationEngine, PollSettings, Publisher, RelaySettings, ResponseAggregator,
        SessionManager, TempJanitor,
    },
};

/// Relay tuning derived from the loaded configuration.
#[must_use]
pub fn relay_settings(cfg: &RegistraConfig) -> RelaySettings {
    let relay = &cfg.relay;
    RelaySettings {
        peer: cfg.telegram.bot_username.trim().to_string(),
        structured_prefix: relay.structured_prefix.clone(),
        max_rate_limit_retries: relay.max_rate_limit_retries,
        max_session_regenerations: relay.max_session_regenerations,
        poll: PollSettings {
            timeout: Duration::from_secs(relay.timeout_secs),
            interval: Duration::from_secs(relay.poll_interval_secs),
            capture_cap: relay.capture_cap,
            fetch_window: relay.fetch_window,
        },
    }
}

/// Wire the relay components around `connector`, all rooted at the
/// configured temp directory.
pub fn build_engine(cfg: &RegistraConfig, connector: Arc<dyn Connector>) -> CorrelationEngine {
    let settings = relay_settings(cfg);
    let temp_dir = &cfg.storage.temp_dir;
    let retention = Duration::from_secs(cfg.relay.retention_hours.saturating_mul(3600));

    CorrelationEngine::new(
        Arc::new(SessionManager::new(
            connector,
            settings.max_session_regenerations,
        )),
        ResponseAggregator::new(temp_dir.clone()),
        Publisher::in_dir(temp_dir),
        TempJanitor::new(temp_dir.clone(), retention),
        settings,
    )
}

/// Shared state behind every handler.
pub struct GatewayState {
    pub engine: Arc<CorrelationEngine>,
    pub catalog: Arc<CommandCatalog>,
    pub temp_dir: PathBuf,
    pub frontend_dir: PathBuf,
}

impl GatewayState {
    pub fn new(cfg: &RegistraConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        Arc::new(Self {
            engine: Arc::new(build_engine(cfg, connector)),
            catalog: Arc::new(CommandCatalog::new(cfg.storage.catalog_path.clone())),
            temp_dir: cfg.storage.temp_dir.clone(),
            frontend_dir: cfg.storage.frontend_dir.clone(),
        })
    }
}
