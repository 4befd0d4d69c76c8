mod doctor_commands;
mod login_commands;
mod transport;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    registra_config::RegistraConfig,
    registra_gateway::{GatewayState, build_engine, start_gateway},
    registra_relay::TempJanitor,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "registra", about = "Registra: HTTP relay for a Telegram query bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: discover `registra.{toml,yaml,yml,json}`).
    #[arg(long, global = true, env = "REGISTRA_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default when no subcommand is provided).
    Gateway,
    /// Dispatch one command and print the JSON result.
    Send {
        /// Command text, e.g. `/dni 12345678`.
        command: String,
    },
    /// Log the user session in and write the session file.
    Login,
    /// Remove expired files from the temp directory.
    Sweep,
    /// Validate the configuration.
    Doctor,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RegistraConfig> {
    registra_config::load_from(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("failed to load {}", path.display()),
        None => "failed to load config".into(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "registra starting");

    match cli.command {
        None | Some(Commands::Gateway) => {
            let config = load_config(&cli)?;
            let connector = transport::connector(&config)?;

            let bind = cli.bind.clone().unwrap_or_else(|| config.server.bind.clone());
            let port = cli.port.unwrap_or(config.server.port);

            let state = GatewayState::new(&config, connector);
            start_gateway(&bind, port, state).await
        },
        Some(Commands::Send { ref command }) => {
            let config = load_config(&cli)?;
            let engine = build_engine(&config, transport::connector(&config)?);
            tokio::fs::create_dir_all(&config.storage.temp_dir).await?;

            let response = engine.dispatch(command).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.is_ok() {
                std::process::exit(2);
            }
            Ok(())
        },
        Some(Commands::Login) => {
            let config = load_config(&cli)?;
            login_commands::handle_login(&config).await
        },
        Some(Commands::Sweep) => {
            let config = load_config(&cli)?;
            let retention =
                std::time::Duration::from_secs(config.relay.retention_hours.saturating_mul(3600));
            let janitor = TempJanitor::new(config.storage.temp_dir.clone(), retention);
            let report = janitor.sweep().await;
            println!("removed {} file(s)", report.removed.len());
            if report.failed > 0 {
                eprintln!("{} entr(y/ies) could not be removed", report.failed);
            }
            Ok(())
        },
        Some(Commands::Doctor) => doctor_commands::handle_doctor(cli.config.as_deref()),
    }
}
