use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        routing::{get, head},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        services::ServeDir,
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{routes, state::GatewayState};

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/secciones", get(routes::sections))
        .route("/comandos", get(routes::commands))
        .route("/consulta", get(routes::dispatch))
        .route("/respuesta", get(routes::latest_response))
        .route("/descargar/{nombre}", get(routes::download))
        .route("/exists/{nombre}", head(routes::exists))
        .route("/debug/tempdir", get(routes::debug_tempdir))
        .nest_service("/temp_files", ServeDir::new(&state.temp_dir))
        .nest_service("/static", ServeDir::new(state.frontend_dir.join("static")))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `bind:port` and serve until the listener fails.
pub async fn start_gateway(bind: &str, port: u16, state: Arc<GatewayState>) -> anyhow::Result<()> {
    if let Err(e) = tokio::fs::create_dir_all(&state.temp_dir).await {
        warn!(dir = %state.temp_dir.display(), error = %e, "cannot create temp dir");
    }
    let sweep = state.engine.janitor().sweep().await;
    info!(removed = sweep.removed.len(), "startup sweep finished");

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let app = build_app(state);

    info!(%addr, "registra gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
