use std::{io, path::PathBuf, sync::Arc};

use {
    axum::{
        Json,
        body::Body,
        extract::{self, Query, Request, State},
        http::{
            HeaderMap, HeaderValue, StatusCode,
            header::{CACHE_CONTROL, CONTENT_DISPOSITION, ETAG, EXPIRES, PRAGMA},
        },
        response::{Html, IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tower_http::services::ServeFile,
    tracing::{info, warn},
};

use crate::{
    error::{ApiError, ApiResult},
    state::GatewayState,
};

const FILE_NOT_FOUND: &str = "El archivo no se encontró en el servidor.";
const NO_COMMANDS: &str = "No se encontraron comandos.";
const INDEX_MISSING: &str = "<h3>⚠️ index.html no encontrado en /Frontend</h3>";

type AppState = State<Arc<GatewayState>>;

/// Headers that stop browsers and proxies from caching polled resources.
pub fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    headers
}

/// `temp_dir/<basename of name>`, or `None` when `name` has no file part.
fn temp_file(state: &GatewayState, name: &str) -> Option<(String, PathBuf)> {
    let base = std::path::Path::new(name).file_name()?.to_str()?.to_string();
    let path = state.temp_dir.join(&base);
    Some((base, path))
}

// ── Health & catalog ─────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "msg": "Servidor activo" }))
}

pub async fn sections(State(state): AppState) -> ApiResult<impl IntoResponse> {
    let secciones = state.catalog.sections().await?;
    Ok(Json(json!({ "secciones": secciones })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CommandsQuery {
    pub seccion: Option<String>,
}

pub async fn commands(
    State(state): AppState,
    Query(query): Query<CommandsQuery>,
) -> ApiResult<impl IntoResponse> {
    let comandos = state.catalog.list(query.seccion.as_deref()).await?;
    if comandos.is_empty() {
        return Err(ApiError::not_found(NO_COMMANDS));
    }
    Ok(Json(json!({ "total": comandos.len(), "comandos": comandos })))
}

// ── Relay ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct DispatchQuery {
    #[serde(default)]
    pub comando: String,
}

pub async fn dispatch(
    State(state): AppState,
    Query(query): Query<DispatchQuery>,
) -> ApiResult<Response> {
    if let Err(e) = tokio::fs::create_dir_all(&state.temp_dir).await {
        return Err(ApiError::internal(format!(
            "No se pudo crear el directorio temporal: {e}"
        )));
    }

    info!(command = %query.comando, "dispatch requested");
    match state.engine.dispatch(&query.comando).await {
        Ok(response) if response.is_ok() => Ok(Json(response).into_response()),
        Ok(response) => Err(ApiError::internal(response.text)),
        Err(e) => {
            warn!(error = %e, "dispatch failed");
            Err(ApiError::internal(e.to_string()))
        },
    }
}

pub async fn latest_response(State(state): AppState) -> ApiResult<Response> {
    let publisher = state.engine.publisher();
    let read_failed = |e: registra_relay::Error| {
        ApiError::internal(format!("No se pudo leer la respuesta: {e}"))
    };

    let Some(document) = publisher.read().await.map_err(read_failed)? else {
        return Ok((
            StatusCode::NO_CONTENT,
            no_cache_headers(),
            Json(json!({ "texto": "", "archivo": null })),
        )
            .into_response());
    };

    let mut headers = no_cache_headers();
    if let Some(secs) = publisher.modified_epoch().await.map_err(read_failed)? {
        headers.insert(ETAG, HeaderValue::from(secs));
    }
    Ok((headers, Json(document)).into_response())
}

// ── Artifacts ────────────────────────────────────────────────────────────────

pub async fn download(
    State(state): AppState,
    extract::Path(nombre): extract::Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let Some((base, path)) = temp_file(&state, &nombre) else {
        return Err(ApiError::not_found(FILE_NOT_FOUND));
    };
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {},
        Ok(_) => return Err(ApiError::not_found(FILE_NOT_FOUND)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(FILE_NOT_FOUND));
        },
        Err(e) => return Err(ApiError::internal(e.to_string())),
    }

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let served = ServeFile::new_with_mime(&path, &mime)
        .try_call(request)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if served.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::not_found(FILE_NOT_FOUND));
    }

    let mut response = served.map(Body::new);
    let headers = response.headers_mut();
    headers.extend(no_cache_headers());
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{base}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(CONTENT_DISPOSITION, disposition);

    Ok(response)
}

pub async fn exists(
    State(state): AppState,
    extract::Path(nombre): extract::Path<String>,
) -> Response {
    let found = match temp_file(&state, &nombre) {
        Some((_, path)) => tokio::fs::metadata(&path)
            .await
            .is_ok_and(|meta| meta.is_file()),
        None => false,
    };
    if found {
        (StatusCode::NO_CONTENT, no_cache_headers()).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

// ── Frontend & diagnostics ───────────────────────────────────────────────────

pub async fn index(State(state): AppState) -> Response {
    match tokio::fs::read_to_string(state.frontend_dir.join("index.html")).await {
        Ok(html) => (no_cache_headers(), Html(html)).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html(INDEX_MISSING)).into_response(),
    }
}

pub async fn debug_tempdir(State(state): AppState) -> impl IntoResponse {
    let mut archivos = Vec::new();
    let exists = match tokio::fs::read_dir(&state.temp_dir).await {
        Ok(mut entries) => {
            while let Ok(Some(entry)) = entries.next_entry().await {
                archivos.push(entry.file_name().to_string_lossy().into_owned());
            }
            true
        },
        Err(_) => false,
    };
    archivos.sort();

    Json(json!({
        "TEMP_DIR": state.temp_dir.display().to_string(),
        "exists": exists,
        "archivos": archivos,
    }))
}
