use std::{net::SocketAddr, path::Path, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use gemini_integration::{GeminiClient, GeminiConfig};
use server_api::{osv::OsvClient, parser::MAX_MANIFEST_BYTES, ApiContext, ApiSettings};
use shared::{
    domain::{ComicHash, GeneratedComic, ScanResult},
    error::ApiError,
    protocol::{
        ComicMetadata, GenerateComicRequest, HealthResponse, GENERATE_COMIC_ROUTE, HEALTH_ROUTE,
        SCAN_FILE_FIELD, SCAN_ROUTE,
    },
};
use storage::{LocalAssetStore, Storage};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

/// Room above the manifest limit so oversized uploads get a proper error body.
const MAX_REQUEST_BYTES: usize = 2 * MAX_MANIFEST_BYTES;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    init_tracing(&settings.log_level);
    settings.validate()?;

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    tokio::fs::create_dir_all(&settings.local_storage_path)
        .await
        .with_context(|| {
            format!(
                "failed to create local storage dir '{}'",
                settings.local_storage_path
            )
        })?;

    let gemini = Arc::new(GeminiClient::new(GeminiConfig {
        api_key: settings.gemini_api_key.clone(),
        base_url: settings.gemini_base_url.clone(),
        text_model: settings.gemini_text_model.clone(),
        image_model: settings.gemini_image_model.clone(),
        ..GeminiConfig::default()
    })?);
    let api = ApiContext {
        storage,
        assets: Arc::new(LocalAssetStore::new(
            &settings.local_storage_path,
            settings.files_url(),
        )),
        vulnerabilities: Arc::new(OsvClient::new(settings.osv_api_url.clone())?),
        language_model: gemini.clone(),
        image_model: gemini,
        settings: ApiSettings {
            frontend_url: settings.frontend_url.clone(),
            ..ApiSettings::default()
        },
    };

    let app = build_router(
        AppState { api },
        Path::new(&settings.local_storage_path),
    )?;

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, files = %settings.files_url(), "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_router(state: AppState, files_dir: &Path) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.api.settings.frontend_url)?;
    Ok(Router::new()
        .route(HEALTH_ROUTE, get(http_health))
        .route(SCAN_ROUTE, post(http_scan))
        .route(GENERATE_COMIC_ROUTE, post(http_generate_comic))
        .route("/api/comic/:comic_hash", get(http_get_comic))
        .nest_service("/files", ServeDir::new(files_dir))
        // Enforced while the multipart body is read, so the handler can
        // still answer with FILE_TOO_LARGE.
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(cors)
        .with_state(Arc::new(state)))
}

fn cors_layer(frontend_url: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(frontend_url.trim_end_matches('/'))
        .with_context(|| format!("frontend url '{frontend_url}' is not a valid origin"))?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]))
}

fn http_error(err: ApiError) -> HttpError {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(code = ?err.code, error = %err, "request failed");
    }
    (status, Json(err))
}

fn multipart_error(err: MultipartError) -> HttpError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return http_error(ApiError::file_too_large());
    }
    http_error(ApiError::parse(format!("invalid upload: {}", err.body_text())))
}

async fn http_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, HttpError> {
    server_api::health(&state.api)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_scan(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ScanResult>, HttpError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(SCAN_FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content = field.bytes().await.map_err(multipart_error)?;
        return server_api::scan_file(&state.api, filename.as_deref(), &content)
            .await
            .map(Json)
            .map_err(http_error);
    }

    Err(http_error(ApiError::parse(format!(
        "upload must include a '{SCAN_FILE_FIELD}' field"
    ))))
}

async fn http_generate_comic(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateComicRequest>,
) -> Result<Json<GeneratedComic>, HttpError> {
    server_api::create_comic(&state.api, &request.story_card)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_get_comic(
    State(state): State<Arc<AppState>>,
    UrlPath(comic_hash): UrlPath<String>,
) -> Result<Json<ComicMetadata>, HttpError> {
    server_api::get_comic(&state.api, &ComicHash::from(comic_hash))
        .await
        .map(Json)
        .map_err(http_error)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
