use std::sync::Arc;

use gemini_integration::{ImageModel, LanguageModel, ModelError};
use shared::{
    domain::{ComicHash, GeneratedComic, ScanResult, StoryCard},
    error::{ApiError, ErrorCode},
    protocol::{ComicMetadata, HealthResponse},
};
use storage::{AssetStore, Storage};
use tracing::{info, warn};

pub mod comic;
pub mod osv;
pub mod parser;
pub mod research;
pub mod storyboard;

use comic::{ComicRenderer, RenderError};
use osv::VulnerabilityDatabase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub frontend_url: String,
    pub app_version: String,
    pub max_active_stories: usize,
    pub max_historical_stories: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".into(),
            app_version: env!("CARGO_PKG_VERSION").into(),
            max_active_stories: 3,
            max_historical_stories: 2,
        }
    }
}

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub assets: Arc<dyn AssetStore>,
    pub vulnerabilities: Arc<dyn VulnerabilityDatabase>,
    pub language_model: Arc<dyn LanguageModel>,
    pub image_model: Arc<dyn ImageModel>,
    pub settings: ApiSettings,
}

pub async fn health(ctx: &ApiContext) -> Result<HealthResponse, ApiError> {
    ctx.storage.health_check().await.map_err(internal)?;
    Ok(HealthResponse {
        status: "healthy".into(),
        version: ctx.settings.app_version.clone(),
    })
}

/// Parses an uploaded manifest, checks it against OSV and drafts story cards.
pub async fn scan_file(
    ctx: &ApiContext,
    filename: Option<&str>,
    content: &[u8],
) -> Result<ScanResult, ApiError> {
    let filename = filename.filter(|name| !name.is_empty()).unwrap_or("unknown");
    info!(filename, size_bytes = content.len(), "scan started");

    let parsed = parser::parse_manifest(content, filename)?;
    info!(
        filename,
        count = parsed.packages.len(),
        errors = parsed.parse_errors.len(),
        "packages parsed"
    );

    let scan = osv::scan_packages(ctx.vulnerabilities.as_ref(), &parsed.packages).await;

    let model = ctx.language_model.as_ref();
    let active = research::generate_story_cards(
        model,
        &scan.vulnerabilities,
        ctx.settings.max_active_stories,
    )
    .await;
    let clean = research::clean_packages(&parsed.packages, &scan.vulnerabilities);
    let historical =
        research::generate_historical_story_cards(model, &clean, ctx.settings.max_historical_stories)
            .await;

    let mut story_cards = active;
    let active_stories = story_cards.len();
    story_cards.extend(historical);

    info!(
        filename,
        packages = scan.package_count,
        vulnerabilities = scan.vulnerabilities.len(),
        active_stories,
        total_stories = story_cards.len(),
        clean = scan.clean_count,
        "scan complete"
    );

    Ok(ScanResult {
        filename: parsed.filename,
        package_count: scan.package_count,
        story_cards,
        vulnerabilities: scan.vulnerabilities,
        clean_count: scan.clean_count,
    })
}

/// Storyboards a story card, renders every page and registers the comic.
pub async fn create_comic(ctx: &ApiContext, card: &StoryCard) -> Result<GeneratedComic, ApiError> {
    info!(story_id = %card.id, title = %card.title, "comic request received");

    let storyboard = storyboard::generate_storyboard(ctx.language_model.as_ref(), card)
        .await
        .map_err(model_error)?;

    let renderer = ComicRenderer {
        image_model: ctx.image_model.as_ref(),
        assets: ctx.assets.as_ref(),
        frontend_url: &ctx.settings.frontend_url,
    };
    let comic = renderer.render(&storyboard).await.map_err(render_error)?;

    ctx.storage.save_comic(&comic).await.map_err(internal)?;
    info!(
        comic_hash = %comic.comic_hash,
        title = %comic.title,
        pages = comic.page_count,
        "comic created"
    );
    Ok(comic)
}

pub async fn get_comic(ctx: &ApiContext, comic_hash: &ComicHash) -> Result<ComicMetadata, ApiError> {
    let comic = ctx
        .storage
        .load_comic(comic_hash)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            warn!(comic_hash = %comic_hash, "comic not found");
            ApiError::comic_not_found(comic_hash.as_str())
        })?;
    Ok(ComicMetadata::from(&comic))
}

fn model_error(err: ModelError) -> ApiError {
    match err {
        ModelError::Transport(_) | ModelError::Provider { .. } => ApiError::external("Gemini", err),
        other => ApiError::generation_failed(other.to_string()),
    }
}

fn render_error(err: RenderError) -> ApiError {
    match err {
        RenderError::Model { source, .. } => model_error(source),
        RenderError::Asset { .. } => ApiError::generation_failed(err.to_string()),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
