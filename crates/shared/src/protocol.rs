use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ComicHash, GeneratedComic, GeneratedPage, StoryCard};

pub const HEALTH_ROUTE: &str = "/api/health";
pub const SCAN_ROUTE: &str = "/api/scan";
pub const GENERATE_COMIC_ROUTE: &str = "/api/generate-comic";
pub const COMIC_ROUTE_PREFIX: &str = "/api/comic";

/// Multipart field carrying the uploaded manifest.
pub const SCAN_FILE_FIELD: &str = "file";

pub fn comic_route(comic_hash: &ComicHash) -> String {
    format!("{COMIC_ROUTE_PREFIX}/{comic_hash}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateComicRequest {
    pub story_card: StoryCard,
}

/// Share-page payload for a stored comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicMetadata {
    pub comic_hash: ComicHash,
    pub title: String,
    pub description: String,
    pub page_count: u32,
    pub pages: Vec<GeneratedPage>,
    pub thumbnail_url: String,
    pub generated_at: DateTime<Utc>,
}

impl From<&GeneratedComic> for ComicMetadata {
    fn from(comic: &GeneratedComic) -> Self {
        Self {
            comic_hash: comic.comic_hash.clone(),
            title: comic.title.clone(),
            description: format!(
                "A {} security comic about {}",
                comic.archetype.as_str().to_lowercase(),
                comic.title
            ),
            page_count: comic.page_count,
            pages: comic.pages.clone(),
            thumbnail_url: comic
                .pages
                .first()
                .map(|page| page.image_url.clone())
                .unwrap_or_default(),
            generated_at: comic.generated_at,
        }
    }
}
