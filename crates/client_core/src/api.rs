//! HTTP client for the scan and comic endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ComicHash, GeneratedComic, ScanResult, StoryCard},
    error::ApiError,
    protocol::{
        comic_route, ComicMetadata, GenerateComicRequest, HealthResponse, GENERATE_COMIC_ROUTE,
        HEALTH_ROUTE, SCAN_FILE_FIELD, SCAN_ROUTE,
    },
};
use tracing::{debug, info};

use crate::error::ClientError;

/// Comic generation can take minutes, so the default is generous.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[async_trait]
pub trait ComicApi: Send + Sync {
    async fn scan(&self, filename: &str, content: Vec<u8>) -> Result<ScanResult, ClientError>;
    async fn generate_comic(&self, story: &StoryCard) -> Result<GeneratedComic, ClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpComicApi {
    http: Client,
    base_url: String,
}

impl HttpComicApi {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl AsRef<str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let response = self.http.get(self.url(HEALTH_ROUTE)).send().await?;
        decode_response(response).await
    }

    pub async fn comic_metadata(
        &self,
        comic_hash: &ComicHash,
    ) -> Result<ComicMetadata, ClientError> {
        let response = self
            .http
            .get(self.url(&comic_route(comic_hash)))
            .send()
            .await?;
        decode_response(response).await
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }
}

#[async_trait]
impl ComicApi for HttpComicApi {
    async fn scan(&self, filename: &str, content: Vec<u8>) -> Result<ScanResult, ClientError> {
        let size = content.len();
        let part = Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str("application/json")?;
        let form = Form::new().part(SCAN_FILE_FIELD, part);

        debug!(filename, size, "uploading manifest");
        let response = self
            .http
            .post(self.url(SCAN_ROUTE))
            .multipart(form)
            .send()
            .await?;
        let scan: ScanResult = decode_response(response).await?;
        info!(
            filename = %scan.filename,
            packages = scan.package_count,
            stories = scan.story_cards.len(),
            "scan complete"
        );
        Ok(scan)
    }

    async fn generate_comic(&self, story: &StoryCard) -> Result<GeneratedComic, ClientError> {
        debug!(story_id = %story.id, package = %story.package_name, "requesting comic");
        let response = self
            .http
            .post(self.url(GENERATE_COMIC_ROUTE))
            .json(&GenerateComicRequest {
                story_card: story.clone(),
            })
            .send()
            .await?;
        let comic: GeneratedComic = decode_response(response).await?;
        info!(comic_hash = %comic.comic_hash, pages = comic.page_count, "comic received");
        Ok(comic)
    }
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        return Err(match serde_json::from_slice::<ApiError>(&body) {
            Ok(error) => ClientError::from_api(status.as_u16(), error),
            Err(_) => ClientError::Decode(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&body).chars().take(200).collect::<String>()
            )),
        });
    }

    serde_json::from_slice(&body).map_err(|err| ClientError::Decode(err.to_string()))
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
