use super::*;
use async_trait::async_trait;
use axum::{
    body::{self, Body, HttpBody as _},
    http::Request,
    response::Response,
};
use gemini_integration::{
    Content, GeneratedImage, ImageConversation, ImageModel, LanguageModel, ModelError, TextRequest,
};
use serde_json::Value;
use server_api::osv::VulnerabilityDatabase;
use shared::domain::{Package, Severity, StoryCard, Vulnerability};
use tower::ServiceExt;

const BOUNDARY: &str = "scan-comic-test-boundary";

const STORYBOARD_JSON: &str = r##"{
  "title": "The Lodash Saga",
  "archetype": "SAGA",
  "art_style": "RETRO_COMIC",
  "visual_anchors": { "color_palette": ["#ff0000"], "characters": [], "key_entities": [], "atmosphere": "dramatic", "line_style": "bold" },
  "pages": [{ "page_number": 1, "layout": "splash", "panels": [{ "panel_number": 1, "scene_description": "LODASH title card" }] }]
}"##;

struct OneAdvisory;

#[async_trait]
impl VulnerabilityDatabase for OneAdvisory {
    async fn query(&self, package: &Package) -> Vec<Vulnerability> {
        if package.name != "lodash" {
            return Vec::new();
        }
        vec![Vulnerability {
            vuln_id: "GHSA-35jh-r3h4-6jhm".into(),
            package_name: package.name.clone(),
            package_version: package.version.clone(),
            affected_versions: "<4.17.21".into(),
            severity: Severity::High,
            summary: "Command Injection in lodash".into(),
            details: None,
            references: vec![],
        }]
    }
}

/// Research calls fail (fallback cards); storyboard calls succeed.
struct StoryboardOnly;

#[async_trait]
impl LanguageModel for StoryboardOnly {
    async fn generate(&self, request: TextRequest) -> Result<String, ModelError> {
        if request.prompt.starts_with("Create a comic storyboard") {
            return Ok(STORYBOARD_JSON.into());
        }
        Err(ModelError::EmptyResponse)
    }
}

struct SolidImage;

#[async_trait]
impl ImageModel for SolidImage {
    async fn send(
        &self,
        conversation: &mut ImageConversation,
        prompt: &str,
    ) -> Result<GeneratedImage, ModelError> {
        conversation.record_exchange(Content::user_text(prompt), Content::user_text("ok"));
        Ok(GeneratedImage {
            bytes: b"\x89PNG fake page".to_vec(),
            mime_type: "image/png".into(),
        })
    }
}

async fn test_app(files_dir: &Path) -> Router {
    let api = ApiContext {
        storage: Storage::new("sqlite::memory:").await.expect("db"),
        assets: Arc::new(LocalAssetStore::new(files_dir, "http://localhost:8000/files")),
        vulnerabilities: Arc::new(OneAdvisory),
        language_model: Arc::new(StoryboardOnly),
        image_model: Arc::new(SolidImage),
        settings: ApiSettings::default(),
    };
    build_router(AppState { api }, files_dir).expect("router")
}

fn multipart_upload(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/json\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post(SCAN_ROUTE)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

async fn json_body(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn health_reports_healthy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(Request::get(HEALTH_ROUTE).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn scan_accepts_multipart_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;
    let manifest = br#"{"dependencies": {"lodash": "4.17.15", "chalk": "5.0.0"}}"#;

    let response = app
        .oneshot(multipart_upload(SCAN_FILE_FIELD, "package.json", manifest))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["filename"], "package.json");
    assert_eq!(body["packageCount"], 2);
    assert_eq!(body["cleanCount"], 1);
    assert_eq!(body["storyCards"][0]["title"], "Security Issue in lodash");
    assert_eq!(body["storyCards"][0]["storyType"], "ACTIVE");
    assert_eq!(body["vulnerabilities"][0]["severity"], "HIGH");
}

#[tokio::test]
async fn scan_rejects_unsupported_file_type() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(multipart_upload(SCAN_FILE_FIELD, "requirements.txt", b"flask==2.0"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "INVALID_FILE_TYPE");
    assert!(body["message"]
        .as_str()
        .is_some_and(|message| message.contains("requirements.txt")));
}

#[tokio::test]
async fn scan_reports_oversized_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;
    let content = vec![b' '; MAX_MANIFEST_BYTES + 10];

    let response = app
        .oneshot(multipart_upload(SCAN_FILE_FIELD, "package.json", &content))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "FILE_TOO_LARGE");
    assert_eq!(body["message"], "File exceeds maximum size of 1MB");
}

#[tokio::test]
async fn scan_over_request_limit_with_content_length_is_structured() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;
    let mut request = multipart_upload(SCAN_FILE_FIELD, "package.json", &vec![b' '; 3 << 20]);
    let length = request.body().size_hint().exact().expect("sized body");
    assert!(length as usize > MAX_REQUEST_BYTES);
    request
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "FILE_TOO_LARGE");
}

#[tokio::test]
async fn scan_without_file_field_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(multipart_upload("manifest", "package.json", b"{}"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "PARSE_ERROR");
}

#[tokio::test]
async fn generated_comic_is_shareable_and_served() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;
    let card = StoryCard {
        id: "story_0123456789ab".into(),
        title: "The Lodash Saga".into(),
        package_name: "lodash".into(),
        package_version: "4.17.15".into(),
        story_type: shared::domain::StoryType::Active,
        severity: Some(Severity::High),
        what_happened: vec!["template injection".into()],
        why_should_i_care: vec!["you use it".into()],
        what_should_i_do: vec!["upgrade".into()],
        incident_date: None,
        sources: vec![],
    };
    let request = Request::post(GENERATE_COMIC_ROUTE)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::to_vec(&GenerateComicRequest { story_card: card }).expect("json"),
        ))
        .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let comic: GeneratedComic =
        serde_json::from_value(json_body(response).await).expect("comic");
    assert_eq!(comic.page_count, 1);

    let response = app
        .clone()
        .oneshot(
            Request::get(shared::protocol::comic_route(&comic.comic_hash))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let metadata = json_body(response).await;
    assert_eq!(
        metadata["description"],
        "A saga security comic about The Lodash Saga"
    );

    let page_path = comic.pages[0]
        .image_url
        .strip_prefix("http://localhost:8000")
        .expect("local url")
        .to_string();
    let response = app
        .oneshot(Request::get(page_path).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes.as_ref(), b"\x89PNG fake page");
}

#[tokio::test]
async fn unknown_comic_returns_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::get("/api/comic/com_missing")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "COMIC_NOT_FOUND");
}

#[tokio::test]
async fn cors_allows_configured_frontend() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::get(HEALTH_ROUTE)
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok()),
        Some("http://localhost:3000")
    );
}
