use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub backend_url: String,
    pub frontend_url: String,
    pub local_storage_path: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub osv_api_url: String,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8000".into(),
            database_url: "sqlite://./data/server.db".into(),
            backend_url: "http://localhost:8000".into(),
            frontend_url: "http://localhost:3000".into(),
            local_storage_path: "./data/files".into(),
            gemini_api_key: String::new(),
            gemini_base_url: gemini_integration::DEFAULT_BASE_URL.into(),
            gemini_text_model: gemini_integration::DEFAULT_TEXT_MODEL.into(),
            gemini_image_model: gemini_integration::DEFAULT_IMAGE_MODEL.into(),
            osv_api_url: server_api::osv::DEFAULT_OSV_URL.into(),
            log_level: "info".into(),
        }
    }
}

impl Settings {
    /// Public prefix under which stored page images are served.
    pub fn files_url(&self) -> String {
        format!("{}/files", self.backend_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("backend_url", &self.backend_url),
            ("frontend_url", &self.frontend_url),
            ("gemini_base_url", &self.gemini_base_url),
            ("osv_api_url", &self.osv_api_url),
        ] {
            Url::parse(value).with_context(|| format!("{name} '{value}' is not a valid url"))?;
        }
        if self.gemini_api_key.is_empty() {
            tracing::warn!("GEMINI_API_KEY is not set; story research and comics will fail");
        }
        Ok(())
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml` keys, then environment variables.
pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            apply_file(&mut settings, &file_cfg);
        }
    }

    let overrides: [(&[&str], &mut String); 11] = [
        (&["SERVER_BIND", "APP__BIND_ADDR"], &mut settings.server_bind),
        (&["DATABASE_URL", "APP__DATABASE_URL"], &mut settings.database_url),
        (&["BACKEND_URL", "APP__BACKEND_URL"], &mut settings.backend_url),
        (&["FRONTEND_URL", "APP__FRONTEND_URL"], &mut settings.frontend_url),
        (
            &["LOCAL_STORAGE_PATH", "APP__LOCAL_STORAGE_PATH"],
            &mut settings.local_storage_path,
        ),
        (&["GEMINI_API_KEY", "APP__GEMINI_API_KEY"], &mut settings.gemini_api_key),
        (&["GEMINI_BASE_URL"], &mut settings.gemini_base_url),
        (&["GEMINI_TEXT_MODEL"], &mut settings.gemini_text_model),
        (&["GEMINI_IMAGE_MODEL"], &mut settings.gemini_image_model),
        (&["OSV_API_URL"], &mut settings.osv_api_url),
        (&["LOG_LEVEL"], &mut settings.log_level),
    ];
    // Later keys win, so `APP__*` aliases override the plain names.
    for (keys, slot) in overrides {
        for key in keys {
            if let Some(value) = env(*key) {
                *slot = value;
            }
        }
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    let fields: [(&str, &mut String); 11] = [
        ("bind_addr", &mut settings.server_bind),
        ("database_url", &mut settings.database_url),
        ("backend_url", &mut settings.backend_url),
        ("frontend_url", &mut settings.frontend_url),
        ("local_storage_path", &mut settings.local_storage_path),
        ("gemini_api_key", &mut settings.gemini_api_key),
        ("gemini_base_url", &mut settings.gemini_base_url),
        ("gemini_text_model", &mut settings.gemini_text_model),
        ("gemini_image_model", &mut settings.gemini_image_model),
        ("osv_api_url", &mut settings.osv_api_url),
        ("log_level", &mut settings.log_level),
    ];
    for (key, slot) in fields {
        if let Some(value) = file_cfg.get(key) {
            *slot = value.clone();
        }
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

pub(crate) fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
