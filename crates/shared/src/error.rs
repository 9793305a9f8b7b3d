use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidFileType,
    FileTooLarge,
    ParseError,
    ComicNotFound,
    GenerationFailed,
    ExternalApiError,
    Internal,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidFileType | ErrorCode::FileTooLarge | ErrorCode::ParseError => 400,
            ErrorCode::ComicNotFound => 404,
            ErrorCode::ExternalApiError => 502,
            ErrorCode::GenerationFailed | ErrorCode::Internal | ErrorCode::Unknown => 500,
        }
    }
}

/// Error body returned by every API route: `{"error": CODE, "message": text}`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    #[serde(rename = "error")]
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_file_type(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFileType, message)
    }

    pub fn file_too_large() -> Self {
        Self::new(ErrorCode::FileTooLarge, "File exceeds maximum size of 1MB")
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn comic_not_found(comic_hash: &str) -> Self {
        Self::new(
            ErrorCode::ComicNotFound,
            format!("comic '{comic_hash}' not found"),
        )
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::GenerationFailed, message)
    }

    pub fn external(service: &str, message: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::ExternalApiError,
            format!("{service} API error: {message}"),
        )
    }

    pub fn status(&self) -> u16 {
        self.code.http_status()
    }
}
