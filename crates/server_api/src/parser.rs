use serde_json::{Map, Value};
use shared::{
    domain::{Ecosystem, Package},
    error::ApiError,
};
use tracing::debug;

pub const MAX_MANIFEST_BYTES: usize = 1024 * 1024;

const SUPPORTED_FILES: &[&str] = &["package.json"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDependencies {
    pub filename: String,
    pub ecosystem: Ecosystem,
    pub packages: Vec<Package>,
    /// Entries that were skipped, with the reason.
    pub parse_errors: Vec<String>,
}

pub trait DependencyParser: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;
    fn parse(&self, content: &str, filename: &str) -> Result<ParsedDependencies, ApiError>;
}

pub struct NpmParser;

impl NpmParser {
    fn collect_section(
        &self,
        manifest: &Map<String, Value>,
        section: &str,
        packages: &mut Vec<Package>,
        parse_errors: &mut Vec<String>,
    ) {
        let entries = match manifest.get(section) {
            None => return,
            Some(Value::Object(entries)) => entries,
            Some(_) => {
                parse_errors.push(format!("'{section}' field is not an object, skipping"));
                return;
            }
        };

        for (name, version) in entries {
            match version {
                Value::String(version) => packages.push(Package {
                    name: name.clone(),
                    version: version.clone(),
                    ecosystem: self.ecosystem(),
                }),
                _ => parse_errors.push(format!("Skipping '{name}': version is not a string")),
            }
        }
    }
}

impl DependencyParser for NpmParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn parse(&self, content: &str, filename: &str) -> Result<ParsedDependencies, ApiError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| ApiError::parse(format!("Invalid JSON: {e}")))?;
        let Value::Object(manifest) = value else {
            return Err(ApiError::parse("package.json must be a JSON object"));
        };

        let mut packages = Vec::new();
        let mut parse_errors = Vec::new();
        self.collect_section(&manifest, "dependencies", &mut packages, &mut parse_errors);
        self.collect_section(&manifest, "devDependencies", &mut packages, &mut parse_errors);

        debug!(
            count = packages.len(),
            errors = parse_errors.len(),
            "npm manifest parsed"
        );

        Ok(ParsedDependencies {
            filename: filename.to_string(),
            ecosystem: self.ecosystem(),
            packages,
            parse_errors,
        })
    }
}

static NPM_PARSER: NpmParser = NpmParser;

/// Picks a parser by filename: `package.json`, `*package.json`, then any `*.json`.
pub fn parser_for(filename: &str) -> Result<&'static dyn DependencyParser, ApiError> {
    let lower = filename.to_lowercase();
    if lower.ends_with("package.json") || lower.ends_with(".json") {
        return Ok(&NPM_PARSER);
    }
    Err(ApiError::invalid_file_type(format!(
        "Unsupported file type: {filename}. Supported: {}",
        SUPPORTED_FILES.join(", ")
    )))
}

pub fn parse_manifest(content: &[u8], filename: &str) -> Result<ParsedDependencies, ApiError> {
    if content.len() > MAX_MANIFEST_BYTES {
        return Err(ApiError::file_too_large());
    }
    let parser = parser_for(filename)?;
    let text = std::str::from_utf8(content)
        .map_err(|_| ApiError::parse("File must be valid UTF-8 text"))?;
    parser.parse(text, filename)
}
