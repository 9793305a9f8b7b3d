use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::{Package, Severity, Vulnerability};
use tracing::{info, warn};

pub const DEFAULT_OSV_URL: &str = "https://api.osv.dev/v1/query";
pub const OSV_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REFERENCES: usize = 5;

#[async_trait]
pub trait VulnerabilityDatabase: Send + Sync {
    /// Known vulnerabilities for one package. Lookup failures yield an empty list.
    async fn query(&self, package: &Package) -> Vec<Vulnerability>;
}

#[derive(Debug, Serialize)]
struct OsvQuery<'a> {
    package: OsvQueryPackage<'a>,
    version: &'a str,
}

#[derive(Debug, Serialize)]
struct OsvQueryPackage<'a> {
    name: &'a str,
    ecosystem: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct OsvResponse {
    #[serde(default)]
    pub vulns: Vec<OsvVulnerability>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsvVulnerability {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub details: Option<String>,
    pub references: Vec<OsvReference>,
    pub severity: Vec<OsvSeverity>,
    pub database_specific: Option<OsvDatabaseSpecific>,
    pub affected: Vec<OsvAffected>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsvReference {
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsvSeverity {
    /// Either a numeric CVSS score or a CVSS vector string.
    pub score: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsvDatabaseSpecific {
    pub severity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsvAffected {
    pub package: Option<OsvAffectedPackage>,
    pub ranges: Vec<OsvRange>,
    pub versions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsvAffectedPackage {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsvRange {
    pub events: Vec<OsvEvent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OsvEvent {
    pub introduced: Option<String>,
    pub fixed: Option<String>,
}

pub fn severity_from_cvss(score: f64) -> Severity {
    if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else if score >= 0.1 {
        Severity::Low
    } else {
        Severity::Info
    }
}

/// A numeric CVSS score wins; otherwise the advisory database's own label.
pub fn extract_severity(vuln: &OsvVulnerability) -> Severity {
    if let Some(score) = vuln
        .severity
        .iter()
        .find_map(|entry| entry.score.as_ref().and_then(Value::as_f64))
    {
        return severity_from_cvss(score);
    }

    vuln.database_specific
        .as_ref()
        .and_then(|db| db.severity.as_deref())
        .filter(|label| !label.is_empty())
        .map(Severity::from_label)
        .unwrap_or(Severity::Info)
}

pub fn extract_affected_versions(vuln: &OsvVulnerability, package_name: &str) -> String {
    let matching = vuln.affected.iter().filter(|affected| {
        affected
            .package
            .as_ref()
            .and_then(|pkg| pkg.name.as_deref())
            .is_some_and(|name| name.eq_ignore_ascii_case(package_name))
    });

    for affected in matching {
        for range in &affected.ranges {
            let mut introduced = None;
            let mut fixed = None;
            for event in &range.events {
                if let Some(value) = event.introduced.as_deref() {
                    introduced = Some(value);
                }
                if let Some(value) = event.fixed.as_deref() {
                    fixed = Some(value);
                }
            }

            match (introduced.filter(|v| !v.is_empty()), fixed.filter(|v| !v.is_empty())) {
                (Some(introduced), Some(fixed)) if introduced != "0" => {
                    return format!(">={introduced}, <{fixed}")
                }
                (_, Some(fixed)) => return format!("<{fixed}"),
                (Some(introduced), None) => return format!(">={introduced}"),
                (None, None) => {}
            }
        }

        match affected.versions.as_slice() {
            [] => {}
            versions if versions.len() <= 3 => return versions.join(", "),
            [first, rest @ ..] => return format!("{first} and {} more", rest.len()),
        }
    }

    "unknown".to_string()
}

pub fn to_vulnerability(vuln: &OsvVulnerability, package: &Package) -> Vulnerability {
    Vulnerability {
        vuln_id: vuln.id.clone().unwrap_or_else(|| "UNKNOWN".into()),
        package_name: package.name.clone(),
        package_version: package.version.clone(),
        affected_versions: extract_affected_versions(vuln, &package.name),
        severity: extract_severity(vuln),
        summary: vuln
            .summary
            .clone()
            .unwrap_or_else(|| "No summary available".into()),
        details: vuln.details.clone(),
        references: vuln
            .references
            .iter()
            .filter_map(|reference| reference.url.clone())
            .take(MAX_REFERENCES)
            .collect(),
    }
}

pub struct OsvClient {
    http: Client,
    url: String,
}

impl OsvClient {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: Client::builder().timeout(OSV_TIMEOUT).build()?,
            url: url.into(),
        })
    }

    async fn fetch(&self, package: &Package) -> Result<OsvResponse, reqwest::Error> {
        let query = OsvQuery {
            package: OsvQueryPackage {
                name: &package.name,
                ecosystem: package.ecosystem.osv_name(),
            },
            version: &package.version,
        };
        self.http
            .post(&self.url)
            .json(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl VulnerabilityDatabase for OsvClient {
    async fn query(&self, package: &Package) -> Vec<Vulnerability> {
        match self.fetch(package).await {
            Ok(response) => response
                .vulns
                .iter()
                .map(|vuln| to_vulnerability(vuln, package))
                .collect(),
            Err(err) => {
                warn!(
                    package = %package.name,
                    version = %package.version,
                    status = err.status().map(|s| s.as_u16()),
                    timeout = err.is_timeout(),
                    error = %err,
                    "osv query failed"
                );
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsvScan {
    pub package_count: u32,
    pub vulnerabilities: Vec<Vulnerability>,
    pub clean_count: u32,
}

/// Queries every package concurrently and aggregates the findings.
pub async fn scan_packages(db: &dyn VulnerabilityDatabase, packages: &[Package]) -> OsvScan {
    info!(package_count = packages.len(), "osv scan started");

    let results = join_all(packages.iter().map(|package| db.query(package))).await;

    let mut vulnerabilities = Vec::new();
    let mut vulnerable_packages = HashSet::new();
    for (package, found) in packages.iter().zip(results) {
        if !found.is_empty() {
            vulnerable_packages.insert(format!("{}@{}", package.name, package.version));
            vulnerabilities.extend(found);
        }
    }

    let package_count = packages.len();
    let clean_count = package_count.saturating_sub(vulnerable_packages.len());
    info!(
        total_packages = package_count,
        vulnerable_packages = vulnerable_packages.len(),
        total_vulnerabilities = vulnerabilities.len(),
        clean_packages = clean_count,
        "osv scan complete"
    );

    OsvScan {
        package_count: u32::try_from(package_count).unwrap_or(u32::MAX),
        vulnerabilities,
        clean_count: u32::try_from(clean_count).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
#[path = "tests/osv_tests.rs"]
mod tests;
