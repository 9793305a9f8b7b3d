use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(StoryId);
string_id!(ComicHash);
string_id!(HistoryEntryId);

/// Declared from least to most severe so the derived ordering ranks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Lenient mapping for free-form severity labels.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" | "MODERATE" => Severity::Medium,
            "LOW" => Severity::Low,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pypi,
}

impl Ecosystem {
    /// Ecosystem name as spelled by the OSV API.
    pub fn osv_name(self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "PyPI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub name: String,
    pub version: String,
    pub ecosystem: Ecosystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub vuln_id: String,
    pub package_name: String,
    /// Version that was queried, not the fixed one.
    pub package_version: String,
    pub affected_versions: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryType {
    Active,
    HistoricalYours,
    HistoricalGeneral,
}

impl StoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            StoryType::Active => "ACTIVE",
            StoryType::HistoricalYours => "HISTORICAL_YOURS",
            StoryType::HistoricalGeneral => "HISTORICAL_GENERAL",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StoryType::Active => "active threat",
            StoryType::HistoricalYours => "from your dependencies' past",
            StoryType::HistoricalGeneral => "from the ecosystem's past",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryCard {
    pub id: StoryId,
    pub title: String,
    pub package_name: String,
    pub package_version: String,
    pub story_type: StoryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    pub what_happened: Vec<String>,
    pub why_should_i_care: Vec<String>,
    pub what_should_i_do: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_date: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Archetype {
    Heist,
    Oops,
    Saga,
    Lurker,
}

impl Archetype {
    pub fn as_str(self) -> &'static str {
        match self {
            Archetype::Heist => "HEIST",
            Archetype::Oops => "OOPS",
            Archetype::Saga => "SAGA",
            Archetype::Lurker => "LURKER",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtStyle {
    EpicScifi,
    NoirThriller,
    RetroComic,
    MinimalXkcd,
    Cyberpunk,
    PropagandaPoster,
}

impl ArtStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtStyle::EpicScifi => "EPIC_SCIFI",
            ArtStyle::NoirThriller => "NOIR_THRILLER",
            ArtStyle::RetroComic => "RETRO_COMIC",
            ArtStyle::MinimalXkcd => "MINIMAL_XKCD",
            ArtStyle::Cyberpunk => "CYBERPUNK",
            ArtStyle::PropagandaPoster => "PROPAGANDA_POSTER",
        }
    }
}

impl fmt::Display for ArtStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPage {
    pub page_number: u32,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedComic {
    pub comic_hash: ComicHash,
    pub title: String,
    pub archetype: Archetype,
    pub art_style: ArtStyle,
    pub page_count: u32,
    pub total_panels: u32,
    pub pages: Vec<GeneratedPage>,
    pub share_url: String,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedComic {
    pub fn summary(&self) -> ComicSummary {
        ComicSummary {
            hash: self.comic_hash.clone(),
            title: self.title.clone(),
        }
    }
}

/// Scan response: everything the stories screen needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub filename: String,
    pub package_count: u32,
    pub story_cards: Vec<StoryCard>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub clean_count: u32,
}

impl ScanResult {
    pub fn story(&self, id: &StoryId) -> Option<&StoryCard> {
        self.story_cards.iter().find(|card| &card.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicSummary {
    pub hash: ComicHash,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryEntry {
    pub id: HistoryEntryId,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub package_count: u32,
    pub scan_result: ScanResult,
    /// Opaque report payload; nothing in the scan/comic flow produces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
    #[serde(default)]
    pub comics: Vec<ComicSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_least_to_most_severe() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn severity_labels_map_moderate_to_medium() {
        assert_eq!(Severity::from_label("moderate"), Severity::Medium);
        assert_eq!(Severity::from_label("HIGH"), Severity::High);
        assert_eq!(Severity::from_label("unheard-of"), Severity::Info);
    }

    #[test]
    fn story_card_uses_camel_case_and_screaming_enums() {
        let card = StoryCard {
            id: StoryId::from("story_abc"),
            title: "The Lodash Saga".into(),
            package_name: "lodash".into(),
            package_version: "4.17.20".into(),
            story_type: StoryType::HistoricalYours,
            severity: Some(Severity::High),
            what_happened: vec!["prototype pollution".into()],
            why_should_i_care: vec![],
            what_should_i_do: vec![],
            incident_date: None,
            sources: vec![],
        };
        let value = serde_json::to_value(&card).expect("json");
        assert_eq!(value["packageName"], "lodash");
        assert_eq!(value["storyType"], "HISTORICAL_YOURS");
        assert_eq!(value["severity"], "HIGH");
        assert_eq!(value["id"], "story_abc");
        assert!(value.get("incidentDate").is_none());
    }
}
