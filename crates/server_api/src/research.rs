use std::collections::HashSet;

use futures::future::join_all;
use gemini_integration::{generate_structured, LanguageModel, StructuredOutput};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shared::domain::{Package, Severity, StoryCard, StoryId, StoryType, Vulnerability};
use tracing::{info, warn};

const MAX_SOURCES: usize = 3;
const MAX_DETAILS_CHARS: usize = 1000;

/// Packages with well-known incident histories, researched before the rest.
pub const NOTABLE_PACKAGES: &[&str] = &[
    "left-pad",
    "event-stream",
    "ua-parser-js",
    "colors",
    "faker",
    "node-ipc",
    "peacenotwar",
    "log4j",
    "lodash",
    "moment",
    "minimist",
    "axios",
    "express",
    "jquery",
    "bootstrap",
    "angular",
    "react",
    "vue",
    "webpack",
    "npm",
    "yarn",
];

pub const STORY_CARD_SYSTEM_PROMPT: &str = "\
You are a security educator who explains vulnerabilities in clear, accessible language.
Your goal is to help developers understand security issues without unnecessary jargon.
Be factual and educational, not alarmist.

When generating story card content:
- Create catchy, memorable titles (like \"The Lodash Saga\" not just \"CVE-2021-23337\")
- Explain what happened in simple terms developers can understand
- Focus on why this matters to someone using the affected package
- Provide actionable remediation steps they can take immediately
- If you know the approximate date of the incident, include it";

pub const HISTORICAL_SYSTEM_PROMPT: &str = "\
You are a security historian who knows about famous npm/JavaScript package security incidents.
Your knowledge includes well-known incidents like:
- left-pad unpublishing (2016) - broke the internet
- event-stream attack (2018) - cryptocurrency wallet theft
- ua-parser-js hijacking (2021) - cryptominer injection
- colors/faker sabotage (2022) - author intentionally broke packages
- node-ipc protestware (2022) - geopolitical protest in code
- Log4Shell (2021) - one of the most severe vulnerabilities ever

When asked about a package, recall if there have been ANY notable security incidents, supply chain attacks,
maintainer drama, or interesting security stories. Historical incidents that are now fixed count too.

Be accurate. If you don't know of any notable incidents for a package, say so clearly.
Only report incidents you're confident actually happened.";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoryCardContent {
    pub title: String,
    pub what_happened: Vec<String>,
    pub why_should_i_care: Vec<String>,
    pub what_should_i_do: Vec<String>,
    #[serde(default)]
    pub incident_date: Option<String>,
}

impl StructuredOutput for StoryCardContent {
    const SCHEMA_HINT: &'static str = r#"{
  "title": string,
  "what_happened": [string],
  "why_should_i_care": [string],
  "what_should_i_do": [string],
  "incident_date": string | null
}"#;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoricalIncident {
    pub has_incident: bool,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub what_happened: Vec<String>,
    #[serde(default)]
    pub why_should_i_care: Vec<String>,
    #[serde(default)]
    pub what_should_i_do: Vec<String>,
    #[serde(default)]
    pub incident_date: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl StructuredOutput for HistoricalIncident {
    const SCHEMA_HINT: &'static str = r#"{
  "has_incident": boolean,
  "package_name": string,
  "title": string | null,
  "severity": "CRITICAL" | "HIGH" | "MEDIUM" | "LOW" | "INFO" | null,
  "what_happened": [string],
  "why_should_i_care": [string],
  "what_should_i_do": [string],
  "incident_date": string | null,
  "sources": [string]
}"#;
}

fn short_digest(input: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..12].to_string()
}

pub fn story_id(vuln: &Vulnerability) -> StoryId {
    StoryId(format!(
        "story_{}",
        short_digest(&format!(
            "{}:{}:{}",
            vuln.vuln_id, vuln.package_name, vuln.package_version
        ))
    ))
}

pub fn historical_story_id(package_name: &str) -> StoryId {
    StoryId(format!(
        "story_{}",
        short_digest(&format!("historical:{package_name}"))
    ))
}

/// One vulnerability per package, the most severe, in first-seen package order.
pub fn dedupe_vulnerabilities(vulns: &[Vulnerability]) -> Vec<Vulnerability> {
    let mut best: Vec<Vulnerability> = Vec::new();
    for vuln in vulns {
        match best
            .iter_mut()
            .find(|kept| kept.package_name == vuln.package_name)
        {
            Some(kept) if vuln.severity > kept.severity => *kept = vuln.clone(),
            Some(_) => {}
            None => best.push(vuln.clone()),
        }
    }
    best
}

fn research_prompt(vuln: &Vulnerability) -> String {
    let details = match vuln.details.as_deref() {
        Some(details) if details.chars().count() > MAX_DETAILS_CHARS => {
            let truncated: String = details.chars().take(MAX_DETAILS_CHARS).collect();
            format!("Details: {truncated}...")
        }
        Some(details) => format!("Details: {details}"),
        None => String::new(),
    };

    format!(
        "Generate educational content for this security vulnerability:

Package: {package}
Version: {version}
Vulnerability ID: {id}
Severity: {severity}
Summary: {summary}
{details}

Generate:
1. A catchy, memorable title for this incident
2. 3-5 bullet points explaining what happened
3. 2-3 bullet points explaining why developers should care
4. 2-3 actionable remediation steps
5. The approximate incident date if known (format: \"YYYY-MM\" or null)",
        package = vuln.package_name,
        version = vuln.package_version,
        id = vuln.vuln_id,
        severity = vuln.severity,
        summary = vuln.summary,
    )
}

async fn research_vulnerability(
    model: &dyn LanguageModel,
    vuln: &Vulnerability,
) -> Option<StoryCardContent> {
    match generate_structured(model, STORY_CARD_SYSTEM_PROMPT, &research_prompt(vuln)).await {
        Ok(content) => Some(content),
        Err(err) => {
            warn!(
                vuln_id = %vuln.vuln_id,
                package = %vuln.package_name,
                error = %err,
                "story research failed"
            );
            None
        }
    }
}

pub fn story_card_from_research(vuln: &Vulnerability, content: StoryCardContent) -> StoryCard {
    StoryCard {
        id: story_id(vuln),
        title: content.title,
        package_name: vuln.package_name.clone(),
        package_version: vuln.package_version.clone(),
        story_type: StoryType::Active,
        severity: Some(vuln.severity),
        what_happened: content.what_happened,
        why_should_i_care: content.why_should_i_care,
        what_should_i_do: content.what_should_i_do,
        incident_date: content.incident_date,
        sources: vuln.references.iter().take(MAX_SOURCES).cloned().collect(),
    }
}

/// Minimal card built straight from advisory data.
pub fn fallback_story_card(vuln: &Vulnerability) -> StoryCard {
    StoryCard {
        id: story_id(vuln),
        title: format!("Security Issue in {}", vuln.package_name),
        package_name: vuln.package_name.clone(),
        package_version: vuln.package_version.clone(),
        story_type: StoryType::Active,
        severity: Some(vuln.severity),
        what_happened: vec![vuln.summary.clone()],
        why_should_i_care: vec![format!("Your version ({}) is affected", vuln.package_version)],
        what_should_i_do: vec![format!(
            "Update {} to a patched version",
            vuln.package_name
        )],
        incident_date: None,
        sources: vuln.references.iter().take(MAX_SOURCES).cloned().collect(),
    }
}

pub async fn generate_story_cards(
    model: &dyn LanguageModel,
    vulnerabilities: &[Vulnerability],
    max_stories: usize,
) -> Vec<StoryCard> {
    if vulnerabilities.is_empty() {
        info!("no vulnerabilities to research");
        return Vec::new();
    }

    let mut unique = dedupe_vulnerabilities(vulnerabilities);
    let unique_packages = unique.len();
    // Stable sort keeps first-seen order among equal severities.
    unique.sort_by(|a, b| b.severity.cmp(&a.severity));
    unique.truncate(max_stories);

    info!(
        total_vulns = vulnerabilities.len(),
        unique_packages,
        generating = unique.len(),
        "story research started"
    );

    let researched = join_all(unique.iter().map(|vuln| research_vulnerability(model, vuln))).await;
    let with_llm_content = researched.iter().filter(|content| content.is_some()).count();

    let cards: Vec<StoryCard> = unique
        .iter()
        .zip(researched)
        .map(|(vuln, content)| match content {
            Some(content) => story_card_from_research(vuln, content),
            None => fallback_story_card(vuln),
        })
        .collect();

    info!(
        stories_generated = cards.len(),
        with_llm_content, "story research complete"
    );
    cards
}

fn historical_prompt(package: &Package) -> String {
    format!(
        "Research this npm package for historical security incidents:

Package: {name}
Version in user's project: {version}

Questions to answer:
1. Has this package ever had a notable security incident, supply chain attack, or maintainer drama?
2. If yes, what happened? When? What was the impact?
3. What can developers learn from this incident?

If there's NO notable incident for this package, set has_incident to false.
If there IS a notable incident, provide:
- A catchy title (like \"The Left-Pad Incident\" or \"The Event-Stream Attack\")
- 3-5 bullet points explaining what happened
- 2-3 bullet points on why developers should care
- 2-3 lessons learned / best practices
- The approximate date (YYYY-MM format)
- Set severity based on impact: CRITICAL (widespread damage), HIGH (significant), MEDIUM (moderate), LOW (minor), INFO (educational)",
        name = package.name,
        version = package.version,
    )
}

async fn research_history(
    model: &dyn LanguageModel,
    package: &Package,
) -> Option<HistoricalIncident> {
    match generate_structured(model, HISTORICAL_SYSTEM_PROMPT, &historical_prompt(package)).await {
        Ok(incident) => Some(incident),
        Err(err) => {
            warn!(package = %package.name, error = %err, "historical research failed");
            None
        }
    }
}

pub fn historical_story_card(package: &Package, incident: HistoricalIncident) -> StoryCard {
    let severity = incident
        .severity
        .as_deref()
        .map(Severity::from_label)
        .unwrap_or(Severity::Info);
    StoryCard {
        id: historical_story_id(&package.name),
        title: incident
            .title
            .unwrap_or_else(|| format!("The {} Story", package.name)),
        package_name: package.name.clone(),
        package_version: package.version.clone(),
        story_type: StoryType::HistoricalYours,
        severity: Some(severity),
        what_happened: incident.what_happened,
        why_should_i_care: incident.why_should_i_care,
        what_should_i_do: incident.what_should_i_do,
        incident_date: incident.incident_date,
        sources: incident.sources.into_iter().take(MAX_SOURCES).collect(),
    }
}

/// Notable packages first, then the rest, with a little headroom for misses.
pub fn historical_candidates(clean_packages: &[Package], max_stories: usize) -> Vec<Package> {
    let is_notable = |package: &Package| NOTABLE_PACKAGES.contains(&package.name.to_lowercase().as_str());
    let (mut candidates, others): (Vec<Package>, Vec<Package>) =
        clean_packages.iter().cloned().partition(is_notable);
    candidates.extend(others);
    candidates.truncate(max_stories + 2);
    candidates
}

pub async fn generate_historical_story_cards(
    model: &dyn LanguageModel,
    clean_packages: &[Package],
    max_stories: usize,
) -> Vec<StoryCard> {
    let candidates = historical_candidates(clean_packages, max_stories);
    if candidates.is_empty() {
        return Vec::new();
    }

    info!(candidates = candidates.len(), "historical research started");

    let researched = join_all(candidates.iter().map(|package| research_history(model, package))).await;

    let mut cards = Vec::new();
    for (package, incident) in candidates.iter().zip(researched) {
        if cards.len() >= max_stories {
            break;
        }
        match incident {
            Some(incident)
                if incident.has_incident
                    && incident.title.as_deref().is_some_and(|title| !title.is_empty()) =>
            {
                cards.push(historical_story_card(package, incident));
            }
            _ => {}
        }
    }

    info!(
        researched = candidates.len(),
        with_incidents = cards.len(),
        "historical research complete"
    );
    cards
}

/// Clean packages are those whose name (case-insensitively) has no finding.
pub fn clean_packages(packages: &[Package], vulnerabilities: &[Vulnerability]) -> Vec<Package> {
    let vulnerable: HashSet<String> = vulnerabilities
        .iter()
        .map(|vuln| vuln.package_name.to_lowercase())
        .collect();
    packages
        .iter()
        .filter(|package| !vulnerable.contains(&package.name.to_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "tests/research_tests.rs"]
mod tests;
