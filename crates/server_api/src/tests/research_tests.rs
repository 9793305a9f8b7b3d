use super::*;
use async_trait::async_trait;
use gemini_integration::{ModelError, TextRequest};
use shared::domain::Ecosystem;
use std::sync::Mutex;

fn vuln(id: &str, package: &str, severity: Severity) -> Vulnerability {
    Vulnerability {
        vuln_id: id.into(),
        package_name: package.into(),
        package_version: "1.0.0".into(),
        affected_versions: "<2.0.0".into(),
        severity,
        summary: format!("{package} is broken"),
        details: None,
        references: (0..5).map(|i| format!("https://example.test/{id}/{i}")).collect(),
    }
}

fn npm(name: &str) -> Package {
    Package {
        name: name.into(),
        version: "1.0.0".into(),
        ecosystem: Ecosystem::Npm,
    }
}

/// Replies based on which package the prompt mentions; unknown packages fail.
struct ScriptedModel {
    replies: Vec<(&'static str, &'static str)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            replies,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: TextRequest) -> Result<String, ModelError> {
        self.prompts
            .lock()
            .expect("prompts")
            .push(request.prompt.clone());
        self.replies
            .iter()
            .find(|(package, _)| request.prompt.contains(&format!("Package: {package}\n")))
            .map(|(_, reply)| reply.to_string())
            .ok_or(ModelError::EmptyResponse)
    }
}

#[test]
fn story_ids_are_stable_hashes() {
    let id = story_id(&vuln("GHSA-1", "lodash", Severity::High));
    assert!(id.as_str().starts_with("story_"));
    assert_eq!(id.as_str().len(), "story_".len() + 12);
    assert_eq!(id, story_id(&vuln("GHSA-1", "lodash", Severity::Low)));
    assert_ne!(id, story_id(&vuln("GHSA-2", "lodash", Severity::High)));
    assert_ne!(historical_story_id("lodash"), historical_story_id("react"));
}

#[test]
fn dedupe_keeps_most_severe_per_package_in_first_seen_order() {
    let deduped = dedupe_vulnerabilities(&[
        vuln("A", "axios", Severity::Medium),
        vuln("B", "lodash", Severity::Low),
        vuln("C", "axios", Severity::Critical),
        vuln("D", "axios", Severity::Critical),
    ]);
    let ids: Vec<_> = deduped.iter().map(|v| v.vuln_id.as_str()).collect();
    assert_eq!(ids, vec!["C", "B"]);
}

#[test]
fn fallback_card_uses_advisory_data() {
    let card = fallback_story_card(&vuln("GHSA-9", "minimist", Severity::Critical));
    assert_eq!(card.title, "Security Issue in minimist");
    assert_eq!(card.what_happened, vec!["minimist is broken".to_string()]);
    assert_eq!(
        card.why_should_i_care,
        vec!["Your version (1.0.0) is affected".to_string()]
    );
    assert_eq!(
        card.what_should_i_do,
        vec!["Update minimist to a patched version".to_string()]
    );
    assert_eq!(card.sources.len(), 3);
    assert_eq!(card.story_type, StoryType::Active);
}

#[tokio::test]
async fn top_stories_use_research_or_fall_back() {
    let model = ScriptedModel::new(vec![(
        "lodash",
        r#"{"title": "The Lodash Saga", "what_happened": ["a"], "why_should_i_care": ["b"], "what_should_i_do": ["c"], "incident_date": "2021-02"}"#,
    )]);
    let vulns = vec![
        vuln("L1", "left-pad", Severity::Low),
        vuln("X1", "lodash", Severity::High),
        vuln("M1", "minimist", Severity::Critical),
        vuln("Q1", "qs", Severity::Medium),
    ];

    let cards = generate_story_cards(&model, &vulns, 3).await;
    let titles: Vec<_> = cards.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Security Issue in minimist", "The Lodash Saga", "Security Issue in qs"]
    );
    assert_eq!(cards[1].incident_date.as_deref(), Some("2021-02"));
    assert_eq!(cards[1].severity, Some(Severity::High));
    assert_eq!(model.prompts.lock().expect("prompts").len(), 3);
}

#[tokio::test]
async fn no_vulnerabilities_means_no_research() {
    let model = ScriptedModel::new(vec![]);
    assert!(generate_story_cards(&model, &[], 3).await.is_empty());
    assert!(model.prompts.lock().expect("prompts").is_empty());
}

#[test]
fn notable_packages_are_researched_first() {
    let packages = vec![npm("my-utils"), npm("chalk"), npm("Lodash"), npm("left-pad"), npm("zod")];
    let names: Vec<_> = historical_candidates(&packages, 2)
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Lodash", "left-pad", "my-utils", "chalk"]);
}

#[tokio::test]
async fn historical_cards_need_an_incident_and_a_title() {
    let model = ScriptedModel::new(vec![
        ("left-pad", r#"{"has_incident": true, "package_name": "left-pad", "title": "The Left-Pad Incident", "severity": "HIGH", "sources": ["a", "b", "c", "d"]}"#),
        ("lodash", r#"{"has_incident": true, "package_name": "lodash", "title": null}"#),
        ("chalk", r#"{"has_incident": false, "package_name": "chalk"}"#),
        ("colors", r#"{"has_incident": true, "package_name": "colors", "title": "Colors Goes Rogue"}"#),
    ]);
    let packages = vec![npm("chalk"), npm("lodash"), npm("left-pad"), npm("colors")];

    let cards = generate_historical_story_cards(&model, &packages, 2).await;
    let titles: Vec<_> = cards.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["The Left-Pad Incident", "Colors Goes Rogue"]);
    assert!(cards
        .iter()
        .all(|c| c.story_type == StoryType::HistoricalYours));
    assert_eq!(cards[0].severity, Some(Severity::High));
    assert_eq!(cards[0].sources.len(), 3);
    assert_eq!(cards[0].id, historical_story_id("left-pad"));
    assert_eq!(cards[1].severity, Some(Severity::Info));
}

#[tokio::test]
async fn empty_incident_titles_are_skipped() {
    let model = ScriptedModel::new(vec![
        ("lodash", r#"{"has_incident": true, "package_name": "lodash", "title": ""}"#),
        ("colors", r#"{"has_incident": true, "package_name": "colors", "title": "Colors Goes Rogue"}"#),
    ]);
    let packages = vec![npm("lodash"), npm("colors")];

    let cards = generate_historical_story_cards(&model, &packages, 2).await;
    let titles: Vec<_> = cards.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Colors Goes Rogue"]);
}

#[test]
fn clean_packages_exclude_vulnerable_names() {
    let packages = vec![npm("Lodash"), npm("react")];
    let clean = clean_packages(&packages, &[vuln("X", "lodash", Severity::High)]);
    assert_eq!(clean, vec![npm("react")]);
}
