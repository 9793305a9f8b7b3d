use super::*;
use chrono::{TimeZone, Utc};
use shared::domain::{
    Archetype, ArtStyle, ComicHash, ComicSummary, GeneratedPage, HistoryEntryId, Severity,
    StoryId, StoryType,
};

fn card(id: &str, package: &str) -> StoryCard {
    StoryCard {
        id: StoryId::from(id),
        title: format!("Trouble in {package}"),
        package_name: package.into(),
        package_version: "1.2.0".into(),
        story_type: StoryType::Active,
        severity: Some(Severity::Critical),
        what_happened: vec![],
        why_should_i_care: vec![],
        what_should_i_do: vec![],
        incident_date: None,
        sources: vec![],
    }
}

fn scan(cards: Vec<StoryCard>) -> ScanResult {
    ScanResult {
        filename: "package.json".into(),
        package_count: 3,
        clean_count: 2,
        story_cards: cards,
        vulnerabilities: vec![],
    }
}

fn snapshot(view: ViewState) -> ViewSnapshot {
    ViewSnapshot {
        view,
        error: None,
        scan_pending: false,
        generating: vec![],
        history_entry: None,
    }
}

fn comic() -> GeneratedComic {
    GeneratedComic {
        comic_hash: ComicHash::from("com_0123456789ab"),
        title: "The Minimist Heist".into(),
        archetype: Archetype::Heist,
        art_style: ArtStyle::NoirThriller,
        page_count: 1,
        total_panels: 4,
        pages: vec![GeneratedPage {
            page_number: 1,
            image_url: "http://localhost:8000/files/pages/p1.png".into(),
        }],
        share_url: "http://localhost:3000/c/com_0123456789ab".into(),
        generated_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("time"),
    }
}

#[test]
fn story_list_numbers_cards_and_marks_in_flight_ones() {
    let mut snap = snapshot(ViewState::Stories {
        scan: scan(vec![
            card("story_aaaaaaaaaaaa", "minimist"),
            card("story_bbbbbbbbbbbb", "lodash"),
        ]),
    });
    snap.generating = vec![StoryId::from("story_bbbbbbbbbbbb")];

    let out = screen(&snap);
    assert!(out.starts_with("package.json: 3 packages, 0 vulnerabilities, 2 clean\n"));
    assert!(out.contains("[1] Trouble in minimist (minimist@1.2.0) CRITICAL, active threat\n"));
    assert!(out.contains(
        "[2] Trouble in lodash (lodash@1.2.0) CRITICAL, active threat  (generating...)\n"
    ));
}

#[test]
fn empty_scan_shows_at_peace() {
    let out = screen(&snapshot(ViewState::Stories { scan: scan(vec![]) }));
    assert!(out.contains(AT_PEACE_MESSAGE));
    assert!(!out.contains("[1]"));
}

#[test]
fn errors_are_appended_to_the_screen() {
    let mut snap = snapshot(ViewState::Upload);
    snap.error = Some("Failed to scan file. Please try again.".into());
    let out = screen(&snap);
    assert!(out.starts_with("Upload a package.json"));
    assert!(out.ends_with("error: Failed to scan file. Please try again.\n"));
}

#[test]
fn comic_screen_lists_pages_and_share_link() {
    let out = screen(&snapshot(ViewState::Comic {
        scan: scan(vec![card("story_aaaaaaaaaaaa", "minimist")]),
        story: card("story_aaaaaaaaaaaa", "minimist"),
        comic: comic(),
    }));
    assert!(out.starts_with("The Minimist Heist [HEIST / NOIR_THRILLER], 1 pages, 4 panels\n"));
    assert!(out.contains("  page 1: http://localhost:8000/files/pages/p1.png\n"));
    assert!(out.contains("share: http://localhost:3000/c/com_0123456789ab\n"));
}

#[test]
fn history_renders_entries_and_comics() {
    assert_eq!(history_list(&[]), "No scans yet.\n");

    let entry = ScanHistoryEntry {
        id: HistoryEntryId::from("6f1c"),
        filename: "package.json".into(),
        timestamp: Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 30, 0)
            .single()
            .expect("time"),
        package_count: 3,
        scan_result: scan(vec![card("story_aaaaaaaaaaaa", "minimist")]),
        report: None,
        comics: vec![ComicSummary {
            hash: ComicHash::from("com_0123456789ab"),
            title: "The Minimist Heist".into(),
        }],
    };

    assert_eq!(
        history_list(std::slice::from_ref(&entry)),
        "6f1c  2024-05-01 09:30  package.json  3 packages, 1 comics\n"
    );
    let detail = history_entry(&entry);
    assert!(detail.starts_with("package.json scanned 2024-05-01 09:30:00 UTC\n"));
    assert!(detail.contains("  - Trouble in minimist (minimist@1.2.0) CRITICAL, active threat\n"));
    assert!(detail.ends_with("comics:\n  com_0123456789ab The Minimist Heist\n"));
}
