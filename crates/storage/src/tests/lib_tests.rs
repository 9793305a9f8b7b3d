use super::*;
use shared::domain::{
    Archetype, ArtStyle, GeneratedPage, Severity, StoryCard, StoryId, StoryType, Vulnerability,
};

fn sample_scan(filename: &str) -> ScanResult {
    ScanResult {
        filename: filename.to_string(),
        package_count: 2,
        story_cards: vec![StoryCard {
            id: StoryId::from("story_111111111111"),
            title: "Security Issue in minimist".into(),
            package_name: "minimist".into(),
            package_version: "1.2.0".into(),
            story_type: StoryType::Active,
            severity: Some(Severity::Critical),
            what_happened: vec!["Prototype pollution".into()],
            why_should_i_care: vec!["Your version (1.2.0) is affected".into()],
            what_should_i_do: vec!["Update minimist to a patched version".into()],
            incident_date: None,
            sources: vec![],
        }],
        vulnerabilities: vec![Vulnerability {
            vuln_id: "GHSA-xvch-5gv4-984h".into(),
            package_name: "minimist".into(),
            package_version: "1.2.0".into(),
            affected_versions: "<1.2.6".into(),
            severity: Severity::Critical,
            summary: "Prototype pollution".into(),
            details: None,
            references: vec![],
        }],
        clean_count: 1,
    }
}

fn sample_comic(hash: &str) -> GeneratedComic {
    GeneratedComic {
        comic_hash: ComicHash::from(hash),
        title: "The Minimist Heist".into(),
        archetype: Archetype::Heist,
        art_style: ArtStyle::NoirThriller,
        page_count: 1,
        total_panels: 3,
        pages: vec![GeneratedPage {
            page_number: 1,
            image_url: "http://localhost:8000/files/pages/p1.png".into(),
        }],
        share_url: format!("http://localhost:3000/c/{hash}"),
        generated_at: Utc::now(),
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("history.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn history_entry_embeds_scan_result() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let scan = sample_scan("package.json");

    let id = storage.create_history_entry(&scan).await.expect("create");
    let entry = storage
        .load_history_entry(&id)
        .await
        .expect("load")
        .expect("entry exists");

    assert_eq!(entry.id, id);
    assert_eq!(entry.filename, "package.json");
    assert_eq!(entry.package_count, 2);
    assert_eq!(entry.scan_result, scan);
    assert!(entry.comics.is_empty());
    assert!(entry.report.is_none());
}

#[tokio::test]
async fn history_entries_get_distinct_ids() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let scan = sample_scan("package.json");

    let first = storage.create_history_entry(&scan).await.expect("first");
    let second = storage.create_history_entry(&scan).await.expect("second");
    assert_ne!(first, second);
}

#[tokio::test]
async fn append_comic_is_idempotent_per_hash() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let id = storage
        .create_history_entry(&sample_scan("package.json"))
        .await
        .expect("create");
    let summary = ComicSummary {
        hash: ComicHash::from("com_aaaaaaaaaaaa"),
        title: "The Minimist Heist".into(),
    };

    assert!(storage.append_history_comic(&id, &summary).await.expect("append"));
    assert!(storage.append_history_comic(&id, &summary).await.expect("append again"));

    let other = ComicSummary {
        hash: ComicHash::from("com_bbbbbbbbbbbb"),
        title: "Part Two".into(),
    };
    storage.append_history_comic(&id, &other).await.expect("append other");

    let entry = storage
        .load_history_entry(&id)
        .await
        .expect("load")
        .expect("entry");
    assert_eq!(entry.comics, vec![summary, other]);
}

#[tokio::test]
async fn append_comic_reports_missing_entry() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let appended = storage
        .append_history_comic(
            &HistoryEntryId::from("does-not-exist"),
            &ComicSummary {
                hash: ComicHash::from("com_cccccccccccc"),
                title: "Orphan".into(),
            },
        )
        .await
        .expect("append");
    assert!(!appended);
}

#[tokio::test]
async fn lists_history_newest_first() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let older = storage
        .create_history_entry(&sample_scan("old-package.json"))
        .await
        .expect("older");
    let newer = storage
        .create_history_entry(&sample_scan("new-package.json"))
        .await
        .expect("newer");

    let entries = storage.list_history_entries().await.expect("list");
    let ids: Vec<_> = entries.iter().map(|entry| entry.id.clone()).collect();
    assert_eq!(ids, vec![newer, older]);
}

#[tokio::test]
async fn report_payload_round_trips_opaquely() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let report = serde_json::json!({ "reportId": "rep_1", "status": "PENDING" });
    let id = storage
        .create_history_entry_with_report(&sample_scan("package.json"), Some(&report))
        .await
        .expect("create");

    let entry = storage
        .load_history_entry(&id)
        .await
        .expect("load")
        .expect("entry");
    assert_eq!(entry.report, Some(report));
}

#[tokio::test]
async fn comics_are_stored_by_hash() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let comic = sample_comic("com_dddddddddddd");

    storage.save_comic(&comic).await.expect("save");
    let loaded = storage
        .load_comic(&comic.comic_hash)
        .await
        .expect("load")
        .expect("comic");
    assert_eq!(loaded, comic);

    let missing = storage
        .load_comic(&ComicHash::from("com_missing"))
        .await
        .expect("load missing");
    assert!(missing.is_none());
}

#[test]
fn memory_urls_have_no_sqlite_path() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/history.db?mode=rwc"),
        Some(PathBuf::from("./data/history.db"))
    );
}
