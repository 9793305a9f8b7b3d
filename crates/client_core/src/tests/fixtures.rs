use chrono::{TimeZone, Utc};
use shared::domain::{
    Archetype, ArtStyle, ComicHash, GeneratedComic, GeneratedPage, ScanResult, Severity,
    StoryCard, StoryId, StoryType,
};

pub(crate) fn story(id: &str, package: &str) -> StoryCard {
    StoryCard {
        id: StoryId::from(id),
        title: format!("The {package} Heist"),
        package_name: package.into(),
        package_version: "1.0.0".into(),
        story_type: StoryType::Active,
        severity: Some(Severity::High),
        what_happened: vec!["something slipped in".into()],
        why_should_i_care: vec!["you depend on it".into()],
        what_should_i_do: vec![format!("Update {package}")],
        incident_date: None,
        sources: vec![],
    }
}

pub(crate) fn scan_with(stories: Vec<StoryCard>) -> ScanResult {
    ScanResult {
        filename: "package.json".into(),
        package_count: 5,
        clean_count: 5 - stories.len() as u32,
        story_cards: stories,
        vulnerabilities: vec![],
    }
}

pub(crate) fn two_story_scan() -> ScanResult {
    scan_with(vec![
        story("story_aaaaaaaaaaaa", "minimist"),
        story("story_bbbbbbbbbbbb", "lodash"),
    ])
}

pub(crate) fn comic_for(story: &StoryCard) -> GeneratedComic {
    let hash = ComicHash(format!("com_{}", &story.id.as_str()[6..]));
    GeneratedComic {
        title: story.title.clone(),
        archetype: Archetype::Heist,
        art_style: ArtStyle::NoirThriller,
        page_count: 1,
        total_panels: 3,
        pages: vec![GeneratedPage {
            page_number: 1,
            image_url: format!("http://localhost:8000/files/pages/{hash}_p01.png"),
        }],
        share_url: format!("http://localhost:3000/c/{hash}"),
        generated_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("time"),
        comic_hash: hash,
    }
}
