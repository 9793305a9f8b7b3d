//! Plain-text screens drawn from controller snapshots.

use std::fmt::Write as _;

use client_core::{StoryListing, ViewSnapshot, ViewState};
use shared::domain::{GeneratedComic, ScanHistoryEntry, ScanResult, StoryCard};

pub const AT_PEACE_MESSAGE: &str =
    "No known vulnerabilities in your dependencies. They are at peace.";

pub fn screen(snapshot: &ViewSnapshot) -> String {
    let mut out = String::new();
    match &snapshot.view {
        ViewState::Upload => {
            if snapshot.scan_pending {
                out.push_str("Scanning...\n");
            } else {
                out.push_str("Upload a package.json to begin: upload <path>\n");
            }
        }
        ViewState::Stories { scan } => {
            out.push_str(&scan_header(scan));
            out.push_str(&story_list(snapshot));
        }
        ViewState::Generating { story, .. } => {
            let _ = writeln!(
                out,
                "Generating a comic for \"{}\". This can take a few minutes.",
                story.title
            );
            out.push_str("Type 'back' to return to the stories meanwhile.\n");
        }
        ViewState::Comic { comic, .. } => out.push_str(&comic_view(comic)),
    }
    if let Some(error) = &snapshot.error {
        let _ = writeln!(out, "error: {error}");
    }
    out
}

fn scan_header(scan: &ScanResult) -> String {
    format!(
        "{}: {} packages, {} vulnerabilities, {} clean\n",
        scan.filename,
        scan.package_count,
        scan.vulnerabilities.len(),
        scan.clean_count
    )
}

pub fn story_list(snapshot: &ViewSnapshot) -> String {
    let Some(listing) = snapshot.listing() else {
        return String::new();
    };
    let cards = match listing {
        StoryListing::AtPeace => return format!("{AT_PEACE_MESSAGE}\n"),
        StoryListing::Cards(cards) => cards,
    };

    let mut out = String::new();
    for (index, card) in cards.iter().enumerate() {
        let _ = write!(out, "[{}] {}", index + 1, story_line(card));
        if snapshot.is_generating(&card.id) {
            out.push_str("  (generating...)");
        }
        out.push('\n');
    }
    out.push_str("generate <n> to turn a story into a comic\n");
    out
}

fn story_line(card: &StoryCard) -> String {
    let severity = card
        .severity
        .map(|severity| format!(" {severity}"))
        .unwrap_or_default();
    format!(
        "{} ({}@{}){severity}, {}",
        card.title,
        card.package_name,
        card.package_version,
        card.story_type.label()
    )
}

pub fn comic_view(comic: &GeneratedComic) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{} / {}], {} pages, {} panels",
        comic.title, comic.archetype, comic.art_style, comic.page_count, comic.total_panels
    );
    for page in &comic.pages {
        let _ = writeln!(out, "  page {}: {}", page.page_number, page.image_url);
    }
    let _ = writeln!(out, "share: {}", comic.share_url);
    out
}

pub fn history_list(entries: &[ScanHistoryEntry]) -> String {
    if entries.is_empty() {
        return "No scans yet.\n".into();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}  {}  {}  {} packages, {} comics",
            entry.id,
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.filename,
            entry.package_count,
            entry.comics.len()
        );
    }
    out
}

pub fn history_entry(entry: &ScanHistoryEntry) -> String {
    let mut out = format!(
        "{} scanned {}\n",
        entry.filename,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    out.push_str(&scan_header(&entry.scan_result));
    for card in &entry.scan_result.story_cards {
        let _ = writeln!(out, "  - {}", story_line(card));
    }
    if !entry.comics.is_empty() {
        out.push_str("comics:\n");
        for comic in &entry.comics {
            let _ = writeln!(out, "  {} {}", comic.hash, comic.title);
        }
    }
    out
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
