//! Screen state machine: upload, stories, generating, comic.
//!
//! `ViewModel` is plain data plus synchronous transitions. Network calls live
//! in the controller, which holds tickets between starting and finishing an
//! operation so late results can be recognised.

use std::{collections::HashSet, fmt};

use shared::domain::{GeneratedComic, HistoryEntryId, ScanResult, StoryCard, StoryId};
use thiserror::Error;

pub const SCAN_FALLBACK_MESSAGE: &str = "Failed to scan file. Please try again.";
pub const GENERATE_FALLBACK_MESSAGE: &str = "Failed to generate comic. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Upload,
    Stories,
    Generating,
    Comic,
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Screen::Upload => "upload",
            Screen::Stories => "stories",
            Screen::Generating => "generating",
            Screen::Comic => "comic",
        })
    }
}

/// Each variant carries exactly what its screen shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewState {
    #[default]
    Upload,
    Stories {
        scan: ScanResult,
    },
    Generating {
        scan: ScanResult,
        story: StoryCard,
    },
    Comic {
        scan: ScanResult,
        story: StoryCard,
        comic: GeneratedComic,
    },
}

impl ViewState {
    pub fn screen(&self) -> Screen {
        match self {
            ViewState::Upload => Screen::Upload,
            ViewState::Stories { .. } => Screen::Stories,
            ViewState::Generating { .. } => Screen::Generating,
            ViewState::Comic { .. } => Screen::Comic,
        }
    }

    pub fn scan(&self) -> Option<&ScanResult> {
        match self {
            ViewState::Upload => None,
            ViewState::Stories { scan }
            | ViewState::Generating { scan, .. }
            | ViewState::Comic { scan, .. } => Some(scan),
        }
    }

    pub fn selected_story(&self) -> Option<&StoryCard> {
        match self {
            ViewState::Generating { story, .. } | ViewState::Comic { story, .. } => Some(story),
            _ => None,
        }
    }

    pub fn comic(&self) -> Option<&GeneratedComic> {
        match self {
            ViewState::Comic { comic, .. } => Some(comic),
            _ => None,
        }
    }

    fn into_scan(self) -> Option<ScanResult> {
        match self {
            ViewState::Upload => None,
            ViewState::Stories { scan }
            | ViewState::Generating { scan, .. }
            | ViewState::Comic { scan, .. } => Some(scan),
        }
    }
}

/// What the stories screen lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoryListing<'a> {
    /// No stories at all: show the "at peace" empty state.
    AtPeace,
    Cards(&'a [StoryCard]),
}

impl<'a> StoryListing<'a> {
    pub fn of(scan: &'a ScanResult) -> Self {
        if scan.story_cards.is_empty() {
            StoryListing::AtPeace
        } else {
            StoryListing::Cards(&scan.story_cards)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("a scan is already in progress")]
    ScanInFlight,
    #[error("cannot upload from the {0} screen; start over first")]
    NotOnUpload(Screen),
    #[error("no scan result to pick a story from")]
    NoScan,
    #[error("story '{0}' is not part of the current scan")]
    UnknownStory(StoryId),
    #[error("a comic for story '{0}' is already being generated")]
    AlreadyGenerating(StoryId),
    #[error("nothing to go back from on the {0} screen")]
    CannotGoBack(Screen),
}

#[derive(Debug)]
pub struct ScanTicket {
    epoch: u64,
}

#[derive(Debug)]
pub struct GenerateTicket {
    epoch: u64,
    story: StoryCard,
    history_entry: Option<HistoryEntryId>,
}

impl GenerateTicket {
    pub fn story(&self) -> &StoryCard {
        &self.story
    }

    /// History entry of the scan the story came from, captured at request time.
    pub fn history_entry(&self) -> Option<&HistoryEntryId> {
        self.history_entry.as_ref()
    }
}

/// Owned copy of the model for presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub view: ViewState,
    pub error: Option<String>,
    pub scan_pending: bool,
    /// Sorted for stable rendering.
    pub generating: Vec<StoryId>,
    pub history_entry: Option<HistoryEntryId>,
}

impl ViewSnapshot {
    pub fn screen(&self) -> Screen {
        self.view.screen()
    }

    pub fn is_generating(&self, story_id: &StoryId) -> bool {
        self.generating.contains(story_id)
    }

    pub fn listing(&self) -> Option<StoryListing<'_>> {
        self.view.scan().map(StoryListing::of)
    }
}

#[derive(Debug, Default)]
pub struct ViewModel {
    view: ViewState,
    error: Option<String>,
    scan_pending: bool,
    generating: HashSet<StoryId>,
    epoch: u64,
    history_entry: Option<HistoryEntryId>,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_generating(&self, story_id: &StoryId) -> bool {
        self.generating.contains(story_id)
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let mut generating: Vec<_> = self.generating.iter().cloned().collect();
        generating.sort();
        ViewSnapshot {
            view: self.view.clone(),
            error: self.error.clone(),
            scan_pending: self.scan_pending,
            generating,
            history_entry: self.history_entry.clone(),
        }
    }

    pub fn begin_scan(&mut self) -> Result<ScanTicket, TransitionError> {
        if self.scan_pending {
            return Err(TransitionError::ScanInFlight);
        }
        if !matches!(self.view, ViewState::Upload) {
            return Err(TransitionError::NotOnUpload(self.view.screen()));
        }
        self.scan_pending = true;
        self.error = None;
        Ok(ScanTicket { epoch: self.epoch })
    }

    /// Returns `false` when the ticket predates a reset and the view is unchanged.
    pub fn complete_scan(
        &mut self,
        ticket: ScanTicket,
        scan: ScanResult,
        history_entry: Option<HistoryEntryId>,
    ) -> bool {
        self.scan_pending = false;
        if ticket.epoch != self.epoch {
            return false;
        }
        self.history_entry = history_entry;
        self.view = ViewState::Stories { scan };
        true
    }

    pub fn fail_scan(&mut self, ticket: ScanTicket, message: String) -> bool {
        self.scan_pending = false;
        if ticket.epoch != self.epoch {
            return false;
        }
        self.error = Some(message);
        true
    }

    /// Selects `story_id` and moves to the generating screen. Any comic on
    /// screen is discarded first.
    pub fn begin_generate(
        &mut self,
        story_id: &StoryId,
    ) -> Result<GenerateTicket, TransitionError> {
        let story = self
            .view
            .scan()
            .ok_or(TransitionError::NoScan)?
            .story(story_id)
            .cloned()
            .ok_or_else(|| TransitionError::UnknownStory(story_id.clone()))?;
        if self.generating.contains(story_id) {
            return Err(TransitionError::AlreadyGenerating(story_id.clone()));
        }

        let scan = std::mem::take(&mut self.view)
            .into_scan()
            .ok_or(TransitionError::NoScan)?;
        self.view = ViewState::Generating {
            scan,
            story: story.clone(),
        };
        self.error = None;
        self.generating.insert(story_id.clone());
        Ok(GenerateTicket {
            epoch: self.epoch,
            story,
            history_entry: self.history_entry.clone(),
        })
    }

    /// Shows `comic` if the ticket's story is still the one being generated.
    /// Returns whether the view changed.
    pub fn complete_generate(&mut self, ticket: &GenerateTicket, comic: GeneratedComic) -> bool {
        if !self.settle(ticket) {
            return false;
        }
        match std::mem::take(&mut self.view) {
            ViewState::Generating { scan, story } => {
                self.view = ViewState::Comic { scan, story, comic };
                true
            }
            other => {
                self.view = other;
                false
            }
        }
    }

    /// Reverts to the story list with `message` if the ticket is current.
    pub fn fail_generate(&mut self, ticket: &GenerateTicket, message: String) -> bool {
        if !self.settle(ticket) {
            return false;
        }
        match std::mem::take(&mut self.view) {
            ViewState::Generating { scan, .. } => {
                self.view = ViewState::Stories { scan };
                self.error = Some(message);
                true
            }
            other => {
                self.view = other;
                false
            }
        }
    }

    /// Clears the in-flight marker, whatever the epoch, and reports whether
    /// the result still belongs on screen.
    fn settle(&mut self, ticket: &GenerateTicket) -> bool {
        self.generating.remove(&ticket.story.id);
        if ticket.epoch != self.epoch {
            return false;
        }
        matches!(
            &self.view,
            ViewState::Generating { story, .. } if story.id == ticket.story.id
        )
    }

    /// Comic (or a pending generation) back to the story list.
    pub fn back(&mut self) -> Result<(), TransitionError> {
        match std::mem::take(&mut self.view) {
            ViewState::Generating { scan, .. } | ViewState::Comic { scan, .. } => {
                self.view = ViewState::Stories { scan };
                Ok(())
            }
            other => {
                let screen = other.screen();
                self.view = other;
                Err(TransitionError::CannotGoBack(screen))
            }
        }
    }

    /// Back to upload with the screen state dropped. Requests already in
    /// flight keep their markers until they settle, but their results no
    /// longer change the view.
    pub fn start_over(&mut self) {
        self.view = ViewState::Upload;
        self.error = None;
        self.history_entry = None;
        self.epoch += 1;
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
