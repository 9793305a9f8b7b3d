use std::sync::Arc;

use shared::domain::{GeneratedComic, HistoryEntryId, StoryId};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    api::ComicApi,
    history::{AppendOutcome, ScanHistory},
    state::{
        TransitionError, ViewModel, ViewSnapshot, GENERATE_FALLBACK_MESSAGE,
        SCAN_FALLBACK_MESSAGE,
    },
};

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StateChanged(ViewSnapshot),
    HistoryUpdated(HistoryEntryId),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Now on the stories screen. `history_entry` is `None` if recording the
    /// scan failed.
    Completed {
        history_entry: Option<HistoryEntryId>,
    },
    Failed(String),
    /// The user started over while the request was in flight.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Completed(GeneratedComic),
    Failed(String),
    /// A request for this story is still outstanding; nothing was sent.
    Suppressed,
    /// Resolved after the user moved on. A successful comic is still recorded
    /// in history.
    Stale,
}

/// Drives the screen state machine and its two network calls.
///
/// Calls run outside the state lock, so `back`, `start_over` and
/// generation for other stories stay available while a request is pending.
pub struct ViewController {
    api: Arc<dyn ComicApi>,
    history: Arc<dyn ScanHistory>,
    model: Mutex<ViewModel>,
    events: broadcast::Sender<ControllerEvent>,
}

impl ViewController {
    pub fn new(api: Arc<dyn ComicApi>, history: Arc<dyn ScanHistory>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            history,
            model: Mutex::new(ViewModel::new()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        self.model.lock().await.snapshot()
    }

    pub fn history(&self) -> &Arc<dyn ScanHistory> {
        &self.history
    }

    pub async fn upload(
        &self,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<ScanOutcome, TransitionError> {
        let ticket = {
            let mut model = self.model.lock().await;
            let ticket = model.begin_scan()?;
            self.publish(&model);
            ticket
        };

        info!(filename, size = content.len(), "scan started");
        match self.api.scan(filename, content).await {
            Ok(scan) => {
                let history_entry = match self.history.create_entry(&scan).await {
                    Ok(entry_id) => {
                        let _ = self
                            .events
                            .send(ControllerEvent::HistoryUpdated(entry_id.clone()));
                        Some(entry_id)
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "failed to record scan history");
                        None
                    }
                };

                let mut model = self.model.lock().await;
                let applied = model.complete_scan(ticket, scan, history_entry.clone());
                self.publish(&model);
                if !applied {
                    warn!(filename, "scan finished after reset; result discarded");
                    return Ok(ScanOutcome::Stale);
                }
                Ok(ScanOutcome::Completed { history_entry })
            }
            Err(err) => {
                warn!(filename, error = %err, "scan failed");
                let message = err.user_message(SCAN_FALLBACK_MESSAGE);
                let mut model = self.model.lock().await;
                let applied = model.fail_scan(ticket, message.clone());
                self.publish(&model);
                if !applied {
                    return Ok(ScanOutcome::Stale);
                }
                let _ = self.events.send(ControllerEvent::Error(message.clone()));
                Ok(ScanOutcome::Failed(message))
            }
        }
    }

    pub async fn generate(&self, story_id: &StoryId) -> Result<GenerateOutcome, TransitionError> {
        let ticket = {
            let mut model = self.model.lock().await;
            match model.begin_generate(story_id) {
                Ok(ticket) => {
                    self.publish(&model);
                    ticket
                }
                Err(TransitionError::AlreadyGenerating(_)) => {
                    info!(%story_id, "comic already generating; request suppressed");
                    return Ok(GenerateOutcome::Suppressed);
                }
                Err(err) => return Err(err),
            }
        };

        let story = ticket.story();
        info!(%story_id, package = %story.package_name, "comic generation started");
        match self.api.generate_comic(story).await {
            Ok(comic) => {
                if let Some(entry_id) = ticket.history_entry() {
                    self.record_comic(entry_id, &comic).await;
                }

                let mut model = self.model.lock().await;
                let applied = model.complete_generate(&ticket, comic.clone());
                self.publish(&model);
                if !applied {
                    warn!(%story_id, comic_hash = %comic.comic_hash, "comic arrived after the view moved on");
                    return Ok(GenerateOutcome::Stale);
                }
                Ok(GenerateOutcome::Completed(comic))
            }
            Err(err) => {
                warn!(%story_id, error = %err, "comic generation failed");
                let message = err.user_message(GENERATE_FALLBACK_MESSAGE);
                let mut model = self.model.lock().await;
                let applied = model.fail_generate(&ticket, message.clone());
                self.publish(&model);
                if !applied {
                    return Ok(GenerateOutcome::Stale);
                }
                let _ = self.events.send(ControllerEvent::Error(message.clone()));
                Ok(GenerateOutcome::Failed(message))
            }
        }
    }

    pub async fn back(&self) -> Result<(), TransitionError> {
        let mut model = self.model.lock().await;
        model.back()?;
        self.publish(&model);
        Ok(())
    }

    /// Returns to the upload screen. Persisted history is left alone.
    pub async fn start_over(&self) {
        let mut model = self.model.lock().await;
        model.start_over();
        self.publish(&model);
    }

    async fn record_comic(&self, entry_id: &HistoryEntryId, comic: &GeneratedComic) {
        match self.history.append_comic(entry_id, &comic.summary()).await {
            Ok(AppendOutcome::Appended) => {
                let _ = self
                    .events
                    .send(ControllerEvent::HistoryUpdated(entry_id.clone()));
            }
            Ok(AppendOutcome::Missing) => {
                warn!(%entry_id, comic_hash = %comic.comic_hash, "history entry missing; comic not recorded");
            }
            Err(err) => {
                warn!(%entry_id, error = %format!("{err:#}"), "failed to record comic in history");
            }
        }
    }

    fn publish(&self, model: &ViewModel) {
        let _ = self
            .events
            .send(ControllerEvent::StateChanged(model.snapshot()));
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
