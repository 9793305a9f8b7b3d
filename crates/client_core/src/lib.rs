//! Client side of scan-to-comic: the screen state machine, the HTTP client
//! it drives and the local scan history it records into.

pub mod api;
pub mod controller;
pub mod error;
pub mod history;
pub mod state;

pub use api::{ComicApi, HttpComicApi};
pub use controller::{ControllerEvent, GenerateOutcome, ScanOutcome, ViewController};
pub use error::ClientError;
pub use history::{AppendOutcome, ScanHistory};
pub use state::{
    Screen, StoryListing, TransitionError, ViewModel, ViewSnapshot, ViewState,
    GENERATE_FALLBACK_MESSAGE, SCAN_FALLBACK_MESSAGE,
};

#[cfg(test)]
#[path = "tests/fixtures.rs"]
pub(crate) mod fixtures;
