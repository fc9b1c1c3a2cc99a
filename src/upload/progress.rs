//! Utilities to track the progression of an upload

use std::fmt::{Display, Error, Formatter};

use crate::error::DavError;
use crate::upload::merge_service::Duplicate;

/// The current state of an upload, as observed by the UI
#[derive(Clone, Debug, PartialEq)]
pub enum UploadState {
    /// No upload has started
    Idle,
    /// Chunks are being sent. `done` contacts out of `total` are committed.
    Uploading { done: usize, total: usize },
    /// Every contact has been sent
    Success { has_duplicates: bool },
    /// Some contacts are still pending, and can be re-sent with `retry_upload`
    AwaitingRetry,
    /// The server refuses this many contacts. Retrying will not help.
    LimitExceeded,
    Cancelled,
    Skipped,
}

impl UploadState {
    /// Whether the upload is over, and its batch gone
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Success { .. } | UploadState::LimitExceeded | UploadState::Cancelled | UploadState::Skipped)
    }
}

impl Display for UploadState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            UploadState::Idle => write!(f, "Not started"),
            UploadState::Uploading { done, total } => write!(f, "Uploading ({}/{})...", done, total),
            UploadState::Success { has_duplicates } => match has_duplicates {
                false => write!(f, "Upload successfully finished"),
                true => write!(f, "Upload finished, duplicates were found"),
            },
            UploadState::AwaitingRetry => write!(f, "Upload failed, it can be retried"),
            UploadState::LimitExceeded => write!(f, "Too many contacts"),
            UploadState::Cancelled => write!(f, "Upload cancelled"),
            UploadState::Skipped => write!(f, "Upload skipped"),
        }
    }
}

impl Default for UploadState {
    fn default() -> Self {
        Self::Idle
    }
}

/// A one-shot notification for the observer of an upload
#[derive(Clone, Debug, PartialEq)]
pub enum UploadEvent {
    /// Every contact was sent, and none is a duplicate
    Success,
    /// Every contact was sent. The user should now resolve these duplicates.
    ShowDuplicates(Vec<Duplicate>),
    /// The hard limit of the merge service has been hit
    TooManyContacts,
    /// A chunk failed, the remaining contacts can be retried
    RetryableFailure(DavError),
    Cancelled,
    Skipped,
}

/// See [`state_channel`]
pub type StateSender = tokio::sync::watch::Sender<UploadState>;
/// See [`state_channel`]
pub type StateReceiver = tokio::sync::watch::Receiver<UploadState>;

/// Create a state channel, that can be used to retrieve the current state of an upload
pub fn state_channel() -> (StateSender, StateReceiver) {
    tokio::sync::watch::channel(UploadState::default())
}

/// See [`event_channel`]
pub type EventSender = tokio::sync::mpsc::UnboundedSender<UploadEvent>;
/// See [`event_channel`]
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<UploadEvent>;

/// Create an event channel. Every event is delivered once, to a single observer.
pub fn event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Publishes the state and the events of an upload
pub struct UploadProgress {
    state: StateSender,
    events: EventSender,
}

impl UploadProgress {
    pub fn new(state: StateSender, events: EventSender) -> Self {
        Self { state, events }
    }

    pub fn current(&self) -> UploadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> StateReceiver {
        self.state.subscribe()
    }

    pub fn set_state(&self, state: UploadState) {
        log::debug!("Upload state: {}", state);
        self.state.send_replace(state);
    }

    /// Send an event to the observer (if it still listens)
    pub fn emit(&self, event: UploadEvent) {
        log::info!("Upload event: {:?}", event);
        if self.events.send(event).is_err() {
            log::debug!("Nobody listens to upload events anymore");
        }
    }
}
