//! Cooperative cancellation
//!
//! Long operations (discovery, uploads) check a [`CancelSignal`] between units of work.
//! They never stop in the middle of a unit (an HTTP request, an uploaded chunk).

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{DavError, Result};

/// Create a cancellation handle and a signal that observes it
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let handle = CancelHandle::new();
    let signal = handle.signal();
    (handle, signal)
}

/// The side that requests a cancellation
#[derive(Clone, Debug)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    /// Request cancellation. This cannot be undone.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// A new signal observing this handle
    pub fn signal(&self) -> CancelSignal {
        CancelSignal { receiver: self.sender.subscribe() }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The side that checks whether it should stop
#[derive(Clone, Debug)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that is never triggered
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Returns `Err(DavError::Cancelled)` in case a cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DavError::Cancelled)
        } else {
            Ok(())
        }
    }
}
