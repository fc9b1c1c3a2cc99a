//! Chunked, resumable upload of local contacts to the merge service
//!
//! An upload goes `Idle → Uploading → {Success, AwaitingRetry, LimitExceeded, Cancelled, Skipped}`.
//! Contacts are sent in chunks. A chunk that went through is never sent again: a retry only sends what is still pending.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::cancel::{cancel_pair, CancelHandle, CancelSignal};
use crate::config::Settings;
use crate::contacts::{Contact, ContactId, GroupId, LocalContactCache};
use crate::error::{DavError, Result};

pub mod merge_service;
pub use merge_service::{Duplicate, DuplicateReport, HttpMergeService, MergeService};
pub mod progress;
pub use progress::{UploadEvent, UploadState};
use progress::{event_channel, state_channel, EventReceiver, StateReceiver, UploadProgress};

/// The contacts of one upload, and how far it went
#[derive(Debug)]
pub struct UploadBatch {
    pub id: Uuid,
    /// The contacts as they were when the upload started
    originals: Vec<Contact>,
    /// What has not been committed yet. This only ever shrinks.
    pending: VecDeque<Contact>,
    duplicates: Vec<Duplicate>,
    last_error: Option<DavError>,
}

impl UploadBatch {
    fn new(contacts: Vec<Contact>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pending: contacts.iter().cloned().collect(),
            originals: contacts,
            duplicates: Vec::new(),
            last_error: None,
        }
    }

    fn progress(&self) -> UploadState {
        UploadState::Uploading {
            done: self.originals.len() - self.pending.len(),
            total: self.originals.len(),
        }
    }
}

/// What an import already committed. Calling the import again does not resend these contacts.
#[derive(Debug, Default)]
struct ImportLedger {
    contacts: BTreeSet<ContactId>,
    identifiers: Vec<String>,
}

/// Resets the running flag, even if the upload future is dropped
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives the upload of the contacts of an account
pub struct ContactUploadCoordinator {
    account: String,
    cache: Arc<LocalContactCache>,
    service: Arc<dyn MergeService>,
    chunk_size: usize,

    batch: Mutex<Option<UploadBatch>>,
    imported: Mutex<ImportLedger>,
    running: AtomicBool,
    cancel: Mutex<CancelHandle>,
    progress: UploadProgress,
    events: Mutex<Option<EventReceiver>>,
}

impl ContactUploadCoordinator {
    pub fn new<S: Into<String>>(account: S, cache: Arc<LocalContactCache>, service: Arc<dyn MergeService>, settings: &Settings) -> Self {
        let (state_tx, _) = state_channel();
        let (event_tx, event_rx) = event_channel();
        Self {
            account: account.into(),
            cache,
            service,
            chunk_size: settings.upload_chunk_size.max(1),
            batch: Mutex::new(None),
            imported: Mutex::new(ImportLedger::default()),
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancelHandle::new()),
            progress: UploadProgress::new(state_tx, event_tx),
            events: Mutex::new(Some(event_rx)),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn state(&self) -> UploadState {
        self.progress.current()
    }

    /// Watch the state of the uploads
    pub fn subscribe(&self) -> StateReceiver {
        self.progress.subscribe()
    }

    /// The event stream. There is a single observer, so this returns `Some` only once.
    pub fn take_events(&self) -> Option<EventReceiver> {
        self.events.lock().unwrap().take()
    }

    /// The contacts that have not been committed yet
    pub fn pending_contacts(&self) -> Vec<Contact> {
        self.batch.lock().unwrap()
            .as_ref()
            .map(|batch| batch.pending.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The duplicates reported so far
    pub fn duplicates(&self) -> Vec<Duplicate> {
        self.batch.lock().unwrap()
            .as_ref()
            .map(|batch| batch.duplicates.clone())
            .unwrap_or_default()
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        self.batch.lock().unwrap().as_ref().map(|batch| batch.id)
    }

    /// Upload the members of `groups`, or every contact when `groups` is `None`
    pub async fn upload_contacts(&self, groups: Option<&[GroupId]>) -> Result<UploadState> {
        let _guard = self.start()?;

        let mut contacts = match groups {
            None => self.cache.all_contacts(None)?,
            Some(groups) => self.cache.contacts_in_groups(groups)?,
        };
        self.cache.group_method().before_upload(&mut contacts, &self.cache.groups_by_id()?);

        let batch = UploadBatch::new(contacts);
        log::info!("Starting upload {} of {} contacts for {}", batch.id, batch.originals.len(), self.account);
        self.progress.set_state(batch.progress());
        *self.batch.lock().unwrap() = Some(batch);
        *self.imported.lock().unwrap() = ImportLedger::default();

        let signal = self.fresh_signal();
        self.run(signal).await
    }

    /// Send the contacts that are still pending after a failed pass
    pub async fn retry_upload(&self) -> Result<UploadState> {
        let _guard = self.start()?;

        match &*self.batch.lock().unwrap() {
            Some(batch) if batch.pending.is_empty() == false => {
                log::info!("Retrying upload {}: {} contacts left", batch.id, batch.pending.len());
            },
            _ => return Err(DavError::InvalidState("there is nothing to retry".to_string())),
        }

        let signal = self.fresh_signal();
        self.run(signal).await
    }

    /// Stop the upload. A chunk that is being sent is not interrupted, but no further chunk will be.
    pub fn cancel_upload(&self) {
        self.terminate(UploadState::Cancelled, UploadEvent::Cancelled);
    }

    /// The user does not want to upload their contacts
    pub fn skip_upload(&self) {
        self.terminate(UploadState::Skipped, UploadEvent::Skipped);
    }

    /// Import the contacts the user kept after resolving duplicates. Returns the remote identifiers of the whole import.
    ///
    /// When a chunk fails, the chunks before it stay imported: calling this again only sends the remaining contacts.
    pub async fn import_contacts(&self, contacts: &[Contact]) -> Result<Vec<String>> {
        let _guard = self.start()?;

        let remaining: Vec<Contact> = {
            let ledger = self.imported.lock().unwrap();
            contacts.iter()
                .filter(|contact| ledger.contacts.contains(&contact.id) == false)
                .cloned()
                .collect()
        };
        if remaining.len() < contacts.len() {
            log::info!("Resuming the import for {}: {} of {} contacts left", self.account, remaining.len(), contacts.len());
        }

        for chunk in remaining.chunks(self.chunk_size) {
            let result = self.service.import(chunk).await;

            let mut ledger = self.imported.lock().unwrap();
            match result {
                Ok(identifiers) => {
                    ledger.contacts.extend(chunk.iter().map(|contact| contact.id));
                    ledger.identifiers.extend(identifiers);
                },
                Err(err) => {
                    log::warn!("Import for {} stopped after {} contacts: {}", self.account, ledger.contacts.len(), err);
                    return Err(err);
                },
            }
        }

        let identifiers = std::mem::take(&mut *self.imported.lock().unwrap()).identifiers;
        log::info!("Imported {} contacts for {}", identifiers.len(), self.account);
        *self.batch.lock().unwrap() = None;
        self.progress.set_state(UploadState::Success { has_duplicates: false });
        Ok(identifiers)
    }

    fn start(&self) -> Result<RunGuard<'_>> {
        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(DavError::InvalidState(format!("an upload is already running for {}", self.account)));
        }
        Ok(RunGuard(&self.running))
    }

    fn fresh_signal(&self) -> CancelSignal {
        let (handle, signal) = cancel_pair();
        *self.cancel.lock().unwrap() = handle;
        signal
    }

    fn terminate(&self, state: UploadState, event: UploadEvent) {
        self.cancel.lock().unwrap().cancel();
        if let Some(batch) = self.batch.lock().unwrap().take() {
            log::info!("Upload {} ends: {}", batch.id, state);
        }
        self.progress.set_state(state);
        self.progress.emit(event);
    }

    /// The chunk loop. It stops at the first failing chunk.
    async fn run(&self, signal: CancelSignal) -> Result<UploadState> {
        loop {
            if signal.is_cancelled() {
                return Ok(self.state());
            }

            let chunk: Vec<Contact> = match &*self.batch.lock().unwrap() {
                None => return Ok(self.state()),
                Some(batch) if batch.pending.is_empty() => break,
                Some(batch) => {
                    self.progress.set_state(batch.progress());
                    batch.pending.iter().take(self.chunk_size).cloned().collect()
                },
            };

            let result = self.service.duplicate_check(&chunk).await;

            let mut guard = self.batch.lock().unwrap();
            let batch = match guard.as_mut() {
                // Cancelled or skipped while the chunk was in flight
                None => return Ok(self.state()),
                Some(batch) => batch,
            };
            match result {
                Ok(report) => {
                    batch.pending.drain(..chunk.len());
                    batch.duplicates.extend(report.duplicates);
                    batch.last_error = None;
                    log::debug!("Upload {}: chunk committed, {} contacts left", batch.id, batch.pending.len());
                },
                Err(err) => {
                    log::warn!("Upload {}: a chunk of {} contacts failed: {}", batch.id, chunk.len(), err);
                    batch.last_error = Some(err);
                    break;
                },
            }
        }

        Ok(self.finish())
    }

    /// Decide how a pass ended
    fn finish(&self) -> UploadState {
        let mut guard = self.batch.lock().unwrap();
        let batch = match guard.as_mut() {
            None => return self.state(),
            Some(batch) => batch,
        };

        let (state, event, keep_batch) = if batch.pending.is_empty() {
            if batch.duplicates.is_empty() {
                (UploadState::Success { has_duplicates: false }, UploadEvent::Success, false)
            } else {
                // Kept until the duplicates are resolved
                (UploadState::Success { has_duplicates: true }, UploadEvent::ShowDuplicates(batch.duplicates.clone()), true)
            }
        } else {
            match batch.last_error.clone() {
                Some(DavError::TooManyContacts) => (UploadState::LimitExceeded, UploadEvent::TooManyContacts, false),
                Some(err) => (UploadState::AwaitingRetry, UploadEvent::RetryableFailure(err), true),
                None => (UploadState::AwaitingRetry, UploadEvent::RetryableFailure(DavError::InvalidState("upload interrupted".to_string())), true),
            }
        };

        log::info!("Upload {} for {}: {}", batch.id, self.account, state);
        if keep_batch == false {
            *guard = None;
        }
        drop(guard);

        self.progress.set_state(state.clone());
        self.progress.emit(event);
        state
    }
}
