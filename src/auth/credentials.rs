//! Credentials, where they are stored, and the per-account slot that guards their refresh

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use url::Url;

use crate::auth::token::TokenResponse;
use crate::error::{DavError, Result};

/// The OAuth tokens of an account, plus the base URL of its merge service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub service_base_url: Option<Url>,
}

impl Credentials {
    pub fn new<S: Into<String>>(access_token: Option<S>, refresh_token: Option<S>) -> Self {
        Self {
            access_token: access_token.map(Into::into),
            refresh_token: refresh_token.map(Into::into),
            ..Self::default()
        }
    }

    /// Forget both tokens, so that no request is sent with stale credentials
    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
    }

    /// Apply the result of a refresh. A server that does not rotate refresh tokens keeps the old one.
    pub(crate) fn apply(&mut self, tokens: TokenResponse) {
        self.access_token = Some(tokens.access_token);
        if let Some(refresh_token) = tokens.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(id_token) = tokens.id_token {
            self.id_token = Some(id_token);
        }
    }
}

/// Where accounts and their credentials are persisted (usually the platform account manager)
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// The credentials of an account. An unknown account has empty credentials.
    async fn credentials(&self, account: &str) -> Result<Credentials>;
    async fn set_credentials(&self, account: &str, credentials: Credentials) -> Result<()>;
    async fn accounts(&self) -> Result<Vec<String>>;
}

/// A refresh in progress, that any number of callers can await
pub(crate) type SharedRefresh = Shared<BoxFuture<'static, Result<Option<String>>>>;

pub(crate) struct SlotState {
    pub(crate) credentials: Credentials,
    pub(crate) refresh: Option<SharedRefresh>,
}

/// The in-memory credentials of one account.
///
/// Every pipeline built for the same account shares the same slot (see [`SessionRegistry`]),
/// so that there is never more than one token refresh in flight for an account.
pub struct CredentialSlot {
    account: String,
    pub(crate) state: Mutex<SlotState>,
    loaded: OnceCell<()>,
    /// Looked up once per slot
    pub(crate) token_endpoint: OnceCell<Url>,
}

impl CredentialSlot {
    fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
            state: Mutex::new(SlotState { credentials: Credentials::default(), refresh: None }),
            loaded: OnceCell::new(),
            token_endpoint: OnceCell::new(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Read the credentials from the store, the first time only
    pub(crate) async fn ensure_loaded(&self, store: &dyn AccountStore) -> Result<()> {
        self.loaded.get_or_try_init(|| async {
            let credentials = store.credentials(&self.account).await?;
            log::debug!("Loaded credentials of {} (access token: {})", self.account, credentials.access_token.is_some());
            self.state.lock().unwrap().credentials = credentials;
            Ok::<(), DavError>(())
        }).await?;
        Ok(())
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.state.lock().unwrap().credentials.access_token.clone()
    }

    pub(crate) fn snapshot(&self) -> Credentials {
        self.state.lock().unwrap().credentials.clone()
    }
}

/// Hands out one [`CredentialSlot`] per account
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, Arc<CredentialSlot>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, account: &str) -> Arc<CredentialSlot> {
        self.slots.lock().unwrap()
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(CredentialSlot::new(account)))
            .clone()
    }

    /// Drop the slot of a removed account
    pub fn forget(&self, account: &str) {
        self.slots.lock().unwrap().remove(account);
    }
}
