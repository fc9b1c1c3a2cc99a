//! Bearer-token authentication of outgoing requests
//!
//! [`AuthenticatingPipeline`] attaches the access token of an account to every request.
//! When the server answers `401`, the token is refreshed once and the request is re-sent once.
//!
//! Refreshes are single-flight per account: the first caller that needs one starts it and publishes
//! a shared handle in the account [`CredentialSlot`], and every concurrent caller awaits that handle.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;

use crate::error::{DavError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

pub mod credentials;
pub use credentials::{AccountStore, CredentialSlot, Credentials, SessionRegistry};
pub mod token;
pub use token::OAuthConfig;

/// Called (with the account name) whenever a request ends up unauthorized
pub type UnauthorizedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// An [`HttpTransport`] that authenticates requests on behalf of an account
pub struct AuthenticatingPipeline {
    slot: Arc<CredentialSlot>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn AccountStore>,
    oauth: OAuthConfig,
    on_unauthorized: Option<UnauthorizedCallback>,
}

impl AuthenticatingPipeline {
    /// Create a pipeline for `account`. Pipelines created from the same registry for the same account share their tokens.
    pub fn new(
        registry: &SessionRegistry,
        account: &str,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn AccountStore>,
        oauth: OAuthConfig,
    ) -> Self {
        Self {
            slot: registry.slot(account),
            transport,
            store,
            oauth,
            on_unauthorized: None,
        }
    }

    pub fn with_unauthorized_callback(mut self, callback: UnauthorizedCallback) -> Self {
        self.on_unauthorized = Some(callback);
        self
    }

    pub fn account(&self) -> &str {
        self.slot.account()
    }

    /// The current credentials of the account
    pub async fn credentials(&self) -> Result<Credentials> {
        self.slot.ensure_loaded(self.store.as_ref()).await?;
        Ok(self.slot.snapshot())
    }

    /// Send a request with the account credentials.
    ///
    /// A final `401` is returned as a response, not as an error.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.slot.ensure_loaded(self.store.as_ref()).await?;

        let token = match self.slot.access_token() {
            Some(token) => token,
            None => {
                log::debug!("No access token for {}, not sending {} {}", self.account(), request.method, request.url);
                self.notify_unauthorized();
                return Ok(HttpResponse::new(StatusCode::UNAUTHORIZED));
            },
        };

        let response = self.transport.execute(authorize(request.clone(), &token)?).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        log::debug!("{} {} is unauthorized for {}", request.method, request.url, self.account());
        match self.refreshed_token(&token).await? {
            None => {
                self.notify_unauthorized();
                Ok(response)
            },
            Some(new_token) => {
                let retried = self.transport.execute(authorize(request, &new_token)?).await?;
                if retried.status == StatusCode::UNAUTHORIZED {
                    log::warn!("{} is still unauthorized after a token refresh", self.account());
                    self.notify_unauthorized();
                }
                Ok(retried)
            },
        }
    }

    /// Returns a token newer than `stale`, refreshing it if nobody did already.
    ///
    /// `None` means there is no way to get one (no refresh token, or it has been rejected).
    async fn refreshed_token(&self, stale: &str) -> Result<Option<String>> {
        let refresh = {
            let mut state = self.slot.state.lock().unwrap();
            match &state.credentials.access_token {
                Some(current) if current != stale => {
                    log::debug!("Token of {} has been refreshed meanwhile", self.account());
                    return Ok(Some(current.clone()));
                },
                _ => {},
            }

            let in_flight = state.refresh.clone();
            match in_flight {
                Some(in_flight) => in_flight,
                None => {
                    let refresh_token = match state.credentials.refresh_token.clone() {
                        None => {
                            log::info!("No refresh token for {}", self.account());
                            return Ok(None);
                        },
                        Some(token) => token,
                    };
                    let refresh = run_refresh(
                        self.slot.clone(),
                        self.transport.clone(),
                        self.store.clone(),
                        self.oauth.clone(),
                        refresh_token,
                    ).boxed().shared();
                    state.refresh = Some(refresh.clone());
                    refresh
                },
            }
        };

        refresh.await
    }

    fn notify_unauthorized(&self) {
        if let Some(callback) = &self.on_unauthorized {
            callback(self.account());
        }
    }
}

#[async_trait]
impl HttpTransport for AuthenticatingPipeline {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send(request).await
    }
}

fn authorize(request: HttpRequest, token: &str) -> Result<HttpRequest> {
    request.header(AUTHORIZATION, &format!("Bearer {}", token))
}

/// The actual refresh. Its outcome is stored in the slot before the shared handle resolves.
///
/// A rejected refresh clears both tokens, so later sends fail locally with a `401`.
/// A network failure is the exception: both tokens are kept, the error is surfaced to the callers,
/// and the next `401` tries the refresh again.
async fn run_refresh(
    slot: Arc<CredentialSlot>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn AccountStore>,
    oauth: OAuthConfig,
    refresh_token: String,
) -> Result<Option<String>> {
    log::info!("Refreshing the access token of {}", slot.account());

    let outcome = async {
        let endpoint = slot.token_endpoint
            .get_or_try_init(|| token::fetch_token_endpoint(transport.as_ref(), &oauth.issuer))
            .await?
            .clone();
        token::refresh_grant(transport.as_ref(), &endpoint, &oauth.client_id, &refresh_token).await
    }.await;

    match outcome {
        Ok(tokens) => {
            let mut credentials = slot.snapshot();
            credentials.apply(tokens);
            if let Err(err) = store.set_credentials(slot.account(), credentials.clone()).await {
                log::warn!("Unable to persist the new tokens of {}: {}", slot.account(), err);
            }

            let mut state = slot.state.lock().unwrap();
            state.credentials = credentials.clone();
            state.refresh = None;
            Ok(credentials.access_token)
        },
        Err(DavError::Network(msg)) => {
            log::warn!("Token refresh for {} failed: {}", slot.account(), msg);
            slot.state.lock().unwrap().refresh = None;
            Err(DavError::Network(msg))
        },
        Err(err) => {
            log::warn!("Token refresh for {} failed: {}. Forgetting its tokens.", slot.account(), err);
            let mut credentials = slot.snapshot();
            credentials.clear_tokens();
            if let Err(err) = store.set_credentials(slot.account(), credentials.clone()).await {
                log::warn!("Unable to persist the cleared tokens of {}: {}", slot.account(), err);
            }

            let mut state = slot.state.lock().unwrap();
            state.credentials = credentials;
            state.refresh = None;
            Ok(None)
        },
    }
}
