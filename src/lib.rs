//! This crate finds where the CardDAV and CalDAV collections of an account live, and uploads local contacts to a merge service.
//!
//! Discovery is done by the [`ServiceDiscoveryEngine`](discovery::ServiceDiscoveryEngine) in the [`discovery`] module.
//! It probes the URL of an account, then its well-known URIs, then the locations DNS advertises for it.
//!
//! Every request can be authenticated by an [`AuthenticatingPipeline`](auth::AuthenticatingPipeline), that attaches bearer tokens and refreshes them when they expire. \
//! There is never more than one refresh in flight for an account, however many requests are waiting for it.
//!
//! Local contacts are mirrored by a [`LocalContactCache`](contacts::LocalContactCache), that shapes them to what the remote side accepts. \
//! They are then sent in chunks by a [`ContactUploadCoordinator`](upload::ContactUploadCoordinator), that can resume a failed upload where it stopped.

pub mod error;
pub use error::{DavError, Result};
pub mod config;
pub use config::Settings;
pub mod cancel;

pub mod http;
pub mod dav;
pub mod dns;
pub mod discovery;
pub use discovery::{Configuration, ServiceDiscoveryEngine};
pub mod auth;
pub use auth::AuthenticatingPipeline;

pub mod contacts;
pub mod upload;
pub use upload::ContactUploadCoordinator;

pub mod mock_behaviour;
pub mod utils;
