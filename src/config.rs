//! Support for library configuration options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::contacts::capping::FieldCaps;
use crate::error::Result;

/// Tunables of the discovery and upload machinery.
///
/// Every field has a sensible default, so that a JSON document only has to mention what it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// How many contacts are sent to the merge service in a single request
    pub upload_chunk_size: usize,
    /// Overall deadline of a discovery run. DNS lookups have no timeout of their own.
    pub discovery_timeout_secs: u64,
    /// Sent as `User-Agent` by the reqwest transport
    pub user_agent: String,
    /// How contacts are shaped before they leave the device
    pub limits: ContactLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_chunk_size: 500,
            discovery_timeout_secs: 60,
            user_agent: format!("davlink/{}", env!("CARGO_PKG_VERSION")),
            limits: ContactLimits::default(),
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document. Missing fields keep their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

/// An account, as configured by the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// The name the account store knows it by
    pub id: String,
    /// An `http(s)://` URL, a `mailto:` URI or an e-mail address
    pub base: String,
}

/// Per-field caps applied by the local contact cache.
///
/// These must match what the remote validation service enforces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactLimits {
    pub phone_plain: FieldCaps,
    pub phone_mobile: FieldCaps,
    pub phone_fax: FieldCaps,
    pub phone_voip: FieldCaps,
    pub emails: FieldCaps,
    pub addresses: FieldCaps,
    pub web_pages: FieldCaps,

    /// First, middle, last and display names
    pub max_name_len: usize,
    pub max_nickname_len: usize,
    /// Organization and job title
    pub max_organization_len: usize,
    pub max_note_len: usize,
    /// Phone numbers, e-mail addresses, URLs and postal address parts
    pub max_value_len: usize,
}

impl Default for ContactLimits {
    fn default() -> Self {
        Self {
            phone_plain: FieldCaps::new(12, 12, 14),
            phone_mobile: FieldCaps::new(3, 3, 4),
            phone_fax: FieldCaps::new(2, 2, 2),
            phone_voip: FieldCaps::new(2, 2, 2),
            emails: FieldCaps::new(5, 5, 6),
            addresses: FieldCaps::new(3, 3, 4),
            web_pages: FieldCaps::new(3, 3, 4),
            max_name_len: 64,
            max_nickname_len: 64,
            max_organization_len: 128,
            max_note_len: 1000,
            max_value_len: 256,
        }
    }
}
