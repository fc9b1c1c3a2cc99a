//! This module provides the few WebDAV requests service discovery needs

use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::header::{HeaderName, LOCATION};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::error::{DavError, Result};
use crate::http::{HttpRequest, HttpTransport};
use crate::utils::resolve_href;

pub mod properties;
pub use properties::{DavCapabilities, DavProperties, DavResponse, ResourceTypes, SupportedComponents};

static PROPFIND: Lazy<Method> = Lazy::new(|| {
    Method::from_bytes(b"PROPFIND").expect("cannot create PROPFIND method.")
});

/// How many redirections a single PROPFIND follows (e.g. for `/.well-known/` URLs)
const MAX_REDIRECTS: usize = 5;

pub static CARDDAV_DISCOVERY_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
       <d:prop>
           <d:resourcetype />
           <d:displayname />
           <d:current-user-principal />
           <card:addressbook-home-set />
       </d:prop>
    </d:propfind>
"#;

pub static CALDAV_DISCOVERY_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
       <d:prop>
           <d:resourcetype />
           <d:displayname />
           <d:current-user-principal />
           <cal:calendar-home-set />
       </d:prop>
    </d:propfind>
"#;

pub static EMAIL_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
       <d:prop>
           <cal:calendar-user-address-set />
       </d:prop>
    </d:propfind>
"#;

pub static ADDRESSBOOKS_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
       <d:prop>
           <d:resourcetype />
           <d:displayname />
           <d:current-user-privilege-set />
           <card:addressbook-description />
       </d:prop>
    </d:propfind>
"#;

pub static CALENDARS_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav" xmlns:cs="http://calendarserver.org/ns/" xmlns:ical="http://apple.com/ns/ical/">
       <d:prop>
           <d:resourcetype />
           <d:displayname />
           <d:current-user-privilege-set />
           <cal:calendar-description />
           <cal:supported-calendar-component-set />
           <ical:calendar-color />
           <cs:source />
       </d:prop>
    </d:propfind>
"#;


/// The result of a PROPFIND
#[derive(Clone, Debug)]
pub struct Multistatus {
    /// The URL that eventually answered, after redirections
    pub url: Url,
    pub responses: Vec<DavResponse>,
}

/// Sends WebDAV requests through a transport (usually an authenticating one)
#[derive(Clone)]
pub struct DavClient {
    transport: Arc<dyn HttpTransport>,
}

impl DavClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Send a PROPFIND and parse its multistatus.
    ///
    /// Redirections are followed within the same origin only, as the transport may carry credentials.
    pub async fn propfind(&self, url: &Url, depth: u32, body: &str) -> Result<Multistatus> {
        let mut url = url.clone();

        for _ in 0..=MAX_REDIRECTS {
            let request = HttpRequest::new(PROPFIND.clone(), url.clone())
                .header(HeaderName::from_static("depth"), &depth.to_string())?
                .body("application/xml; charset=utf-8", body)?;
            let response = self.transport.execute(request).await?;

            match response.status {
                StatusCode::MULTI_STATUS => {
                    let responses = properties::parse_multistatus(&url, &response.body)?;
                    return Ok(Multistatus { url, responses });
                },
                status if status.is_redirection() => {
                    let target = response.headers.get(LOCATION)
                        .and_then(|location| location.to_str().ok())
                        .and_then(|location| resolve_href(&url, location))
                        .ok_or_else(|| DavError::Protocol(format!("redirection from {} without a valid Location", url)))?;
                    if target.origin() != url.origin() {
                        log::warn!("Not following the redirection from {} to {}", url, target);
                        return Err(DavError::Protocol(format!("cross-origin redirection from {} to {}", url, target)));
                    }
                    log::debug!("PROPFIND {} redirected to {}", url, target);
                    url = target;
                },
                StatusCode::UNAUTHORIZED => return Err(DavError::Auth(format!("PROPFIND {}", url))),
                status => return Err(DavError::Http { status: status.as_u16(), url: url.to_string() }),
            }
        }

        Err(DavError::Protocol(format!("too many redirections, last one to {}", url)))
    }

    /// Send an OPTIONS request and return the capabilities it advertises
    pub async fn options(&self, url: &Url) -> Result<DavCapabilities> {
        let response = self.transport.execute(HttpRequest::new(Method::OPTIONS, url.clone())).await?;
        match response.status {
            status if status.is_success() => Ok(DavCapabilities::from_header_values(&response.header_values("dav"))),
            StatusCode::UNAUTHORIZED => Err(DavError::Auth(format!("OPTIONS {}", url))),
            status => Err(DavError::Http { status: status.as_u16(), url: url.to_string() }),
        }
    }
}
