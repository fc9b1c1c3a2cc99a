//! This module finds where the CardDAV and CalDAV collections of an account live
//!
//! Each service is looked for independently:
//! 1. the URL the user gave (if any) is queried directly,
//! 2. then its `/.well-known/` counterpart (HTTPS only),
//! 3. then DNS SRV/TXT records of the domain are used to build a list of candidate context paths.
//!
//! Once a principal is known, its home sets are listed to find the actual collections.
//! Errors never abort a run: they are recorded in [`Configuration::logs`] and the next stage is tried.
//! Only cancellation stops everything.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::cancel::CancelSignal;
use crate::dav::{self, DavClient, DavResponse, ResourceTypes};
use crate::dns::{self, DnsServiceResolver};
use crate::error::{DavError, Result};
use crate::http::HttpTransport;
use crate::utils::{parent_collection, with_trailing_slash};

pub mod configuration;
pub use configuration::{Collection, CollectionKind, Configuration, Service, ServiceInfo};
pub mod session;
pub use session::{DiscoveryLog, DiscoverySession};

/// How the user identified their account
#[derive(Clone, Debug, PartialEq)]
pub enum BaseIdentifier {
    /// An `http(s)://` URL
    Url(Url),
    /// A `mailto:` URI or a bare e-mail address. Only its domain is used.
    Email { domain: String },
}

impl BaseIdentifier {
    pub fn parse(base: &str) -> Result<Self> {
        let base = base.trim();

        let email = if let Some(address) = strip_mailto(base) {
            Some(address)
        } else if base.contains("://") == false && base.contains('@') {
            Some(base)
        } else {
            None
        };

        if let Some(address) = email {
            let domain = address.rsplit('@').next().unwrap_or("").trim().to_lowercase();
            if domain.is_empty() || address.contains('@') == false {
                return Err(DavError::Protocol(format!("{:?} has no domain part", base)));
            }
            return Ok(BaseIdentifier::Email { domain });
        }

        let url = if base.contains("://") {
            Url::parse(base)?
        } else {
            Url::parse(&format!("https://{}/", base))?
        };
        match url.scheme() {
            "http" | "https" => Ok(BaseIdentifier::Url(url)),
            other => Err(DavError::Protocol(format!("unsupported URL scheme {:?}", other))),
        }
    }
}

/// Finds the initial [`Configuration`] of an account
pub struct ServiceDiscoveryEngine {
    dav: DavClient,
    dns: Arc<dyn DnsServiceResolver>,
    base: String,
}

impl ServiceDiscoveryEngine {
    /// `transport` is usually an [`AuthenticatingPipeline`](crate::auth::AuthenticatingPipeline).
    /// `base` is a URL, a `mailto:` URI or an e-mail address.
    pub fn new<S: Into<String>>(transport: Arc<dyn HttpTransport>, dns: Arc<dyn DnsServiceResolver>, base: S) -> Self {
        Self {
            dav: DavClient::new(transport),
            dns,
            base: base.into(),
        }
    }

    /// Run discovery for both services.
    ///
    /// This only returns `Err(DavError::Cancelled)`: every other failure is logged in the configuration.
    pub async fn find_initial_configuration(&self, cancel: &CancelSignal) -> Result<Configuration> {
        let mut carddav_session = DiscoverySession::new(Service::CardDav, cancel.clone());
        let mut caldav_session = DiscoverySession::new(Service::CalDav, cancel.clone());

        let (carddav, caldav) = tokio::try_join!(
            self.discover(&mut carddav_session),
            self.discover(&mut caldav_session),
        )?;

        let logs = format!("{}{}", carddav_session.log.to_text(), caldav_session.log.to_text());
        Ok(Configuration { carddav, caldav, logs })
    }

    /// Same as [`Self::find_initial_configuration`], bounded by a deadline.
    ///
    /// Hitting the deadline is reported as a cancellation.
    pub async fn find_initial_configuration_with_timeout(&self, timeout: Duration) -> Result<Configuration> {
        match tokio::time::timeout(timeout, self.find_initial_configuration(&CancelSignal::never())).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Discovery for {} did not complete within {:?}", self.base, timeout);
                Err(DavError::Cancelled)
            },
        }
    }

    async fn discover(&self, session: &mut DiscoverySession) -> Result<Option<ServiceInfo>> {
        let service = session.service;
        session.log.info(&format!("Looking for {} services of {}", service, self.base));
        let mut info = ServiceInfo::default();

        let domain = match BaseIdentifier::parse(&self.base) {
            Err(err) => {
                session.log.error(&format!("Invalid account identifier: {}", err));
                return Ok(None);
            },
            Ok(BaseIdentifier::Url(url)) => {
                self.probe(&url, &mut info, session).await?;

                if info.principal.is_none() && url.scheme() == "https" {
                    match url.join(&service.well_known_path()) {
                        Ok(well_known) => self.probe(&well_known, &mut info, session).await?,
                        Err(err) => session.log.warn(&format!("Unable to build the well-known URL: {}", err)),
                    }
                }
                url.host_str().map(|host| host.to_string())
            },
            Ok(BaseIdentifier::Email { domain }) => Some(domain),
        };

        if info.principal.is_none() {
            match domain {
                Some(domain) => self.discover_via_dns(&domain, &mut info, session).await?,
                None => session.log.warn("No domain to run DNS discovery on"),
            }
        }

        if let Some(principal) = info.principal.clone() {
            if info.home_sets.is_empty() {
                self.probe(&principal, &mut info, session).await?;
            }
            if service == Service::CalDav {
                self.query_email(&principal, &mut info, session).await?;
            }
        }

        self.list_home_sets(&mut info, session).await?;

        if info.is_available() {
            session.log.info(&format!("{}: principal {:?}, {} home set(s), {} collection(s)",
                service,
                info.principal.as_ref().map(|p| p.as_str()),
                info.home_sets.len(),
                info.collections.len()));
            Ok(Some(info))
        } else {
            session.log.warn(&format!("No {} service found", service));
            Ok(None)
        }
    }

    /// Depth-0 PROPFIND of a candidate URL. Whatever it returns is merged into `info`.
    async fn probe(&self, url: &Url, info: &mut ServiceInfo, session: &mut DiscoverySession) -> Result<()> {
        session.checkpoint()?;
        let service = session.service;
        session.log.debug(&format!("PROPFIND {}", url));

        let body = match service {
            Service::CardDav => dav::CARDDAV_DISCOVERY_BODY,
            Service::CalDav => dav::CALDAV_DISCOVERY_BODY,
        };
        let multistatus = match self.dav.propfind(url, 0, body).await {
            Ok(ms) => ms,
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                session.log.warn(&format!("{} probe of {} failed: {}", service, url, err));
                return Ok(());
            },
        };

        for response in &multistatus.responses {
            absorb_response(response, info, session);
        }
        Ok(())
    }

    async fn discover_via_dns(&self, domain: &str, info: &mut ServiceInfo, session: &mut DiscoverySession) -> Result<()> {
        session.checkpoint()?;
        let service = session.service;
        let name = service.srv_name(domain);

        let (host, port) = match self.dns.lookup_srv(&name).await {
            Ok(records) => match dns::select_srv(&records) {
                Some(record) => {
                    session.log.info(&format!("SRV {} → {}:{}", name, record.target, record.port));
                    (record.target.clone(), record.port)
                },
                None => {
                    session.log.debug(&format!("No usable SRV record for {}", name));
                    (domain.to_string(), 443)
                },
            },
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                session.log.warn(&format!("SRV lookup of {} failed: {}", name, err));
                (domain.to_string(), 443)
            },
        };

        session.checkpoint()?;
        let mut candidates = match self.dns.lookup_txt(&name).await {
            Ok(records) => dns::txt_paths(&records),
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                session.log.warn(&format!("TXT lookup of {} failed: {}", name, err));
                Vec::new()
            },
        };
        candidates.push(service.well_known_path());
        candidates.push(String::from("/"));

        let mut tried = HashSet::new();
        for path in candidates {
            if tried.insert(path.clone()) == false {
                continue;
            }
            let url = match Url::parse(&format!("https://{}:{}{}", host, port, path)) {
                Ok(url) => url,
                Err(err) => {
                    session.log.warn(&format!("Invalid candidate {}:{}{}: {}", host, port, path, err));
                    continue;
                },
            };

            // A candidate only counts once its principal passed the capability check
            let mut found = ServiceInfo::default();
            self.probe(&url, &mut found, session).await?;
            match found.principal.clone() {
                Some(principal) => {
                    if self.has_capability(&principal, session).await? {
                        session.log.info(&format!("Found {} principal {} via DNS", service, principal));
                        info.merge(found);
                        return Ok(());
                    }
                },
                None => session.log.debug(&format!("No principal at {}", url)),
            }
        }

        session.log.warn(&format!("DNS discovery found no {} principal for {}", service, domain));
        Ok(())
    }

    /// Check the `DAV:` header of a candidate principal
    async fn has_capability(&self, principal: &Url, session: &mut DiscoverySession) -> Result<bool> {
        session.checkpoint()?;
        let service = session.service;
        match self.dav.options(principal).await {
            Ok(caps) if caps.contains(service.capability()) => Ok(true),
            Ok(_) => {
                session.log.info(&format!("{} does not advertise {}, ignoring it", principal, service));
                Ok(false)
            },
            Err(err) if err.is_cancellation() => Err(err),
            Err(err) => {
                session.log.warn(&format!("OPTIONS {} failed: {}", principal, err));
                Ok(false)
            },
        }
    }

    /// Recover the e-mail address of the account from its calendar-user-address-set
    async fn query_email(&self, principal: &Url, info: &mut ServiceInfo, session: &mut DiscoverySession) -> Result<()> {
        session.checkpoint()?;
        let multistatus = match self.dav.propfind(principal, 0, dav::EMAIL_BODY).await {
            Ok(ms) => ms,
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                session.log.warn(&format!("Unable to query calendar-user-address-set of {}: {}", principal, err));
                return Ok(());
            },
        };

        let email = multistatus.responses.iter()
            .flat_map(|response| response.properties.calendar_user_addresses.iter())
            .find_map(|address| strip_mailto(address).filter(|mail| mail.is_empty() == false))
            .map(|mail| mail.to_string());
        match email {
            Some(email) => {
                session.log.info(&format!("Account e-mail is {}", email));
                info.email = Some(email);
            },
            None => session.log.debug("No mailto: in calendar-user-address-set"),
        }
        Ok(())
    }

    /// Depth-1 PROPFIND of every home set, to find the collections inside
    async fn list_home_sets(&self, info: &mut ServiceInfo, session: &mut DiscoverySession) -> Result<()> {
        let service = session.service;
        let body = match service {
            Service::CardDav => dav::ADDRESSBOOKS_BODY,
            Service::CalDav => dav::CALENDARS_BODY,
        };

        let home_sets: Vec<Url> = info.home_sets.iter().cloned().collect();
        for home_set in home_sets {
            session.checkpoint()?;
            session.log.debug(&format!("Listing home set {}", home_set));
            let multistatus = match self.dav.propfind(&home_set, 1, body).await {
                Ok(ms) => ms,
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => {
                    session.log.warn(&format!("Unable to list home set {}: {}", home_set, err));
                    continue;
                },
            };

            for response in &multistatus.responses {
                if with_trailing_slash(&response.href) == home_set {
                    continue;
                }
                if let Some(collection) = Collection::from_response(service, response) {
                    session.log.info(&format!("Found {:?} {}", collection.kind, collection.url));
                    info.add_collection(collection);
                }
            }
        }
        Ok(())
    }
}

/// `mailto:alice@example.com` → `alice@example.com`, case-insensitively
fn strip_mailto(uri: &str) -> Option<&str> {
    match uri.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => uri.get(7..),
        _ => None,
    }
}

/// Merge what a single response tells about the account into `info`
fn absorb_response(response: &DavResponse, info: &mut ServiceInfo, session: &mut DiscoverySession) {
    let service = session.service;
    let props = &response.properties;

    if let Some(collection) = Collection::from_response(service, response) {
        session.log.info(&format!("{} is a {:?}", collection.url, collection.kind));
        // The parent of a collection is a home set
        if let Some(parent) = parent_collection(&collection.url) {
            info.add_home_set(&parent);
        }
        info.add_collection(collection);
    }

    let home_sets = match service {
        Service::CardDav => &props.addressbook_home_sets,
        Service::CalDav => &props.calendar_home_sets,
    };
    for home_set in home_sets {
        session.log.info(&format!("Found home set {}", home_set));
        info.add_home_set(home_set);
    }

    if info.principal.is_none() {
        if let Some(principal) = &props.current_user_principal {
            session.log.info(&format!("Found principal {}", principal));
            info.principal = Some(principal.clone());
        } else if props.resource_types.contains(ResourceTypes::PRINCIPAL) {
            session.log.info(&format!("{} is a principal", response.href));
            info.principal = Some(response.href.clone());
        }
    }
}
