//! What a discovery run finds out about an account

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use url::Url;

use crate::dav::{DavCapabilities, DavResponse, ResourceTypes, SupportedComponents};
use crate::utils::with_trailing_slash;

/// The two services discovery looks for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Service {
    CardDav,
    CalDav,
}

impl Service {
    /// `carddav` or `caldav`, as used in well-known paths
    pub fn name(&self) -> &'static str {
        match self {
            Service::CardDav => "carddav",
            Service::CalDav => "caldav",
        }
    }

    pub fn well_known_path(&self) -> String {
        format!("/.well-known/{}", self.name())
    }

    /// The SRV/TXT record name. Only the TLS variant is ever looked up.
    pub fn srv_name(&self, domain: &str) -> String {
        format!("_{}s._tcp.{}", self.name(), domain)
    }

    /// What the `DAV:` header of a principal must advertise
    pub fn capability(&self) -> DavCapabilities {
        match self {
            Service::CardDav => DavCapabilities::ADDRESSBOOK,
            Service::CalDav => DavCapabilities::CALENDAR_ACCESS,
        }
    }
}

impl Display for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::CardDav => write!(f, "CardDAV"),
            Service::CalDav => write!(f, "CalDAV"),
        }
    }
}

/// The outcome of a discovery run. It is never persisted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Configuration {
    pub carddav: Option<ServiceInfo>,
    pub caldav: Option<ServiceInfo>,
    /// Human-readable diagnostics of every stage
    pub logs: String,
}

impl Configuration {
    pub fn service(&self, service: Service) -> Option<&ServiceInfo> {
        match service {
            Service::CardDav => self.carddav.as_ref(),
            Service::CalDav => self.caldav.as_ref(),
        }
    }
}

/// What has been found for a single service
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceInfo {
    pub principal: Option<Url>,
    pub home_sets: BTreeSet<Url>,
    pub collections: BTreeMap<Url, Collection>,
    /// Only looked for on CalDAV
    pub email: Option<String>,
}

impl ServiceInfo {
    /// Whether there is anything worth keeping
    pub fn is_available(&self) -> bool {
        self.principal.is_some() || self.home_sets.is_empty() == false || self.collections.is_empty() == false
    }

    pub fn add_home_set(&mut self, url: &Url) {
        self.home_sets.insert(with_trailing_slash(url));
    }

    /// Insert a collection, unless the same URL (give or take a trailing slash) is already known
    pub fn add_collection(&mut self, collection: Collection) {
        self.collections.entry(collection.url.clone()).or_insert(collection);
    }

    /// Take over what `other` found. What is already known here wins.
    pub fn merge(&mut self, other: ServiceInfo) {
        if self.principal.is_none() {
            self.principal = other.principal;
        }
        for home_set in &other.home_sets {
            self.add_home_set(home_set);
        }
        for (_, collection) in other.collections {
            self.add_collection(collection);
        }
        if self.email.is_none() {
            self.email = other.email;
        }
    }
}

/// The kind of a collection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionKind {
    AddressBook,
    Calendar,
    /// A read-only calendar subscription
    WebCal,
}

/// An address book or a calendar
#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    /// Always ends with a `/`
    pub url: Url,
    pub kind: CollectionKind,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub read_only: bool,
    pub supported_components: SupportedComponents,
    /// Only for subscriptions
    pub source: Option<Url>,
}

impl Collection {
    /// Build a collection from a WebDAV response, in case it describes a collection of the right service
    pub fn from_response(service: Service, response: &DavResponse) -> Option<Self> {
        let props = &response.properties;
        let kind = match service {
            Service::CardDav if props.resource_types.contains(ResourceTypes::ADDRESSBOOK) => CollectionKind::AddressBook,
            Service::CalDav if props.resource_types.contains(ResourceTypes::CALENDAR) => CollectionKind::Calendar,
            Service::CalDav if props.resource_types.contains(ResourceTypes::SUBSCRIBED) => CollectionKind::WebCal,
            _ => return None,
        };

        // An empty or missing component set means "everything"
        let supported_components = match props.supported_components {
            Some(comps) if comps.is_empty() == false => comps,
            _ => SupportedComponents::all(),
        };

        Some(Self {
            url: with_trailing_slash(&response.href),
            kind,
            display_name: props.display_name.clone(),
            description: props.description.clone(),
            color: props.color.clone(),
            read_only: kind == CollectionKind::WebCal || props.read_only.unwrap_or(false),
            supported_components,
            source: props.source.clone(),
        })
    }
}
