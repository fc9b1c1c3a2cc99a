//! WebDAV properties that are relevant to service discovery, and how to read them from a multistatus

use minidom::Element;
use url::Url;

use bitflags::bitflags;

use crate::error::{DavError, Result};
use crate::utils::{child, children, find_elems, resolve_href};

bitflags! {
    /// The content of a `<resourcetype>` property
    pub struct ResourceTypes: u8 {
        const COLLECTION = 1;
        const PRINCIPAL = 2;
        /// A CardDAV address book
        const ADDRESSBOOK = 4;
        /// A CalDAV calendar
        const CALENDAR = 8;
        /// A calendar subscription (CalendarServer extension)
        const SUBSCRIBED = 16;
    }
}

bitflags! {
    /// Calendar components a calendar accepts
    pub struct SupportedComponents: u8 {
        /// An event, such as a calendar meeting
        const EVENT = 1;
        /// A to-do item, such as a reminder
        const TODO = 2;
    }
}

impl SupportedComponents {
    /// Create an instance from an XML <supported-calendar-component-set> element
    pub fn from_element(element: &Element) -> Result<Self> {
        if element.name() != "supported-calendar-component-set" {
            return Err(DavError::Protocol("Element must be a <supported-calendar-component-set>".into()));
        }

        let mut flags = Self::empty();
        for comp in element.children() {
            match comp.attr("name") {
                None => continue,
                Some("VEVENT") => flags.insert(Self::EVENT),
                Some("VTODO") => flags.insert(Self::TODO),
                Some(other) => {
                    log::debug!("Unimplemented supported component type: {:?}. Ignoring it", other);
                    continue
                },
            };
        }

        Ok(flags)
    }
}

bitflags! {
    /// Capabilities advertised in the `DAV:` header of an OPTIONS response
    pub struct DavCapabilities: u8 {
        /// RFC 6352
        const ADDRESSBOOK = 1;
        /// RFC 4791
        const CALENDAR_ACCESS = 2;
        /// RFC 6638
        const CALENDAR_AUTO_SCHEDULE = 4;
    }
}

impl DavCapabilities {
    /// Parse the (possibly repeated) `DAV:` headers of a response
    pub fn from_header_values(values: &[&str]) -> Self {
        let mut caps = Self::empty();
        for token in values.iter().flat_map(|value| value.split(',')) {
            match token.trim() {
                "addressbook" => caps.insert(Self::ADDRESSBOOK),
                "calendar-access" => caps.insert(Self::CALENDAR_ACCESS),
                "calendar-auto-schedule" => caps.insert(Self::CALENDAR_AUTO_SCHEDULE),
                _ => continue,
            }
        }
        caps
    }
}

/// The properties of a single resource, as returned with a `200` propstat
#[derive(Clone, Debug, PartialEq)]
pub struct DavProperties {
    pub resource_types: ResourceTypes,
    pub display_name: Option<String>,
    pub current_user_principal: Option<Url>,
    pub addressbook_home_sets: Vec<Url>,
    pub calendar_home_sets: Vec<Url>,
    /// Raw hrefs, usually `mailto:` URIs
    pub calendar_user_addresses: Vec<String>,
    /// Address book or calendar description
    pub description: Option<String>,
    pub color: Option<String>,
    pub supported_components: Option<SupportedComponents>,
    /// `None` when the server did not report the privilege set
    pub read_only: Option<bool>,
    /// Where a calendar subscription reads its data from
    pub source: Option<Url>,
}

impl Default for DavProperties {
    fn default() -> Self {
        Self {
            resource_types: ResourceTypes::empty(),
            display_name: None,
            current_user_principal: None,
            addressbook_home_sets: Vec::new(),
            calendar_home_sets: Vec::new(),
            calendar_user_addresses: Vec::new(),
            description: None,
            color: None,
            supported_components: None,
            read_only: None,
            source: None,
        }
    }
}

impl DavProperties {
    /// Read every known property of a `<prop>` element
    fn absorb(&mut self, prop: &Element, base: &Url) {
        for el in prop.children() {
            match el.name() {
                "resourcetype" => {
                    for rt in el.children() {
                        match rt.name() {
                            "collection" => self.resource_types.insert(ResourceTypes::COLLECTION),
                            "principal" => self.resource_types.insert(ResourceTypes::PRINCIPAL),
                            "addressbook" => self.resource_types.insert(ResourceTypes::ADDRESSBOOK),
                            "calendar" => self.resource_types.insert(ResourceTypes::CALENDAR),
                            "subscribed" => self.resource_types.insert(ResourceTypes::SUBSCRIBED),
                            _ => continue,
                        }
                    }
                },
                "displayname" => self.display_name = non_empty_text(el),
                "current-user-principal" => {
                    self.current_user_principal = child(el, "href")
                        .and_then(|href| resolve_href(base, &href.text()));
                },
                "addressbook-home-set" => self.addressbook_home_sets.extend(hrefs(el, base)),
                "calendar-home-set" => self.calendar_home_sets.extend(hrefs(el, base)),
                "calendar-user-address-set" => {
                    self.calendar_user_addresses.extend(
                        children(el, "href").map(|href| href.text().trim().to_string())
                    );
                },
                "addressbook-description" | "calendar-description" => self.description = non_empty_text(el),
                "calendar-color" => self.color = non_empty_text(el),
                "supported-calendar-component-set" => {
                    match SupportedComponents::from_element(el) {
                        Ok(comps) => self.supported_components = Some(comps),
                        Err(err) => log::warn!("Invalid supported components: {}", err),
                    }
                },
                "current-user-privilege-set" => {
                    let writable = find_elems(el, "privilege").iter()
                        .flat_map(|privilege| privilege.children())
                        .any(|p| matches!(p.name(), "all" | "write" | "write-content" | "bind"));
                    self.read_only = Some(writable == false);
                },
                "source" => {
                    self.source = child(el, "href").and_then(|href| resolve_href(base, &href.text()));
                },
                _ => continue,
            }
        }
    }
}

/// One `<response>` of a multistatus
#[derive(Clone, Debug, PartialEq)]
pub struct DavResponse {
    pub href: Url,
    pub properties: DavProperties,
}

/// Parse a `207 Multi-Status` body. `base` is the URL of the request.
///
/// Only properties from successful propstats are kept.
pub fn parse_multistatus(base: &Url, text: &str) -> Result<Vec<DavResponse>> {
    let root: Element = text.parse()?;
    if root.name() != "multistatus" {
        return Err(DavError::Protocol(format!("expected a <multistatus>, got a <{}>", root.name())));
    }

    let mut responses = Vec::new();
    for response in children(&root, "response") {
        let href = match child(response, "href").and_then(|href| resolve_href(base, &href.text())) {
            None => {
                log::warn!("Ignoring a <response> without a valid <href>");
                continue;
            },
            Some(url) => url,
        };

        let mut properties = DavProperties::default();
        for propstat in children(response, "propstat") {
            let ok = child(propstat, "status")
                .map(|status| status_is_success(&status.text()))
                .unwrap_or(false);
            if ok == false {
                continue;
            }
            if let Some(prop) = child(propstat, "prop") {
                properties.absorb(prop, base);
            }
        }

        responses.push(DavResponse { href, properties });
    }
    Ok(responses)
}

/// `HTTP/1.1 200 OK` → true
fn status_is_success(status_line: &str) -> bool {
    status_line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .map(|code| (200..300).contains(&code))
        .unwrap_or(false)
}

fn non_empty_text(el: &Element) -> Option<String> {
    let text = el.text();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn hrefs(el: &Element, base: &Url) -> Vec<Url> {
    children(el, "href")
        .filter_map(|href| resolve_href(base, &href.text()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    const PRINCIPAL_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav" xmlns:cal="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/principals/alice/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:principal/></d:resourcetype>
        <d:displayname>Alice</d:displayname>
        <d:current-user-principal><d:href>/principals/alice/</d:href></d:current-user-principal>
        <card:addressbook-home-set><d:href>/addressbooks/alice/</d:href></card:addressbook-home-set>
        <cal:calendar-user-address-set>
          <d:href>mailto:alice@example.com</d:href>
          <d:href>/principals/alice/</d:href>
        </cal:calendar-user-address-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
    <d:propstat>
      <d:prop>
        <cal:calendar-home-set><d:href>/never/</d:href></cal:calendar-home-set>
      </d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    const CALENDARS_RESPONSE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav" xmlns:ical="http://apple.com/ns/ical/">
  <d:response>
    <d:href>/calendars/alice/work/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/><cal:calendar/></d:resourcetype>
        <d:displayname>Work</d:displayname>
        <ical:calendar-color>#FF0000FF</ical:calendar-color>
        <cal:supported-calendar-component-set>
          <cal:comp name="VEVENT"/>
          <cal:comp name="VJOURNAL"/>
        </cal:supported-calendar-component-set>
        <d:current-user-privilege-set>
          <d:privilege><d:read/></d:privilege>
        </d:current-user-privilege-set>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn principal_properties() {
        let base = Url::parse("https://dav.example.com/").unwrap();
        let responses = parse_multistatus(&base, PRINCIPAL_RESPONSE).unwrap();
        assert_eq!(responses.len(), 1);

        let props = &responses[0].properties;
        assert_eq!(responses[0].href.as_str(), "https://dav.example.com/principals/alice/");
        assert!(props.resource_types.contains(ResourceTypes::PRINCIPAL));
        assert_eq!(props.display_name.as_deref(), Some("Alice"));
        assert_eq!(props.current_user_principal.as_ref().map(|u| u.as_str()), Some("https://dav.example.com/principals/alice/"));
        assert_eq!(props.addressbook_home_sets.len(), 1);
        // This one came with a 404 propstat
        assert!(props.calendar_home_sets.is_empty());
        assert_eq!(props.calendar_user_addresses[0], "mailto:alice@example.com");
    }

    #[test]
    fn calendar_properties() {
        let base = Url::parse("https://dav.example.com/calendars/alice/").unwrap();
        let responses = parse_multistatus(&base, CALENDARS_RESPONSE).unwrap();
        let props = &responses[0].properties;
        assert!(props.resource_types.contains(ResourceTypes::COLLECTION | ResourceTypes::CALENDAR));
        assert_eq!(props.color.as_deref(), Some("#FF0000FF"));
        assert_eq!(props.supported_components, Some(SupportedComponents::EVENT));
        assert_eq!(props.read_only, Some(true));
    }

    #[test]
    fn non_multistatus_is_a_protocol_error() {
        let base = Url::parse("https://dav.example.com/").unwrap();
        let err = parse_multistatus(&base, r#"<html xmlns="http://www.w3.org/1999/xhtml"><body/></html>"#).unwrap_err();
        assert!(matches!(err, DavError::Protocol(_)));
        assert!(parse_multistatus(&base, "this is not XML").is_err());
    }

    #[test]
    fn capabilities_from_headers() {
        let caps = DavCapabilities::from_header_values(&["1, 2, 3, access-control", "addressbook, extended-mkcol"]);
        assert!(caps.contains(DavCapabilities::ADDRESSBOOK));
        assert!(caps.contains(DavCapabilities::CALENDAR_ACCESS) == false);

        let caps = DavCapabilities::from_header_values(&["1,calendar-access,calendar-auto-schedule"]);
        assert_eq!(caps, DavCapabilities::CALENDAR_ACCESS | DavCapabilities::CALENDAR_AUTO_SCHEDULE);
    }

    #[test]
    fn status_lines() {
        assert!(status_is_success("HTTP/1.1 200 OK"));
        assert!(status_is_success("HTTP/1.1 404 Not Found") == false);
        assert!(status_is_success("garbage") == false);
    }
}
