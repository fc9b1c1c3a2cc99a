//! Mocked collaborators, shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::StatusCode;

use davlink::auth::{AccountStore, Credentials};
use davlink::contacts::{Contact, DataRow, LocalContactStore, RawContact, RawGroup};
use davlink::dns::{DnsServiceResolver, SrvRecord};
use davlink::http::{HttpRequest, HttpResponse, HttpTransport};
use davlink::mock_behaviour::MockBehaviour;
use davlink::upload::{Duplicate, DuplicateReport, MergeService};
use davlink::Result;

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}


/// A transport that answers with a closure, and records every request
pub struct MockTransport {
    handler: Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        Self { handler: Box::new(handler), requests: Mutex::new(Vec::new()), delay: None }
    }

    /// Every request takes this long to be answered
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// How many requests were sent to this path
    pub fn count(&self, path: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.url.path() == path).count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(&request)
    }
}

/// Which discovery request this is, judging from its body
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DavQuery {
    CardDavProbe,
    CalDavProbe,
    Email,
    AddressBooks,
    Calendars,
    Options,
    Other,
}

pub fn dav_query(request: &HttpRequest) -> DavQuery {
    if request.method == reqwest::Method::OPTIONS {
        return DavQuery::Options;
    }
    let body = request.body.as_deref().unwrap_or("");
    if body.contains("addressbook-home-set") {
        DavQuery::CardDavProbe
    } else if body.contains("calendar-home-set") {
        DavQuery::CalDavProbe
    } else if body.contains("calendar-user-address-set") {
        DavQuery::Email
    } else if body.contains("addressbook-description") {
        DavQuery::AddressBooks
    } else if body.contains("calendar-description") {
        DavQuery::Calendars
    } else {
        DavQuery::Other
    }
}

/// A `207 Multi-Status` response made of `(href, props)` pairs
pub fn multistatus(responses: &[(&str, &str)]) -> Result<HttpResponse> {
    let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav" xmlns:cal="urn:ietf:params:xml:ns:caldav" xmlns:ical="http://apple.com/ns/ical/">"#);
    for (href, props) in responses {
        body.push_str(&format!(r#"
  <d:response>
    <d:href>{}</d:href>
    <d:propstat>
      <d:prop>{}</d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>"#, href, props));
    }
    body.push_str("\n</d:multistatus>\n");
    Ok(HttpResponse::with_body(StatusCode::MULTI_STATUS, body))
}

pub fn status(code: StatusCode) -> Result<HttpResponse> {
    Ok(HttpResponse::new(code))
}

/// An OPTIONS response advertising `dav`
pub fn options(dav: &str) -> Result<HttpResponse> {
    let mut response = HttpResponse::new(StatusCode::OK);
    response.headers.insert("dav", HeaderValue::from_str(dav).unwrap());
    Ok(response)
}


/// A DNS resolver with fixed records
#[derive(Default)]
pub struct MockDns {
    pub srv: HashMap<String, Vec<SrvRecord>>,
    pub txt: HashMap<String, Vec<String>>,
    pub fail: bool,
    calls: AtomicUsize,
}

impl MockDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn with_srv(mut self, name: &str, target: &str, port: u16) -> Self {
        self.srv.insert(name.to_string(), vec![SrvRecord { target: target.to_string(), port, priority: 0, weight: 1 }]);
        self
    }

    pub fn with_txt(mut self, name: &str, record: &str) -> Self {
        self.txt.insert(name.to_string(), vec![record.to_string()]);
        self
    }

    /// How many lookups were made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsServiceResolver for MockDns {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(davlink::DavError::Network(format!("no DNS server for {}", name)));
        }
        Ok(self.srv.get(name).cloned().unwrap_or_default())
    }

    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(davlink::DavError::Network(format!("no DNS server for {}", name)));
        }
        Ok(self.txt.get(name).cloned().unwrap_or_default())
    }
}


/// Accounts kept in memory
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Credentials>>,
    pub behaviour: Mutex<MockBehaviour>,
}

impl MemoryAccountStore {
    pub fn with_account(account: &str, credentials: Credentials) -> Self {
        let store = Self::default();
        store.accounts.lock().unwrap().insert(account.to_string(), credentials);
        store
    }

    pub fn stored(&self, account: &str) -> Credentials {
        self.accounts.lock().unwrap().get(account).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn credentials(&self, account: &str) -> Result<Credentials> {
        Ok(self.stored(account))
    }

    async fn set_credentials(&self, account: &str, credentials: Credentials) -> Result<()> {
        self.behaviour.lock().unwrap().can_set_credentials()?;
        self.accounts.lock().unwrap().insert(account.to_string(), credentials);
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        Ok(self.accounts.lock().unwrap().keys().cloned().collect())
    }
}


/// A device address book
pub struct MemoryContactStore {
    pub contacts: Vec<RawContact>,
    pub groups: Vec<RawGroup>,
}

impl MemoryContactStore {
    /// `n` contacts named `Contact 0000`...
    pub fn numbered(n: i64) -> Self {
        let contacts = (0..n)
            .map(|id| RawContact {
                id,
                rows: vec![
                    DataRow::Name {
                        first: Some("Contact".to_string()),
                        middle: None,
                        last: Some(format!("{:04}", id)),
                        display: None,
                    },
                    DataRow::GroupMembership(id % 2),
                ],
            })
            .collect();
        let groups = vec![
            RawGroup { id: 0, title: "Even".to_string(), deleted: false },
            RawGroup { id: 1, title: "Odd".to_string(), deleted: false },
        ];
        Self { contacts, groups }
    }
}

impl LocalContactStore for MemoryContactStore {
    fn query_contacts(&self) -> Result<Vec<RawContact>> {
        Ok(self.contacts.clone())
    }
    fn query_groups(&self) -> Result<Vec<RawGroup>> {
        Ok(self.groups.clone())
    }
}


/// A merge service that records what it receives
#[derive(Default)]
pub struct MockMergeService {
    pub behaviour: Mutex<MockBehaviour>,
    /// Contacts whose id is in there are reported as duplicates
    pub known: Vec<i64>,
    checked: Mutex<Vec<Vec<i64>>>,
    imported: Mutex<Vec<i64>>,
    delay: Option<Duration>,
}

impl MockMergeService {
    pub fn new(behaviour: MockBehaviour) -> Self {
        Self { behaviour: Mutex::new(behaviour), ..Self::default() }
    }

    pub fn with_known(mut self, known: Vec<i64>) -> Self {
        self.known = known;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The ids of every chunk that went through, in order
    pub fn checked_chunks(&self) -> Vec<Vec<i64>> {
        self.checked.lock().unwrap().clone()
    }

    pub fn imported(&self) -> Vec<i64> {
        self.imported.lock().unwrap().clone()
    }
}

#[async_trait]
impl MergeService for MockMergeService {
    async fn duplicate_check(&self, contacts: &[Contact]) -> Result<DuplicateReport> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.behaviour.lock().unwrap().can_duplicate_check()?;

        self.checked.lock().unwrap().push(contacts.iter().map(|c| c.id).collect());
        let duplicates = contacts.iter()
            .filter(|c| self.known.contains(&c.id))
            .map(|c| Duplicate { contact_id: c.id, remote_id: format!("remote-{}", c.id), display_name: None })
            .collect();
        Ok(DuplicateReport { duplicates })
    }

    async fn import(&self, contacts: &[Contact]) -> Result<Vec<String>> {
        self.behaviour.lock().unwrap().can_import()?;
        self.imported.lock().unwrap().extend(contacts.iter().map(|c| c.id));
        Ok(contacts.iter().map(|c| format!("remote-{}", c.id)).collect())
    }
}
