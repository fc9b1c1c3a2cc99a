//! The remote service that finds duplicates among uploaded contacts, and imports them

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::contacts::{Contact, ContactId};
use crate::error::{DavError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::utils::with_trailing_slash;

/// The error code the service uses when an account holds more contacts than it accepts
pub const TOO_MANY_CONTACTS_CODE: &str = "TOO_MANY_CONTACTS";

/// A local contact that matches a contact already known remotely
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Duplicate {
    pub contact_id: ContactId,
    pub remote_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    #[serde(default)]
    pub duplicates: Vec<Duplicate>,
}

#[derive(Debug, Deserialize)]
struct ImportReport {
    #[serde(default)]
    identifiers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
}

#[async_trait]
pub trait MergeService: Send + Sync {
    /// Send contacts, and get back the ones that duplicate remote contacts
    async fn duplicate_check(&self, contacts: &[Contact]) -> Result<DuplicateReport>;
    /// Import contacts, and get back their remote identifiers
    async fn import(&self, contacts: &[Contact]) -> Result<Vec<String>>;
}

/// A [`MergeService`] that speaks JSON over HTTP.
///
/// Give it an [`AuthenticatingPipeline`](crate::auth::AuthenticatingPipeline) as a transport, so that requests carry the account credentials.
pub struct HttpMergeService {
    transport: Arc<dyn HttpTransport>,
    base: Url,
}

impl HttpMergeService {
    pub fn new(transport: Arc<dyn HttpTransport>, base: &Url) -> Self {
        Self { transport, base: with_trailing_slash(base) }
    }

    async fn send(&self, method: Method, path: &str, contacts: &[Contact]) -> Result<HttpResponse> {
        let url = self.base.join(path)?;
        let request = HttpRequest::new(method, url.clone())
            .header(ACCEPT, "application/json")?
            .body("application/json", serde_json::to_string(contacts)?)?;

        log::debug!("Sending {} contacts to {}", contacts.len(), url);
        let response = self.transport.execute(request).await?;
        check_status(&url, response)
    }
}

#[async_trait]
impl MergeService for HttpMergeService {
    async fn duplicate_check(&self, contacts: &[Contact]) -> Result<DuplicateReport> {
        let response = self.send(Method::POST, "contacts/duplicate-check", contacts).await?;
        if response.body.trim().is_empty() {
            return Ok(DuplicateReport::default());
        }
        Ok(serde_json::from_str(&response.body)?)
    }

    async fn import(&self, contacts: &[Contact]) -> Result<Vec<String>> {
        let response = self.send(Method::PUT, "contacts/import", contacts).await?;
        let report: ImportReport = serde_json::from_str(&response.body)?;
        Ok(report.identifiers)
    }
}

/// Map a response of the service into the error taxonomy
fn check_status(url: &Url, response: HttpResponse) -> Result<HttpResponse> {
    let status = response.status;
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return Err(DavError::TooManyContacts);
    }
    if let Ok(ErrorBody { code: Some(code) }) = serde_json::from_str::<ErrorBody>(&response.body) {
        if code == TOO_MANY_CONTACTS_CODE {
            return Err(DavError::TooManyContacts);
        }
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(DavError::Auth(format!("{} is unauthorized", url)));
    }
    Err(DavError::Http { status: status.as_u16(), url: url.to_string() })
}

#[cfg(test)]
mod test {
    use super::*;

    fn url() -> Url {
        Url::parse("https://merge.example.com/api/contacts/import").unwrap()
    }

    #[test]
    fn statuses_are_mapped() {
        assert!(check_status(&url(), HttpResponse::new(StatusCode::OK)).is_ok());
        assert_eq!(check_status(&url(), HttpResponse::new(StatusCode::PAYLOAD_TOO_LARGE)).unwrap_err(), DavError::TooManyContacts);
        assert_eq!(
            check_status(&url(), HttpResponse::with_body(StatusCode::BAD_REQUEST, r#"{"code":"TOO_MANY_CONTACTS","message":"limit is 10000"}"#)).unwrap_err(),
            DavError::TooManyContacts
        );
        assert!(matches!(check_status(&url(), HttpResponse::new(StatusCode::UNAUTHORIZED)), Err(DavError::Auth(_))));
        assert_eq!(
            check_status(&url(), HttpResponse::with_body(StatusCode::BAD_GATEWAY, "<html>")).unwrap_err(),
            DavError::Http { status: 502, url: url().to_string() }
        );
    }

    #[test]
    fn duplicate_reports() {
        let report: DuplicateReport = serde_json::from_str(r#"{"duplicates":[{"contactId":4,"remoteId":"r-4"}]}"#).unwrap();
        assert_eq!(report.duplicates, vec![Duplicate { contact_id: 4, remote_id: "r-4".into(), display_name: None }]);
        let empty: DuplicateReport = serde_json::from_str("{}").unwrap();
        assert!(empty.duplicates.is_empty());
    }
}
