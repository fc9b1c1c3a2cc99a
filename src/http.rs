//! A thin HTTP layer, so that the WebDAV and merge-service code can run on top of any transport
//!
//! In production, this is [`ReqwestTransport`], usually wrapped into an
//! [`AuthenticatingPipeline`](crate::auth::AuthenticatingPipeline).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::error::Result;

/// An outgoing request
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: None }
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self> {
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(self)
    }

    pub fn body<S: Into<String>>(mut self, content_type: &str, body: S) -> Result<Self> {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        self.body = Some(body.into());
        Ok(self)
    }

    /// Returns the bearer token this request carries, if any
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

/// A received response. The body is always fully read.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: String::new() }
    }

    pub fn with_body<S: Into<String>>(status: StatusCode, body: S) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    /// Every value of a header, in case it has been sent several times
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers.get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }
}

/// Something that is able to send HTTP requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and read its whole response.
    ///
    /// Any HTTP status is an `Ok`. `Err` is reserved to cases where no response has been received.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// The production transport. Redirects are not followed, callers decide what to do with them.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        log::trace!("{} {}", request.method, request.url);

        let mut builder = self.client
            .request(request.method, request.url.as_str())
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(HttpResponse { status, headers, body })
    }
}
