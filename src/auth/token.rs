//! OAuth token endpoint discovery and the refresh-token grant

use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{DavError, Result};
use crate::http::{HttpRequest, HttpTransport};
use crate::utils::with_trailing_slash;

/// Identifies this application to the identity provider
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    /// The issuer, whose discovery document gives the token endpoint
    pub issuer: Url,
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
struct ProviderMetadata {
    token_endpoint: Url,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Read the token endpoint from `{issuer}/.well-known/openid-configuration`
pub async fn fetch_token_endpoint(transport: &dyn HttpTransport, issuer: &Url) -> Result<Url> {
    let url = with_trailing_slash(issuer).join(".well-known/openid-configuration")?;
    let request = HttpRequest::new(Method::GET, url.clone())
        .header(ACCEPT, "application/json")?;

    let response = transport.execute(request).await?;
    if response.status.is_success() == false {
        return Err(DavError::Http { status: response.status.as_u16(), url: url.to_string() });
    }

    let metadata: ProviderMetadata = serde_json::from_str(&response.body)?;
    log::debug!("Token endpoint of {} is {}", issuer, metadata.token_endpoint);
    Ok(metadata.token_endpoint)
}

/// Trade a refresh token for a new access token
pub async fn refresh_grant(transport: &dyn HttpTransport, endpoint: &Url, client_id: &str, refresh_token: &str) -> Result<TokenResponse> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "refresh_token")
        .append_pair("refresh_token", refresh_token)
        .append_pair("client_id", client_id)
        .finish();

    let request = HttpRequest::new(Method::POST, endpoint.clone())
        .header(ACCEPT, "application/json")?
        .body("application/x-www-form-urlencoded", body)?;

    let response = transport.execute(request).await?;
    match response.status {
        status if status.is_success() => Ok(serde_json::from_str(&response.body)?),
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
            Err(DavError::Auth(format!("refresh token rejected by {}: {}", endpoint, response.body.trim())))
        },
        status => Err(DavError::Http { status: status.as_u16(), url: endpoint.to_string() }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn token_responses() {
        let full: TokenResponse = serde_json::from_str(r#"{"access_token":"a","refresh_token":"r","id_token":"i","expires_in":3600,"token_type":"Bearer"}"#).unwrap();
        assert_eq!(full.refresh_token.as_deref(), Some("r"));

        let minimal: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(minimal.refresh_token, None);

        assert!(serde_json::from_str::<TokenResponse>(r#"{"error":"invalid_grant"}"#).is_err());
    }
}
