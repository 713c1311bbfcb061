//! Shared HTTP transport with a mutable set of default headers.
//!
//! `reqwest::Client` fixes its default headers at build time, so the
//! transport keeps its own header map and stamps a snapshot of it onto every
//! request at dispatch. Changing the credential therefore affects every later
//! request without touching the call sites, while requests already in flight
//! keep the headers they were sent with.

use crate::Error;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct AuthorizedTransport {
    client: Client,
    base_url: String,
    headers: RwLock<HeaderMap>,
}

impl AuthorizedTransport {
    /// Creates a transport rooted at `base_url` with a per-request timeout.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            headers: RwLock::new(headers),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the `Authorization` value for a bearer token.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCredential`] if the token contains bytes that
    /// cannot appear in a header.
    pub fn bearer(token: &str) -> Result<HeaderValue, Error> {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| Error::InvalidCredential)?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Attaches `token` as a bearer credential to every later request.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCredential`] if the token is not header-safe.
    pub fn install_credential(&self, token: &str) -> Result<(), Error> {
        let value = Self::bearer(token)?;
        self.install_bearer(value);
        Ok(())
    }

    pub(crate) fn install_bearer(&self, value: HeaderValue) {
        self.headers.write().insert(AUTHORIZATION, value);
    }

    pub fn remove_credential(&self) {
        self.headers.write().remove(AUTHORIZATION);
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.headers.read().contains_key(AUTHORIZATION)
    }

    /// Snapshot of the headers the next request will carry.
    #[must_use]
    pub fn default_headers(&self) -> HeaderMap {
        self.headers.read().clone()
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        tracing::debug!(%method, endpoint, "dispatching request");
        self.client
            .request(method, format!("{}{}", self.base_url, endpoint))
            .headers(self.default_headers())
    }

    /// Sends a GET request with `query` as URL parameters.
    ///
    /// # Errors
    /// Returns an error if the request fails, the status is not 2xx, or the
    /// body is not JSON.
    pub async fn get<Q>(&self, endpoint: &str, query: &Q) -> Result<Value, Error>
    where
        Q: Serialize + ?Sized,
    {
        dispatch(self.request(Method::GET, endpoint).query(query)).await
    }

    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    /// Returns an error if the request fails, the status is not 2xx, or the
    /// body is not JSON.
    pub async fn post<B>(&self, endpoint: &str, body: &B) -> Result<Value, Error>
    where
        B: Serialize + ?Sized,
    {
        dispatch(self.request(Method::POST, endpoint).json(body)).await
    }

    /// Sends a DELETE request with a JSON body.
    ///
    /// # Errors
    /// Returns an error if the request fails, the status is not 2xx, or the
    /// body is not JSON.
    pub async fn delete<B>(&self, endpoint: &str, body: &B) -> Result<Value, Error>
    where
        B: Serialize + ?Sized,
    {
        dispatch(self.request(Method::DELETE, endpoint).json(body)).await
    }
}

async fn dispatch(request: RequestBuilder) -> Result<Value, Error> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "request rejected");
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            reason,
            body,
        });
    }
    response.json().await.map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> AuthorizedTransport {
        AuthorizedTransport::new("http://localhost:3000/api/", DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        assert_eq!(transport().base_url(), "http://localhost:3000/api");
    }

    #[test]
    fn content_type_is_json_by_default() {
        let headers = transport().default_headers();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn install_and_remove_credential() {
        let transport = transport();
        transport.install_credential("abc").unwrap();
        assert!(transport.has_credential());
        assert_eq!(
            transport.default_headers().get(AUTHORIZATION).unwrap(),
            "Bearer abc"
        );

        transport.remove_credential();
        assert!(!transport.has_credential());
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let transport = transport();
        let err = transport.install_credential("abc\ndef").unwrap_err();
        assert!(matches!(err, Error::InvalidCredential));
        assert!(!transport.has_credential());
    }
}
