//! HTTP client shared by the collaborator adapters

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::DeployError;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON client for one upstream service, authenticated with a bearer token
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpClient {
    /// Create a client for `base_url`
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, DeployError> {
        Url::parse(base_url)
            .map_err(|e| DeployError::ConfigError(format!("invalid URL '{}': {}", base_url, e)))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`, with `query` pairs percent-encoded
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, DeployError> {
        let raw = format!("{}{}", self.base_url, path);
        let mut url = Url::parse(&raw)
            .map_err(|e| DeployError::ConfigError(format!("invalid URL '{}': {}", raw, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DeployError> {
        let request = self.request(Method::GET, self.url(path, query)?);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        let request = self.request(Method::POST, self.url(path, &[])?).json(body);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    /// Make a DELETE request, ignoring any response body
    pub async fn delete(&self, path: &str) -> Result<(), DeployError> {
        let request = self.request(Method::DELETE, self.url(path, &[])?);
        self.send(request).await?;
        Ok(())
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{} {}", method, url);
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DeployError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let url = response.url().clone();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP request to {} failed: {} - {}", url.path(), status, body);
            return Err(DeployError::HttpStatus(format!("{}: {}", status, body)));
        }

        Ok(response)
    }
}
