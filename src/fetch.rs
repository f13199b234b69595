//! Request/response plumbing shared by every data source
//!
//! The metric engine never talks to `reqwest` directly; it goes through the
//! [`Fetcher`] trait so tests can script responses.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::{MetricsError, Result, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Basic { username: String, password: String },
    Bearer(String),
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub source: Source,
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub auth: Option<Auth>,
    pub body: Option<serde_json::Value>,
}

impl FetchRequest {
    pub fn get(source: Source, url: impl Into<String>) -> Self {
        Self {
            source,
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            auth: None,
            body: None,
        }
    }

    pub fn post(source: Source, url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(source, url)
        }
    }

    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.set_query(key, value);
        self
    }

    /// Replace an existing query parameter or append it
    pub fn set_query(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        if let Some(pair) = self.query.iter_mut().find(|(k, _)| k == key) {
            pair.1 = value;
        } else {
            self.query.push((key.to_string(), value));
        }
    }

    #[must_use]
    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Capability to issue one HTTP exchange against an external system
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Fetch and decode a JSON body, mapping non-2xx to `SourceUnavailable`
pub async fn fetch_json<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
) -> Result<T> {
    let response = fetcher.fetch(request).await?;

    if !response.is_success() {
        return Err(MetricsError::unavailable(
            request.source,
            format!("{} returned HTTP {}", request.url, response.status),
        ));
    }

    serde_json::from_str(&response.body)
        .map_err(|e| MetricsError::malformed(request.source, format!("{}: {e}", request.url)))
}

/// `Fetcher` backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("dora-metrics")
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder = match &request.auth {
            Some(Auth::Basic { username, password }) => builder.basic_auth(username, Some(password)),
            Some(Auth::Bearer(token)) => builder.bearer_auth(token),
            None => builder,
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(source = %request.source, url = %request.url, "sending request");

        let resp = builder
            .send()
            .await
            .map_err(|e| MetricsError::unavailable(request.source, e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| MetricsError::unavailable(request.source, e.to_string()))?;

        debug!(source = %request.source, status, bytes = body.len(), "received response");
        Ok(FetchResponse { status, body })
    }
}
