//! `reqwest` implementation of the service transport.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use trove_core::config::ServiceConfig;
use trove_core::model::{ApiError, Area, CoinId, ExploreReport, License, TreasureId};
use trove_core::request::DigRequest;
use trove_core::transport::{CallResult, Reply, Transport, TransportError};

use crate::wire::DigBody;

#[derive(Debug, Clone)]
struct Endpoints {
    health: String,
    explore: String,
    licenses: String,
    dig: String,
    cash: String,
}

impl Endpoints {
    fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            health: format!("{base}/health-check"),
            explore: format!("{base}/explore"),
            licenses: format!("{base}/licenses"),
            dig: format!("{base}/dig"),
            cash: format!("{base}/cash"),
        }
    }
}

/// Transport speaking the service's JSON protocol over one pooled client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    endpoints: Endpoints,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: &ServiceConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config.base_url()))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        tracing::info!(
            target: "trove::dispatch",
            base_url = %base_url,
            "HTTP transport ready"
        );
        Self {
            client,
            endpoints: Endpoints::new(&base_url),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and turn the answer into a [`Reply`]. Only `200 OK`
    /// carries a payload; every other status is read as an error body.
    async fn send<T, F>(&self, request: RequestBuilder, decode: F) -> CallResult<T>
    where
        F: FnOnce(&[u8]) -> Result<T, TransportError>,
    {
        let started = Instant::now();
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;
        let latency = started.elapsed();

        let reply = if status == StatusCode::OK {
            Reply::ok(decode(&body)?)
        } else {
            Reply::error(status, decode_error(&body))
        };
        Ok(reply.with_latency(latency))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn health_check(&self) -> CallResult<String> {
        self.send(self.client.get(&self.endpoints.health), |body| {
            Ok(String::from_utf8_lossy(body).into_owned())
        })
        .await
    }

    async fn explore(&self, area: Area) -> CallResult<ExploreReport> {
        self.send(self.client.post(&self.endpoints.explore).json(&area), json)
            .await
    }

    async fn issue_license(&self, coins: Vec<CoinId>) -> CallResult<License> {
        self.send(self.client.post(&self.endpoints.licenses).json(&coins), json)
            .await
    }

    async fn dig(&self, request: DigRequest) -> CallResult<Vec<TreasureId>> {
        let body = DigBody::from(request);
        self.send(self.client.post(&self.endpoints.dig).json(&body), json)
            .await
    }

    async fn cash(&self, treasure: TreasureId) -> CallResult<Vec<CoinId>> {
        self.send(self.client.post(&self.endpoints.cash).json(&treasure), json)
            .await
    }
}

fn json<T: DeserializeOwned>(body: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(body).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Error bodies that do not decode keep the raw text as the message.
fn decode_error(body: &[u8]) -> ApiError {
    serde_json::from_slice(body).unwrap_or_else(|_| ApiError {
        code: ApiError::UNKNOWN_CODE,
        message: String::from_utf8_lossy(body).into_owned(),
    })
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() {
        TransportError::Decode(error.to_string())
    } else {
        TransportError::Connection(error.to_string())
    }
}
