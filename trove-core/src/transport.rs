//! Contract between the dispatcher and whatever talks to the service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::model::{ApiError, Area, CoinId, ExploreReport, License, TreasureId};
use crate::request::DigRequest;

/// Failure to obtain any reply at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The call exceeded its deadline. Always safe to resend.
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

/// A reply from the service: status, decoded body or error body, and how
/// long the round trip took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub status: StatusCode,
    pub body: Result<T, ApiError>,
    pub latency: Duration,
}

impl<T> Reply<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            body: Ok(body),
            latency: Duration::ZERO,
        }
    }

    pub fn error(status: StatusCode, error: ApiError) -> Self {
        Self {
            status,
            body: Err(error),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The payload when the call succeeded, otherwise the status and error
    /// body. A 2xx status without a payload reads as an unknown error.
    pub fn into_success(self) -> Result<T, (StatusCode, ApiError)> {
        match self.body {
            Ok(body) if self.status.is_success() => Ok(body),
            Ok(_) => Err((self.status, ApiError::unknown())),
            Err(error) => Err((self.status, error)),
        }
    }
}

pub type CallResult<T> = Result<Reply<T>, TransportError>;

/// One operation per request type. Implementations never interpret
/// payloads beyond decoding them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn health_check(&self) -> CallResult<String>;

    async fn explore(&self, area: Area) -> CallResult<ExploreReport>;

    /// An empty `coins` list asks for a free permit.
    async fn issue_license(&self, coins: Vec<CoinId>) -> CallResult<License>;

    async fn dig(&self, request: DigRequest) -> CallResult<Vec<TreasureId>>;

    async fn cash(&self, treasure: TreasureId) -> CallResult<Vec<CoinId>>;
}
