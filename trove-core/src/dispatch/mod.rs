//! Bounded, priority-ordered request dispatch.
//!
//! The orchestrator submits [`ApiRequest`](crate::request::ApiRequest)s;
//! worker tasks pull them in priority order, call the transport and publish
//! one [`ApiResponse`](crate::request::ApiResponse) per request.

mod dispatcher;
mod limiter;
mod queue;

pub use dispatcher::Dispatcher;
pub use limiter::CostLimiter;
pub use queue::{Backlog, PendingQueue};

use thiserror::Error;

use crate::request::ApiRequest;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The pending queue is at capacity. The request is handed back so the
    /// caller can park it.
    #[error("dispatch queue is full ({capacity} pending)")]
    QueueFull {
        capacity: usize,
        request: Box<ApiRequest>,
    },

    #[error("dispatcher is shutting down")]
    ShuttingDown { request: Box<ApiRequest> },
}

impl DispatchError {
    /// Recover the rejected request.
    pub fn into_request(self) -> ApiRequest {
        match self {
            DispatchError::QueueFull { request, .. }
            | DispatchError::ShuttingDown { request } => *request,
        }
    }
}
