use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::ledger::LedgerError;
use crate::orchestrator::OrchestratorError;
use crate::search::TreeError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum TroveError {
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Search error: {0}")]
    Search(#[from] TreeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Run aborted: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TroveError>;
