//! Error types for the peg-risk toolkit

use crate::risk::RiskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PegError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query results missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Holder {0} has zero LP balance")]
    ZeroBalance(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Received {received} below minimum {minimum}")]
    Slippage { received: String, minimum: String },

    #[error(transparent)]
    Risk(#[from] RiskError),
}

impl From<config::ConfigError> for PegError {
    fn from(e: config::ConfigError) -> Self {
        PegError::Config(e.to_string())
    }
}

impl From<ethers::providers::ProviderError> for PegError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        PegError::Rpc(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PegError>;
