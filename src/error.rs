//! Error types for the swap cycling agent

use thiserror::Error;

use crate::chain::ChainError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
