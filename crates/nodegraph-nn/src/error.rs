//! Error types for nodegraph-nn.

use thiserror::Error;

/// Error type for aggregation and pooling.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Structural error from the underlying batch.
    #[error("graph error: {0}")]
    Graph(#[from] nodegraph_core::Error),

    /// Numeric shape mismatch inside an aggregation or pooling call.
    #[error("computation error: {0}")]
    Computation(String),

    /// Invalid layer configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
