//! Error types for nodegraph-core.

use thiserror::Error;

/// Error type for structural graph operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A descriptor or feature array is inconsistent with the declared graph sizes.
    #[error("Construction error: {0}")]
    Construction(String),

    /// Structural mutation attempted through a view, or incompatible partition layouts.
    #[error("View error: {0}")]
    View(String),

    /// Node reference outside `[0, len)`.
    #[error("Node index {index} out of range for {len} nodes")]
    Index { index: usize, len: usize },

    /// Partition name was never registered with `add_kind`.
    #[error("Unknown partition: {0}")]
    UnknownPartition(String),
}

/// Result type for structural graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Check that `index` addresses one of `len` nodes.
pub(crate) fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::Index { index, len })
    }
}
