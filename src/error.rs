//! Unified error type for the txscope facade.

use thiserror::Error;
use txscope_core::TxError;

/// Errors raised while assembling a [`Txscope`](crate::Txscope).
///
/// Errors of wrapped invocations are reported as
/// [`InvocationError`](txscope_engine::InvocationError) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The builder was given no resource manager
    #[error("no resource manager configured")]
    MissingResourceManager,

    /// Invalid configuration or another transaction-layer failure
    #[error(transparent)]
    Transaction(#[from] TxError),
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Transaction(TxError::Config(_)))
    }
}
