//! Error types for transaction propagation
//!
//! [`TxError`] is the canonical error for every decision and completion
//! operation. Resource-manager failures travel inside it untouched as
//! [`ResourceError`]; this layer never reinterprets them.
//!
//! Every variant also reports an error type name (see [`TxError::error_type`])
//! registered in the standard [`ErrorHierarchy`](crate::ErrorHierarchy), so a
//! failure raised by the transaction machinery itself can be fed back into
//! the rollback matcher like any operation error.

use crate::types::{ContextId, Propagation};
use std::time::Duration;
use thiserror::Error;

/// Error type name of the common ancestor of every [`TxError`]
pub const TRANSACTION_ERROR: &str = "txscope::TransactionError";

/// Failure reported by a resource manager
///
/// Carries the failing operation and an optional underlying cause. The
/// propagation layer surfaces it verbatim.
#[derive(Debug, Error)]
#[error("{operation} failed: {message}")]
pub struct ResourceError {
    /// Resource operation that failed (e.g. "commit")
    pub operation: &'static str,
    /// Human-readable message
    pub message: String,
    /// Underlying cause, if any
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ResourceError {
    /// Create a resource error without an underlying cause
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            source: None,
        }
    }

    /// Create a resource error wrapping an underlying cause
    pub fn with_source(
        operation: &'static str,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            operation,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// All transaction propagation errors
#[derive(Debug, Error)]
pub enum TxError {
    /// MANDATORY propagation with no transaction active
    #[error("no existing transaction found for operation declared '{propagation}'")]
    NoTransaction {
        /// Propagation that demanded a transaction
        propagation: Propagation,
    },

    /// NEVER propagation with a transaction active
    #[error("existing transaction {existing} found for operation declared 'never'")]
    ExistingTransaction {
        /// The transaction that is already active
        existing: ContextId,
    },

    /// NESTED propagation without savepoint capability
    #[error("nested transaction not supported: {reason}")]
    NestedNotSupported {
        /// Why a savepoint could not be used
        reason: String,
    },

    /// Strict join found isolation or read-only mismatch
    #[error("incompatible transaction attributes: {reason}")]
    IncompatibleAttributes {
        /// Description of the mismatch
        reason: String,
    },

    /// Attempt to complete a context that is not the active top of its stack
    #[error("illegal completion of {context}: {reason}")]
    IllegalCompletion {
        /// Context the caller tried to complete
        context: ContextId,
        /// Why the completion was refused
        reason: String,
    },

    /// The transaction outlived its deadline
    #[error("transaction {context} timed out: deadline exceeded by {overrun:?}")]
    TimedOut {
        /// Context owning the physical transaction
        context: ContextId,
        /// How far past the deadline the check happened
        overrun: Duration,
    },

    /// A transaction whose operation succeeded was rolled back because a
    /// participant marked it rollback-only
    #[error("transaction {context} rolled back because it was marked rollback-only")]
    UnexpectedRollback {
        /// Context owning the physical transaction
        context: ContextId,
    },

    /// An attribute named a transaction manager that is not registered
    #[error("no transaction manager registered under '{name}'")]
    UnknownManager {
        /// Requested qualifier
        name: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Pass-through resource manager failure
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl TxError {
    /// Create an illegal-completion error
    pub fn illegal_completion(context: ContextId, reason: impl Into<String>) -> Self {
        TxError::IllegalCompletion {
            context,
            reason: reason.into(),
        }
    }

    /// Error type name used when routing this error through the rollback matcher
    pub fn error_type(&self) -> &'static str {
        match self {
            TxError::NoTransaction { .. } => "txscope::NoTransaction",
            TxError::ExistingTransaction { .. } => "txscope::ExistingTransaction",
            TxError::NestedNotSupported { .. } => "txscope::NestedNotSupported",
            TxError::IncompatibleAttributes { .. } => "txscope::IncompatibleAttributes",
            TxError::IllegalCompletion { .. } => "txscope::IllegalCompletion",
            TxError::TimedOut { .. } => "txscope::TimedOut",
            TxError::UnexpectedRollback { .. } => "txscope::UnexpectedRollback",
            TxError::UnknownManager { .. } => "txscope::UnknownManager",
            TxError::Config(_) => "txscope::Config",
            TxError::Resource(_) => "txscope::Resource",
        }
    }

    /// Check if this error was raised while deciding, before any body ran
    pub fn is_decision_failure(&self) -> bool {
        matches!(
            self,
            TxError::NoTransaction { .. }
                | TxError::ExistingTransaction { .. }
                | TxError::NestedNotSupported { .. }
                | TxError::IncompatibleAttributes { .. }
                | TxError::UnknownManager { .. }
        )
    }

    /// Check if this error came from the resource manager
    pub fn is_resource(&self) -> bool {
        matches!(self, TxError::Resource(_))
    }
}

/// Result type for transaction operations
pub type TxResult<T> = std::result::Result<T, TxError>;
