//! Propagation decision engine
//!
//! Given the attribute of an operation about to run and the chain's context
//! stack, picks the boundary [`Action`]. The engine only reads the stack;
//! applying the action (suspending, beginning, taking a savepoint, pushing)
//! is the job of [`TransactionManager::begin`](crate::TransactionManager::begin).
//!
//! ## Decision table
//!
//! | Propagation | Current exists | Current absent |
//! |-------------|----------------|----------------|
//! | Required | JoinExisting | StartNew |
//! | Supports | JoinExisting | RunWithoutTx(false) |
//! | Mandatory | JoinExisting | Fail(NoTransaction) |
//! | RequiresNew | SuspendAndStartNew | StartNew |
//! | NotSupported | RunWithoutTx(true) | RunWithoutTx(false) |
//! | Never | Fail(ExistingTransaction) | RunWithoutTx(false) |
//! | Nested | NestWithSavepoint / fallback / Fail | StartNew |

use crate::stack::ContextStack;
use crate::context::TransactionContext;
use txscope_core::{ContextId, Isolation, Propagation, TransactionAttribute, TxError};

/// Boundary action chosen on entry to an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Participate in the current transaction
    JoinExisting,
    /// Begin a new physical transaction; nothing to suspend
    StartNew,
    /// Detach the current transaction and begin a new one
    SuspendAndStartNew,
    /// Run without a transaction, optionally detaching the current one
    RunWithoutTx {
        /// Whether a current transaction must be detached first
        suspend_existing: bool,
    },
    /// Run behind a savepoint of the current transaction
    NestWithSavepoint,
    /// Refuse to run the operation
    Fail(Rejection),
}

impl Action {
    /// Short name for log records
    pub fn name(&self) -> &'static str {
        match self {
            Action::JoinExisting => "join_existing",
            Action::StartNew => "start_new",
            Action::SuspendAndStartNew => "suspend_and_start_new",
            Action::RunWithoutTx {
                suspend_existing: true,
            } => "suspend_and_run_without_tx",
            Action::RunWithoutTx {
                suspend_existing: false,
            } => "run_without_tx",
            Action::NestWithSavepoint => "nest_with_savepoint",
            Action::Fail(_) => "fail",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why the engine refused an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A transaction was required but none is active
    NoTransaction,
    /// No transaction was allowed but one is active
    ExistingTransaction(ContextId),
    /// A savepoint was required but the current transaction cannot take one
    NestedNotSupported,
    /// Strict join found a mismatch
    IncompatibleAttributes(String),
}

impl Rejection {
    /// Convert into the canonical error for the given propagation
    pub fn into_error(self, propagation: Propagation) -> TxError {
        match self {
            Rejection::NoTransaction => TxError::NoTransaction { propagation },
            Rejection::ExistingTransaction(existing) => TxError::ExistingTransaction { existing },
            Rejection::NestedNotSupported => TxError::NestedNotSupported {
                reason: "the current transaction does not support savepoints".to_string(),
            },
            Rejection::IncompatibleAttributes(reason) => TxError::IncompatibleAttributes { reason },
        }
    }
}

/// Pure propagation decision logic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationEngine {
    /// Validate isolation/read-only compatibility when joining
    pub strict_join: bool,
    /// Let `Nested` fall back to suspend-and-start-new without savepoints
    pub nested_fallback: bool,
}

impl PropagationEngine {
    /// Engine with lenient joins and no nested fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the action for `attribute` given the chain's stack
    pub fn decide(&self, attribute: &TransactionAttribute, stack: &ContextStack) -> Action {
        match stack.current_transaction() {
            Some(current) => self.decide_with_current(attribute, current),
            None => Self::decide_without_current(attribute.propagation()),
        }
    }

    fn decide_without_current(propagation: Propagation) -> Action {
        match propagation {
            Propagation::Required | Propagation::RequiresNew | Propagation::Nested => {
                Action::StartNew
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                Action::RunWithoutTx {
                    suspend_existing: false,
                }
            }
            Propagation::Mandatory => Action::Fail(Rejection::NoTransaction),
        }
    }

    fn decide_with_current(
        &self,
        attribute: &TransactionAttribute,
        current: &TransactionContext,
    ) -> Action {
        match attribute.propagation() {
            Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                match self.check_join(attribute, current) {
                    Some(reason) => Action::Fail(Rejection::IncompatibleAttributes(reason)),
                    None => Action::JoinExisting,
                }
            }
            Propagation::RequiresNew => Action::SuspendAndStartNew,
            Propagation::NotSupported => Action::RunWithoutTx {
                suspend_existing: true,
            },
            Propagation::Never => Action::Fail(Rejection::ExistingTransaction(current.id())),
            Propagation::Nested if current.savepoints_supported() => Action::NestWithSavepoint,
            Propagation::Nested if self.nested_fallback => Action::SuspendAndStartNew,
            Propagation::Nested => Action::Fail(Rejection::NestedNotSupported),
        }
    }

    /// Mismatch description when strict joining is on, `None` when compatible
    fn check_join(
        &self,
        attribute: &TransactionAttribute,
        current: &TransactionContext,
    ) -> Option<String> {
        if !self.strict_join {
            return None;
        }
        let requested = attribute.isolation();
        if requested != Isolation::Default && requested != current.isolation() {
            return Some(format!(
                "requested isolation '{}' but joined transaction {} runs at '{}'",
                requested,
                current.id(),
                current.isolation()
            ));
        }
        if !attribute.is_read_only() && current.is_read_only() {
            return Some(format!(
                "read-write operation cannot join read-only transaction {}",
                current.id()
            ));
        }
        None
    }
}
