//! Core types for txscope
//!
//! This crate holds everything about transaction propagation that does not
//! depend on a live call chain:
//! - [`TransactionAttribute`]: declared behavior of one operation, and
//!   [`resolve`] for class/method-level declarations
//! - [`ErrorHierarchy`]: explicit ancestor table of error types
//! - [`RollbackRuleMatcher`]: commit-or-rollback decisions from rules
//! - [`ResourceManager`] / [`AttributeSource`]: collaborator traits
//! - [`TxError`]: the canonical error type

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribute;
pub mod error;
pub mod hierarchy;
pub mod rollback;
pub mod traits;
pub mod types;

pub use attribute::{resolve, TransactionAttribute, TransactionDeclaration};
pub use error::{ResourceError, TxError, TxResult, TRANSACTION_ERROR};
pub use hierarchy::{simple_name, ErrorClass, ErrorHierarchy, ErrorTypeDef};
pub use rollback::{
    Decision, Outcome, Reason, RollbackRule, RollbackRuleMatcher, RuleSign, RuleTarget, Verdict,
};
pub use traits::{AttributeSource, BeginRequest, CallSite, ResourceManager};
pub use types::{
    ContextId, Isolation, Propagation, ResourceHandle, SavepointHandle, TIMEOUT_DEFAULT,
};
