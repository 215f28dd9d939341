//! Per call-chain transaction propagation
//!
//! This crate turns declared [`TransactionAttribute`](txscope_core::TransactionAttribute)s
//! into transaction boundaries:
//! - [`ContextStack`]: the open boundaries of one call chain
//! - [`PropagationEngine`]: picks the boundary [`Action`] on entry
//! - [`TransactionManager`]: applies actions, completes boundaries, resumes
//!   suspended contexts and unwinds cancelled chains
//!
//! The crate holds no global or thread-local state; callers own the stacks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod completion;
pub mod config;
pub mod context;
pub mod manager;
pub mod propagation;
pub mod stack;

#[cfg(test)]
mod testing;

pub use completion::{Completion, PhysicalEffect};
pub use config::{ManagerConfig, ResumeTimeout};
pub use context::{
    CompletionCallback, CompletionStatus, ContextStatus, Suspended, TransactionContext,
};
pub use manager::{TransactionManager, DEFAULT_MANAGER};
pub use propagation::{Action, PropagationEngine, Rejection};
pub use stack::ContextStack;
