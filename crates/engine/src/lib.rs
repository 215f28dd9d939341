//! Call-chain integration for txscope
//!
//! Binds the propagation machinery to real call chains:
//! - [`chain`]: thread-local and tokio task-local context stacks
//! - [`TransactionTemplate`]: wraps operations in their declared boundaries
//! - [`ManagerRegistry`]: named transaction managers
//! - [`StaticAttributeSource`]: cached declaration-backed attributes
//! - [`TxscopeConfig`]: TOML configuration
//! - [`InMemoryResourceManager`]: journaled in-memory store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod config;
pub mod memory;
pub mod registry;
pub mod source;
pub mod template;

pub use config::{ComponentConfig, OperationConfig, TxscopeConfig};
pub use memory::{FailPoint, InMemoryResourceManager, ResourceCall};
pub use registry::ManagerRegistry;
pub use source::StaticAttributeSource;
pub use template::{ErrorType, InvocationError, InvocationResult, TransactionTemplate};
