//! Convenient imports for txscope.
//!
//! ```
//! use txscope::prelude::*;
//! ```

// Main entry point
pub use crate::runtime::{Txscope, TxscopeBuilder};

// Error handling
pub use crate::error::{Error, Result};
pub use txscope_core::{ResourceError, TxError, TxResult};
pub use txscope_engine::{ErrorType, InvocationError, InvocationResult};

// Declarations
pub use txscope_core::{
    CallSite, ErrorClass, Isolation, Propagation, RollbackRule, TransactionAttribute,
    TransactionDeclaration,
};

// Runtime pieces
pub use txscope_concurrency::{CompletionStatus, ManagerConfig, ResumeTimeout, TransactionManager};
pub use txscope_engine::{
    InMemoryResourceManager, ManagerRegistry, StaticAttributeSource, TransactionTemplate,
    TxscopeConfig,
};

// Collaborator traits
pub use txscope_core::{AttributeSource, ResourceManager};
