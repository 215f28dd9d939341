//! # txscope
//!
//! Declarative transaction propagation for call chains.
//!
//! Operations declare how they relate to an enclosing transaction (join it,
//! suspend it and start their own, nest behind a savepoint, run without one,
//! or refuse to run). txscope tracks the open boundaries of each call chain,
//! decides what every boundary must do on entry, and commits, rolls back or
//! releases on exit according to declared rollback rules.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use txscope::prelude::*;
//!
//! let store = Arc::new(InMemoryResourceManager::new());
//! let scope = Txscope::builder()
//!     .config_str(r#"
//!         [[components]]
//!         name = "Accounts"
//!         propagation = "required"
//!     "#)
//!     .resource_manager(store.clone())
//!     .build()?;
//!
//! let result = scope.invoke(&CallSite::new("Accounts", "open"), || {
//!     Err::<(), _>(TxError::Config("rejected".into()))
//! });
//! assert!(result.is_err());
//! assert!(store.committed().is_empty());
//! # Ok::<(), txscope::Error>(())
//! ```
//!
//! ## Crates
//!
//! - `txscope-core`: attributes, rollback rules, error hierarchy, collaborator traits
//! - `txscope-concurrency`: context stack, propagation decisions, transaction manager
//! - `txscope-engine`: call-chain binding, invocation template, configuration

#![warn(missing_docs)]

mod error;
mod runtime;

pub mod prelude;

pub use error::{Error, Result};
pub use runtime::{Txscope, TxscopeBuilder};
