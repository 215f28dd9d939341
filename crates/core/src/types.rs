//! Core types for transaction propagation
//!
//! This module defines the small value types shared by every layer:
//! - [`Propagation`]: how an operation participates in a surrounding transaction
//! - [`Isolation`]: requested isolation level for a new physical transaction
//! - [`ContextId`]: opaque identity of one transaction boundary
//! - [`ResourceHandle`] / [`SavepointHandle`]: opaque handles issued by a resource manager

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Timeout value meaning "use the resource manager's default"
pub const TIMEOUT_DEFAULT: i32 = -1;

/// Propagation behavior declared for one operation
///
/// ## Decision summary
///
/// | Propagation | Transaction active | No transaction |
/// |-------------|--------------------|----------------|
/// | Required | join | start new |
/// | Supports | join | run without |
/// | Mandatory | join | fail |
/// | RequiresNew | suspend + start new | start new |
/// | NotSupported | suspend + run without | run without |
/// | Never | fail | run without |
/// | Nested | savepoint | start new |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Join the current transaction, or start one if none exists
    #[default]
    Required,
    /// Join the current transaction, or run non-transactionally
    Supports,
    /// Join the current transaction; fail if none exists
    Mandatory,
    /// Always start a new physical transaction, suspending any current one
    RequiresNew,
    /// Run non-transactionally, suspending any current transaction
    NotSupported,
    /// Run non-transactionally; fail if a transaction exists
    Never,
    /// Run inside a savepoint of the current transaction, or start one
    Nested,
}

impl Propagation {
    /// All propagation behaviors (for iteration)
    pub const ALL: [Propagation; 7] = [
        Propagation::Required,
        Propagation::Supports,
        Propagation::Mandatory,
        Propagation::RequiresNew,
        Propagation::NotSupported,
        Propagation::Never,
        Propagation::Nested,
    ];

    /// Short identifier (used in configuration files)
    pub const fn id(&self) -> &'static str {
        match self {
            Propagation::Required => "required",
            Propagation::Supports => "supports",
            Propagation::Mandatory => "mandatory",
            Propagation::RequiresNew => "requires_new",
            Propagation::NotSupported => "not_supported",
            Propagation::Never => "never",
            Propagation::Nested => "nested",
        }
    }

    /// Parse from short identifier
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.id() == id)
    }

    /// Whether this behavior can ever begin a new physical transaction
    pub const fn may_start_transaction(&self) -> bool {
        matches!(
            self,
            Propagation::Required | Propagation::RequiresNew | Propagation::Nested
        )
    }
}

impl std::fmt::Display for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Requested isolation level
///
/// Only meaningful when a new physical transaction is started; joined and
/// nested scopes inherit the isolation of the transaction they run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Whatever the resource manager uses by default
    #[default]
    Default,
    /// Dirty reads, non-repeatable reads and phantoms may occur
    ReadUncommitted,
    /// Dirty reads are prevented
    ReadCommitted,
    /// Dirty and non-repeatable reads are prevented
    RepeatableRead,
    /// Fully serializable execution
    Serializable,
}

impl Isolation {
    /// Short identifier (used in configuration files)
    pub const fn id(&self) -> &'static str {
        match self {
            Isolation::Default => "default",
            Isolation::ReadUncommitted => "read_uncommitted",
            Isolation::ReadCommitted => "read_committed",
            Isolation::RepeatableRead => "repeatable_read",
            Isolation::Serializable => "serializable",
        }
    }
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Identity of one transaction boundary
///
/// Ids are allocated from a process-wide counter and are never reused, so a
/// completed context can always be told apart from a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    /// Allocate a fresh, never-before-seen id
    pub fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Opaque handle for a physical transaction held open by a resource manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub u64);

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Opaque handle for a savepoint inside a physical transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SavepointHandle(pub u64);

impl std::fmt::Display for SavepointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sp-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
