//! Transaction context
//!
//! One [`TransactionContext`] exists per live transaction boundary, whether
//! that boundary started a physical transaction, joined one, holds a
//! savepoint, or runs without a transaction at all.
//!
//! ## Kinds of boundary
//!
//! | Kind | `is_new_physical` | `resource` | `savepoint` |
//! |------|-------------------|------------|-------------|
//! | Physical | true | owned | - |
//! | Joined | false | shared with parent | - |
//! | Nested | false | shared with parent | present |
//! | Non-transactional | false | - | - |
//!
//! Status transitions:
//! - `Active` → `MarkedRollbackOnly` (an inner participant demanded rollback)
//! - `Active` | `MarkedRollbackOnly` → `Completed` (terminal)

use crate::propagation::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use txscope_core::{
    ContextId, Isolation, ResourceHandle, SavepointHandle, TransactionAttribute,
};

/// Lifecycle status of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextStatus {
    /// Running normally
    Active,
    /// Will roll back even if its own operation succeeds
    MarkedRollbackOnly,
    /// Finished; never reused
    Completed,
}

/// Final state reported to completion callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    /// The physical transaction committed
    Committed,
    /// The physical transaction rolled back
    RolledBack,
    /// The resource manager failed while finishing; outcome unknown
    Unknown,
}

/// Callback fired once the owning physical transaction finishes
pub type CompletionCallback = Box<dyn FnOnce(CompletionStatus) + Send>;

/// Record of a context detached by a later boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suspended {
    /// The detached context
    pub context: ContextId,
    /// When it was detached
    pub at: Instant,
}

/// One transaction boundary on a call chain
pub struct TransactionContext {
    pub(crate) id: ContextId,
    pub(crate) parent: Option<ContextId>,
    pub(crate) attribute: Arc<TransactionAttribute>,
    pub(crate) action: Action,
    pub(crate) status: ContextStatus,

    pub(crate) is_new_physical: bool,
    pub(crate) resource: Option<ResourceHandle>,
    pub(crate) savepoint: Option<SavepointHandle>,

    // Effective properties of the physical transaction this context runs in
    pub(crate) isolation: Isolation,
    pub(crate) read_only: bool,
    pub(crate) savepoints_supported: bool,

    pub(crate) started_at: Instant,
    pub(crate) deadline: Option<Instant>,

    /// Context this boundary detached, resumed when it completes
    pub(crate) suspended: Option<Suspended>,
    /// Set while a later boundary holds this context detached
    pub(crate) detached_at: Option<Instant>,

    pub(crate) callbacks: Vec<CompletionCallback>,
}

impl TransactionContext {
    /// Create a non-transactional context
    ///
    /// The manager upgrades it to a physical, joined or nested context as the
    /// decided [`Action`] requires.
    pub(crate) fn new(
        attribute: Arc<TransactionAttribute>,
        action: Action,
        parent: Option<ContextId>,
    ) -> Self {
        Self {
            id: ContextId::next(),
            parent,
            isolation: attribute.isolation(),
            read_only: attribute.is_read_only(),
            attribute,
            action,
            status: ContextStatus::Active,
            is_new_physical: false,
            resource: None,
            savepoint: None,
            savepoints_supported: false,
            started_at: Instant::now(),
            deadline: None,
            suspended: None,
            detached_at: None,
            callbacks: Vec::new(),
        }
    }

    /// Bind a freshly begun physical transaction
    pub(crate) fn bind_physical(
        &mut self,
        handle: ResourceHandle,
        savepoints_supported: bool,
        deadline: Option<Instant>,
    ) {
        self.is_new_physical = true;
        self.resource = Some(handle);
        self.savepoints_supported = savepoints_supported;
        self.deadline = deadline;
    }

    /// Run inside `current`'s physical transaction
    pub(crate) fn join(&mut self, current: &TransactionContext) {
        self.is_new_physical = false;
        self.resource = current.resource;
        self.isolation = current.isolation;
        self.read_only = current.read_only;
        self.savepoints_supported = current.savepoints_supported;
    }

    /// Run inside `current`'s physical transaction behind a savepoint
    pub(crate) fn nest(&mut self, current: &TransactionContext, savepoint: SavepointHandle) {
        self.join(current);
        self.savepoint = Some(savepoint);
    }

    /// Context id
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Context this one suspended or nested under
    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    /// Attribute that created this boundary
    pub fn attribute(&self) -> &TransactionAttribute {
        &self.attribute
    }

    /// Action recorded by the decision engine
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Current status
    pub fn status(&self) -> ContextStatus {
        self.status
    }

    /// Whether this context began a real resource-manager transaction
    pub fn is_new_physical(&self) -> bool {
        self.is_new_physical
    }

    /// Whether this context runs inside a physical transaction
    pub fn is_transactional(&self) -> bool {
        self.resource.is_some()
    }

    /// Whether this context joined an existing transaction without a savepoint
    pub fn is_participant(&self) -> bool {
        self.is_transactional() && !self.is_new_physical && self.savepoint.is_none()
    }

    /// Physical resource this context runs against
    pub fn resource(&self) -> Option<ResourceHandle> {
        self.resource
    }

    /// Savepoint held by a nested context
    pub fn savepoint(&self) -> Option<SavepointHandle> {
        self.savepoint
    }

    /// Effective isolation of the physical transaction
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Effective read-only flag of the physical transaction
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the physical transaction supports savepoints
    pub fn savepoints_supported(&self) -> bool {
        self.savepoints_supported
    }

    /// Deadline of a physical transaction with a timeout
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one
    ///
    /// Returns `Some(Duration::ZERO)` once the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Elapsed time since this boundary was opened
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Record of the context this boundary detached
    pub fn suspended(&self) -> Option<Suspended> {
        self.suspended
    }

    /// Whether a later boundary currently holds this context detached
    pub fn is_detached(&self) -> bool {
        self.detached_at.is_some()
    }

    /// Whether this context will roll back regardless of its own outcome
    pub fn is_rollback_only(&self) -> bool {
        self.status == ContextStatus::MarkedRollbackOnly
    }

    /// Demand an eventual rollback
    pub fn set_rollback_only(&mut self) {
        if self.status == ContextStatus::Active {
            self.status = ContextStatus::MarkedRollbackOnly;
        }
    }

    /// Number of registered completion callbacks
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = ContextStatus::Completed;
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("action", &self.action)
            .field("status", &self.status)
            .field("is_new_physical", &self.is_new_physical)
            .field("resource", &self.resource)
            .field("savepoint", &self.savepoint)
            .field("deadline", &self.deadline)
            .field("suspended", &self.suspended)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
