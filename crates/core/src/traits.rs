//! Collaborator traits
//!
//! The propagation layer never touches storage itself. It talks to:
//! - a [`ResourceManager`] that physically begins, commits and rolls back
//!   transactions and manages savepoints
//! - an [`AttributeSource`] that tells it what behavior a call site declared

use crate::attribute::TransactionAttribute;
use crate::error::ResourceError;
use crate::types::{Isolation, ResourceHandle, SavepointHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parameters for starting a new physical transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginRequest {
    /// Requested isolation level
    pub isolation: Isolation,
    /// Read-only hint
    pub read_only: bool,
    /// Requested timeout; `None` = resource manager default
    pub timeout: Option<Duration>,
    /// Deadline derived from the timeout, for resource-side enforcement
    pub deadline: Option<Instant>,
    /// Descriptive label of the operation that started it
    pub label: Option<String>,
}

impl BeginRequest {
    /// Build a request from an attribute, computing the deadline from `now`
    pub fn from_attribute(attribute: &TransactionAttribute, now: Instant) -> Self {
        let timeout = attribute.timeout();
        Self {
            isolation: attribute.isolation(),
            read_only: attribute.is_read_only(),
            timeout,
            deadline: timeout.map(|t| now + t),
            label: attribute.label().map(str::to_string),
        }
    }
}

/// Physical transaction capability
///
/// Every method may fail with a [`ResourceError`], which the propagation
/// layer surfaces verbatim. Implementations must be shareable across call
/// chains; each handle is only ever used by the chain that began it.
pub trait ResourceManager: Send + Sync {
    /// Begin a new physical transaction
    fn begin(&self, request: &BeginRequest) -> Result<ResourceHandle, ResourceError>;

    /// Commit a physical transaction
    fn commit(&self, handle: ResourceHandle) -> Result<(), ResourceError>;

    /// Roll back a physical transaction
    fn rollback(&self, handle: ResourceHandle) -> Result<(), ResourceError>;

    /// Whether savepoints can be created inside this transaction
    fn supports_savepoints(&self, handle: ResourceHandle) -> bool;

    /// Create a savepoint inside a physical transaction
    fn create_savepoint(&self, handle: ResourceHandle) -> Result<SavepointHandle, ResourceError>;

    /// Roll back to a savepoint, keeping the transaction open
    fn rollback_to_savepoint(
        &self,
        handle: ResourceHandle,
        savepoint: SavepointHandle,
    ) -> Result<(), ResourceError>;

    /// Release a savepoint without affecting the transaction
    fn release_savepoint(
        &self,
        handle: ResourceHandle,
        savepoint: SavepointHandle,
    ) -> Result<(), ResourceError>;
}

impl<T: ResourceManager + ?Sized> ResourceManager for Arc<T> {
    fn begin(&self, request: &BeginRequest) -> Result<ResourceHandle, ResourceError> {
        (**self).begin(request)
    }

    fn commit(&self, handle: ResourceHandle) -> Result<(), ResourceError> {
        (**self).commit(handle)
    }

    fn rollback(&self, handle: ResourceHandle) -> Result<(), ResourceError> {
        (**self).rollback(handle)
    }

    fn supports_savepoints(&self, handle: ResourceHandle) -> bool {
        (**self).supports_savepoints(handle)
    }

    fn create_savepoint(&self, handle: ResourceHandle) -> Result<SavepointHandle, ResourceError> {
        (**self).create_savepoint(handle)
    }

    fn rollback_to_savepoint(
        &self,
        handle: ResourceHandle,
        savepoint: SavepointHandle,
    ) -> Result<(), ResourceError> {
        (**self).rollback_to_savepoint(handle, savepoint)
    }

    fn release_savepoint(
        &self,
        handle: ResourceHandle,
        savepoint: SavepointHandle,
    ) -> Result<(), ResourceError> {
        (**self).release_savepoint(handle, savepoint)
    }
}

/// A call site: the component (class level) and operation (method level)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// Component owning the operation
    pub component: String,
    /// Operation name
    pub operation: String,
}

impl CallSite {
    /// Create a call site
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
        }
    }
}

impl std::fmt::Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.component, self.operation)
    }
}

/// Supplies the resolved attribute for a call site
///
/// `None` means the call site declares no transactional behavior.
pub trait AttributeSource: Send + Sync {
    /// Resolved attribute for `site`
    fn attribute(&self, site: &CallSite) -> Option<Arc<TransactionAttribute>>;
}
