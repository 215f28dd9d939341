//! Invocation wrapper
//!
//! [`TransactionTemplate`] runs an operation inside the boundary its attribute
//! declares: begin before the body, complete after it, with the body's error
//! type fed to the rollback rules.
//!
//! # Cancellation
//!
//! If the body panics, or an async body's future is dropped before it
//! finishes, the boundary and everything still open above it are completed
//! with [`Outcome::Cancelled`], innermost first.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use txscope_concurrency::TransactionManager;
//! use txscope_core::{TransactionAttribute, TxError};
//! use txscope_engine::{InMemoryResourceManager, ManagerRegistry, TransactionTemplate};
//!
//! let store = Arc::new(InMemoryResourceManager::new());
//! let registry = ManagerRegistry::single(TransactionManager::new(store.clone()));
//! let template = TransactionTemplate::new(Arc::new(registry));
//!
//! let attribute = Arc::new(TransactionAttribute::required());
//! let value = template
//!     .execute(&attribute, || -> Result<_, TxError> {
//!         let tx = template.current_resource(None)?.expect("inside a transaction");
//!         store.put(tx, "greeting", "hello")?;
//!         Ok(42)
//!     })
//!     .unwrap();
//!
//! assert_eq!(value, 42);
//! assert_eq!(store.committed()["greeting"], "hello");
//! ```

use crate::chain;
use crate::registry::ManagerRegistry;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};
use txscope_concurrency::{CompletionStatus, TransactionManager};
use txscope_core::{
    AttributeSource, CallSite, ContextId, Outcome, ResourceError, ResourceHandle,
    TransactionAttribute, TxError, TxResult,
};

/// Error type name of an operation's error, as known to the error hierarchy
pub trait ErrorType {
    /// Fully qualified type name fed to the rollback rules
    fn error_type(&self) -> Cow<'static, str>;
}

impl ErrorType for TxError {
    fn error_type(&self) -> Cow<'static, str> {
        Cow::Borrowed(TxError::error_type(self))
    }
}

impl ErrorType for ResourceError {
    fn error_type(&self) -> Cow<'static, str> {
        Cow::Borrowed("txscope::Resource")
    }
}

/// Failure of a wrapped invocation
#[derive(Debug, Error)]
pub enum InvocationError<E> {
    /// The boundary could not be opened; the body never ran
    #[error("transaction boundary refused: {0}")]
    Declined(#[source] TxError),

    /// The body failed; its boundary was completed normally
    #[error("{0}")]
    Operation(E),

    /// Completing the boundary failed
    #[error("transaction completion failed: {error}")]
    Completion {
        /// Completion failure
        #[source]
        error: TxError,
        /// The body's own error, if it failed too
        operation: Option<E>,
    },
}

impl<E> InvocationError<E> {
    /// The transaction-layer error, if any
    pub fn transaction_error(&self) -> Option<&TxError> {
        match self {
            InvocationError::Declined(e) | InvocationError::Completion { error: e, .. } => Some(e),
            InvocationError::Operation(_) => None,
        }
    }

    /// The body's error, if it ran and failed
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            InvocationError::Operation(e) => Some(e),
            InvocationError::Completion { operation, .. } => operation,
            InvocationError::Declined(_) => None,
        }
    }

    /// Check if the body never ran
    pub fn is_declined(&self) -> bool {
        matches!(self, InvocationError::Declined(_))
    }
}

impl<E: ErrorType> ErrorType for InvocationError<E> {
    fn error_type(&self) -> Cow<'static, str> {
        match self {
            InvocationError::Declined(e) | InvocationError::Completion { error: e, .. } => {
                Cow::Borrowed(TxError::error_type(e))
            }
            InvocationError::Operation(e) => e.error_type(),
        }
    }
}

/// Result of a wrapped invocation
pub type InvocationResult<T, E> = Result<T, InvocationError<E>>;

/// Completes an open boundary with `Cancelled` unless disarmed
struct Unwinder {
    manager: Arc<TransactionManager>,
    context: ContextId,
    armed: bool,
}

impl Unwinder {
    fn new(manager: Arc<TransactionManager>, context: ContextId) -> Self {
        Self {
            manager,
            context,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Unwinder {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let manager = &self.manager;
        warn!(
            manager = %manager.name(),
            context_id = %self.context,
            panicking = std::thread::panicking(),
            "operation abandoned inside transaction boundary"
        );
        let result = chain::with_stack(manager.name(), |stack| {
            manager.unwind_to(stack, self.context)
        });
        if let Err(e) = result {
            error!(context_id = %self.context, error = %e, "failed to unwind cancelled boundary");
        }
    }
}

/// Runs operations inside declared transaction boundaries
#[derive(Clone)]
pub struct TransactionTemplate {
    registry: Arc<ManagerRegistry>,
    source: Option<Arc<dyn AttributeSource>>,
}

impl TransactionTemplate {
    /// Create a template over a manager registry
    pub fn new(registry: Arc<ManagerRegistry>) -> Self {
        Self {
            registry,
            source: None,
        }
    }

    /// Resolve call sites through `source` in [`invoke`](Self::invoke)
    pub fn with_source(mut self, source: Arc<dyn AttributeSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// The manager registry
    pub fn registry(&self) -> &Arc<ManagerRegistry> {
        &self.registry
    }

    /// Run `body` inside the boundary `attribute` declares
    ///
    /// Returns the body's value, or its error unchanged as
    /// [`InvocationError::Operation`], once completion succeeded.
    pub fn execute<T, E, F>(
        &self,
        attribute: &Arc<TransactionAttribute>,
        body: F,
    ) -> InvocationResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: ErrorType,
    {
        let (manager, context) = self.open(attribute)?;
        let mut unwinder = Unwinder::new(Arc::clone(&manager), context);
        let result = body();
        unwinder.disarm();
        Self::close(&manager, context, result)
    }

    /// Async variant of [`execute`](Self::execute)
    ///
    /// Runs on the caller's task-local chain, creating one if the task has
    /// none yet.
    pub async fn execute_async<T, E, F, Fut>(
        &self,
        attribute: &Arc<TransactionAttribute>,
        body: F,
    ) -> InvocationResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorType,
    {
        chain::scope(self.run(attribute, body)).await
    }

    async fn run<T, E, F, Fut>(
        &self,
        attribute: &Arc<TransactionAttribute>,
        body: F,
    ) -> InvocationResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorType,
    {
        let (manager, context) = self.open(attribute)?;
        let mut unwinder = Unwinder::new(Arc::clone(&manager), context);
        let result = body().await;
        unwinder.disarm();
        Self::close(&manager, context, result)
    }

    /// Run `body` with the behavior declared for `site`
    ///
    /// Call sites without declared behavior run `body` directly.
    pub fn invoke<T, E, F>(&self, site: &CallSite, body: F) -> InvocationResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: ErrorType,
    {
        match self.lookup(site) {
            Some(attribute) => self.execute(&attribute, body),
            None => body().map_err(InvocationError::Operation),
        }
    }

    /// Async variant of [`invoke`](Self::invoke)
    pub async fn invoke_async<T, E, F, Fut>(
        &self,
        site: &CallSite,
        body: F,
    ) -> InvocationResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorType,
    {
        match self.lookup(site) {
            Some(attribute) => self.execute_async(&attribute, body).await,
            None => body().await.map_err(InvocationError::Operation),
        }
    }

    fn lookup(&self, site: &CallSite) -> Option<Arc<TransactionAttribute>> {
        self.source.as_ref().and_then(|source| source.attribute(site))
    }

    fn open<E>(
        &self,
        attribute: &Arc<TransactionAttribute>,
    ) -> InvocationResult<(Arc<TransactionManager>, ContextId), E> {
        let manager = self
            .registry
            .resolve(attribute.qualifier())
            .map_err(InvocationError::Declined)?;
        let context = chain::with_stack(manager.name(), |stack| {
            manager.begin(stack, Arc::clone(attribute))
        })
        .map_err(InvocationError::Declined)?;
        Ok((manager, context))
    }

    fn close<T, E: ErrorType>(
        manager: &TransactionManager,
        context: ContextId,
        result: Result<T, E>,
    ) -> InvocationResult<T, E> {
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::failed(e.error_type()),
        };
        let completed =
            chain::with_stack(manager.name(), |stack| manager.complete(stack, context, &outcome));
        match (result, completed) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(e), Ok(_)) => Err(InvocationError::Operation(e)),
            (result, Err(error)) => Err(InvocationError::Completion {
                error,
                operation: result.err(),
            }),
        }
    }

    // ========================================================================
    // Inside a boundary
    // ========================================================================

    /// Physical transaction behind the current boundary of a manager
    ///
    /// `None` when the chain runs without a transaction.
    pub fn current_resource(&self, qualifier: Option<&str>) -> TxResult<Option<ResourceHandle>> {
        let manager = self.registry.resolve(qualifier)?;
        Ok(chain::with_stack(manager.name(), |stack| {
            stack.current_transaction().and_then(|c| c.resource())
        }))
    }

    /// Mark the current transaction of a manager rollback-only
    pub fn set_rollback_only(&self, qualifier: Option<&str>) -> TxResult<()> {
        let manager = self.registry.resolve(qualifier)?;
        chain::with_stack(manager.name(), |stack| manager.set_rollback_only(stack))
    }

    /// Fail if the current transaction of a manager is past its deadline
    pub fn check_deadline(&self, qualifier: Option<&str>) -> TxResult<()> {
        let manager = self.registry.resolve(qualifier)?;
        chain::with_stack(manager.name(), |stack| manager.check_deadline(stack))
    }

    /// Register a callback for the end of the current physical transaction
    ///
    /// The callback runs while the chain's stack is borrowed; it must not
    /// open boundaries itself.
    pub fn register_completion_callback(
        &self,
        qualifier: Option<&str>,
        callback: impl FnOnce(CompletionStatus) + Send + 'static,
    ) -> TxResult<()> {
        let manager = self.registry.resolve(qualifier)?;
        chain::with_stack(manager.name(), |stack| {
            manager.register_completion_callback(stack, callback)
        })
    }
}

impl std::fmt::Debug for TransactionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionTemplate")
            .field("registry", &self.registry)
            .field("source", &self.source.is_some())
            .finish()
    }
}
