//! Transaction manager
//!
//! Applies the decisions of the [`PropagationEngine`] to a call chain's
//! [`ContextStack`] and drives the resource manager.
//!
//! ## Entry sequence
//!
//! ```text
//! 1. engine.decide(attribute, stack) -> Action
//! 2. Fail(..)               -> return error, nothing touched
//! 3. SuspendAndStartNew     -> detach current, begin physical
//!    StartNew               -> begin physical
//!    JoinExisting           -> share current resource
//!    NestWithSavepoint      -> create savepoint on current resource
//!    RunWithoutTx(suspend)  -> detach current if asked
//! 4. push the new context
//! ```
//!
//! The exit sequence lives in [`completion`](crate::completion).
//!
//! # Thread Safety
//!
//! A manager is shared freely between call chains; it holds no per-chain
//! state. Each chain passes its own stack to every call.

use crate::config::{ManagerConfig, ResumeTimeout};
use crate::context::{CompletionStatus, Suspended, TransactionContext};
use crate::propagation::{Action, PropagationEngine};
use crate::stack::ContextStack;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use txscope_core::{
    BeginRequest, ContextId, ErrorHierarchy, Outcome, Propagation, ResourceManager,
    RollbackRuleMatcher, TransactionAttribute, TxError, TxResult,
};

/// Name of the manager used when an attribute carries no qualifier
pub const DEFAULT_MANAGER: &str = "default";

/// Coordinates propagation decisions, resource calls and the context stack
pub struct TransactionManager {
    name: String,
    resource: Arc<dyn ResourceManager>,
    engine: PropagationEngine,
    pub(crate) matcher: RollbackRuleMatcher,
    pub(crate) config: ManagerConfig,
}

impl TransactionManager {
    /// Create a manager with default settings and the standard error hierarchy
    pub fn new(resource: Arc<dyn ResourceManager>) -> Self {
        Self::with_config(resource, ManagerConfig::default())
    }

    /// Create a manager with the given settings
    pub fn with_config(resource: Arc<dyn ResourceManager>, config: ManagerConfig) -> Self {
        Self {
            name: DEFAULT_MANAGER.to_string(),
            resource,
            engine: config.engine(),
            matcher: RollbackRuleMatcher::default(),
            config,
        }
    }

    /// Use a custom error hierarchy for rollback decisions
    pub fn with_hierarchy(mut self, hierarchy: Arc<ErrorHierarchy>) -> Self {
        self.matcher = RollbackRuleMatcher::new(hierarchy);
        self
    }

    /// Set the name used in log records and registries
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Manager name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active settings
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The rollback rule matcher
    pub fn matcher(&self) -> &RollbackRuleMatcher {
        &self.matcher
    }

    /// The resource manager
    pub fn resource_manager(&self) -> &Arc<dyn ResourceManager> {
        &self.resource
    }

    // ========================================================================
    // Entry
    // ========================================================================

    /// Decide the boundary for an operation and open it
    ///
    /// On success the new context is on top of `stack` and its id must later
    /// be passed to [`complete`](Self::complete). On failure the stack is left
    /// exactly as it was.
    ///
    /// # Errors
    ///
    /// - Decision failures (`NoTransaction`, `ExistingTransaction`,
    ///   `NestedNotSupported`, `IncompatibleAttributes`) before any resource
    ///   is touched
    /// - `Resource` if beginning a transaction or taking a savepoint fails
    pub fn begin(
        &self,
        stack: &mut ContextStack,
        attribute: Arc<TransactionAttribute>,
    ) -> TxResult<ContextId> {
        let action = self.engine.decide(&attribute, stack);
        let parent = stack.peek().map(|c| c.id());
        debug!(
            manager = %self.name,
            label = attribute.label().unwrap_or(""),
            propagation = %attribute.propagation(),
            action = %action,
            depth = stack.depth(),
            "transaction boundary decided"
        );

        let mut ctx = TransactionContext::new(Arc::clone(&attribute), action.clone(), parent);
        match action {
            Action::Fail(rejection) => return Err(rejection.into_error(attribute.propagation())),
            Action::StartNew => self.start_physical(&mut ctx)?,
            Action::SuspendAndStartNew => {
                ctx.suspended = Self::suspend(stack);
                if let Err(e) = self.start_physical(&mut ctx) {
                    self.resume(stack, ctx.suspended.take());
                    return Err(e);
                }
            }
            Action::RunWithoutTx { suspend_existing } => {
                if suspend_existing {
                    ctx.suspended = Self::suspend(stack);
                }
            }
            Action::JoinExisting => {
                let current = Self::require_current(stack, attribute.propagation())?;
                ctx.join(current);
            }
            Action::NestWithSavepoint => {
                let current = Self::require_current(stack, attribute.propagation())?;
                let handle = current
                    .resource()
                    .ok_or_else(|| TxError::NestedNotSupported {
                        reason: "current context holds no resource".to_string(),
                    })?;
                let savepoint = self.resource.create_savepoint(handle)?;
                ctx.nest(current, savepoint);
            }
        }

        let id = ctx.id();
        debug!(
            context_id = %id,
            new_physical = ctx.is_new_physical(),
            resource = ?ctx.resource(),
            savepoint = ?ctx.savepoint(),
            "transaction boundary opened"
        );
        stack.push(ctx);
        Ok(id)
    }

    fn require_current(
        stack: &ContextStack,
        propagation: Propagation,
    ) -> TxResult<&TransactionContext> {
        stack
            .current_transaction()
            .ok_or(TxError::NoTransaction { propagation })
    }

    fn start_physical(&self, ctx: &mut TransactionContext) -> TxResult<()> {
        let request = BeginRequest::from_attribute(ctx.attribute(), Instant::now());
        let handle = self.resource.begin(&request)?;
        let savepoints = self.resource.supports_savepoints(handle);
        ctx.bind_physical(handle, savepoints, request.deadline);
        Ok(())
    }

    /// Detach the active context, keeping it for a later resume
    fn suspend(stack: &mut ContextStack) -> Option<Suspended> {
        let current = stack.current_transaction_mut()?;
        let at = Instant::now();
        current.detached_at = Some(at);
        debug!(context_id = %current.id(), "transaction suspended");
        Some(Suspended {
            context: current.id(),
            at,
        })
    }

    /// Rebind a context detached by [`suspend`](Self::suspend)
    pub(crate) fn resume(&self, stack: &mut ContextStack, suspended: Option<Suspended>) {
        let Some(suspended) = suspended else {
            return;
        };
        let Some(ctx) = stack.get_mut(suspended.context) else {
            warn!(context_id = %suspended.context, "suspended context vanished before resume");
            return;
        };
        ctx.detached_at = None;
        let handle = ctx.resource();
        let now = Instant::now();
        let paused = now.saturating_duration_since(suspended.at);

        if let Some(owner) = handle.and_then(|h| stack.owner_of_mut(h)) {
            match self.config.resume_timeout {
                ResumeTimeout::Continue => {}
                ResumeTimeout::ExcludeSuspension => {
                    owner.deadline = owner.deadline.map(|d| d + paused);
                }
                ResumeTimeout::Restart => {
                    owner.deadline = owner.attribute().timeout().map(|t| now + t);
                }
            }
        }
        debug!(
            context_id = %suspended.context,
            suspended_for = ?paused,
            "transaction resumed"
        );
    }

    // ========================================================================
    // Inside a boundary
    // ========================================================================

    /// Fail if the current physical transaction is past its deadline
    ///
    /// Resource managers and callers use this at points that would extend the
    /// transaction. Without a current transaction or deadline this is a no-op.
    pub fn check_deadline(&self, stack: &ContextStack) -> TxResult<()> {
        let Some(current) = stack.current_transaction() else {
            return Ok(());
        };
        let owner = current
            .resource()
            .and_then(|h| stack.iter().find(|c| c.is_new_physical() && c.resource() == Some(h)));
        match owner.and_then(|o| o.deadline().map(|d| (o.id(), d))) {
            Some((context, deadline)) if Instant::now() > deadline => Err(TxError::TimedOut {
                context,
                overrun: Instant::now().saturating_duration_since(deadline),
            }),
            _ => Ok(()),
        }
    }

    /// Mark the current transaction boundary rollback-only
    ///
    /// # Errors
    ///
    /// `NoTransaction` when no transaction is active.
    pub fn set_rollback_only(&self, stack: &mut ContextStack) -> TxResult<()> {
        let current = stack.current_transaction_mut().ok_or(TxError::NoTransaction {
            propagation: Propagation::Mandatory,
        })?;
        current.set_rollback_only();
        Ok(())
    }

    /// Register a callback fired once the current physical transaction finishes
    ///
    /// Callbacks registered in joined or nested scopes move outwards as those
    /// scopes complete, so they always observe the final physical outcome.
    ///
    /// # Errors
    ///
    /// `NoTransaction` when no transaction is active.
    pub fn register_completion_callback(
        &self,
        stack: &mut ContextStack,
        callback: impl FnOnce(CompletionStatus) + Send + 'static,
    ) -> TxResult<()> {
        let current = stack.current_transaction_mut().ok_or(TxError::NoTransaction {
            propagation: Propagation::Mandatory,
        })?;
        current.callbacks.push(Box::new(callback));
        Ok(())
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Complete `id` and every context above it with a cancellation outcome
    ///
    /// Contexts are completed innermost first, mirroring normal unwinding.
    /// Every context is completed even if some fail; the first error is
    /// returned. Unwinding to an id that is not on the stack does nothing.
    pub fn unwind_to(&self, stack: &mut ContextStack, id: ContextId) -> TxResult<()> {
        let Some(position) = stack.position(id) else {
            return Ok(());
        };
        let count = stack.depth() - position;
        warn!(
            manager = %self.name,
            context_id = %id,
            contexts = count,
            "unwinding cancelled call chain"
        );

        let mut first_error = None;
        for _ in 0..count {
            let Some(top) = stack.peek().map(|c| c.id()) else {
                break;
            };
            if let Err(e) = self.complete(stack, top, &Outcome::Cancelled) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Complete every context on the stack with a cancellation outcome
    pub fn unwind(&self, stack: &mut ContextStack) -> TxResult<()> {
        let bottom = stack.iter().last().map(|c| c.id());
        match bottom {
            Some(id) => self.unwind_to(stack, id),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}
