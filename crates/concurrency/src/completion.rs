//! Completion engine
//!
//! Closes the boundary opened by [`TransactionManager::begin`]. The outcome of
//! the operation goes through the rollback rule matcher, then the physical
//! effect depends on what kind of boundary is closing:
//!
//! | Boundary | Commit verdict | Rollback verdict |
//! |----------|----------------|------------------|
//! | Physical | commit | roll back |
//! | Nested | release savepoint | roll back to savepoint, release |
//! | Joined | nothing | mark parent rollback-only |
//! | Non-transactional | nothing | nothing |
//!
//! Whatever happens, the context is popped, the context it suspended is
//! resumed and the context ends up `Completed`.

use crate::context::{CompletionStatus, TransactionContext};
use crate::manager::TransactionManager;
use crate::propagation::Action;
use crate::stack::ContextStack;
use std::time::Instant;
use tracing::{debug, error, warn};
use txscope_core::{
    ContextId, Decision, Outcome, Reason, ResourceError, TxError, TxResult, Verdict,
};

/// What completion physically did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalEffect {
    /// The physical transaction committed
    Committed,
    /// The physical transaction rolled back
    RolledBack,
    /// The nested scope's savepoint was released
    SavepointReleased,
    /// Work since the savepoint was undone
    RolledBackToSavepoint,
    /// The enclosing boundary now demands rollback
    MarkedRollbackOnly,
    /// No resource interaction
    None,
}

/// Result of closing a boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The closed context
    pub context: ContextId,
    /// Action the context was opened with
    pub action: Action,
    /// Matcher verdict
    pub verdict: Verdict,
    /// Why the matcher decided that way
    pub reason: Reason,
    /// Physical effect
    pub effect: PhysicalEffect,
    /// The operation succeeded but a rollback-only mark forced a rollback
    pub unexpected: bool,
}

impl Completion {
    /// Check if the boundary's work was kept
    pub fn is_committed(&self) -> bool {
        self.verdict == Verdict::Commit
    }
}

impl TransactionManager {
    /// Close boundary `id` with the outcome of its operation
    ///
    /// `id` must be the top of `stack`.
    ///
    /// # Errors
    ///
    /// - `IllegalCompletion` if `id` is not the active top; the stack is
    ///   untouched
    /// - `Resource` if a commit, rollback or savepoint call failed; the
    ///   context is still popped and completed
    /// - `TimedOut` if a physical transaction outlived its deadline and was
    ///   rolled back
    /// - `UnexpectedRollback` if configured and a rollback-only mark
    ///   overrode a successful outcome
    pub fn complete(
        &self,
        stack: &mut ContextStack,
        id: ContextId,
        outcome: &Outcome,
    ) -> TxResult<Completion> {
        let mut ctx = Self::pop_top(stack, id)?;

        let overrun = ctx
            .is_new_physical()
            .then(|| ctx.deadline())
            .flatten()
            .filter(|_| outcome.is_success())
            .and_then(|d| Instant::now().checked_duration_since(d));
        let timed_out = overrun.map(|overrun| TxError::TimedOut {
            context: id,
            overrun,
        });
        let effective = match &timed_out {
            Some(e) => Outcome::failed(e.error_type()),
            None => outcome.clone(),
        };

        let Decision { verdict, reason } = self.matcher.evaluate(
            ctx.attribute().rollback_rules(),
            ctx.is_rollback_only(),
            &effective,
        );
        let unexpected = outcome.is_success()
            && reason == Reason::RollbackOnly
            && (ctx.is_new_physical() || ctx.savepoint().is_some());

        let (effect, physical) = self.apply_verdict(stack, &mut ctx, verdict);

        self.resume(stack, ctx.suspended.take());
        ctx.mark_completed();

        debug!(
            manager = %self.name(),
            context_id = %id,
            action = %ctx.action(),
            verdict = %verdict,
            reason = ?reason,
            effect = ?effect,
            depth = stack.depth(),
            "transaction boundary completed"
        );

        if let Err(e) = physical {
            error!(
                manager = %self.name(),
                context_id = %id,
                effect = ?effect,
                error = %e,
                "resource manager failed while completing transaction"
            );
            return Err(e.into());
        }
        if let Some(e) = timed_out {
            if verdict == Verdict::Rollback {
                return Err(e);
            }
            warn!(context_id = %id, error = %e, "timed out transaction committed by rule");
        }
        if unexpected {
            warn!(context_id = %id, "successful operation rolled back by rollback-only mark");
            if self.config.fail_on_unexpected_rollback {
                return Err(TxError::UnexpectedRollback { context: id });
            }
        }

        Ok(Completion {
            context: id,
            action: ctx.action().clone(),
            verdict,
            reason,
            effect,
            unexpected,
        })
    }

    fn pop_top(stack: &mut ContextStack, id: ContextId) -> TxResult<TransactionContext> {
        match stack.peek() {
            Some(top) if top.id() == id => {}
            Some(top) => {
                let reason = if stack.get(id).is_some() {
                    format!("{} is still open above it", top.id())
                } else {
                    "context is not open on this call chain".to_string()
                };
                return Err(TxError::illegal_completion(id, reason));
            }
            None => return Err(TxError::illegal_completion(id, "no boundary is open")),
        }
        stack
            .pop()
            .ok_or_else(|| TxError::illegal_completion(id, "no boundary is open"))
    }

    /// Perform the physical effect and settle completion callbacks
    fn apply_verdict(
        &self,
        stack: &mut ContextStack,
        ctx: &mut TransactionContext,
        verdict: Verdict,
    ) -> (PhysicalEffect, Result<(), ResourceError>) {
        let Some(handle) = ctx.resource() else {
            return (PhysicalEffect::None, Ok(()));
        };
        let rm = self.resource_manager();

        if ctx.is_new_physical() {
            let (effect, result) = match verdict {
                Verdict::Commit => (PhysicalEffect::Committed, rm.commit(handle)),
                Verdict::Rollback => (PhysicalEffect::RolledBack, rm.rollback(handle)),
            };
            let status = match (&result, effect) {
                (Err(_), _) => CompletionStatus::Unknown,
                (Ok(()), PhysicalEffect::Committed) => CompletionStatus::Committed,
                (Ok(()), _) => CompletionStatus::RolledBack,
            };
            for callback in ctx.callbacks.drain(..) {
                callback(status);
            }
            return (effect, result);
        }

        let result = match (ctx.savepoint(), verdict) {
            (Some(sp), Verdict::Commit) => {
                (PhysicalEffect::SavepointReleased, rm.release_savepoint(handle, sp))
            }
            (Some(sp), Verdict::Rollback) => {
                // release even after a failed rollback; the first error wins
                let rolled_back = rm.rollback_to_savepoint(handle, sp);
                let released = rm.release_savepoint(handle, sp);
                (PhysicalEffect::RolledBackToSavepoint, rolled_back.and(released))
            }
            (None, Verdict::Commit) => (PhysicalEffect::None, Ok(())),
            (None, Verdict::Rollback) => (PhysicalEffect::MarkedRollbackOnly, Ok(())),
        };

        let parent = ctx.parent().and_then(|p| stack.get_mut(p));
        match parent {
            Some(parent) => {
                if result.0 == PhysicalEffect::MarkedRollbackOnly {
                    warn!(
                        context_id = %ctx.id(),
                        parent_id = %parent.id(),
                        "participant marked transaction rollback-only"
                    );
                    parent.set_rollback_only();
                }
                parent.callbacks.append(&mut ctx.callbacks);
            }
            None => {
                warn!(
                    context_id = %ctx.id(),
                    callbacks = ctx.callback_count(),
                    "enclosing transaction missing; dropping completion callbacks"
                );
                ctx.callbacks.clear();
            }
        }
        result
    }
}
