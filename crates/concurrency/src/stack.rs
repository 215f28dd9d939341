//! Per call-chain context stack
//!
//! The top of the stack is the innermost open boundary. Contexts below it are
//! either enclosing boundaries of the same transaction or contexts detached
//! by a `RequiresNew`/`NotSupported` boundary further up.
//!
//! A stack belongs to exactly one call chain and is mutated strictly
//! sequentially; it is deliberately not `Sync`-shared.

use crate::context::TransactionContext;
use tracing::trace;
use txscope_core::{ContextId, ResourceHandle};

/// Ordered stack of transaction contexts for one call chain
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<TransactionContext>,
}

impl ContextStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a context; it becomes the active one
    pub fn push(&mut self, ctx: TransactionContext) {
        trace!(context_id = %ctx.id, depth = self.frames.len() + 1, "push context");
        self.frames.push(ctx);
    }

    /// Pop the active context
    pub fn pop(&mut self) -> Option<TransactionContext> {
        let ctx = self.frames.pop();
        if let Some(ctx) = &ctx {
            trace!(context_id = %ctx.id, depth = self.frames.len(), "pop context");
        }
        ctx
    }

    /// The active context, transactional or not
    pub fn peek(&self) -> Option<&TransactionContext> {
        self.frames.last()
    }

    /// Mutable access to the active context
    pub fn peek_mut(&mut self) -> Option<&mut TransactionContext> {
        self.frames.last_mut()
    }

    /// The active context if it runs inside a physical transaction
    ///
    /// This is what propagation decisions treat as "the current transaction":
    /// a non-transactional frame on top hides any transaction below it.
    pub fn current_transaction(&self) -> Option<&TransactionContext> {
        self.peek().filter(|c| c.is_transactional())
    }

    /// Mutable variant of [`current_transaction`](Self::current_transaction)
    pub fn current_transaction_mut(&mut self) -> Option<&mut TransactionContext> {
        self.peek_mut().filter(|c| c.is_transactional())
    }

    /// Number of open boundaries
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Check if no boundary is open
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Position of a context, counted from the bottom
    pub fn position(&self, id: ContextId) -> Option<usize> {
        self.frames.iter().rposition(|c| c.id == id)
    }

    /// Look up a context by id
    pub fn get(&self, id: ContextId) -> Option<&TransactionContext> {
        self.frames.iter().rev().find(|c| c.id == id)
    }

    /// Mutable lookup by id
    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut TransactionContext> {
        self.frames.iter_mut().rev().find(|c| c.id == id)
    }

    /// The context that began the physical transaction behind `handle`
    pub fn owner_of_mut(&mut self, handle: ResourceHandle) -> Option<&mut TransactionContext> {
        self.frames
            .iter_mut()
            .rev()
            .find(|c| c.is_new_physical && c.resource == Some(handle))
    }

    /// Iterate from the innermost context outwards
    pub fn iter(&self) -> impl Iterator<Item = &TransactionContext> {
        self.frames.iter().rev()
    }
}
