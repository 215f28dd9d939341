//! Call-chain binding of context stacks
//!
//! Every call chain owns one [`ContextStack`] per transaction manager.
//! Synchronous code uses a thread-local map; async code runs inside a tokio
//! task-local scope so a chain follows its task across worker threads.
//!
//! # Architecture
//!
//! - Inside a task-local scope (see [`scope`]), all lookups hit the task's map,
//!   including synchronous calls made from within the task
//! - Outside one, lookups hit the current thread's map
//! - Spawned tasks never inherit a scope; each gets a fresh chain
//!
//! Closures passed to [`with_stack`] must not re-enter it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use txscope_concurrency::ContextStack;
use txscope_core::ContextId;

type Stacks = RefCell<HashMap<String, ContextStack>>;

thread_local! {
    static THREAD_STACKS: Stacks = RefCell::new(HashMap::new());
}

tokio::task_local! {
    static TASK_STACKS: Stacks;
}

/// Run `f` against this chain's stack for `manager`
pub fn with_stack<R>(manager: &str, f: impl FnOnce(&mut ContextStack) -> R) -> R {
    if in_task_scope() {
        TASK_STACKS.with(|stacks| with_entry(stacks, manager, f))
    } else {
        THREAD_STACKS.with(|stacks| with_entry(stacks, manager, f))
    }
}

fn with_entry<R>(stacks: &Stacks, manager: &str, f: impl FnOnce(&mut ContextStack) -> R) -> R {
    let mut stacks = stacks.borrow_mut();
    let stack = stacks.entry(manager.to_string()).or_default();
    let result = f(stack);
    if stack.is_empty() {
        stacks.remove(manager);
    }
    result
}

/// Whether the caller runs inside a task-local chain
pub fn in_task_scope() -> bool {
    TASK_STACKS.try_with(|_| ()).is_ok()
}

/// Run `fut` as its own call chain unless it already runs inside one
pub async fn scope<F: Future>(fut: F) -> F::Output {
    if in_task_scope() {
        fut.await
    } else {
        TASK_STACKS.scope(RefCell::new(HashMap::new()), fut).await
    }
}

/// Number of open boundaries for `manager` on this chain
pub fn depth(manager: &str) -> usize {
    with_stack(manager, |stack| stack.depth())
}

/// Innermost open boundary for `manager` on this chain
pub fn current_context(manager: &str) -> Option<ContextId> {
    with_stack(manager, |stack| stack.peek().map(|c| c.id()))
}

/// Whether a transaction is active for `manager` on this chain
pub fn is_transaction_active(manager: &str) -> bool {
    with_stack(manager, |stack| stack.current_transaction().is_some())
}
