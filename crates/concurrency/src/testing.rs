//! Recording resource manager for unit tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use txscope_core::{
    BeginRequest, ResourceError, ResourceHandle, ResourceManager, SavepointHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Begin(u64),
    Commit(u64),
    Rollback(u64),
    Savepoint(u64, u64),
    RollbackTo(u64, u64),
    Release(u64, u64),
}

pub(crate) struct JournalResource {
    savepoints: bool,
    next_tx: AtomicU64,
    next_sp: AtomicU64,
    fail_commit: AtomicBool,
    fail_rollback_to: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl JournalResource {
    pub(crate) fn new(savepoints: bool) -> Self {
        Self {
            savepoints,
            next_tx: AtomicU64::new(1),
            next_sp: AtomicU64::new(1),
            fail_commit: AtomicBool::new(false),
            fail_rollback_to: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_rollback_to(&self) {
        self.fail_rollback_to.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl ResourceManager for JournalResource {
    fn begin(&self, _request: &BeginRequest) -> Result<ResourceHandle, ResourceError> {
        let id = self.next_tx.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Begin(id));
        Ok(ResourceHandle(id))
    }

    fn commit(&self, handle: ResourceHandle) -> Result<(), ResourceError> {
        self.record(Call::Commit(handle.0));
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(ResourceError::new("commit", "injected failure"));
        }
        Ok(())
    }

    fn rollback(&self, handle: ResourceHandle) -> Result<(), ResourceError> {
        self.record(Call::Rollback(handle.0));
        Ok(())
    }

    fn supports_savepoints(&self, _handle: ResourceHandle) -> bool {
        self.savepoints
    }

    fn create_savepoint(&self, handle: ResourceHandle) -> Result<SavepointHandle, ResourceError> {
        let sp = self.next_sp.fetch_add(1, Ordering::SeqCst);
        self.record(Call::Savepoint(handle.0, sp));
        Ok(SavepointHandle(sp))
    }

    fn rollback_to_savepoint(
        &self,
        handle: ResourceHandle,
        savepoint: SavepointHandle,
    ) -> Result<(), ResourceError> {
        self.record(Call::RollbackTo(handle.0, savepoint.0));
        if self.fail_rollback_to.swap(false, Ordering::SeqCst) {
            return Err(ResourceError::new("rollback_to_savepoint", "injected failure"));
        }
        Ok(())
    }

    fn release_savepoint(
        &self,
        handle: ResourceHandle,
        savepoint: SavepointHandle,
    ) -> Result<(), ResourceError> {
        self.record(Call::Release(handle.0, savepoint.0));
        Ok(())
    }
}
