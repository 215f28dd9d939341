//! In-memory resource manager
//!
//! A small key/value store with real transaction semantics, used to exercise
//! propagation end to end:
//! - writes are buffered per physical transaction and applied on commit
//! - savepoints mark a position in the write buffer
//! - every call is journaled so tests can assert exact interactions
//! - one-shot failures can be injected per operation

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::trace;
use txscope_core::{
    BeginRequest, Isolation, ResourceError, ResourceHandle, ResourceManager, SavepointHandle,
};

/// One journaled resource call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCall {
    /// A physical transaction began
    Begin {
        /// Handle handed out
        handle: ResourceHandle,
        /// Requested isolation
        isolation: Isolation,
        /// Read-only hint
        read_only: bool,
    },
    /// Commit
    Commit(ResourceHandle),
    /// Rollback
    Rollback(ResourceHandle),
    /// Savepoint created
    CreateSavepoint(ResourceHandle, SavepointHandle),
    /// Rolled back to a savepoint
    RollbackToSavepoint(ResourceHandle, SavepointHandle),
    /// Savepoint released
    ReleaseSavepoint(ResourceHandle, SavepointHandle),
}

/// Operation a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `begin`
    Begin,
    /// `commit`
    Commit,
    /// `rollback`
    Rollback,
    /// `create_savepoint`
    CreateSavepoint,
    /// `rollback_to_savepoint`
    RollbackToSavepoint,
    /// `release_savepoint`
    ReleaseSavepoint,
}

impl FailPoint {
    fn operation(self) -> &'static str {
        match self {
            FailPoint::Begin => "begin",
            FailPoint::Commit => "commit",
            FailPoint::Rollback => "rollback",
            FailPoint::CreateSavepoint => "create_savepoint",
            FailPoint::RollbackToSavepoint => "rollback_to_savepoint",
            FailPoint::ReleaseSavepoint => "release_savepoint",
        }
    }
}

#[derive(Debug)]
struct OpenTransaction {
    read_only: bool,
    deadline: Option<Instant>,
    writes: Vec<(String, Option<String>)>,
    savepoints: Vec<(SavepointHandle, usize)>,
}

#[derive(Debug, Default)]
struct State {
    committed: BTreeMap<String, String>,
    open: HashMap<ResourceHandle, OpenTransaction>,
    journal: Vec<ResourceCall>,
    failures: HashSet<FailPoint>,
}

/// Key/value resource manager held entirely in memory
#[derive(Debug)]
pub struct InMemoryResourceManager {
    savepoints: bool,
    next_handle: AtomicU64,
    next_savepoint: AtomicU64,
    state: Mutex<State>,
}

impl Default for InMemoryResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResourceManager {
    /// Create a store that supports savepoints
    pub fn new() -> Self {
        Self {
            savepoints: true,
            next_handle: AtomicU64::new(1),
            next_savepoint: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        }
    }

    /// Create a store without savepoint support
    pub fn without_savepoints() -> Self {
        Self {
            savepoints: false,
            ..Self::new()
        }
    }

    /// Make the next call to `point` fail
    pub fn fail_next(&self, point: FailPoint) {
        self.state.lock().failures.insert(point);
    }

    /// All calls so far, oldest first
    pub fn journal(&self) -> Vec<ResourceCall> {
        self.state.lock().journal.clone()
    }

    /// Forget the journal
    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// Number of physical transactions still open
    pub fn open_transactions(&self) -> usize {
        self.state.lock().open.len()
    }

    /// Committed contents
    pub fn committed(&self) -> BTreeMap<String, String> {
        self.state.lock().committed.clone()
    }

    /// Buffer a write inside a transaction
    ///
    /// # Errors
    ///
    /// Fails for unknown handles, read-only transactions and transactions
    /// past their deadline.
    pub fn put(
        &self,
        handle: ResourceHandle,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ResourceError> {
        self.write(handle, key.into(), Some(value.into()))
    }

    /// Buffer a delete inside a transaction
    pub fn delete(&self, handle: ResourceHandle, key: impl Into<String>) -> Result<(), ResourceError> {
        self.write(handle, key.into(), None)
    }

    fn write(
        &self,
        handle: ResourceHandle,
        key: String,
        value: Option<String>,
    ) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        let tx = open_mut(&mut state, handle, "write")?;
        if tx.read_only {
            return Err(ResourceError::new("write", format!("{handle} is read-only")));
        }
        if tx.deadline.is_some_and(|d| Instant::now() > d) {
            return Err(ResourceError::new("write", format!("{handle} exceeded its deadline")));
        }
        tx.writes.push((key, value));
        Ok(())
    }

    /// Read a key as seen from inside a transaction
    pub fn get(&self, handle: ResourceHandle, key: &str) -> Result<Option<String>, ResourceError> {
        let mut state = self.state.lock();
        let own = open_mut(&mut state, handle, "read")?
            .writes
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone());
        Ok(match own {
            Some(value) => value,
            None => state.committed.get(key).cloned(),
        })
    }

    fn enter(&self, state: &mut State, point: FailPoint) -> Result<(), ResourceError> {
        if state.failures.remove(&point) {
            return Err(ResourceError::new(point.operation(), "injected failure"));
        }
        Ok(())
    }
}

fn open_mut<'a>(
    state: &'a mut State,
    handle: ResourceHandle,
    operation: &'static str,
) -> Result<&'a mut OpenTransaction, ResourceError> {
    state
        .open
        .get_mut(&handle)
        .ok_or_else(|| ResourceError::new(operation, format!("{handle} is not open")))
}

impl ResourceManager for InMemoryResourceManager {
    fn begin(&self, request: &BeginRequest) -> Result<ResourceHandle, ResourceError> {
        let mut state = self.state.lock();
        self.enter(&mut state, FailPoint::Begin)?;
        let handle = ResourceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        state.open.insert(
            handle,
            OpenTransaction {
                read_only: request.read_only,
                deadline: request.deadline,
                writes: Vec::new(),
                savepoints: Vec::new(),
            },
        );
        state.journal.push(ResourceCall::Begin {
            handle,
            isolation: request.isolation,
            read_only: request.read_only,
        });
        trace!(%handle, label = request.label.as_deref().unwrap_or(""), "begin");
        Ok(handle)
    }

    fn commit(&self, handle: ResourceHandle) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        state.journal.push(ResourceCall::Commit(handle));
        self.enter(&mut state, FailPoint::Commit)?;
        let tx = state
            .open
            .remove(&handle)
            .ok_or_else(|| ResourceError::new("commit", format!("{handle} is not open")))?;
        for (key, value) in tx.writes {
            match value {
                Some(value) => state.committed.insert(key, value),
                None => state.committed.remove(&key),
            };
        }
        trace!(%handle, "commit");
        Ok(())
    }

    fn rollback(&self, handle: ResourceHandle) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        state.journal.push(ResourceCall::Rollback(handle));
        self.enter(&mut state, FailPoint::Rollback)?;
        state
            .open
            .remove(&handle)
            .ok_or_else(|| ResourceError::new("rollback", format!("{handle} is not open")))?;
        trace!(%handle, "rollback");
        Ok(())
    }

    fn supports_savepoints(&self, _handle: ResourceHandle) -> bool {
        self.savepoints
    }

    fn create_savepoint(&self, handle: ResourceHandle) -> Result<SavepointHandle, ResourceError> {
        if !self.savepoints {
            return Err(ResourceError::new("create_savepoint", "savepoints are disabled"));
        }
        let mut state = self.state.lock();
        self.enter(&mut state, FailPoint::CreateSavepoint)?;
        let savepoint = SavepointHandle(self.next_savepoint.fetch_add(1, Ordering::Relaxed));
        let tx = open_mut(&mut state, handle, "create_savepoint")?;
        tx.savepoints.push((savepoint, tx.writes.len()));
        state
            .journal
            .push(ResourceCall::CreateSavepoint(handle, savepoint));
        Ok(savepoint)
    }

    fn rollback_to_savepoint(
        &self,
        handle: ResourceHandle,
        savepoint: SavepointHandle,
    ) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        state
            .journal
            .push(ResourceCall::RollbackToSavepoint(handle, savepoint));
        self.enter(&mut state, FailPoint::RollbackToSavepoint)?;
        let tx = open_mut(&mut state, handle, "rollback_to_savepoint")?;
        let position = tx
            .savepoints
            .iter()
            .position(|(sp, _)| *sp == savepoint)
            .ok_or_else(|| {
                ResourceError::new("rollback_to_savepoint", format!("unknown {savepoint}"))
            })?;
        let mark = tx.savepoints[position].1;
        tx.writes.truncate(mark);
        // later savepoints are gone; this one stays until released
        tx.savepoints.truncate(position + 1);
        Ok(())
    }

    fn release_savepoint(
        &self,
        handle: ResourceHandle,
        savepoint: SavepointHandle,
    ) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        state
            .journal
            .push(ResourceCall::ReleaseSavepoint(handle, savepoint));
        self.enter(&mut state, FailPoint::ReleaseSavepoint)?;
        let tx = open_mut(&mut state, handle, "release_savepoint")?;
        tx.savepoints.retain(|(sp, _)| *sp != savepoint);
        Ok(())
    }
}
