//! Named transaction managers
//!
//! An attribute's qualifier selects the manager that runs it; attributes
//! without one use [`DEFAULT_MANAGER`].

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use txscope_concurrency::{TransactionManager, DEFAULT_MANAGER};
use txscope_core::{TxError, TxResult};

/// Thread-safe map from manager name to manager
#[derive(Debug, Default)]
pub struct ManagerRegistry {
    managers: RwLock<HashMap<String, Arc<TransactionManager>>>,
}

impl ManagerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding one manager under the default name
    pub fn single(manager: TransactionManager) -> Self {
        let registry = Self::new();
        registry.register(manager.named(DEFAULT_MANAGER));
        registry
    }

    /// Add a manager under its own name, replacing any previous one
    pub fn register(&self, manager: TransactionManager) -> Option<Arc<TransactionManager>> {
        let name = manager.name().to_string();
        info!(manager = %name, "registered transaction manager");
        self.managers.write().insert(name, Arc::new(manager))
    }

    /// Manager registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<TransactionManager>> {
        self.managers.read().get(name).cloned()
    }

    /// Manager for an attribute qualifier
    ///
    /// # Errors
    ///
    /// `UnknownManager` if nothing is registered under the qualifier, or
    /// under the default name when there is no qualifier.
    pub fn resolve(&self, qualifier: Option<&str>) -> TxResult<Arc<TransactionManager>> {
        let name = qualifier.unwrap_or(DEFAULT_MANAGER);
        self.get(name).ok_or_else(|| TxError::UnknownManager {
            name: name.to_string(),
        })
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.managers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered managers
    pub fn len(&self) -> usize {
        self.managers.read().len()
    }

    /// Check if no manager is registered
    pub fn is_empty(&self) -> bool {
        self.managers.read().is_empty()
    }
}
