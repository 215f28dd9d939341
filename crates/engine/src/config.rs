//! TOML configuration
//!
//! ```toml
//! [manager]
//! strict_join = true
//! resume_timeout = "exclude_suspension"
//!
//! [managers.reporting]
//! nested_fallback = true
//!
//! [[error_types]]
//! name = "app::Error"
//! class = "checked"
//!
//! [[error_types]]
//! name = "app::Fraud"
//! parent = "app::Error"
//! class = "unchecked"
//!
//! [[components]]
//! name = "Orders"
//! propagation = "required"
//! rollback_for = ["app::Error"]
//!
//! [[components.operations]]
//! name = "audit"
//! propagation = "requires_new"
//! ```

use crate::registry::ManagerRegistry;
use crate::source::StaticAttributeSource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use txscope_concurrency::{ManagerConfig, TransactionManager, DEFAULT_MANAGER};
use txscope_core::{ErrorHierarchy, ErrorTypeDef, ResourceManager, TransactionDeclaration, TxError, TxResult};

/// Declarations for one component and its operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Component name
    pub name: String,
    /// Component-level declaration; empty means none
    #[serde(flatten)]
    pub declaration: TransactionDeclaration,
    /// Keys matching no declaration field; rejected by `validate`
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
    /// Operation-level declarations
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

/// Declaration for one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Operation name
    pub name: String,
    /// Operation-level declaration
    #[serde(flatten)]
    pub declaration: TransactionDeclaration,
    /// Keys matching no declaration field; rejected by `validate`
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TxscopeConfig {
    /// Settings of the default manager
    pub manager: ManagerConfig,
    /// Settings of named managers
    pub managers: BTreeMap<String, ManagerConfig>,
    /// Application error types, parents before children
    pub error_types: Vec<ErrorTypeDef>,
    /// Attribute declarations
    pub components: Vec<ComponentConfig>,
}

impl TxscopeConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// `Config` if the document is malformed or inconsistent.
    pub fn from_toml_str(source: &str) -> TxResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| TxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> TxResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TxError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!(
            path = %path.display(),
            components = config.components.len(),
            error_types = config.error_types.len(),
            "loaded transaction configuration"
        );
        Ok(config)
    }

    /// Check names and the error hierarchy
    pub fn validate(&self) -> TxResult<()> {
        self.hierarchy()?;
        let mut components = HashSet::new();
        for component in &self.components {
            if component.name.is_empty() {
                return Err(TxError::Config("component with empty name".to_string()));
            }
            if !components.insert(component.name.as_str()) {
                return Err(TxError::Config(format!(
                    "component '{}' declared twice",
                    component.name
                )));
            }
            reject_unknown(&component.unknown, || format!("component '{}'", component.name))?;
            let mut operations = HashSet::new();
            for operation in &component.operations {
                reject_unknown(&operation.unknown, || {
                    format!("operation '{}.{}'", component.name, operation.name)
                })?;
                if !operations.insert(operation.name.as_str()) {
                    return Err(TxError::Config(format!(
                        "operation '{}.{}' declared twice",
                        component.name, operation.name
                    )));
                }
            }
        }
        if self.managers.contains_key(DEFAULT_MANAGER) {
            return Err(TxError::Config(format!(
                "use [manager] to configure the '{DEFAULT_MANAGER}' manager"
            )));
        }
        Ok(())
    }

    /// Standard hierarchy extended with the configured error types
    pub fn hierarchy(&self) -> TxResult<ErrorHierarchy> {
        let mut hierarchy = ErrorHierarchy::standard();
        hierarchy.register_all(&self.error_types)?;
        Ok(hierarchy)
    }

    /// Attribute source holding the configured declarations
    pub fn attribute_source(&self) -> StaticAttributeSource {
        let mut source = StaticAttributeSource::new();
        for component in &self.components {
            if component.declaration != TransactionDeclaration::default() {
                source.declare_component(&component.name, component.declaration.clone());
            }
            for operation in &component.operations {
                source.declare_operation(
                    &component.name,
                    &operation.name,
                    operation.declaration.clone(),
                );
            }
        }
        source
    }

    /// Settings for a manager name
    pub fn manager_config(&self, name: &str) -> &ManagerConfig {
        self.managers.get(name).unwrap_or(&self.manager)
    }

    /// Registry with the default manager and every named manager, all on
    /// `resource`
    pub fn build_registry(&self, resource: Arc<dyn ResourceManager>) -> TxResult<ManagerRegistry> {
        let hierarchy = Arc::new(self.hierarchy()?);
        let registry = ManagerRegistry::new();
        let names = std::iter::once(DEFAULT_MANAGER).chain(self.managers.keys().map(String::as_str));
        for name in names {
            let manager =
                TransactionManager::with_config(Arc::clone(&resource), self.manager_config(name).clone())
                    .with_hierarchy(Arc::clone(&hierarchy))
                    .named(name);
            registry.register(manager);
        }
        Ok(registry)
    }
}

fn reject_unknown(
    unknown: &BTreeMap<String, toml::Value>,
    owner: impl FnOnce() -> String,
) -> TxResult<()> {
    match unknown.keys().next() {
        Some(key) => Err(TxError::Config(format!("unknown key '{}' in {}", key, owner()))),
        None => Ok(()),
    }
}
