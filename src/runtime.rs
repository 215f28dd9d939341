//! Main entry point for txscope.
//!
//! [`Txscope`] bundles a manager registry, a declaration-backed attribute
//! source and the invocation template built over them.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use txscope_concurrency::{ManagerConfig, TransactionManager};
use txscope_core::{CallSite, ResourceManager};
use txscope_engine::{
    ErrorType, InvocationResult, ManagerRegistry, StaticAttributeSource, TransactionTemplate,
    TxscopeConfig,
};

/// Configured transaction propagation runtime.
///
/// Create one with [`Txscope::builder`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use txscope::prelude::*;
///
/// let store = Arc::new(InMemoryResourceManager::new());
/// let scope = Txscope::builder()
///     .config_str(r#"
///         [[components]]
///         name = "Orders"
///         propagation = "required"
///     "#)
///     .resource_manager(store.clone())
///     .build()?;
///
/// let placed = scope.invoke(&CallSite::new("Orders", "place"), || {
///     let tx = scope.template().current_resource(None)?.expect("transaction");
///     store.put(tx, "order:1", "placed")?;
///     Ok::<_, TxError>("order:1")
/// });
/// assert_eq!(placed.unwrap(), "order:1");
/// assert_eq!(store.committed()["order:1"], "placed");
/// # Ok::<(), txscope::Error>(())
/// ```
pub struct Txscope {
    registry: Arc<ManagerRegistry>,
    source: Arc<StaticAttributeSource>,
    template: TransactionTemplate,
}

impl Txscope {
    /// Create a builder.
    pub fn builder() -> TxscopeBuilder {
        TxscopeBuilder::new()
    }

    /// Run `body` with the behavior declared for `site`.
    pub fn invoke<T, E, F>(&self, site: &CallSite, body: F) -> InvocationResult<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: ErrorType,
    {
        self.template.invoke(site, body)
    }

    /// Async variant of [`invoke`](Self::invoke).
    pub async fn invoke_async<T, E, F, Fut>(&self, site: &CallSite, body: F) -> InvocationResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: ErrorType,
    {
        self.template.invoke_async(site, body).await
    }

    /// The invocation template.
    pub fn template(&self) -> &TransactionTemplate {
        &self.template
    }

    /// The manager registry.
    pub fn registry(&self) -> &Arc<ManagerRegistry> {
        &self.registry
    }

    /// The attribute source.
    pub fn attribute_source(&self) -> &Arc<StaticAttributeSource> {
        &self.source
    }
}

impl std::fmt::Debug for Txscope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txscope")
            .field("managers", &self.registry.names())
            .field("cached_sites", &self.source.cached())
            .finish()
    }
}

enum ConfigInput {
    None,
    Value(TxscopeConfig),
    Text(String),
    File(PathBuf),
}

/// Builder for [`Txscope`].
///
/// # Example
///
/// ```ignore
/// let scope = Txscope::builder()
///     .config_file("./txscope.toml")
///     .resource_manager(database.clone())
///     .manager("reporting", warehouse.clone(), ManagerConfig::new().nested_fallback(true))
///     .build()?;
/// ```
pub struct TxscopeBuilder {
    config: ConfigInput,
    resource: Option<Arc<dyn ResourceManager>>,
    managers: Vec<(String, Arc<dyn ResourceManager>, Option<ManagerConfig>)>,
}

impl TxscopeBuilder {
    /// Create a builder with no configuration.
    pub fn new() -> Self {
        Self {
            config: ConfigInput::None,
            resource: None,
            managers: Vec::new(),
        }
    }

    /// Use an already parsed configuration.
    pub fn config(mut self, config: TxscopeConfig) -> Self {
        self.config = ConfigInput::Value(config);
        self
    }

    /// Parse configuration from TOML text at build time.
    pub fn config_str(mut self, toml: impl Into<String>) -> Self {
        self.config = ConfigInput::Text(toml.into());
        self
    }

    /// Load configuration from a TOML file at build time.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config = ConfigInput::File(path.as_ref().to_path_buf());
        self
    }

    /// Resource manager behind the default manager and every named manager
    /// declared in configuration.
    pub fn resource_manager(mut self, resource: Arc<dyn ResourceManager>) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Add a named manager on its own resource manager.
    ///
    /// Settings default to the `[managers.<name>]` table of the
    /// configuration, or `[manager]` when there is none.
    pub fn manager(
        mut self,
        name: impl Into<String>,
        resource: Arc<dyn ResourceManager>,
        config: impl Into<Option<ManagerConfig>>,
    ) -> Self {
        self.managers.push((name.into(), resource, config.into()));
        self
    }

    /// Build the runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingResourceManager`] without a resource manager
    /// - [`Error::Transaction`] for invalid configuration
    pub fn build(self) -> Result<Txscope> {
        let config = match self.config {
            ConfigInput::None => TxscopeConfig::default(),
            ConfigInput::Value(config) => {
                config.validate()?;
                config
            }
            ConfigInput::Text(text) => TxscopeConfig::from_toml_str(&text)?,
            ConfigInput::File(path) => TxscopeConfig::from_file(path)?,
        };
        let resource = self.resource.ok_or(Error::MissingResourceManager)?;

        let registry = config.build_registry(resource)?;
        let hierarchy = Arc::new(config.hierarchy()?);
        for (name, resource, settings) in self.managers {
            let settings = settings.unwrap_or_else(|| config.manager_config(&name).clone());
            let manager = TransactionManager::with_config(resource, settings)
                .with_hierarchy(Arc::clone(&hierarchy))
                .named(name);
            registry.register(manager);
        }

        let registry = Arc::new(registry);
        let source = Arc::new(config.attribute_source());
        let template = TransactionTemplate::new(Arc::clone(&registry)).with_source(source.clone());
        info!(
            managers = registry.len(),
            components = config.components.len(),
            "txscope runtime ready"
        );
        Ok(Txscope {
            registry,
            source,
            template,
        })
    }
}

impl Default for TxscopeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
