//! Declaration-backed attribute source
//!
//! Holds component-level and operation-level [`TransactionDeclaration`]s and
//! resolves them on first use of a call site. Resolved attributes (including
//! "nothing declared") are cached per call site.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use txscope_core::{resolve, AttributeSource, CallSite, TransactionAttribute, TransactionDeclaration};

#[derive(Debug, Clone, Default)]
struct Component {
    declaration: Option<TransactionDeclaration>,
    operations: HashMap<String, TransactionDeclaration>,
}

/// Attribute source built from static declarations
///
/// # Example
///
/// ```
/// use txscope_core::{AttributeSource, CallSite, Propagation, TransactionDeclaration};
/// use txscope_engine::StaticAttributeSource;
///
/// let mut source = StaticAttributeSource::new();
/// source.declare_component("Orders", TransactionDeclaration::propagation(Propagation::Required));
/// source.declare_operation(
///     "Orders",
///     "audit",
///     TransactionDeclaration::propagation(Propagation::RequiresNew),
/// );
///
/// let audit = source.attribute(&CallSite::new("Orders", "audit")).unwrap();
/// assert_eq!(audit.propagation(), Propagation::RequiresNew);
/// assert!(source.attribute(&CallSite::new("Billing", "charge")).is_none());
/// ```
#[derive(Debug, Default)]
pub struct StaticAttributeSource {
    components: HashMap<String, Component>,
    cache: DashMap<CallSite, Option<Arc<TransactionAttribute>>>,
}

impl StaticAttributeSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare behavior for every operation of a component
    pub fn declare_component(
        &mut self,
        component: impl Into<String>,
        declaration: TransactionDeclaration,
    ) -> &mut Self {
        self.components
            .entry(component.into())
            .or_default()
            .declaration = Some(declaration);
        self.cache.clear();
        self
    }

    /// Declare behavior for one operation
    pub fn declare_operation(
        &mut self,
        component: impl Into<String>,
        operation: impl Into<String>,
        declaration: TransactionDeclaration,
    ) -> &mut Self {
        self.components
            .entry(component.into())
            .or_default()
            .operations
            .insert(operation.into(), declaration);
        self.cache.clear();
        self
    }

    /// Number of call sites resolved so far
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn compute(&self, site: &CallSite) -> Option<Arc<TransactionAttribute>> {
        let component = self.components.get(&site.component)?;
        let attribute = resolve(
            component.declaration.as_ref(),
            component.operations.get(&site.operation),
        )?;
        let attribute = match attribute.label() {
            Some(_) => attribute,
            None => attribute.with_label(site.to_string()),
        };
        debug!(
            site = %site,
            propagation = %attribute.propagation(),
            rules = attribute.rollback_rules().len(),
            "resolved transaction attribute"
        );
        Some(Arc::new(attribute))
    }
}

impl AttributeSource for StaticAttributeSource {
    fn attribute(&self, site: &CallSite) -> Option<Arc<TransactionAttribute>> {
        if let Some(hit) = self.cache.get(site) {
            return hit.value().clone();
        }
        let resolved = self.compute(site);
        self.cache.insert(site.clone(), resolved.clone());
        resolved
    }
}
