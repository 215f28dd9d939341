//! Declared transaction behavior
//!
//! A [`TransactionAttribute`] is the immutable, fully resolved behavior of one
//! operation. It is produced from up to two partial [`TransactionDeclaration`]s
//! (one at class/component level, one at method/operation level) by
//! [`resolve`].

use crate::rollback::{RollbackRule, RuleSign, RuleTarget};
use crate::types::{Isolation, Propagation, TIMEOUT_DEFAULT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Effective transaction behavior for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionAttribute {
    propagation: Propagation,
    isolation: Isolation,
    timeout_seconds: i32,
    read_only: bool,
    rollback_rules: Vec<RollbackRule>,
    qualifier: Option<String>,
    label: Option<String>,
}

impl Default for TransactionAttribute {
    fn default() -> Self {
        Self {
            propagation: Propagation::Required,
            isolation: Isolation::Default,
            timeout_seconds: TIMEOUT_DEFAULT,
            read_only: false,
            rollback_rules: Vec::new(),
            qualifier: None,
            label: None,
        }
    }
}

impl TransactionAttribute {
    /// Attribute with the given propagation and defaults everywhere else
    pub fn new(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }

    /// Shorthand for `TransactionAttribute::new(Propagation::Required)`
    pub fn required() -> Self {
        Self::new(Propagation::Required)
    }

    /// Set the isolation level
    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set the timeout in seconds (`-1` = resource manager default)
    pub fn with_timeout_seconds(mut self, seconds: i32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set the read-only hint
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Append a rollback rule
    pub fn with_rule(mut self, rule: RollbackRule) -> Self {
        self.rollback_rules.push(rule);
        self
    }

    /// Append a rule rolling back for the exact error type
    pub fn rollback_for(self, error_type: impl Into<String>) -> Self {
        self.with_rule(RollbackRule::exact(error_type, RuleSign::Rollback))
    }

    /// Append a rule committing despite the exact error type
    pub fn no_rollback_for(self, error_type: impl Into<String>) -> Self {
        self.with_rule(RollbackRule::exact(error_type, RuleSign::NoRollback))
    }

    /// Select a named transaction manager
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Attach a descriptive label used in log records
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Declared propagation
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Requested isolation level
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Raw timeout in seconds (`-1` = default)
    pub fn timeout_seconds(&self) -> i32 {
        self.timeout_seconds
    }

    /// Timeout as a duration, or `None` for the resource manager default
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout_seconds)
            .ok()
            .map(Duration::from_secs)
    }

    /// Read-only hint
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Rollback rules in declaration order
    pub fn rollback_rules(&self) -> &[RollbackRule] {
        &self.rollback_rules
    }

    /// Named transaction manager, if any
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Descriptive label, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Partially specified transaction behavior
///
/// Every `None` field is "not set" and inherits from the enclosing level
/// during [`resolve`]. This is the shape attribute declarations take in
/// configuration files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionDeclaration {
    /// Propagation behavior
    pub propagation: Option<Propagation>,
    /// Isolation level
    pub isolation: Option<Isolation>,
    /// Timeout in seconds
    pub timeout: Option<i32>,
    /// Read-only hint
    pub read_only: Option<bool>,
    /// Error types that force rollback
    pub rollback_for: Vec<String>,
    /// Error type names (or simple names) that force rollback
    pub rollback_for_name: Vec<String>,
    /// Error types that commit anyway
    pub no_rollback_for: Vec<String>,
    /// Error type names (or simple names) that commit anyway
    pub no_rollback_for_name: Vec<String>,
    /// Named transaction manager
    pub qualifier: Option<String>,
    /// Descriptive label
    pub label: Option<String>,
}

impl TransactionDeclaration {
    /// Declaration setting only the propagation
    pub fn propagation(propagation: Propagation) -> Self {
        Self {
            propagation: Some(propagation),
            ..Self::default()
        }
    }

    /// Rules declared at this level, in declaration order
    pub fn rules(&self) -> impl Iterator<Item = RollbackRule> + '_ {
        rules_from(&self.rollback_for, RuleSign::Rollback, RuleTarget::Exact)
            .chain(rules_from(&self.rollback_for_name, RuleSign::Rollback, RuleTarget::Name))
            .chain(rules_from(&self.no_rollback_for, RuleSign::NoRollback, RuleTarget::Exact))
            .chain(rules_from(
                &self.no_rollback_for_name,
                RuleSign::NoRollback,
                RuleTarget::Name,
            ))
    }
}

fn rules_from(
    names: &[String],
    sign: RuleSign,
    target: fn(String) -> RuleTarget,
) -> impl Iterator<Item = RollbackRule> + '_ {
    names
        .iter()
        .map(move |n| RollbackRule::new(target(n.clone()), sign))
}

/// Resolve class-level and method-level declarations into one attribute
///
/// Method-level fields override class-level fields one by one; unset fields
/// inherit. Rollback rules are merged with class-level rules first, so that a
/// method-level rule wins a specificity tie. Returns `None` when neither
/// level declares anything: the operation runs without transactional
/// semantics.
pub fn resolve(
    class_level: Option<&TransactionDeclaration>,
    method_level: Option<&TransactionDeclaration>,
) -> Option<TransactionAttribute> {
    if class_level.is_none() && method_level.is_none() {
        return None;
    }

    fn pick<T: Clone>(
        class_level: Option<&TransactionDeclaration>,
        method_level: Option<&TransactionDeclaration>,
        field: impl Fn(&TransactionDeclaration) -> Option<T>,
    ) -> Option<T> {
        method_level
            .and_then(&field)
            .or_else(|| class_level.and_then(&field))
    }

    let defaults = TransactionAttribute::default();
    let rollback_rules = class_level
        .into_iter()
        .chain(method_level)
        .flat_map(|d| d.rules())
        .collect();

    Some(TransactionAttribute {
        propagation: pick(class_level, method_level, |d| d.propagation)
            .unwrap_or(defaults.propagation),
        isolation: pick(class_level, method_level, |d| d.isolation)
            .unwrap_or(defaults.isolation),
        timeout_seconds: pick(class_level, method_level, |d| d.timeout)
            .unwrap_or(defaults.timeout_seconds),
        read_only: pick(class_level, method_level, |d| d.read_only)
            .unwrap_or(defaults.read_only),
        rollback_rules,
        qualifier: pick(class_level, method_level, |d| d.qualifier.clone()),
        label: pick(class_level, method_level, |d| d.label.clone()),
    })
}
