//! Error type hierarchy
//!
//! Rollback rules are prioritized by how many ancestor steps separate the
//! raised error type from the rule's target. This module keeps the explicit
//! parent links that make that distance computable, plus the
//! checked/unchecked/fatal classification used by the default policy.
//!
//! Types are registered parent-first, so the table can never contain a cycle.
//!
//! ```
//! use txscope_core::{ErrorClass, ErrorHierarchy};
//!
//! let mut h = ErrorHierarchy::new();
//! h.register("Exception", None, Some(ErrorClass::Checked)).unwrap();
//! h.register("RuntimeException", Some("Exception"), Some(ErrorClass::Unchecked)).unwrap();
//! h.register("ArithmeticException", Some("RuntimeException"), None).unwrap();
//!
//! assert_eq!(h.distance("ArithmeticException", "Exception"), Some(2));
//! assert_eq!(h.classify("ArithmeticException"), ErrorClass::Unchecked);
//! ```

use crate::error::{TxError, TxResult, TRANSACTION_ERROR};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification driving the default rollback policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Expected/declared error: commits when no rule matches
    Checked,
    /// Unexpected error: rolls back when no rule matches
    Unchecked,
    /// Unrecoverable error: rolls back when no rule matches
    Fatal,
}

impl ErrorClass {
    /// Whether the default policy rolls back for this class
    pub const fn rolls_back_by_default(&self) -> bool {
        matches!(self, ErrorClass::Unchecked | ErrorClass::Fatal)
    }
}

/// Declaration of one error type, as found in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTypeDef {
    /// Fully qualified type name
    pub name: String,
    /// Parent type name, if any
    #[serde(default)]
    pub parent: Option<String>,
    /// Explicit classification; inherited from the nearest ancestor when absent
    #[serde(default)]
    pub class: Option<ErrorClass>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    parent: Option<String>,
    class: Option<ErrorClass>,
}

static STANDARD: Lazy<ErrorHierarchy> = Lazy::new(|| {
    let mut h = ErrorHierarchy::new();
    h.types.insert(
        TRANSACTION_ERROR.to_string(),
        Entry {
            parent: None,
            class: Some(ErrorClass::Unchecked),
        },
    );
    for name in [
        "txscope::NoTransaction",
        "txscope::ExistingTransaction",
        "txscope::NestedNotSupported",
        "txscope::IncompatibleAttributes",
        "txscope::IllegalCompletion",
        "txscope::TimedOut",
        "txscope::UnexpectedRollback",
        "txscope::UnknownManager",
        "txscope::Config",
        "txscope::Resource",
    ] {
        h.types.insert(
            name.to_string(),
            Entry {
                parent: Some(TRANSACTION_ERROR.to_string()),
                class: None,
            },
        );
    }
    h
});

/// Explicit ancestor table of error types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorHierarchy {
    types: HashMap<String, Entry>,
}

impl ErrorHierarchy {
    /// Create an empty hierarchy
    pub fn new() -> Self {
        Self::default()
    }

    /// Hierarchy pre-populated with the transaction machinery's own error types
    ///
    /// All of them descend from [`TRANSACTION_ERROR`] and are unchecked.
    pub fn standard() -> Self {
        STANDARD.clone()
    }

    /// Register an error type
    ///
    /// # Errors
    ///
    /// Returns [`TxError::Config`] if the parent is not registered yet, or if
    /// the name is already registered with a different definition.
    pub fn register(
        &mut self,
        name: &str,
        parent: Option<&str>,
        class: Option<ErrorClass>,
    ) -> TxResult<()> {
        if let Some(parent) = parent {
            if !self.types.contains_key(parent) {
                return Err(TxError::Config(format!(
                    "error type '{}' names unknown parent '{}'",
                    name, parent
                )));
            }
        }
        let entry = Entry {
            parent: parent.map(str::to_string),
            class,
        };
        match self.types.get(name) {
            Some(existing) if *existing != entry => Err(TxError::Config(format!(
                "error type '{}' is already registered with a different definition",
                name
            ))),
            Some(_) => Ok(()),
            None => {
                self.types.insert(name.to_string(), entry);
                Ok(())
            }
        }
    }

    /// Register a batch of declarations in order
    pub fn register_all<'a>(
        &mut self,
        defs: impl IntoIterator<Item = &'a ErrorTypeDef>,
    ) -> TxResult<()> {
        for def in defs {
            self.register(&def.name, def.parent.as_deref(), def.class)?;
        }
        Ok(())
    }

    /// Check if a type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Walk from `name` up to its root, starting with `name` itself
    ///
    /// An unregistered name yields only itself.
    pub fn ancestors<'a>(&'a self, name: &'a str) -> Ancestors<'a> {
        Ancestors {
            hierarchy: self,
            next: Some(name),
        }
    }

    /// Number of ancestor steps from `name` up to `ancestor`, if related
    pub fn distance(&self, name: &str, ancestor: &str) -> Option<usize> {
        self.ancestors(name).position(|n| n == ancestor)
    }

    /// Classification of a type, inherited from the nearest classified ancestor
    ///
    /// Unregistered types are unchecked. Registered types with no classified
    /// ancestor are checked.
    pub fn classify(&self, name: &str) -> ErrorClass {
        if !self.contains(name) {
            return ErrorClass::Unchecked;
        }
        self.ancestors(name)
            .find_map(|n| self.types.get(n).and_then(|e| e.class))
            .unwrap_or(ErrorClass::Checked)
    }
}

/// Iterator returned by [`ErrorHierarchy::ancestors`]
pub struct Ancestors<'a> {
    hierarchy: &'a ErrorHierarchy,
    next: Option<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = self
            .hierarchy
            .types
            .get(current)
            .and_then(|e| e.parent.as_deref());
        Some(current)
    }
}

/// Last path segment of a qualified type name (`a.b.C` or `a::b::C` → `C`)
pub fn simple_name(name: &str) -> &str {
    name.rsplit(|c| c == '.' || c == ':').next().unwrap_or(name)
}
