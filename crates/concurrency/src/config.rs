//! Transaction manager settings

use crate::propagation::PropagationEngine;
use serde::{Deserialize, Serialize};

/// What happens to a suspended transaction's deadline when it resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeTimeout {
    /// Time spent suspended counts against the timeout
    #[default]
    Continue,
    /// The deadline moves forward by the time spent suspended
    ExcludeSuspension,
    /// The full timeout starts again at resume
    Restart,
}

/// Settings for one [`TransactionManager`](crate::TransactionManager)
///
/// # Example
///
/// ```
/// use txscope_concurrency::{ManagerConfig, ResumeTimeout};
///
/// let config = ManagerConfig::new()
///     .strict_join(true)
///     .resume_timeout(ResumeTimeout::ExcludeSuspension);
/// assert!(config.strict_join);
/// assert!(!config.nested_fallback);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Reject joins whose isolation or read-only flag disagree with the
    /// current transaction
    pub strict_join: bool,
    /// Let `Nested` suspend and start a new transaction when savepoints are
    /// unavailable instead of failing
    pub nested_fallback: bool,
    /// Deadline handling on resume
    pub resume_timeout: ResumeTimeout,
    /// Report a rollback forced by a rollback-only mark on an otherwise
    /// successful boundary as an error
    pub fail_on_unexpected_rollback: bool,
}

impl ManagerConfig {
    /// Default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strict join validation
    pub fn strict_join(mut self, enabled: bool) -> Self {
        self.strict_join = enabled;
        self
    }

    /// Set the nested fallback
    pub fn nested_fallback(mut self, enabled: bool) -> Self {
        self.nested_fallback = enabled;
        self
    }

    /// Set resume timeout handling
    pub fn resume_timeout(mut self, policy: ResumeTimeout) -> Self {
        self.resume_timeout = policy;
        self
    }

    /// Set unexpected rollback reporting
    pub fn fail_on_unexpected_rollback(mut self, enabled: bool) -> Self {
        self.fail_on_unexpected_rollback = enabled;
        self
    }

    /// Decision engine configured from these settings
    pub fn engine(&self) -> PropagationEngine {
        PropagationEngine {
            strict_join: self.strict_join,
            nested_fallback: self.nested_fallback,
        }
    }
}
