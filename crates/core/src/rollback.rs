//! Rollback rule matching
//!
//! Decides whether a completing transaction boundary commits or rolls back.
//!
//! ## Algorithm
//!
//! 1. Success → commit, unless the boundary was marked rollback-only.
//! 2. Cancelled → rollback.
//! 3. Failed(type) → every rule is scored by the number of ancestor steps from
//!    the raised type up to the rule target. Unrelated rules do not match. The
//!    smallest distance wins; ties go to the rule declared last.
//! 4. No rule matched → default policy from the type's [`ErrorClass`]:
//!    unchecked and fatal errors roll back, checked errors commit.
//!
//! The matcher is pure: it performs no I/O and cannot fail.

use crate::hierarchy::{simple_name, ErrorClass, ErrorHierarchy};
use crate::attribute::TransactionAttribute;
use std::borrow::Cow;
use std::sync::Arc;

/// Verdict attached to a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleSign {
    /// Matching errors roll the transaction back
    Rollback,
    /// Matching errors let the transaction commit
    NoRollback,
}

/// What a rule matches against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleTarget {
    /// A specific error type, compared by full name
    Exact(String),
    /// A type name: compared against each ancestor's full name first, then
    /// against each ancestor's simple name
    Name(String),
}

/// One declared rollback rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RollbackRule {
    target: RuleTarget,
    sign: RuleSign,
}

impl RollbackRule {
    /// Create a rule
    pub fn new(target: RuleTarget, sign: RuleSign) -> Self {
        Self { target, sign }
    }

    /// Rule targeting an exact error type
    pub fn exact(error_type: impl Into<String>, sign: RuleSign) -> Self {
        Self::new(RuleTarget::Exact(error_type.into()), sign)
    }

    /// Rule targeting a type name
    pub fn named(name: impl Into<String>, sign: RuleSign) -> Self {
        Self::new(RuleTarget::Name(name.into()), sign)
    }

    /// Rule target
    pub fn target(&self) -> &RuleTarget {
        &self.target
    }

    /// Rule sign
    pub fn sign(&self) -> RuleSign {
        self.sign
    }
}

/// How an operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Returned normally
    Success,
    /// Raised an error of the given concrete type
    Failed(Cow<'static, str>),
    /// The call chain was cancelled before the operation finished
    Cancelled,
}

impl Outcome {
    /// Failure outcome for the given error type name
    pub fn failed(error_type: impl Into<Cow<'static, str>>) -> Self {
        Outcome::Failed(error_type.into())
    }

    /// Check if this is a success
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Commit-or-rollback verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Make the work permanent
    Commit,
    /// Discard the work
    Rollback,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Commit => write!(f, "commit"),
            Verdict::Rollback => write!(f, "rollback"),
        }
    }
}

/// Why the matcher reached its verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Success outcome on an unmarked boundary
    Success,
    /// Boundary marked rollback-only; overrides rules and defaults
    RollbackOnly,
    /// Synthetic cancellation outcome
    Cancelled,
    /// A declared rule matched
    Rule {
        /// Index of the winning rule in the attribute's rule list
        index: usize,
        /// Ancestor distance of the match
        distance: usize,
    },
    /// No rule matched; default policy applied
    Default(ErrorClass),
}

/// Verdict plus the reason behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Commit or rollback
    pub verdict: Verdict,
    /// How the verdict was reached
    pub reason: Reason,
}

/// Rollback rule matcher over an explicit error hierarchy
#[derive(Debug, Clone)]
pub struct RollbackRuleMatcher {
    hierarchy: Arc<ErrorHierarchy>,
}

impl Default for RollbackRuleMatcher {
    fn default() -> Self {
        Self::new(Arc::new(ErrorHierarchy::standard()))
    }
}

impl RollbackRuleMatcher {
    /// Create a matcher over the given hierarchy
    pub fn new(hierarchy: Arc<ErrorHierarchy>) -> Self {
        Self { hierarchy }
    }

    /// The hierarchy used to compute distances
    pub fn hierarchy(&self) -> &ErrorHierarchy {
        &self.hierarchy
    }

    /// Commit or rollback for a completing boundary
    pub fn decide(
        &self,
        attribute: &TransactionAttribute,
        rollback_only: bool,
        outcome: &Outcome,
    ) -> Verdict {
        self.evaluate(attribute.rollback_rules(), rollback_only, outcome)
            .verdict
    }

    /// Like [`decide`](Self::decide), also reporting which rule won
    ///
    /// A rollback-only mark overrides every rule and the default policy.
    pub fn evaluate(
        &self,
        rules: &[RollbackRule],
        rollback_only: bool,
        outcome: &Outcome,
    ) -> Decision {
        match outcome {
            Outcome::Success | Outcome::Failed(_) if rollback_only => Decision {
                verdict: Verdict::Rollback,
                reason: Reason::RollbackOnly,
            },
            Outcome::Success => Decision {
                verdict: Verdict::Commit,
                reason: Reason::Success,
            },
            Outcome::Cancelled => Decision {
                verdict: Verdict::Rollback,
                reason: Reason::Cancelled,
            },
            Outcome::Failed(error_type) => match self.winning_rule(rules, error_type) {
                Some((index, distance)) => Decision {
                    verdict: match rules[index].sign {
                        RuleSign::Rollback => Verdict::Rollback,
                        RuleSign::NoRollback => Verdict::Commit,
                    },
                    reason: Reason::Rule { index, distance },
                },
                None => {
                    let class = self.hierarchy.classify(error_type);
                    Decision {
                        verdict: if class.rolls_back_by_default() {
                            Verdict::Rollback
                        } else {
                            Verdict::Commit
                        },
                        reason: Reason::Default(class),
                    }
                }
            },
        }
    }

    /// Index and distance of the most specific matching rule
    ///
    /// Ties are won by the later rule.
    pub fn winning_rule(&self, rules: &[RollbackRule], error_type: &str) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for (index, rule) in rules.iter().enumerate() {
            let Some(distance) = self.distance(rule, error_type) else {
                continue;
            };
            match best {
                Some((_, best_distance)) if distance > best_distance => {}
                _ => best = Some((index, distance)),
            }
        }
        best
    }

    /// Ancestor distance from `error_type` to the rule target, if related
    pub fn distance(&self, rule: &RollbackRule, error_type: &str) -> Option<usize> {
        match &rule.target {
            RuleTarget::Exact(target) => self.hierarchy.distance(error_type, target),
            RuleTarget::Name(pattern) => self
                .hierarchy
                .distance(error_type, pattern)
                .or_else(|| {
                    self.hierarchy
                        .ancestors(error_type)
                        .position(|n| simple_name(n) == pattern)
                }),
        }
    }
}
