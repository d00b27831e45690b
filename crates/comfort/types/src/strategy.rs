//! Adjustment strategies
//!
//! Strategies are configuration shared read-only across sessions. Each one
//! names the issue types it addresses and the ordered rules that produce a
//! parameter delta.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::StrategyId;
use crate::issue::IssueType;
use crate::settings::WaveParameter;

/// What a rule does to its parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuleAction {
    /// Add a signed amount (parameter units)
    Offset(f64),
    /// Multiply by a factor
    Scale(f64),
    /// Move to a fixed target value
    SetTo(f64),
}

/// A single parameter rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRule {
    pub parameter: WaveParameter,

    pub action: RuleAction,

    /// Scale the change by the most severe triggering issue
    #[serde(default)]
    pub scale_with_severity: bool,
}

impl AdjustmentRule {
    pub fn new(parameter: WaveParameter, action: RuleAction) -> Self {
        Self {
            parameter,
            action,
            scale_with_severity: false,
        }
    }

    pub fn severity_scaled(mut self) -> Self {
        self.scale_with_severity = true;
        self
    }
}

/// Named, prioritized rule set mapping issue types to parameter changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentStrategy {
    pub id: StrategyId,

    pub name: String,

    /// Higher wins when several strategies match
    pub priority: i32,

    pub addressed_issues: BTreeSet<IssueType>,

    /// Rules, applied in order
    pub rules: Vec<AdjustmentRule>,

    pub enabled: bool,
}

impl AdjustmentStrategy {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            id: StrategyId::new(id),
            name: name.into(),
            priority,
            addressed_issues: BTreeSet::new(),
            rules: Vec::new(),
            enabled: true,
        }
    }

    pub fn addressing(mut self, issue_type: IssueType) -> Self {
        self.addressed_issues.insert(issue_type);
        self
    }

    pub fn with_rule(mut self, rule: AdjustmentRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn addresses(&self, issue_type: IssueType) -> bool {
        self.addressed_issues.contains(&issue_type)
    }

    /// Whether this strategy addresses any of the given issue types.
    pub fn addresses_any<'a>(&self, mut issue_types: impl Iterator<Item = &'a IssueType>) -> bool {
        issue_types.any(|t| self.addresses(*t))
    }
}
