//! Strategy library and selection.

use std::collections::BTreeSet;

use comfort_types::{
    AdjustmentRule, AdjustmentStrategy, ComfortIssue, IssueType, RuleAction, StrategyId,
    WaveParameter,
};
use serde::{Deserialize, Serialize};

/// Ordered, read-only collection of adjustment strategies.
///
/// Shared by every session; replacing the library only affects selections
/// made afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyLibrary {
    strategies: Vec<AdjustmentStrategy>,
}

impl StrategyLibrary {
    pub fn new(strategies: Vec<AdjustmentStrategy>) -> Self {
        Self { strategies }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn get(&self, id: &StrategyId) -> Option<&AdjustmentStrategy> {
        self.strategies.iter().find(|s| &s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdjustmentStrategy> {
        self.strategies.iter()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Select the strategy for a set of detected issues.
    ///
    /// Among enabled strategies addressing at least one detected issue type,
    /// the highest priority wins; equal priorities keep library order.
    pub fn select(&self, issues: &[ComfortIssue]) -> Option<&AdjustmentStrategy> {
        let detected: BTreeSet<IssueType> = issues.iter().map(|i| i.issue_type).collect();

        let mut selected: Option<&AdjustmentStrategy> = None;
        for strategy in self
            .strategies
            .iter()
            .filter(|s| s.enabled && s.addresses_any(detected.iter()))
        {
            match selected {
                Some(current) if current.priority >= strategy.priority => {}
                _ => selected = Some(strategy),
            }
        }
        selected
    }
}

impl Default for StrategyLibrary {
    /// Library covering every issue type.
    fn default() -> Self {
        Self::new(vec![
            AdjustmentStrategy::new("motion-reduction", "Motion reduction", 100)
                .addressing(IssueType::MotionSickness)
                .addressing(IssueType::Disorientation)
                .with_rule(
                    AdjustmentRule::new(WaveParameter::Speed, RuleAction::Scale(0.85))
                        .severity_scaled(),
                )
                .with_rule(
                    AdjustmentRule::new(WaveParameter::Amplitude, RuleAction::Scale(0.85))
                        .severity_scaled(),
                )
                .with_rule(AdjustmentRule::new(WaveParameter::Damping, RuleAction::Offset(0.1))),
            AdjustmentStrategy::new("visual-calming", "Visual calming", 80)
                .addressing(IssueType::EyeStrain)
                .with_rule(
                    AdjustmentRule::new(WaveParameter::Frequency, RuleAction::Scale(0.8))
                        .severity_scaled(),
                )
                .with_rule(AdjustmentRule::new(
                    WaveParameter::Complexity,
                    RuleAction::Offset(-0.1),
                )),
            AdjustmentStrategy::new("stress-relief", "Stress relief", 70)
                .addressing(IssueType::PhysiologicalStress)
                .addressing(IssueType::BehavioralDiscomfort)
                .with_rule(
                    AdjustmentRule::new(WaveParameter::Speed, RuleAction::Scale(0.9))
                        .severity_scaled(),
                )
                .with_rule(AdjustmentRule::new(WaveParameter::Frequency, RuleAction::Scale(0.9)))
                .with_rule(AdjustmentRule::new(WaveParameter::Damping, RuleAction::Offset(0.05))),
            AdjustmentStrategy::new("complexity-reduction", "Complexity reduction", 60)
                .addressing(IssueType::CognitiveOverload)
                .with_rule(
                    AdjustmentRule::new(WaveParameter::Complexity, RuleAction::Offset(-0.15))
                        .severity_scaled(),
                )
                .with_rule(AdjustmentRule::new(WaveParameter::Frequency, RuleAction::Scale(0.9))),
        ])
    }
}
