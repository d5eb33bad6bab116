use crate::rule::RuleCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The outcome of evaluating a single rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    /// The id of the rule that was evaluated
    pub rule_id: String,

    /// The rule's category; `None` when a referenced rule could not be
    /// resolved at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<RuleCategory>,

    /// Whether the rule passed
    pub passed: bool,

    /// Human-readable summary of the check
    pub message: String,

    /// What the rule expected, where applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,

    /// What the response actually contained, where applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,

    /// Evaluation error (bad regex, malformed JSON, missing library rule);
    /// always paired with `passed == false`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuleOutcome {
    /// A passing outcome
    pub fn passed(
        rule_id: impl Into<String>,
        category: impl Into<Option<RuleCategory>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            category: category.into(),
            passed: true,
            message: message.into(),
            expected: None,
            actual: None,
            error: None,
        }
    }

    /// A failing outcome
    pub fn failed(
        rule_id: impl Into<String>,
        category: impl Into<Option<RuleCategory>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            category: category.into(),
            passed: false,
            message: message.into(),
            expected: None,
            actual: None,
            error: None,
        }
    }

    /// A failing outcome caused by an evaluation error rather than a
    /// mismatched assertion
    pub fn errored(
        rule_id: impl Into<String>,
        category: impl Into<Option<RuleCategory>>,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            category: category.into(),
            passed: false,
            message: message.into(),
            expected: None,
            actual: None,
            error: Some(error.into()),
        }
    }

    /// Attach the expected value
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Attach the actual value
    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

/// The verdict for one response against one validation config.
///
/// Produced fresh per response and never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Whether validation was enabled at all
    pub enabled: bool,

    /// Count of all referenced rules, enabled or not
    pub total_rules: usize,

    /// Count of enabled rules that passed
    pub passed_rules: usize,

    /// Count of enabled rules that failed
    pub failed_rules: usize,

    /// True iff no enabled rule failed
    pub all_passed: bool,

    /// Per-rule outcomes in declaration order
    pub rule_results: Vec<RuleOutcome>,

    /// When the evaluation ran
    pub executed_at: DateTime<Utc>,
}

impl ValidationResult {
    /// The vacuously-passing verdict for an absent or disabled config
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            total_rules: 0,
            passed_rules: 0,
            failed_rules: 0,
            all_passed: true,
            rule_results: Vec::new(),
            executed_at: Utc::now(),
        }
    }

    /// Build an enabled verdict from per-rule outcomes.
    ///
    /// `total` counts every referenced rule; the pass/fail tally counts only
    /// the outcomes of enabled rules, which the caller passes through
    /// `counted` flags alongside each outcome.
    pub fn from_outcomes(outcomes: Vec<(RuleOutcome, bool)>) -> Self {
        let total_rules = outcomes.len();
        let mut passed_rules = 0;
        let mut failed_rules = 0;
        let mut rule_results = Vec::with_capacity(total_rules);

        for (outcome, counted) in outcomes {
            if counted {
                if outcome.passed {
                    passed_rules += 1;
                } else {
                    failed_rules += 1;
                }
            }
            rule_results.push(outcome);
        }

        Self {
            enabled: true,
            total_rules,
            passed_rules,
            failed_rules,
            all_passed: failed_rules == 0,
            rule_results,
            executed_at: Utc::now(),
        }
    }
}
