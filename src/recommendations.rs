//! Rule-based advisory messages.
//!
//! Rules run in a fixed order (liquidity, profitability, budget execution,
//! trend) and each one sees the same inputs; the emission order of the
//! resulting list is the rule order.

use crate::budget::BudgetExecutionResult;
use crate::config::BudgetConfig;
use crate::metrics::{FinancialSnapshot, RatioName};
use crate::utils::percent_change;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current ratio below this is treated as critical regardless of the configured threshold.
pub const CRITICAL_CURRENT_RATIO: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Liquidity,
    Profitability,
    BudgetExecution,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub severity: Severity,
    pub message: String,
}

impl Recommendation {
    fn new(category: RecommendationCategory, severity: Severity, message: String) -> Self {
        Self {
            category,
            severity,
            message,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.category, self.severity, self.message)
    }
}

/// What a rule may look at: the month being assessed and, for trend
/// comparison, the month analysed before it.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub snapshot: &'a FinancialSnapshot,
    pub execution: &'a BudgetExecutionResult,
    pub previous: Option<(&'a FinancialSnapshot, &'a BudgetExecutionResult)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedMetric {
    Revenue,
    Expense,
    Ebitda,
    NetMarginPct,
    CurrentRatio,
}

impl TrackedMetric {
    pub const ALL: [TrackedMetric; 5] = [
        Self::Revenue,
        Self::Expense,
        Self::Ebitda,
        Self::NetMarginPct,
        Self::CurrentRatio,
    ];

    pub fn value(self, snapshot: &FinancialSnapshot, execution: &BudgetExecutionResult) -> Option<f64> {
        match self {
            Self::Revenue => snapshot.revenue,
            Self::Expense => Some(execution.actual_expense),
            Self::Ebitda => Some(snapshot.ebitda),
            Self::NetMarginPct => snapshot.ratio(RatioName::NetMarginPct).value(),
            Self::CurrentRatio => snapshot.ratio(RatioName::CurrentRatio).value(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Revenue => "Revenue",
            Self::Expense => "Total expense",
            Self::Ebitda => "EBITDA",
            Self::NetMarginPct => "Net margin",
            Self::CurrentRatio => "Current ratio",
        }
    }
}

pub type Rule = fn(&RuleInput<'_>, &BudgetConfig) -> Vec<Recommendation>;

pub const RULES: [Rule; 4] = [liquidity_rule, profitability_rule, budget_rule, trend_rule];

pub fn liquidity_rule(input: &RuleInput<'_>, config: &BudgetConfig) -> Vec<Recommendation> {
    let Some(current_ratio) = input.snapshot.ratio(RatioName::CurrentRatio).value() else {
        return Vec::new();
    };
    if current_ratio >= config.liquidity_threshold {
        return Vec::new();
    }

    let severity = if current_ratio < CRITICAL_CURRENT_RATIO {
        Severity::Critical
    } else {
        Severity::Warning
    };
    vec![Recommendation::new(
        RecommendationCategory::Liquidity,
        severity,
        format!(
            "Current ratio of {:.2} is below the minimum of {:.2}. Improve collections or arrange short-term financing.",
            current_ratio, config.liquidity_threshold
        ),
    )]
}

pub fn profitability_rule(input: &RuleInput<'_>, config: &BudgetConfig) -> Vec<Recommendation> {
    match input.snapshot.ratio(RatioName::NetMarginPct).value() {
        Some(net_margin) if net_margin < config.net_margin_threshold => vec![Recommendation::new(
            RecommendationCategory::Profitability,
            Severity::Warning,
            format!(
                "Net margin of {:.2}% is below the {:.2}% target. Review cost of sales and operating expenses.",
                net_margin, config.net_margin_threshold
            ),
        )],
        _ => Vec::new(),
    }
}

pub fn budget_rule(input: &RuleInput<'_>, config: &BudgetConfig) -> Vec<Recommendation> {
    let execution = input.execution;
    let mut recommendations = Vec::new();

    if execution.revenue_deviation {
        recommendations.push(Recommendation::new(
            RecommendationCategory::BudgetExecution,
            Severity::Warning,
            format!(
                "Revenue executed at {:.1}% of budget, more than {:.1} points from target. Review sales channels and commercial strategy.",
                execution.revenue_pct, config.deviation_threshold_pct
            ),
        ));
    }
    if execution.expense_deviation {
        recommendations.push(Recommendation::new(
            RecommendationCategory::BudgetExecution,
            Severity::Warning,
            format!(
                "Expenses executed at {:.1}% of budget, more than {:.1} points from target. Tighten spending approvals.",
                execution.expense_pct, config.deviation_threshold_pct
            ),
        ));
    }

    recommendations
}

pub fn trend_rule(input: &RuleInput<'_>, config: &BudgetConfig) -> Vec<Recommendation> {
    let Some((previous, previous_execution)) = input.previous else {
        return Vec::new();
    };

    TrackedMetric::ALL
        .iter()
        .filter_map(|metric| {
            let before = metric.value(previous, previous_execution)?;
            let now = metric.value(input.snapshot, input.execution)?;
            let change = percent_change(before, now)?;
            if change.abs() <= config.trend_threshold_pct {
                return None;
            }
            Some(Recommendation::new(
                RecommendationCategory::Trend,
                Severity::Warning,
                format!(
                    "{} changed {:+.1}% from {} to {} ({:.2} -> {:.2}).",
                    metric.label(),
                    change,
                    previous.month,
                    input.snapshot.month,
                    before,
                    now
                ),
            ))
        })
        .collect()
}

pub struct RecommendationEngine<'a> {
    config: &'a BudgetConfig,
}

impl<'a> RecommendationEngine<'a> {
    pub fn new(config: &'a BudgetConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, input: &RuleInput<'_>) -> Vec<Recommendation> {
        RULES
            .iter()
            .flat_map(|rule| rule(input, self.config))
            .collect()
    }
}
