use crate::config::BudgetConfig;
use crate::utils::round_to;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Decimals kept on execution percentages; half rounds away from zero.
pub const EXECUTION_PCT_DECIMALS: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BudgetExecutionResult {
    pub actual_revenue: f64,
    pub actual_expense: f64,
    pub revenue_pct: f64,
    pub expense_pct: f64,
    pub revenue_deviation: bool,
    pub expense_deviation: bool,
    /// True when either side deviates.
    pub significant_deviation: bool,
}

pub fn execution_pct(actual: f64, target: f64) -> f64 {
    round_to(actual * 100.0 / target, EXECUTION_PCT_DECIMALS)
}

pub fn deviates(pct: f64, threshold_pct: f64) -> bool {
    (100.0 - pct).abs() > threshold_pct
}

/// Targets are validated to be positive before analysis starts.
pub fn analyze_execution(
    actual_revenue: f64,
    actual_expense: f64,
    budget: &BudgetConfig,
) -> BudgetExecutionResult {
    let revenue_pct = execution_pct(actual_revenue, budget.monthly_revenue_target);
    let expense_pct = execution_pct(actual_expense, budget.monthly_expense_target);
    let revenue_deviation = deviates(revenue_pct, budget.deviation_threshold_pct);
    let expense_deviation = deviates(expense_pct, budget.deviation_threshold_pct);

    debug!(
        "Budget execution: revenue {:.1}% expense {:.1}% (threshold {:.1})",
        revenue_pct, expense_pct, budget.deviation_threshold_pct
    );

    BudgetExecutionResult {
        actual_revenue,
        actual_expense,
        revenue_pct,
        expense_pct,
        revenue_deviation,
        expense_deviation,
        significant_deviation: revenue_deviation || expense_deviation,
    }
}
