use crate::error::{AnalysisError, Result};
use crate::utils::normalize_label;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MONTHLY_REVENUE_TARGET: f64 = 100_000_000.0;
pub const DEFAULT_MONTHLY_EXPENSE_TARGET: f64 = 125_000_000.0;
pub const DEFAULT_DEVIATION_THRESHOLD_PCT: f64 = 10.0;
pub const DEFAULT_LIQUIDITY_THRESHOLD: f64 = 1.5;
pub const DEFAULT_NET_MARGIN_THRESHOLD: f64 = 5.0;
pub const DEFAULT_TREND_THRESHOLD_PCT: f64 = 20.0;

/// Budget targets and alert thresholds. Read-only once handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BudgetConfig {
    #[schemars(description = "Expected revenue per month, in the export's currency")]
    pub monthly_revenue_target: f64,

    #[schemars(description = "Expected total expense per month, in the export's currency")]
    pub monthly_expense_target: f64,

    #[schemars(
        description = "Execution percentages further than this many points from 100% are flagged"
    )]
    pub deviation_threshold_pct: f64,

    #[schemars(description = "Current ratio below this value triggers a liquidity recommendation")]
    pub liquidity_threshold: f64,

    #[schemars(description = "Net margin % below this value triggers a profitability recommendation")]
    pub net_margin_threshold: f64,

    #[schemars(
        description = "Month-over-month change (in %) of a tracked metric that triggers a trend recommendation"
    )]
    pub trend_threshold_pct: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_revenue_target: DEFAULT_MONTHLY_REVENUE_TARGET,
            monthly_expense_target: DEFAULT_MONTHLY_EXPENSE_TARGET,
            deviation_threshold_pct: DEFAULT_DEVIATION_THRESHOLD_PCT,
            liquidity_threshold: DEFAULT_LIQUIDITY_THRESHOLD,
            net_margin_threshold: DEFAULT_NET_MARGIN_THRESHOLD,
            trend_threshold_pct: DEFAULT_TREND_THRESHOLD_PCT,
        }
    }
}

impl BudgetConfig {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AnalysisError::Config(format!("malformed budget configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("monthly_revenue_target", self.monthly_revenue_target),
            ("monthly_expense_target", self.monthly_expense_target),
            ("deviation_threshold_pct", self.deviation_threshold_pct),
            ("liquidity_threshold", self.liquidity_threshold),
            ("net_margin_threshold", self.net_margin_threshold),
            ("trend_threshold_pct", self.trend_threshold_pct),
        ];

        for (name, value) in fields {
            if !value.is_finite() {
                return Err(AnalysisError::Config(format!(
                    "{} must be a finite number, got {}",
                    name, value
                )));
            }
        }

        if self.monthly_revenue_target <= 0.0 {
            return Err(AnalysisError::Config(format!(
                "monthly_revenue_target must be positive, got {}",
                self.monthly_revenue_target
            )));
        }
        if self.monthly_expense_target <= 0.0 {
            return Err(AnalysisError::Config(format!(
                "monthly_expense_target must be positive, got {}",
                self.monthly_expense_target
            )));
        }
        if self.deviation_threshold_pct < 0.0 {
            return Err(AnalysisError::Config(format!(
                "deviation_threshold_pct cannot be negative, got {}",
                self.deviation_threshold_pct
            )));
        }
        if self.liquidity_threshold < 0.0 {
            return Err(AnalysisError::Config(format!(
                "liquidity_threshold cannot be negative, got {}",
                self.liquidity_threshold
            )));
        }
        if self.trend_threshold_pct < 0.0 {
            return Err(AnalysisError::Config(format!(
                "trend_threshold_pct cannot be negative, got {}",
                self.trend_threshold_pct
            )));
        }

        Ok(())
    }
}

/// Chart-of-accounts conventions of the export. The defaults follow the
/// Colombian PUC, where class 1 holds assets and group 14 inventories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ChartMapping {
    pub current_asset_groups: Vec<String>,
    pub inventory_groups: Vec<String>,
    /// First digits of ledger codes that count as expense accounts.
    pub expense_class_prefixes: Vec<String>,
    /// Shorter ledger codes are class, group or account subtotals.
    pub detail_code_min_digits: usize,
    pub depreciation_patterns: Vec<String>,
    pub interest_patterns: Vec<String>,
    pub revenue_descriptions: Vec<String>,
    pub cost_of_sales_descriptions: Vec<String>,
    pub net_income_descriptions: Vec<String>,
    pub total_expense_descriptions: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for ChartMapping {
    fn default() -> Self {
        Self {
            current_asset_groups: strings(&["11", "12", "13", "14"]),
            inventory_groups: strings(&["14"]),
            expense_class_prefixes: strings(&["5", "6", "7"]),
            detail_code_min_digits: 6,
            depreciation_patterns: strings(&["DEPRECIACION", "AMORTIZACION"]),
            interest_patterns: strings(&["INTERES"]),
            revenue_descriptions: strings(&["INGRESOS ORDINARIOS", "OPERATING REVENUE"]),
            cost_of_sales_descriptions: strings(&["COSTO DE VENTA", "COST OF SALES"]),
            net_income_descriptions: strings(&["RESULTADO DEL EJERCICIO", "NET INCOME"]),
            total_expense_descriptions: strings(&["TOTAL GASTOS Y COSTOS", "TOTAL EXPENSES"]),
        }
    }
}

impl ChartMapping {
    /// Copy with every name pattern normalized for accent-insensitive matching.
    pub fn normalized(&self) -> Self {
        let norm = |values: &[String]| -> Vec<String> {
            values.iter().map(|v| normalize_label(v)).collect()
        };
        Self {
            current_asset_groups: self.current_asset_groups.clone(),
            inventory_groups: self.inventory_groups.clone(),
            expense_class_prefixes: self.expense_class_prefixes.clone(),
            detail_code_min_digits: self.detail_code_min_digits,
            depreciation_patterns: norm(&self.depreciation_patterns),
            interest_patterns: norm(&self.interest_patterns),
            revenue_descriptions: norm(&self.revenue_descriptions),
            cost_of_sales_descriptions: norm(&self.cost_of_sales_descriptions),
            net_income_descriptions: norm(&self.net_income_descriptions),
            total_expense_descriptions: norm(&self.total_expense_descriptions),
        }
    }

    /// True for detail (not subtotal) ledger codes of an expense class.
    pub fn is_expense_code(&self, code: &str) -> bool {
        code.len() >= self.detail_code_min_digits
            && self
                .expense_class_prefixes
                .iter()
                .any(|prefix| code.starts_with(prefix.as_str()))
    }
}
