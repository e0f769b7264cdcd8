use crate::config::ChartMapping;
use crate::consolidator::{AccountClass, ConsolidatedBalance};
use crate::schema::{ComputationWarning, IncomeStatementRow, LedgerRow, ReportingMonth, WarningKind};
use crate::utils::{contains_any, round_to, safe_divide};
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A ratio either has a value or could not be computed (zero or missing denominator).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum RatioValue {
    Defined(f64),
    Undefined,
}

impl RatioValue {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Defined(v) => Some(v),
            Self::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Self::Defined(_))
    }
}

impl fmt::Display for RatioValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defined(v) => write!(f, "{:.2}", v),
            Self::Undefined => f.write_str("undefined"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RatioName {
    CurrentRatio,
    QuickRatio,
    GrossMarginPct,
    NetMarginPct,
    ReturnOnEquityPct,
    DebtToEquity,
    InventoryTurnover,
}

impl fmt::Display for RatioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CurrentRatio => "Current Ratio",
            Self::QuickRatio => "Quick Ratio",
            Self::GrossMarginPct => "Gross Margin %",
            Self::NetMarginPct => "Net Margin %",
            Self::ReturnOnEquityPct => "ROE %",
            Self::DebtToEquity => "Debt/Equity",
            Self::InventoryTurnover => "Inventory Turnover",
        };
        f.write_str(label)
    }
}

/// The income-statement lines the metrics depend on, for one month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IncomeStatementFigures {
    pub revenue: Option<f64>,
    pub cost_of_sales: Option<f64>,
    /// Signed: a loss is negative.
    pub net_income: Option<f64>,
    pub total_expense: Option<f64>,
}

impl IncomeStatementFigures {
    /// `mapping` is expected to be normalized (see [`ChartMapping::normalized`]).
    /// Revenue, cost and expense lines are taken as absolute values since
    /// exports present them with either sign.
    pub fn extract(rows: &[IncomeStatementRow], month: ReportingMonth, mapping: &ChartMapping) -> Self {
        let find = |patterns: &[String]| {
            rows.iter()
                .filter(|r| contains_any(&r.description, patterns))
                .find_map(|r| r.total(month))
        };

        Self {
            revenue: find(&mapping.revenue_descriptions).map(f64::abs),
            cost_of_sales: find(&mapping.cost_of_sales_descriptions).map(f64::abs),
            net_income: find(&mapping.net_income_descriptions),
            total_expense: find(&mapping.total_expense_descriptions).map(f64::abs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EbitdaComponents {
    pub depreciation: f64,
    pub interest: f64,
}

impl EbitdaComponents {
    /// Sums depreciation/amortization and interest expense detail accounts of
    /// the ledger; subtotal rows are skipped.
    pub fn extract(ledger: &[LedgerRow], month: ReportingMonth, mapping: &ChartMapping) -> Self {
        let mut components = Self::default();
        for row in ledger.iter().filter(|r| mapping.is_expense_code(r.code.trim())) {
            if contains_any(&row.name, &mapping.depreciation_patterns) {
                components.depreciation += row.amount(month).abs();
            } else if contains_any(&row.name, &mapping.interest_patterns) {
                components.interest += row.amount(month).abs();
            }
        }
        components
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialSnapshot {
    pub month: ReportingMonth,
    pub class_balances: BTreeMap<AccountClass, f64>,
    pub current_assets: Option<f64>,
    pub inventory: Option<f64>,
    pub revenue: Option<f64>,
    pub cost_of_sales: Option<f64>,
    pub net_income: Option<f64>,
    pub depreciation: f64,
    pub interest: f64,
    /// Net income + depreciation + interest, unrounded.
    pub ebitda: f64,
    pub ratios: BTreeMap<RatioName, RatioValue>,
}

impl FinancialSnapshot {
    pub fn ratio(&self, name: RatioName) -> RatioValue {
        self.ratios.get(&name).copied().unwrap_or(RatioValue::Undefined)
    }
}

pub fn ebitda(net_income: f64, depreciation: f64, interest: f64) -> f64 {
    net_income + depreciation + interest
}

struct RatioBuilder {
    month: ReportingMonth,
    ratios: BTreeMap<RatioName, RatioValue>,
    warnings: Vec<ComputationWarning>,
}

impl RatioBuilder {
    fn set(&mut self, name: RatioName, numerator: Option<f64>, denominator: Option<f64>, scale: f64) {
        let value = match (numerator, denominator) {
            (Some(n), Some(d)) => match safe_divide(n, d) {
                Some(v) => RatioValue::Defined(round_to(v * scale, 2)),
                None => {
                    self.warn(
                        WarningKind::ZeroDenominator,
                        format!("{} is undefined: denominator is zero", name),
                    );
                    RatioValue::Undefined
                }
            },
            _ => {
                self.warn(
                    WarningKind::MissingFigure,
                    format!("{} is undefined: a required balance is absent", name),
                );
                RatioValue::Undefined
            }
        };
        self.ratios.insert(name, value);
    }

    fn warn(&mut self, kind: WarningKind, message: String) {
        let warning = ComputationWarning::new(self.month, kind, message);
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

pub struct MetricCalculator;

impl MetricCalculator {
    pub fn compute(
        balance: &ConsolidatedBalance,
        figures: &IncomeStatementFigures,
        components: &EbitdaComponents,
    ) -> (FinancialSnapshot, Vec<ComputationWarning>) {
        let mut builder = RatioBuilder {
            month: balance.month,
            ratios: BTreeMap::new(),
            warnings: Vec::new(),
        };

        let current_liabilities = balance.class_balance(AccountClass::Liability);
        let equity = balance.class_balance(AccountClass::Equity);
        let quick_assets = balance
            .current_assets
            .map(|ca| ca - balance.inventory.unwrap_or(0.0));
        let gross_profit = match (figures.revenue, figures.cost_of_sales) {
            (Some(revenue), Some(cost)) => Some(revenue - cost),
            _ => None,
        };

        builder.set(RatioName::CurrentRatio, balance.current_assets, current_liabilities, 1.0);
        builder.set(RatioName::QuickRatio, quick_assets, current_liabilities, 1.0);
        builder.set(RatioName::GrossMarginPct, gross_profit, figures.revenue, 100.0);
        builder.set(RatioName::NetMarginPct, figures.net_income, figures.revenue, 100.0);
        builder.set(RatioName::ReturnOnEquityPct, figures.net_income, equity, 100.0);
        builder.set(RatioName::DebtToEquity, current_liabilities, equity, 1.0);
        builder.set(RatioName::InventoryTurnover, figures.cost_of_sales, balance.inventory, 1.0);

        if figures.net_income.is_none() {
            builder.warn(
                WarningKind::MissingFigure,
                "Net income line not found; EBITDA uses zero net income".to_string(),
            );
        }
        let ebitda = ebitda(
            figures.net_income.unwrap_or(0.0),
            components.depreciation,
            components.interest,
        );

        let snapshot = FinancialSnapshot {
            month: balance.month,
            class_balances: balance.class_balances.clone(),
            current_assets: balance.current_assets,
            inventory: balance.inventory,
            revenue: figures.revenue,
            cost_of_sales: figures.cost_of_sales,
            net_income: figures.net_income,
            depreciation: components.depreciation,
            interest: components.interest,
            ebitda,
            ratios: builder.ratios,
        };

        (snapshot, builder.warnings)
    }
}
