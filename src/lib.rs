//! # Financial Metrics Engine
//!
//! A library for turning a monthly accounting export (chart-of-accounts
//! balances, the income/expense ledger and the income-statement summary)
//! into a structured set of financial metrics.
//!
//! ## Core Concepts
//!
//! - **Account hierarchy**: Balance rows are validated and linked into a tree by code prefix
//! - **Consolidation**: Balances are rolled up per class with debit/credit sign conventions applied
//! - **Expense breakdown**: Expense accounts are partitioned by an ordered rule table
//! - **Metrics**: EBITDA and liquidity/profitability/leverage ratios; a zero denominator yields `Undefined`
//! - **Budget execution**: Actual revenue and expense against configured monthly targets
//! - **Recommendations**: Ordered threshold rules over the computed figures
//!
//! The engine is a pure function of the export and an immutable [`BudgetConfig`]:
//! it reads no files, environment or clock, and the same input always yields
//! the same [`AnalysisResult`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_metrics_engine::*;
//!
//! let export: FinancialExport = serde_json::from_str(&json)?;
//! let budget = BudgetConfig::default();
//!
//! let result = analyze_financials(&export, &budget)?;
//! for (month, analysis) in &result.months {
//!     println!("{}: EBITDA {:.0}", month, analysis.snapshot.ebitda);
//!     for rec in &analysis.recommendations {
//!         println!("  {}", rec);
//!     }
//! }
//! ```

pub mod budget;
pub mod chart_of_accounts;
pub mod classifier;
pub mod config;
pub mod consolidator;
pub mod error;
pub mod ingestion;
pub mod metrics;
pub mod recommendations;
pub mod schema;
pub mod utils;

pub use budget::{analyze_execution, BudgetExecutionResult};
pub use chart_of_accounts::{normalize_balances, AccountEntry, AccountHierarchy};
pub use classifier::{classify, ExpenseBreakdown, ExpenseCategory, ExpenseClassifier};
pub use config::{BudgetConfig, ChartMapping};
pub use consolidator::{AccountClass, BalanceConsolidator, ConsolidatedBalance};
pub use error::{AnalysisError, Result};
pub use ingestion::*;
pub use metrics::{
    EbitdaComponents, FinancialSnapshot, IncomeStatementFigures, MetricCalculator, RatioName,
    RatioValue,
};
pub use recommendations::{
    Recommendation, RecommendationCategory, RecommendationEngine, RuleInput, Severity,
};
pub use schema::*;

use chrono::NaiveDate;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyAnalysis {
    pub month: ReportingMonth,
    /// Last calendar day of the month in the export's fiscal year.
    pub period_end: NaiveDate,
    pub snapshot: FinancialSnapshot,
    pub expenses: ExpenseBreakdown,
    pub budget: BudgetExecutionResult,
    /// In rule order: liquidity, profitability, budget execution, trend.
    pub recommendations: Vec<Recommendation>,
    pub warnings: Vec<ComputationWarning>,
}

/// Everything the engine derives from one export. This is the only object
/// handed to reporting, charting and e-mail collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    pub organization_name: String,
    pub fiscal_year: i32,
    pub months: BTreeMap<ReportingMonth, MonthlyAnalysis>,
}

impl AnalysisResult {
    pub fn get(&self, month: ReportingMonth) -> Option<&MonthlyAnalysis> {
        self.months.get(&month)
    }

    /// The most recent month analysed.
    pub fn latest(&self) -> Option<&MonthlyAnalysis> {
        self.months.values().next_back()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ComputationWarning> {
        self.months.values().flat_map(|m| m.warnings.iter())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisResult)
    }

    pub fn schema_as_json() -> Result<String> {
        Ok(serde_json::to_string_pretty(&Self::json_schema())?)
    }
}

pub struct FinancialAnalyzer<'a> {
    budget: &'a BudgetConfig,
    mapping: ChartMapping,
}

impl<'a> FinancialAnalyzer<'a> {
    pub fn new(budget: &'a BudgetConfig) -> Self {
        Self::with_mapping(budget, &ChartMapping::default())
    }

    pub fn with_mapping(budget: &'a BudgetConfig, mapping: &ChartMapping) -> Self {
        Self {
            budget,
            mapping: mapping.normalized(),
        }
    }

    pub fn analyze(&self, export: &FinancialExport) -> Result<AnalysisResult> {
        self.budget.validate()?;
        validate_export(export)?;

        info!(
            "Analyzing financials for organization: {} ({} months)",
            export.organization_name,
            export.balances.len()
        );

        let mut months = BTreeMap::new();
        for &month in export.balances.keys() {
            months.insert(month, self.analyze_month(export, month)?);
        }

        let mut previous: Option<&MonthlyAnalysis> = None;
        let mut recommendations = BTreeMap::new();
        for (month, analysis) in &months {
            recommendations.insert(*month, self.recommend(analysis, previous));
            previous = Some(analysis);
        }
        for (month, recs) in recommendations {
            if let Some(analysis) = months.get_mut(&month) {
                analysis.recommendations = recs;
            }
        }

        Ok(AnalysisResult {
            organization_name: export.organization_name.clone(),
            fiscal_year: export.fiscal_year,
            months,
        })
    }

    /// Computes every figure of one month from that month's rows only.
    /// Months share no state, so callers may measure them in parallel; the
    /// returned analysis has no recommendations yet (see [`Self::recommend`]).
    pub fn analyze_month(&self, export: &FinancialExport, month: ReportingMonth) -> Result<MonthlyAnalysis> {
        let rows = export.balances.get(&month).ok_or_else(|| {
            AnalysisError::MissingSheet(format!("{} {}", BALANCE_SHEET_PREFIX, month.spanish_name()))
        })?;
        let period_end = utils::last_day_of_month(export.fiscal_year, month.number()).ok_or_else(|| {
            AnalysisError::validation(
                Some(month),
                format!("Fiscal year {} is out of range", export.fiscal_year),
            )
        })?;

        let tree = AccountHierarchy::build(month, rows)?;
        let consolidated = BalanceConsolidator::new(&self.mapping).consolidate_month(&tree);

        let figures = IncomeStatementFigures::extract(&export.income_statement, month, &self.mapping);
        let components = EbitdaComponents::extract(&export.ledger, month, &self.mapping);
        let (expenses, expense_warnings) = ExpenseClassifier::new(&self.mapping).classify_month(
            &export.ledger,
            month,
            figures.total_expense,
        );
        let (snapshot, metric_warnings) = MetricCalculator::compute(&consolidated, &figures, &components);
        let budget = analyze_execution(figures.revenue.unwrap_or(0.0), expenses.total, self.budget);

        let mut warnings = consolidated.warnings;
        warnings.extend(expense_warnings);
        warnings.extend(metric_warnings);

        info!(
            "Completed {}: EBITDA {:.2}, {} warnings",
            month,
            snapshot.ebitda,
            warnings.len()
        );
        debug!("Expense totals for {}: {:?}", month, expenses.totals);

        Ok(MonthlyAnalysis {
            month,
            period_end,
            snapshot,
            expenses,
            budget,
            recommendations: Vec::new(),
            warnings,
        })
    }

    pub fn recommend(
        &self,
        current: &MonthlyAnalysis,
        previous: Option<&MonthlyAnalysis>,
    ) -> Vec<Recommendation> {
        let input = RuleInput {
            snapshot: &current.snapshot,
            execution: &current.budget,
            previous: previous.map(|p| (&p.snapshot, &p.budget)),
        };
        RecommendationEngine::new(self.budget).evaluate(&input)
    }
}

pub fn analyze_financials(export: &FinancialExport, budget: &BudgetConfig) -> Result<AnalysisResult> {
    FinancialAnalyzer::new(budget).analyze(export)
}

fn validate_export(export: &FinancialExport) -> Result<()> {
    if export.balances.is_empty() {
        return Err(AnalysisError::MissingSheet(format!(
            "{} <MES>",
            BALANCE_SHEET_PREFIX
        )));
    }
    if export.ledger.is_empty() {
        return Err(AnalysisError::MissingSheet(LEDGER_SHEET.to_string()));
    }
    if export.income_statement.is_empty() {
        return Err(AnalysisError::MissingSheet(INCOME_STATEMENT_SHEET.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_of_accounts::tests::row;

    fn amounts(values: &[(ReportingMonth, f64)]) -> BTreeMap<ReportingMonth, f64> {
        values.iter().copied().collect()
    }

    fn sample_export() -> FinancialExport {
        let balance = vec![
            row(AccountLevel::Class, "1", "ACTIVO", 500_000_000.0),
            row(AccountLevel::Group, "11", "DISPONIBLE", 150_000_000.0),
            row(AccountLevel::Group, "13", "DEUDORES", 130_000_000.0),
            row(AccountLevel::Group, "14", "INVENTARIOS", 120_000_000.0),
            row(AccountLevel::Group, "15", "PROPIEDAD PLANTA Y EQUIPO", 100_000_000.0),
            row(AccountLevel::Class, "2", "PASIVO", -200_000_000.0),
            row(AccountLevel::Class, "3", "PATRIMONIO", -300_000_000.0),
        ];
        let mut balances = BTreeMap::new();
        balances.insert(ReportingMonth::February, balance.clone());
        balances.insert(ReportingMonth::March, balance);

        let ledger_row = |code: &str, name: &str, feb: f64, mar: f64| LedgerRow {
            code: code.to_string(),
            name: name.to_string(),
            amounts: amounts(&[(ReportingMonth::February, feb), (ReportingMonth::March, mar)]),
        };
        let is_row = |description: &str, feb: f64, mar: f64| IncomeStatementRow {
            description: description.to_string(),
            level: Some(0),
            totals: amounts(&[(ReportingMonth::February, feb), (ReportingMonth::March, mar)]),
        };

        FinancialExport {
            organization_name: "Demo SAS".to_string(),
            fiscal_year: 2025,
            balances,
            ledger: vec![
                ledger_row("510506", "SUELDOS ADMINISTRATIVOS", 52_000_000.0, 48_000_000.0),
                ledger_row("510530", "CESANTIAS", 10_500_000.0, 9_800_000.0),
                ledger_row("516005", "DEPRECIACION", 8_200_000.0, 7_800_000.0),
                ledger_row("530520", "INTERESES", 4_800_000.0, 5_200_000.0),
                ledger_row("613505", "COSTO VENTAS", 32_000_000.0, 28_000_000.0),
                ledger_row("720101", "COSTO PRODUCCION", 42_000_000.0, 38_000_000.0),
            ],
            income_statement: vec![
                is_row("INGRESOS ORDINARIOS", 125_000_000.0, 110_000_000.0),
                is_row("COSTO DE VENTA", 32_000_000.0, 28_000_000.0),
                is_row("RESULTADO DEL EJERCICIO", 18_000_000.0, 12_000_000.0),
            ],
        }
    }

    #[test]
    fn test_end_to_end_analysis() {
        let budget = BudgetConfig::default();
        let result = analyze_financials(&sample_export(), &budget).unwrap();

        assert_eq!(result.months.len(), 2);
        let march = result.latest().unwrap();
        assert_eq!(march.month, ReportingMonth::March);
        assert_eq!(march.period_end, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
        assert_eq!(march.snapshot.ebitda, 12_000_000.0 + 7_800_000.0 + 5_200_000.0);
        assert_eq!(march.budget.revenue_pct, 110.0);
        assert_eq!(march.expenses.total, 136_800_000.0);
        assert_eq!(march.expenses.get(ExpenseCategory::Salaries), 48_000_000.0);
        assert_eq!(march.expenses.get(ExpenseCategory::Severance), 9_800_000.0);
        assert_eq!(
            march.snapshot.ratio(RatioName::CurrentRatio),
            RatioValue::Defined(2.0)
        );
    }

    #[test]
    fn test_first_month_has_no_trend_recommendations() {
        let budget = BudgetConfig::default();
        let result = analyze_financials(&sample_export(), &budget).unwrap();
        let february = result.get(ReportingMonth::February).unwrap();

        assert!(february
            .recommendations
            .iter()
            .all(|r| r.category != RecommendationCategory::Trend));
    }

    #[test]
    fn test_invalid_config_fails_before_analysis() {
        let budget = BudgetConfig {
            monthly_expense_target: 0.0,
            ..BudgetConfig::default()
        };
        let mut export = sample_export();
        export.balances.clear();

        let err = analyze_financials(&export, &budget).unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }

    #[test]
    fn test_missing_sheets_are_validation_errors() {
        let budget = BudgetConfig::default();

        let mut export = sample_export();
        export.ledger.clear();
        let err = analyze_financials(&export, &budget).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingSheet(ref s) if s == LEDGER_SHEET));

        let mut export = sample_export();
        export.income_statement.clear();
        assert!(analyze_financials(&export, &budget).unwrap_err().is_validation());
    }

    #[test]
    fn test_result_schema_generation() {
        let schema_json = AnalysisResult::schema_as_json().unwrap();
        assert!(schema_json.contains("recommendations"));
        assert!(schema_json.contains("significant_deviation"));
        assert!(schema_json.contains("period_end"));
    }
}
