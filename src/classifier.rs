//! Expense classification.
//!
//! Every expense account of the ledger lands in exactly one category. Rules
//! are evaluated top to bottom and the first match wins; name rules come
//! before code rules, so "SUELDOS ADMINISTRACION" under code 5105 is counted
//! as salaries rather than administrative expense.

use crate::config::ChartMapping;
use crate::schema::{ComputationWarning, LedgerRow, ReportingMonth, WarningKind};
use crate::utils::{normalize_label, percent_change, MONEY_EPSILON};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum ExpenseCategory {
    Administrative,
    Other,
    CostOfSales,
    CostOfProduction,
    Salaries,
    Severance,
    Unclassified,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 7] = [
        Self::Administrative,
        Self::Other,
        Self::CostOfSales,
        Self::CostOfProduction,
        Self::Salaries,
        Self::Severance,
        Self::Unclassified,
    ];
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Administrative => "Administrative",
            Self::Other => "Other",
            Self::CostOfSales => "Cost-of-Sales",
            Self::CostOfProduction => "Cost-of-Production",
            Self::Salaries => "Salaries",
            Self::Severance => "Severance",
            Self::Unclassified => "Unclassified",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatcher {
    /// Matches when the normalized account name contains any of the patterns.
    NameContains(&'static [&'static str]),
    /// Matches when the account code starts with any of the prefixes.
    CodePrefix(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRule {
    pub matcher: RuleMatcher,
    pub category: ExpenseCategory,
}

impl ClassificationRule {
    const fn new(matcher: RuleMatcher, category: ExpenseCategory) -> Self {
        Self { matcher, category }
    }

    /// `normalized_name` must already be upper-cased and accent-folded.
    pub fn matches(&self, code: &str, normalized_name: &str) -> bool {
        match self.matcher {
            RuleMatcher::NameContains(patterns) => {
                patterns.iter().any(|p| normalized_name.contains(p))
            }
            RuleMatcher::CodePrefix(prefixes) => prefixes.iter().any(|p| code.starts_with(p)),
        }
    }
}

pub const EXPENSE_RULES: &[ClassificationRule] = &[
    ClassificationRule::new(
        RuleMatcher::NameContains(&["SUELDO", "SALARIO"]),
        ExpenseCategory::Salaries,
    ),
    ClassificationRule::new(
        RuleMatcher::NameContains(&["CESANTIA"]),
        ExpenseCategory::Severance,
    ),
    ClassificationRule::new(RuleMatcher::CodePrefix(&["51"]), ExpenseCategory::Administrative),
    ClassificationRule::new(RuleMatcher::CodePrefix(&["53"]), ExpenseCategory::Other),
    ClassificationRule::new(RuleMatcher::CodePrefix(&["61"]), ExpenseCategory::CostOfSales),
    ClassificationRule::new(
        RuleMatcher::CodePrefix(&["72", "73"]),
        ExpenseCategory::CostOfProduction,
    ),
];

/// Category of an account under `rules`, or `Unclassified` if none applies.
pub fn classify_with(rules: &[ClassificationRule], code: &str, name: &str) -> ExpenseCategory {
    let normalized = normalize_label(name);
    let code = code.trim();
    rules
        .iter()
        .find(|rule| rule.matches(code, &normalized))
        .map(|rule| rule.category)
        .unwrap_or(ExpenseCategory::Unclassified)
}

pub fn classify(code: &str, name: &str) -> ExpenseCategory {
    classify_with(EXPENSE_RULES, code, name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassifiedExpense {
    pub code: String,
    pub name: String,
    pub category: ExpenseCategory,
    pub amount: f64,
    /// Share of the breakdown total in percent; `None` when the total is zero.
    pub share_of_total_pct: Option<f64>,
    /// Mean absolute amount over the ledger months from January to this one.
    pub average_to_date: f64,
    /// Change against the previous month in percent; `None` in January or
    /// when the previous month is zero or absent.
    pub change_vs_previous_pct: Option<f64>,
    /// Change against `average_to_date` in percent; `None` when the average is zero.
    pub change_vs_average_pct: Option<f64>,
}

impl ClassifiedExpense {
    fn from_row(row: &LedgerRow, month: ReportingMonth, category: ExpenseCategory) -> Self {
        let amount = row.amount(month).abs();
        let to_date: Vec<f64> = row.amounts.range(..=month).map(|(_, v)| v.abs()).collect();
        let average_to_date = if to_date.is_empty() {
            0.0
        } else {
            to_date.iter().sum::<f64>() / to_date.len() as f64
        };
        let change_vs_previous_pct = month
            .previous()
            .and_then(|prev| row.amounts.get(&prev))
            .and_then(|prev| percent_change(prev.abs(), amount));

        Self {
            code: row.code.trim().to_string(),
            name: row.name.trim().to_string(),
            category,
            amount,
            share_of_total_pct: None,
            average_to_date,
            change_vs_previous_pct,
            change_vs_average_pct: percent_change(average_to_date, amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseBreakdown {
    /// Every category is present, zero when nothing was classified into it.
    pub totals: BTreeMap<ExpenseCategory, f64>,
    pub lines: Vec<ClassifiedExpense>,
    /// Equals the sum of `totals`.
    pub total: f64,
    /// Reported total expense minus the ledger detail. A positive residual is
    /// booked to `Unclassified`; a negative one (the ledger exceeds the
    /// income statement) is only reported.
    pub reconciliation_residual: f64,
}

impl ExpenseBreakdown {
    pub fn get(&self, category: ExpenseCategory) -> f64 {
        self.totals.get(&category).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.totals.values().sum()
    }
}

pub struct ExpenseClassifier<'a> {
    mapping: &'a ChartMapping,
    rules: &'a [ClassificationRule],
}

impl<'a> ExpenseClassifier<'a> {
    pub fn new(mapping: &'a ChartMapping) -> Self {
        Self {
            mapping,
            rules: EXPENSE_RULES,
        }
    }

    pub fn with_rules(mapping: &'a ChartMapping, rules: &'a [ClassificationRule]) -> Self {
        Self { mapping, rules }
    }

    /// Classifies the detail expense accounts of `month`; subtotal rows are
    /// skipped. When the income statement reports a total expense above the
    /// ledger, the gap is booked to `Unclassified` so the breakdown sums to
    /// that total.
    pub fn classify_month(
        &self,
        ledger: &[LedgerRow],
        month: ReportingMonth,
        reference_total: Option<f64>,
    ) -> (ExpenseBreakdown, Vec<ComputationWarning>) {
        let mut totals: BTreeMap<ExpenseCategory, f64> =
            ExpenseCategory::ALL.iter().map(|c| (*c, 0.0)).collect();
        let mut lines = Vec::new();
        let mut warnings = Vec::new();

        for row in ledger.iter().filter(|r| self.mapping.is_expense_code(r.code.trim())) {
            let category = classify_with(self.rules, &row.code, &row.name);
            let line = ClassifiedExpense::from_row(row, month, category);
            *totals.entry(category).or_insert(0.0) += line.amount;
            lines.push(line);
        }

        let classified: f64 = lines.iter().map(|l| l.amount).sum();
        let mut total = classified;
        let mut reconciliation_residual = 0.0;
        if let Some(reference) = reference_total {
            let residual = reference - classified;
            if residual.abs() > MONEY_EPSILON {
                reconciliation_residual = residual;
                let message = if residual > 0.0 {
                    *totals.entry(ExpenseCategory::Unclassified).or_insert(0.0) += residual;
                    total = reference;
                    format!(
                        "Ledger expenses ({:.2}) fall short of income statement total ({:.2}); {:.2} booked as Unclassified",
                        classified, reference, residual
                    )
                } else {
                    format!(
                        "Ledger expenses ({:.2}) exceed income statement total ({:.2}) by {:.2}; breakdown keeps the ledger figures",
                        classified, reference, -residual
                    )
                };
                let warning =
                    ComputationWarning::new(month, WarningKind::ReconciliationResidual, message);
                warn!("{}", warning);
                warnings.push(warning);
            }
        }

        for line in &mut lines {
            line.share_of_total_pct = if total == 0.0 {
                None
            } else {
                Some(line.amount / total * 100.0)
            };
        }

        debug!(
            "Classified {} expense accounts for {} (total {:.2})",
            lines.len(),
            month,
            total
        );

        (
            ExpenseBreakdown {
                totals,
                lines,
                total,
                reconciliation_residual,
            },
            warnings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::approx_eq;

    fn ledger_row(code: &str, name: &str, amount: f64) -> LedgerRow {
        let mut amounts = BTreeMap::new();
        amounts.insert(ReportingMonth::March, amount);
        LedgerRow {
            code: code.to_string(),
            name: name.to_string(),
            amounts,
        }
    }

    #[test]
    fn test_name_rules_override_code_rules() {
        assert_eq!(classify("510506", "SUELDOS ADMINISTRACIÓN"), ExpenseCategory::Salaries);
        assert_eq!(classify("510530", "Cesantías"), ExpenseCategory::Severance);
        assert_eq!(classify("720101", "SALARIOS PLANTA"), ExpenseCategory::Salaries);
    }

    #[test]
    fn test_code_prefix_rules() {
        assert_eq!(classify("511505", "ARRENDAMIENTOS"), ExpenseCategory::Administrative);
        assert_eq!(classify("530505", "GASTOS BANCARIOS"), ExpenseCategory::Other);
        assert_eq!(classify("613505", "COSTO VENTAS"), ExpenseCategory::CostOfSales);
        assert_eq!(classify("720101", "MATERIA PRIMA"), ExpenseCategory::CostOfProduction);
        assert_eq!(classify("730505", "CIF"), ExpenseCategory::CostOfProduction);
        assert_eq!(classify("520505", "GASTOS DE VENTAS"), ExpenseCategory::Unclassified);
    }

    #[test]
    fn test_rule_table_order_is_precedence() {
        let categories: Vec<ExpenseCategory> = EXPENSE_RULES.iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![
                ExpenseCategory::Salaries,
                ExpenseCategory::Severance,
                ExpenseCategory::Administrative,
                ExpenseCategory::Other,
                ExpenseCategory::CostOfSales,
                ExpenseCategory::CostOfProduction,
            ]
        );
    }

    #[test]
    fn test_custom_rule_table() {
        const RULES: &[ClassificationRule] = &[ClassificationRule {
            matcher: RuleMatcher::CodePrefix(&["52"]),
            category: ExpenseCategory::Other,
        }];
        assert_eq!(classify_with(RULES, "520505", "VENTAS"), ExpenseCategory::Other);
        assert_eq!(classify_with(RULES, "510506", "SUELDOS"), ExpenseCategory::Unclassified);
    }

    #[test]
    fn test_breakdown_keeps_unclassified_accounts() {
        let ledger = vec![
            ledger_row("510506", "SUELDOS", 50.0),
            ledger_row("511505", "ARRENDAMIENTOS", 20.0),
            ledger_row("540505", "IMPUESTO DE RENTA", 30.0),
            ledger_row("413505", "VENTAS", -500.0),
        ];
        let mapping = ChartMapping::default();
        let (breakdown, warnings) =
            ExpenseClassifier::new(&mapping).classify_month(&ledger, ReportingMonth::March, None);

        assert!(warnings.is_empty());
        assert_eq!(breakdown.lines.len(), 3);
        assert_eq!(breakdown.get(ExpenseCategory::Unclassified), 30.0);
        assert_eq!(breakdown.get(ExpenseCategory::Salaries), 50.0);
        assert_eq!(breakdown.get(ExpenseCategory::Administrative), 20.0);
        assert_eq!(breakdown.total, 100.0);
        assert!(approx_eq(breakdown.sum(), breakdown.total, MONEY_EPSILON));
        assert_eq!(breakdown.totals.len(), ExpenseCategory::ALL.len());
        assert_eq!(breakdown.lines[0].share_of_total_pct, Some(50.0));
    }

    #[test]
    fn test_residual_against_income_statement_goes_to_unclassified() {
        let ledger = vec![
            ledger_row("510506", "SUELDOS", 50.0),
            ledger_row("613505", "COSTO VENTAS", 25.0),
        ];
        let mapping = ChartMapping::default();
        let (breakdown, warnings) = ExpenseClassifier::new(&mapping).classify_month(
            &ledger,
            ReportingMonth::March,
            Some(100.0),
        );

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::ReconciliationResidual);
        assert_eq!(breakdown.get(ExpenseCategory::Unclassified), 25.0);
        assert_eq!(breakdown.total, 100.0);
        assert!(approx_eq(breakdown.sum(), 100.0, MONEY_EPSILON));
    }

    #[test]
    fn test_ledger_excess_does_not_shrink_unclassified() {
        let ledger = vec![
            ledger_row("510506", "SUELDOS", 100.0),
            ledger_row("540505", "IMPUESTO DE RENTA", 30.0),
        ];
        let mapping = ChartMapping::default();
        let (breakdown, warnings) = ExpenseClassifier::new(&mapping).classify_month(
            &ledger,
            ReportingMonth::March,
            Some(110.0),
        );

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::ReconciliationResidual);
        assert_eq!(breakdown.get(ExpenseCategory::Unclassified), 30.0);
        assert_eq!(breakdown.get(ExpenseCategory::Salaries), 100.0);
        assert_eq!(breakdown.total, 130.0);
        assert_eq!(breakdown.reconciliation_residual, -20.0);
        assert!(approx_eq(breakdown.sum(), breakdown.total, MONEY_EPSILON));
    }

    #[test]
    fn test_subtotal_rows_are_not_counted_twice() {
        let ledger = vec![
            ledger_row("5", "OPERACIONALES DE ADMINISTRACION", 100.0),
            ledger_row("51", "GASTOS DE ADMINISTRACION", 100.0),
            ledger_row("5105", "GASTOS DE PERSONAL", 60.0),
            ledger_row("510506", "SUELDOS", 60.0),
            ledger_row("5160", "DEPRECIACIONES", 40.0),
            ledger_row("516005", "DEPRECIACION EQUIPO DE OFICINA", 40.0),
        ];
        let mapping = ChartMapping::default().normalized();
        let (breakdown, warnings) =
            ExpenseClassifier::new(&mapping).classify_month(&ledger, ReportingMonth::March, None);

        assert!(warnings.is_empty());
        assert_eq!(breakdown.lines.len(), 2);
        assert_eq!(breakdown.total, 100.0);
        assert_eq!(breakdown.get(ExpenseCategory::Salaries), 60.0);
        assert_eq!(breakdown.get(ExpenseCategory::Administrative), 40.0);
        assert_eq!(breakdown.get(ExpenseCategory::Unclassified), 0.0);
    }

    #[test]
    fn test_line_trend_columns() {
        let amounts: BTreeMap<ReportingMonth, f64> = [
            (ReportingMonth::January, 50_000_000.0),
            (ReportingMonth::February, 52_000_000.0),
            (ReportingMonth::March, 48_000_000.0),
            (ReportingMonth::April, 90_000_000.0),
        ]
        .into_iter()
        .collect();
        let ledger = vec![
            LedgerRow {
                code: "510506".to_string(),
                name: "SUELDOS".to_string(),
                amounts,
            },
            ledger_row("530520", "INTERESES", 5_200_000.0),
        ];
        let mapping = ChartMapping::default();
        let (breakdown, _) =
            ExpenseClassifier::new(&mapping).classify_month(&ledger, ReportingMonth::March, None);

        let salaries = &breakdown.lines[0];
        assert_eq!(salaries.average_to_date, 50_000_000.0);
        assert!(approx_eq(
            salaries.change_vs_previous_pct.unwrap(),
            -4_000_000.0 / 52_000_000.0 * 100.0,
            1e-9
        ));
        assert_eq!(salaries.change_vs_average_pct, Some(-4.0));

        // Only March is on record for the interest line
        let interest = &breakdown.lines[1];
        assert_eq!(interest.average_to_date, 5_200_000.0);
        assert_eq!(interest.change_vs_previous_pct, None);
        assert_eq!(interest.change_vs_average_pct, Some(0.0));

        let (january, _) =
            ExpenseClassifier::new(&mapping).classify_month(&ledger, ReportingMonth::January, None);
        assert_eq!(january.lines[0].change_vs_previous_pct, None);
    }

    #[test]
    fn test_empty_month_has_no_shares() {
        let mapping = ChartMapping::default();
        let (breakdown, _) =
            ExpenseClassifier::new(&mapping).classify_month(&[], ReportingMonth::March, None);
        assert_eq!(breakdown.total, 0.0);
        assert!(breakdown.lines.is_empty());
    }
}
