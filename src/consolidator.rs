use crate::chart_of_accounts::{AccountEntry, AccountHierarchy};
use crate::config::ChartMapping;
use crate::schema::{AccountLevel, ComputationWarning, ReportingMonth, WarningKind};
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Differences below one currency unit are treated as rounding.
pub const BALANCE_TOLERANCE: f64 = 1.0;

/// Top-level classes of the chart of accounts, identified by the first digit of the code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum AccountClass {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
    CostOfSales,
    ProductionCost,
    DebitMemo,
    CreditMemo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl AccountClass {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.chars().next()? {
            '1' => Some(Self::Asset),
            '2' => Some(Self::Liability),
            '3' => Some(Self::Equity),
            '4' => Some(Self::Revenue),
            '5' => Some(Self::Expense),
            '6' => Some(Self::CostOfSales),
            '7' => Some(Self::ProductionCost),
            '8' => Some(Self::DebitMemo),
            '9' => Some(Self::CreditMemo),
            _ => None,
        }
    }

    pub fn normal_balance(self) -> NormalBalance {
        match self {
            Self::Asset | Self::Expense | Self::CostOfSales | Self::ProductionCost | Self::DebitMemo => {
                NormalBalance::Debit
            }
            Self::Liability | Self::Equity | Self::Revenue | Self::CreditMemo => NormalBalance::Credit,
        }
    }

    /// Converts an exported closing balance into the class's natural sign,
    /// so a healthy liability reads as a positive amount.
    pub fn normalize(self, raw_closing: f64, convention: SignConvention) -> f64 {
        match (convention, self.normal_balance()) {
            (SignConvention::DebitPositive, NormalBalance::Credit) => -raw_closing,
            _ => raw_closing,
        }
    }

    /// `opening + debit - credit` for debit-normal accounts. Credit-normal
    /// accounts written in their natural sign grow with credits instead.
    pub fn expected_closing(self, entry: &AccountEntry, convention: SignConvention) -> f64 {
        match (convention, self.normal_balance()) {
            (SignConvention::NaturalSign, NormalBalance::Credit) => {
                entry.opening_balance - entry.debit_movement + entry.credit_movement
            }
            _ => entry.expected_closing(),
        }
    }

    fn is_balance_sheet(self) -> bool {
        matches!(self, Self::Asset | Self::Liability | Self::Equity)
    }
}

/// How an export writes the balances of credit-normal classes (2, 3, 4, 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Debits positive, credits negative: a liability closes below zero.
    DebitPositive,
    /// Every class as a positive amount in its own normal balance.
    NaturalSign,
}

impl SignConvention {
    /// Reads the convention off the class totals of one month. Any
    /// credit-normal class below zero means debit-positive; credit-normal
    /// classes that are all positive mean natural sign.
    pub fn detect(class_totals: &BTreeMap<String, f64>) -> Self {
        let credit_totals: Vec<f64> = class_totals
            .iter()
            .filter(|(code, _)| {
                AccountClass::from_code(code)
                    .is_some_and(|class| class.normal_balance() == NormalBalance::Credit)
            })
            .map(|(_, raw)| *raw)
            .collect();

        if credit_totals.iter().any(|raw| *raw < 0.0) || !credit_totals.iter().any(|raw| *raw > 0.0) {
            Self::DebitPositive
        } else {
            Self::NaturalSign
        }
    }
}

fn fixed_code_length(level: AccountLevel) -> Option<usize> {
    match level {
        AccountLevel::Class => Some(1),
        AccountLevel::Group => Some(2),
        AccountLevel::Account => Some(4),
        AccountLevel::Subaccount => Some(6),
        AccountLevel::Auxiliary => None,
    }
}

/// Balances of one month rolled up to the figures the metric calculator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedBalance {
    pub month: ReportingMonth,
    pub sign_convention: SignConvention,
    pub class_balances: BTreeMap<AccountClass, f64>,
    pub current_assets: Option<f64>,
    pub inventory: Option<f64>,
    pub warnings: Vec<ComputationWarning>,
}

impl ConsolidatedBalance {
    pub fn class_balance(&self, class: AccountClass) -> Option<f64> {
        self.class_balances.get(&class).copied()
    }
}

pub struct BalanceConsolidator<'a> {
    mapping: &'a ChartMapping,
}

impl<'a> BalanceConsolidator<'a> {
    pub fn new(mapping: &'a ChartMapping) -> Self {
        Self { mapping }
    }

    /// Signed (as exported) balances per code at `level`. Declared rows at the
    /// level win; codes without a declared row are summed from the leaves below.
    pub fn consolidate(&self, tree: &AccountHierarchy, level: AccountLevel) -> BTreeMap<String, f64> {
        let mut balances: BTreeMap<String, f64> = tree
            .at_level(level)
            .map(|e| (e.code.clone(), e.closing_balance))
            .collect();

        let Some(len) = fixed_code_length(level) else {
            return balances;
        };

        let mut rolled: BTreeMap<String, f64> = BTreeMap::new();
        for leaf in tree.leaves().filter(|e| e.level > level) {
            let prefix = &leaf.code[..len];
            if !balances.contains_key(prefix) {
                *rolled.entry(prefix.to_string()).or_insert(0.0) += leaf.closing_balance;
            }
        }
        balances.extend(rolled);

        balances
    }

    pub fn sign_convention(&self, tree: &AccountHierarchy) -> SignConvention {
        SignConvention::detect(&self.consolidate(tree, AccountLevel::Class))
    }

    /// Class totals in each class's natural sign.
    pub fn class_balances(&self, tree: &AccountHierarchy) -> BTreeMap<AccountClass, f64> {
        let raw_totals = self.consolidate(tree, AccountLevel::Class);
        let convention = SignConvention::detect(&raw_totals);

        let mut totals = BTreeMap::new();
        for (code, raw) in raw_totals {
            if let Some(class) = AccountClass::from_code(&code) {
                *totals.entry(class).or_insert(0.0) += class.normalize(raw, convention);
            }
        }
        totals
    }

    /// Sum of the listed group codes, or `None` if none of them is present.
    pub fn group_balance(&self, tree: &AccountHierarchy, groups: &[String]) -> Option<f64> {
        let consolidated = self.consolidate(tree, AccountLevel::Group);
        let present: Vec<f64> = groups
            .iter()
            .filter_map(|g| consolidated.get(g).copied())
            .collect();

        if present.is_empty() {
            None
        } else {
            Some(present.iter().sum())
        }
    }

    pub fn consolidate_month(&self, tree: &AccountHierarchy) -> ConsolidatedBalance {
        let month = tree.month();
        let sign_convention = self.sign_convention(tree);
        let class_balances = self.class_balances(tree);
        let current_assets = self.group_balance(tree, &self.mapping.current_asset_groups);
        let inventory = self.group_balance(tree, &self.mapping.inventory_groups);

        let mut warnings = verify_accounting_equation(month, &class_balances);
        warnings.extend(check_class_signs(month, &class_balances));
        warnings.extend(check_movements(tree, sign_convention));

        for warning in &warnings {
            warn!("{}", warning);
        }
        debug!(
            "Class balances for {} ({:?}): {:?}",
            month, sign_convention, class_balances
        );

        ConsolidatedBalance {
            month,
            sign_convention,
            class_balances,
            current_assets,
            inventory,
            warnings,
        }
    }

    /// Each month is consolidated on its own, so re-running over the same
    /// trees yields the same sequence.
    pub fn consolidate_months(
        &self,
        trees: &BTreeMap<ReportingMonth, AccountHierarchy>,
    ) -> BTreeMap<ReportingMonth, ConsolidatedBalance> {
        trees
            .iter()
            .map(|(month, tree)| (*month, self.consolidate_month(tree)))
            .collect()
    }
}

/// Assets must equal liabilities plus equity plus the not-yet-closed result
/// of the period (revenue minus expenses and costs).
pub fn verify_accounting_equation(
    month: ReportingMonth,
    class_balances: &BTreeMap<AccountClass, f64>,
) -> Vec<ComputationWarning> {
    let Some(&assets) = class_balances.get(&AccountClass::Asset) else {
        return Vec::new();
    };
    let get = |class: AccountClass| class_balances.get(&class).copied().unwrap_or(0.0);

    let liabilities = get(AccountClass::Liability);
    let equity = get(AccountClass::Equity);
    let period_result = get(AccountClass::Revenue)
        - get(AccountClass::Expense)
        - get(AccountClass::CostOfSales)
        - get(AccountClass::ProductionCost);

    let difference = assets - (liabilities + equity + period_result);
    if difference.abs() > BALANCE_TOLERANCE {
        vec![ComputationWarning::new(
            month,
            WarningKind::UnbalancedEquation,
            format!(
                "Assets ({:.2}) != Liabilities ({:.2}) + Equity ({:.2}) + period result ({:.2}); difference {:.2}",
                assets, liabilities, equity, period_result, difference
            ),
        )]
    } else {
        Vec::new()
    }
}

fn check_class_signs(
    month: ReportingMonth,
    class_balances: &BTreeMap<AccountClass, f64>,
) -> Vec<ComputationWarning> {
    class_balances
        .iter()
        .filter(|(class, amount)| class.is_balance_sheet() && **amount < 0.0)
        .map(|(class, amount)| {
            ComputationWarning::new(
                month,
                WarningKind::UnexpectedSign,
                format!("{:?} class carries a negative balance of {:.2}", class, amount),
            )
        })
        .collect()
}

fn check_movements(tree: &AccountHierarchy, convention: SignConvention) -> Vec<ComputationWarning> {
    let expected = |e: &AccountEntry| match AccountClass::from_code(&e.code) {
        Some(class) => class.expected_closing(e, convention),
        None => e.expected_closing(),
    };

    tree.entries()
        .filter(|e| (expected(*e) - e.closing_balance).abs() > BALANCE_TOLERANCE)
        .map(|e| {
            ComputationWarning::new(
                e.month,
                WarningKind::MovementMismatch,
                format!(
                    "Account {} closes at {:.2} but opening and movements give {:.2}",
                    e.code,
                    e.closing_balance,
                    expected(e)
                ),
            )
        })
        .collect()
}
