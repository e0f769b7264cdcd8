use crate::error::{AnalysisError, Result};
use crate::utils::normalize_label;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum ReportingMonth {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl ReportingMonth {
    pub const ALL: [ReportingMonth; 12] = [
        Self::January,
        Self::February,
        Self::March,
        Self::April,
        Self::May,
        Self::June,
        Self::July,
        Self::August,
        Self::September,
        Self::October,
        Self::November,
        Self::December,
    ];

    /// Calendar month number, 1 = January.
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.get(number.checked_sub(1)? as usize).copied()
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    /// The month name as it appears in the accounting export headers.
    pub fn spanish_name(self) -> &'static str {
        self.aliases()[0]
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::January => &["ENERO", "ENE", "JANUARY", "JAN"],
            Self::February => &["FEBRERO", "FEB", "FEBRUARY"],
            Self::March => &["MARZO", "MAR", "MARCH"],
            Self::April => &["ABRIL", "ABR", "APRIL", "APR"],
            Self::May => &["MAYO", "MAY"],
            Self::June => &["JUNIO", "JUN", "JUNE"],
            Self::July => &["JULIO", "JUL", "JULY"],
            Self::August => &["AGOSTO", "AGO", "AUGUST", "AUG"],
            Self::September => &["SEPTIEMBRE", "SETIEMBRE", "SEP", "SEPTEMBER", "SEPT"],
            Self::October => &["OCTUBRE", "OCT", "OCTOBER"],
            Self::November => &["NOVIEMBRE", "NOV", "NOVEMBER"],
            Self::December => &["DICIEMBRE", "DIC", "DECEMBER", "DEC"],
        }
    }

    /// Finds the first month mentioned in a free-form label such as
    /// "BALANCE MARZO", "MARZO DE 2025" or "Total MARZO".
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = normalize_label(label);
        normalized
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|token| !token.is_empty())
            .find_map(|token| {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|month| month.aliases().contains(&token))
            })
    }
}

impl FromStr for ReportingMonth {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_label(s)
            .ok_or_else(|| AnalysisError::validation(None, format!("Unknown month: '{}'", s)))
    }
}

impl fmt::Display for ReportingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Depth of an account in the chart of accounts. The code length is fixed
/// for every level except `Auxiliary`, which takes any longer code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum AccountLevel {
    #[schemars(description = "One-digit code, e.g. 1 = ACTIVO")]
    Class,
    #[schemars(description = "Two-digit code, e.g. 11 = DISPONIBLE")]
    Group,
    #[schemars(description = "Four-digit code, e.g. 1105 = CAJA")]
    Account,
    #[schemars(description = "Six-digit code, e.g. 110505 = CAJA GENERAL")]
    Subaccount,
    #[schemars(description = "Seven or more digits, company-specific detail")]
    Auxiliary,
}

impl AccountLevel {
    pub fn code_matches(self, code: &str) -> bool {
        let len = code.len();
        match self {
            Self::Class => len == 1,
            Self::Group => len == 2,
            Self::Account => len == 4,
            Self::Subaccount => len == 6,
            Self::Auxiliary => len >= 7,
        }
    }

    /// The level implied by a code's length, if any.
    pub fn for_code(code: &str) -> Option<Self> {
        match code.len() {
            1 => Some(Self::Class),
            2 => Some(Self::Group),
            4 => Some(Self::Account),
            6 => Some(Self::Subaccount),
            n if n >= 7 => Some(Self::Auxiliary),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match normalize_label(label).as_str() {
            "CLASE" | "CLASS" => Some(Self::Class),
            "GRUPO" | "GROUP" => Some(Self::Group),
            "CUENTA" | "ACCOUNT" => Some(Self::Account),
            "SUBCUENTA" | "SUBACCOUNT" => Some(Self::Subaccount),
            "AUXILIAR" | "AUXILIARY" => Some(Self::Auxiliary),
            _ => None,
        }
    }
}

/// One row of a monthly balance sheet ("BALANCE <MES>").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BalanceRow {
    pub level: AccountLevel,
    #[schemars(description = "Numeric account code; its length must match the level")]
    pub code: String,
    pub name: String,
    pub opening_balance: f64,
    pub debit_movement: f64,
    pub credit_movement: f64,
    #[schemars(
        description = "Closing balance as exported: debit balances positive, credit balances negative"
    )]
    pub closing_balance: f64,
}

/// One account of the income/expense ledger ("INFORME-ERI").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerRow {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub amounts: BTreeMap<ReportingMonth, f64>,
}

impl LedgerRow {
    pub fn amount(&self, month: ReportingMonth) -> f64 {
        self.amounts.get(&month).copied().unwrap_or(0.0)
    }
}

/// One line of the income-statement summary ("ESTADO RESULTADO").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IncomeStatementRow {
    pub description: String,
    #[serde(default)]
    #[schemars(description = "Indentation level of the line, 0 for top-level totals")]
    pub level: Option<u8>,
    #[serde(default)]
    pub totals: BTreeMap<ReportingMonth, f64>,
}

impl IncomeStatementRow {
    pub fn total(&self, month: ReportingMonth) -> Option<f64> {
        self.totals.get(&month).copied()
    }
}

/// The complete monthly accounting export handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FinancialExport {
    pub organization_name: String,
    #[schemars(description = "Calendar year the reporting months belong to")]
    pub fiscal_year: i32,
    pub balances: BTreeMap<ReportingMonth, Vec<BalanceRow>>,
    #[serde(default)]
    pub ledger: Vec<LedgerRow>,
    #[serde(default)]
    pub income_statement: Vec<IncomeStatementRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    ZeroDenominator,
    MissingFigure,
    UnbalancedEquation,
    UnexpectedSign,
    MovementMismatch,
    ReconciliationResidual,
}

/// A non-fatal numeric condition recorded alongside the month's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComputationWarning {
    pub month: ReportingMonth,
    pub kind: WarningKind,
    pub message: String,
}

impl ComputationWarning {
    pub fn new(month: ReportingMonth, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            month,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ComputationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.month, self.message)
    }
}
