//! Conversion of loosely-typed spreadsheet rows into the typed rows the
//! engine works on. Everything ambiguous is rejected here so that later
//! stages only ever see well-formed data.

use crate::error::{AnalysisError, Result};
use crate::schema::{
    AccountLevel, BalanceRow, IncomeStatementRow, LedgerRow, ReportingMonth,
};
use crate::utils::normalize_label;
use log::debug;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One spreadsheet row, keyed by column header.
pub type RawRecord = serde_json::Map<String, Value>;

pub const BALANCE_SHEET_PREFIX: &str = "BALANCE";
pub const LEDGER_SHEET: &str = "INFORME-ERI";
pub const INCOME_STATEMENT_SHEET: &str = "ESTADO RESULTADO";

const LEVEL_HEADERS: &[&str] = &["NIVEL", "LEVEL"];
const ACCOUNT_CODE_HEADERS: &[&str] = &["CODIGO CUENTA CONTABLE", "CODIGO", "ACCOUNT CODE", "CODE"];
const ACCOUNT_NAME_HEADERS: &[&str] = &["NOMBRE CUENTA CONTABLE", "NOMBRE", "ACCOUNT NAME", "NAME"];
const OPENING_HEADERS: &[&str] = &["SALDO INICIAL", "OPENING BALANCE"];
const DEBIT_HEADERS: &[&str] = &["MOVIMIENTO DEBITO", "DEBIT MOVEMENT", "DEBIT"];
const CREDIT_HEADERS: &[&str] = &["MOVIMIENTO CREDITO", "CREDIT MOVEMENT", "CREDIT"];
const CLOSING_HEADERS: &[&str] = &["SALDO FINAL", "CLOSING BALANCE"];
const LEDGER_CODE_HEADERS: &[&str] = &["CODIGO", "CODE"];
const LEDGER_NAME_HEADERS: &[&str] = &["DISPLAY NAME", "NOMBRE", "NAME"];
const DESCRIPTION_HEADERS: &[&str] = &["DESCRIPCION", "DESCRIPTION"];

struct SheetColumns {
    sheet: String,
    headers: BTreeSet<String>,
}

impl SheetColumns {
    fn new(sheet: impl Into<String>, records: &[RawRecord]) -> Self {
        Self {
            sheet: sheet.into(),
            headers: records.iter().flat_map(|r| r.keys().cloned()).collect(),
        }
    }

    /// The first alias (in preference order) present among the headers.
    fn find(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|alias| {
            self.headers
                .iter()
                .find(|h| normalize_label(h) == *alias)
                .cloned()
        })
    }

    fn require(&self, aliases: &[&str]) -> Result<String> {
        self.find(aliases).ok_or_else(|| AnalysisError::MissingColumn {
            sheet: self.sheet.clone(),
            column: aliases[0].to_string(),
        })
    }

    /// Headers naming a month, excluding the given descriptive columns.
    fn month_columns(&self, exclude: &[&String]) -> Result<BTreeMap<ReportingMonth, String>> {
        let mut columns = BTreeMap::new();
        for header in self.headers.iter().filter(|h| !exclude.contains(h)) {
            if let Some(month) = ReportingMonth::from_label(header) {
                if let Some(existing) = columns.insert(month, header.clone()) {
                    return Err(AnalysisError::validation(
                        Some(month),
                        format!(
                            "Sheet '{}' has more than one column for {}: '{}' and '{}'",
                            self.sheet, month, existing, header
                        ),
                    ));
                }
            }
        }
        if columns.is_empty() {
            return Err(AnalysisError::MissingColumn {
                sheet: self.sheet.clone(),
                column: "<month>".to_string(),
            });
        }
        Ok(columns)
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Parses a monetary cell. Accepts numbers and strings such as
/// "$ 1.234.567,89", "1,234,567.89" or "(500)"; blank cells are zero.
/// A lone separator followed by exactly three digits is read as a
/// thousands separator, the way the exports write whole pesos.
pub fn parse_amount(value: Option<&Value>) -> std::result::Result<f64, String> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("number {} is out of range", n)),
        Some(Value::String(s)) => parse_amount_str(s),
        Some(other) => Err(format!("expected an amount, found {}", other)),
    }
}

fn parse_amount_str(raw: &str) -> std::result::Result<f64, String> {
    let mut text: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    if text.is_empty() || text == "-" {
        return Ok(0.0);
    }

    let negative = text.starts_with('(') && text.ends_with(')');
    if negative {
        text = text[1..text.len() - 1].to_string();
    }

    let last_dot = text.rfind('.');
    let last_comma = text.rfind(',');
    let canonical = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => text.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => text.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = text.len() - comma - 1;
            if text.matches(',').count() > 1 || decimals == 3 {
                text.replace(',', "")
            } else {
                text.replace(',', ".")
            }
        }
        (Some(dot), None) => {
            let decimals = text.len() - dot - 1;
            if text.matches('.').count() > 1 || decimals == 3 {
                text.replace('.', "")
            } else {
                text
            }
        }
        (None, None) => text,
    };

    let value: f64 = canonical
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    Ok(if negative { -value } else { value })
}

fn parse_code(value: Option<&Value>) -> std::result::Result<String, String> {
    match value {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(u), _) => Ok(u.to_string()),
            (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 => Ok(format!("{:.0}", f)),
            _ => Err(format!("'{}' is not an account code", n)),
        },
        None | Some(Value::Null) => Ok(String::new()),
        Some(other) => Err(format!("'{}' is not an account code", other)),
    }
}

fn parse_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Parses one "BALANCE <MES>" sheet.
pub fn parse_balance_sheet(month: ReportingMonth, records: &[RawRecord]) -> Result<Vec<BalanceRow>> {
    let sheet = format!("{} {}", BALANCE_SHEET_PREFIX, month.spanish_name());
    if records.is_empty() {
        return Err(AnalysisError::MissingSheet(sheet));
    }

    let columns = SheetColumns::new(sheet, records);
    let level_col = columns.require(LEVEL_HEADERS)?;
    let code_col = columns.require(ACCOUNT_CODE_HEADERS)?;
    let name_col = columns.require(ACCOUNT_NAME_HEADERS)?;
    let opening_col = columns.require(OPENING_HEADERS)?;
    let debit_col = columns.require(DEBIT_HEADERS)?;
    let credit_col = columns.require(CREDIT_HEADERS)?;
    let closing_col = columns.require(CLOSING_HEADERS)?;

    let mut rows = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        if is_blank(record.get(&level_col)) && is_blank(record.get(&code_col)) {
            continue;
        }
        let fail = |details: String| {
            AnalysisError::validation(Some(month), format!("Row {}: {}", idx + 1, details))
        };

        let level_text = parse_text(record.get(&level_col));
        let level = AccountLevel::from_label(&level_text)
            .ok_or_else(|| fail(format!("unknown account level '{}'", level_text)))?;
        let code = parse_code(record.get(&code_col)).map_err(&fail)?;
        let amount = |column: &String| {
            parse_amount(record.get(column)).map_err(|e| fail(format!("column '{}': {}", column, e)))
        };

        rows.push(BalanceRow {
            level,
            code,
            name: parse_text(record.get(&name_col)),
            opening_balance: amount(&opening_col)?,
            debit_movement: amount(&debit_col)?,
            credit_movement: amount(&credit_col)?,
            closing_balance: amount(&closing_col)?,
        });
    }

    debug!("Parsed {} balance rows for {}", rows.len(), month);
    Ok(rows)
}

/// Parses every sheet whose name starts with "BALANCE" and names a month.
pub fn parse_balance_sheets(
    sheets: &BTreeMap<String, Vec<RawRecord>>,
) -> Result<BTreeMap<ReportingMonth, Vec<BalanceRow>>> {
    let mut balances = BTreeMap::new();
    for (name, records) in sheets {
        if !normalize_label(name).starts_with(BALANCE_SHEET_PREFIX) {
            continue;
        }
        let Some(month) = ReportingMonth::from_label(name) else {
            continue;
        };
        if balances.contains_key(&month) {
            return Err(AnalysisError::validation(
                Some(month),
                format!("More than one balance sheet for {}", month),
            ));
        }
        balances.insert(month, parse_balance_sheet(month, records)?);
    }

    if balances.is_empty() {
        return Err(AnalysisError::MissingSheet(format!(
            "{} <MES>",
            BALANCE_SHEET_PREFIX
        )));
    }
    Ok(balances)
}

/// Parses the income/expense ledger (ERI): code, name and one column per month.
pub fn parse_ledger(records: &[RawRecord]) -> Result<Vec<LedgerRow>> {
    if records.is_empty() {
        return Err(AnalysisError::MissingSheet(LEDGER_SHEET.to_string()));
    }

    let columns = SheetColumns::new(LEDGER_SHEET, records);
    let code_col = columns.require(LEDGER_CODE_HEADERS)?;
    let name_col = columns.require(LEDGER_NAME_HEADERS)?;
    let month_cols = columns.month_columns(&[&code_col, &name_col])?;

    let mut rows = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        if is_blank(record.get(&code_col)) {
            continue;
        }
        let code = parse_code(record.get(&code_col)).map_err(|e| {
            AnalysisError::validation(None, format!("{} row {}: {}", LEDGER_SHEET, idx + 1, e))
        })?;

        let mut amounts = BTreeMap::new();
        for (month, column) in &month_cols {
            let amount = parse_amount(record.get(column)).map_err(|e| {
                AnalysisError::validation(
                    Some(*month),
                    format!("{} row {} column '{}': {}", LEDGER_SHEET, idx + 1, column, e),
                )
            })?;
            amounts.insert(*month, amount);
        }

        let mut name = parse_text(record.get(&name_col));
        if name.is_empty() {
            name = code.clone();
        }

        rows.push(LedgerRow { code, name, amounts });
    }

    debug!("Parsed {} ledger rows over {} months", rows.len(), month_cols.len());
    Ok(rows)
}

/// Parses the income-statement summary: description, optional level and month totals.
pub fn parse_income_statement(records: &[RawRecord]) -> Result<Vec<IncomeStatementRow>> {
    if records.is_empty() {
        return Err(AnalysisError::MissingSheet(INCOME_STATEMENT_SHEET.to_string()));
    }

    let columns = SheetColumns::new(INCOME_STATEMENT_SHEET, records);
    let description_col = columns.require(DESCRIPTION_HEADERS)?;
    let level_col = columns.find(LEVEL_HEADERS);
    let excluded: Vec<&String> = [Some(&description_col), level_col.as_ref()]
        .into_iter()
        .flatten()
        .collect();
    let month_cols = columns.month_columns(&excluded)?;

    let mut rows = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let description = parse_text(record.get(&description_col));
        if description.is_empty() {
            continue;
        }

        let level = level_col
            .as_ref()
            .and_then(|c| parse_text(record.get(c)).parse::<u8>().ok());

        let mut totals = BTreeMap::new();
        for (month, column) in &month_cols {
            if is_blank(record.get(column)) {
                continue;
            }
            let total = parse_amount(record.get(column)).map_err(|e| {
                AnalysisError::validation(
                    Some(*month),
                    format!("{} row {} column '{}': {}", INCOME_STATEMENT_SHEET, idx + 1, column, e),
                )
            })?;
            totals.insert(*month, total);
        }

        rows.push(IncomeStatementRow {
            description,
            level,
            totals,
        });
    }

    Ok(rows)
}
