use crate::error::{AnalysisError, Result};
use crate::schema::{AccountLevel, BalanceRow, ReportingMonth};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub level: AccountLevel,
    pub code: String,
    pub name: String,
    pub opening_balance: f64,
    pub debit_movement: f64,
    pub credit_movement: f64,
    pub closing_balance: f64,
    pub month: ReportingMonth,
}

impl AccountEntry {
    /// First digit of the code, i.e. the class the account rolls up to.
    pub fn class_code(&self) -> &str {
        &self.code[..1]
    }

    /// `opening + debit - credit`, which should equal the closing balance.
    pub fn expected_closing(&self) -> f64 {
        self.opening_balance + self.debit_movement - self.credit_movement
    }
}

/// One month of the chart of accounts, keyed by code. A node's parent is the
/// longest shorter code present in the same month that prefixes it.
#[derive(Debug, Clone)]
pub struct AccountHierarchy {
    month: ReportingMonth,
    entries: BTreeMap<String, AccountEntry>,
    parents: BTreeMap<String, String>,
    children: BTreeMap<String, Vec<String>>,
}

impl AccountHierarchy {
    pub fn build(month: ReportingMonth, rows: &[BalanceRow]) -> Result<Self> {
        let mut entries: BTreeMap<String, AccountEntry> = BTreeMap::new();

        for row in rows {
            let entry = validate_row(month, row)?;
            if entries.contains_key(&entry.code) {
                return Err(AnalysisError::DuplicateAccount {
                    month,
                    code: entry.code,
                });
            }
            entries.insert(entry.code.clone(), entry);
        }

        let mut parents = BTreeMap::new();
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (code, entry) in &entries {
            if entry.level == AccountLevel::Class {
                continue;
            }

            let parent = (1..code.len())
                .rev()
                .map(|len| &code[..len])
                .find(|prefix| entries.contains_key(*prefix))
                .ok_or_else(|| AnalysisError::DataIntegrity {
                    month,
                    code: code.clone(),
                    details: format!(
                        "{:?} account '{}' has no ancestor in the chart of accounts",
                        entry.level, entry.name
                    ),
                })?;

            parents.insert(code.clone(), parent.to_string());
            children
                .entry(parent.to_string())
                .or_default()
                .push(code.clone());
        }

        debug!(
            "Normalized {} accounts for {} ({} parent links)",
            entries.len(),
            month,
            parents.len()
        );

        Ok(Self {
            month,
            entries,
            parents,
            children,
        })
    }

    pub fn month(&self) -> ReportingMonth {
        self.month
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&AccountEntry> {
        self.entries.get(code)
    }

    pub fn entries(&self) -> impl Iterator<Item = &AccountEntry> {
        self.entries.values()
    }

    pub fn parent(&self, code: &str) -> Option<&AccountEntry> {
        self.parents.get(code).and_then(|p| self.entries.get(p))
    }

    pub fn children(&self, code: &str) -> impl Iterator<Item = &AccountEntry> {
        self.children
            .get(code)
            .into_iter()
            .flatten()
            .filter_map(|c| self.entries.get(c))
    }

    pub fn roots(&self) -> impl Iterator<Item = &AccountEntry> {
        self.entries
            .values()
            .filter(|e| !self.parents.contains_key(&e.code))
    }

    pub fn leaves(&self) -> impl Iterator<Item = &AccountEntry> {
        self.entries
            .values()
            .filter(|e| !self.children.contains_key(&e.code))
    }

    pub fn at_level(&self, level: AccountLevel) -> impl Iterator<Item = &AccountEntry> {
        self.entries.values().filter(move |e| e.level == level)
    }

    /// All entries strictly below `code`, in code order.
    pub fn descendants(&self, code: &str) -> Vec<&AccountEntry> {
        let mut found = Vec::new();
        let mut stack: Vec<&String> = self.children.get(code).into_iter().flatten().rev().collect();

        while let Some(current) = stack.pop() {
            if let Some(entry) = self.entries.get(current) {
                found.push(entry);
            }
            if let Some(grandchildren) = self.children.get(current) {
                stack.extend(grandchildren.iter().rev());
            }
        }

        found
    }
}

fn validate_row(month: ReportingMonth, row: &BalanceRow) -> Result<AccountEntry> {
    let code = row.code.trim();
    let name = row.name.trim();

    if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AnalysisError::validation(
            Some(month),
            format!("Account code '{}' is not numeric", row.code),
        ));
    }
    if !row.level.code_matches(code) {
        return Err(AnalysisError::validation(
            Some(month),
            format!(
                "Account code '{}' has {} digits, which does not match level {:?}",
                code,
                code.len(),
                row.level
            ),
        ));
    }
    if name.is_empty() {
        return Err(AnalysisError::validation(
            Some(month),
            format!("Account {} has an empty name", code),
        ));
    }

    let amounts = [
        row.opening_balance,
        row.debit_movement,
        row.credit_movement,
        row.closing_balance,
    ];
    if amounts.iter().any(|a| !a.is_finite()) {
        return Err(AnalysisError::validation(
            Some(month),
            format!("Account {} carries a non-finite amount", code),
        ));
    }

    Ok(AccountEntry {
        level: row.level,
        code: code.to_string(),
        name: name.to_string(),
        opening_balance: row.opening_balance,
        debit_movement: row.debit_movement,
        credit_movement: row.credit_movement,
        closing_balance: row.closing_balance,
        month,
    })
}

/// Builds one hierarchy per month. The first invalid month aborts the run.
pub fn normalize_balances(
    balances: &BTreeMap<ReportingMonth, Vec<BalanceRow>>,
) -> Result<BTreeMap<ReportingMonth, AccountHierarchy>> {
    balances
        .iter()
        .map(|(month, rows)| Ok((*month, AccountHierarchy::build(*month, rows)?)))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn row(level: AccountLevel, code: &str, name: &str, closing: f64) -> BalanceRow {
        BalanceRow {
            level,
            code: code.to_string(),
            name: name.to_string(),
            opening_balance: 0.0,
            debit_movement: closing.max(0.0),
            credit_movement: (-closing).max(0.0),
            closing_balance: closing,
        }
    }

    fn sample_rows() -> Vec<BalanceRow> {
        vec![
            row(AccountLevel::Class, "1", "ACTIVO", 500.0),
            row(AccountLevel::Group, "11", "DISPONIBLE", 150.0),
            row(AccountLevel::Account, "1105", "CAJA", 100.0),
            row(AccountLevel::Subaccount, "110505", "CAJA GENERAL", 100.0),
            row(AccountLevel::Account, "1110", "BANCOS", 50.0),
            row(AccountLevel::Group, "14", "INVENTARIOS", 350.0),
            row(AccountLevel::Class, "2", "PASIVO", -300.0),
            row(AccountLevel::Group, "21", "OBLIGACIONES FINANCIERAS", -300.0),
        ]
    }

    #[test]
    fn test_build_links_parents_by_prefix() {
        let tree = AccountHierarchy::build(ReportingMonth::March, &sample_rows()).unwrap();

        assert_eq!(tree.len(), 8);
        assert_eq!(tree.parent("110505").unwrap().code, "1105");
        assert_eq!(tree.parent("1105").unwrap().code, "11");
        assert_eq!(tree.parent("11").unwrap().code, "1");
        assert!(tree.parent("1").is_none());

        let children: Vec<&str> = tree.children("11").map(|e| e.code.as_str()).collect();
        assert_eq!(children, vec!["1105", "1110"]);

        let roots: Vec<&str> = tree.roots().map(|e| e.code.as_str()).collect();
        assert_eq!(roots, vec!["1", "2"]);

        let leaves: Vec<&str> = tree.leaves().map(|e| e.code.as_str()).collect();
        assert_eq!(leaves, vec!["110505", "1110", "14", "21"]);

        let descendants: Vec<&str> = tree.descendants("1").iter().map(|e| e.code.as_str()).collect();
        assert_eq!(descendants, vec!["11", "1105", "110505", "1110", "14"]);
        assert_eq!(tree.at_level(AccountLevel::Group).count(), 3);
    }

    #[test]
    fn test_parent_may_skip_missing_levels() {
        let rows = vec![
            row(AccountLevel::Class, "5", "GASTOS", 10.0),
            row(AccountLevel::Subaccount, "510506", "SUELDOS", 10.0),
        ];
        let tree = AccountHierarchy::build(ReportingMonth::January, &rows).unwrap();
        assert_eq!(tree.parent("510506").unwrap().code, "5");
    }

    #[test]
    fn test_duplicate_code_is_rejected() {
        let mut rows = sample_rows();
        rows.push(row(AccountLevel::Account, "1105", "CAJA DUPLICADA", 1.0));

        let err = AccountHierarchy::build(ReportingMonth::March, &rows).unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateAccount { ref code, .. } if code == "1105"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_malformed_level_code_pair_is_rejected() {
        let rows = vec![row(AccountLevel::Group, "110", "BAD", 1.0)];
        let err = AccountHierarchy::build(ReportingMonth::March, &rows).unwrap_err();
        assert!(matches!(err, AnalysisError::Validation { .. }));

        let rows = vec![row(AccountLevel::Class, "A", "BAD", 1.0)];
        assert!(AccountHierarchy::build(ReportingMonth::March, &rows).is_err());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let rows = vec![row(AccountLevel::Class, "1", "   ", 1.0)];
        let err = AccountHierarchy::build(ReportingMonth::March, &rows).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_orphan_is_data_integrity_error() {
        let rows = vec![
            row(AccountLevel::Class, "1", "ACTIVO", 10.0),
            row(AccountLevel::Account, "2205", "PROVEEDORES", -10.0),
        ];
        let err = AccountHierarchy::build(ReportingMonth::March, &rows).unwrap_err();
        assert!(matches!(err, AnalysisError::DataIntegrity { ref code, .. } if code == "2205"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_same_code_in_different_months_is_allowed() {
        let mut balances = BTreeMap::new();
        balances.insert(ReportingMonth::February, sample_rows());
        balances.insert(ReportingMonth::March, sample_rows());

        let trees = normalize_balances(&balances).unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[&ReportingMonth::February].month(), ReportingMonth::February);
        assert_eq!(
            trees[&ReportingMonth::March].get("1105").unwrap().month,
            ReportingMonth::March
        );
    }
}
