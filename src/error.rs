use crate::schema::ReportingMonth;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Validation failed for {month:?}: {details}")]
    Validation {
        month: Option<ReportingMonth>,
        details: String,
    },

    #[error("Sheet '{sheet}' is missing required column '{column}'")]
    MissingColumn { sheet: String, column: String },

    #[error("Required sheet is missing or empty: {0}")]
    MissingSheet(String),

    #[error("Duplicate account code {code} in {month:?}")]
    DuplicateAccount { month: ReportingMonth, code: String },

    #[error("Hierarchy inconsistency in {month:?} at account {code}: {details}")]
    DataIntegrity {
        month: ReportingMonth,
        code: String,
        details: String,
    },

    #[error("Invalid budget configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalysisError {
    pub(crate) fn validation(month: Option<ReportingMonth>, details: impl Into<String>) -> Self {
        Self::Validation {
            month,
            details: details.into(),
        }
    }

    /// True for the structural failures that abort a single month's run.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::MissingColumn { .. }
                | Self::MissingSheet(_)
                | Self::DuplicateAccount { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
