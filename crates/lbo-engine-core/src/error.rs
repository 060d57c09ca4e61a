use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LboError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// Malformed or irreconcilable tranche/equity/leverage configuration.
    /// Always raised before any period is computed.
    #[error("Invalid capital structure: {subject}.{field}: {reason}")]
    InvalidCapitalStructure {
        subject: String,
        field: String,
        reason: String,
    },

    /// The circular-interest solver hit its iteration cap for one period.
    #[error("Non-convergence in period {period}: no fixed point after {iterations} iterations (last iterate: {last_iterate}, residual: {residual})")]
    NonConvergence {
        period: u32,
        iterations: u32,
        last_iterate: Decimal,
        residual: Decimal,
    },

    /// Interest and fees exceed the cash available even after a full
    /// revolver draw and deferring all scheduled amortisation.
    #[error("Cash shortfall in period {period}: {shortfall} of interest and fees cannot be funded")]
    CashShortfall { period: u32, shortfall: Decimal },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl LboError {
    /// Stable label used when a failure is reported inside a batch.
    pub fn kind(&self) -> &'static str {
        match self {
            LboError::InvalidInput { .. } => "invalid_input",
            LboError::InvalidCapitalStructure { .. } => "invalid_capital_structure",
            LboError::NonConvergence { .. } => "non_convergence",
            LboError::CashShortfall { .. } => "cash_shortfall",
            LboError::ConvergenceFailure { .. } => "convergence_failure",
            LboError::InsufficientData(_) => "insufficient_data",
            LboError::DivisionByZero { .. } => "division_by_zero",
            LboError::DateError(_) => "date_error",
            LboError::SerializationError(_) => "serialization_error",
        }
    }

    pub(crate) fn capital_structure(
        subject: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        LboError::InvalidCapitalStructure {
            subject: subject.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for LboError {
    fn from(e: serde_json::Error) -> Self {
        LboError::SerializationError(e.to_string())
    }
}
