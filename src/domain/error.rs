//! Domain error types.

/// Top-level error type for propeval.
///
/// Drawdown breaches are not errors; they are recorded as
/// [`FailureReason`](crate::domain::phase::FailureReason) on the phase.
#[derive(Debug, thiserror::Error)]
pub enum PropEvalError {
    #[error("account {account_id} not found")]
    AccountNotFound { account_id: String },

    #[error("account {account_id} has no active phase")]
    NoActivePhase { account_id: String },

    #[error("account {account_id} already exists")]
    AccountExists { account_id: String },

    #[error("invalid phase transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("payout refused: {reason}")]
    PayoutRefused { reason: String },

    #[error("trade import error at record {record}: {reason}")]
    TradeImport { record: u64, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&PropEvalError> for std::process::ExitCode {
    fn from(err: &PropEvalError) -> Self {
        let code: u8 = match err {
            PropEvalError::Io(_) => 1,
            PropEvalError::ConfigParse { .. }
            | PropEvalError::ConfigMissing { .. }
            | PropEvalError::ConfigInvalid { .. } => 2,
            PropEvalError::Database { .. } | PropEvalError::DatabaseQuery { .. } => 3,
            PropEvalError::AccountNotFound { .. }
            | PropEvalError::NoActivePhase { .. }
            | PropEvalError::AccountExists { .. }
            | PropEvalError::TradeImport { .. } => 4,
            PropEvalError::InvalidTransition { .. } | PropEvalError::PayoutRefused { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_identifiers() {
        let err = PropEvalError::NoActivePhase {
            account_id: "ACC-1".into(),
        };
        assert_eq!(err.to_string(), "account ACC-1 has no active phase");

        let err = PropEvalError::ConfigInvalid {
            section: "account".into(),
            key: "drawdown_type".into(),
            reason: "expected percent or absolute".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value [account] drawdown_type: expected percent or absolute"
        );
    }
}
