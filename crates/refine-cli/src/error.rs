//! Error handling for the refine CLI.

use thiserror::Error;

/// Main error type for the refine CLI application.
#[derive(Error, Debug)]
pub enum RefineCliError {
    /// Error when a required configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The input expression/constraint tree failed to decode.
    #[error("failed to decode input: {0}")]
    Decode(String),

    /// Evaluation raised one of the five fatal error kinds.
    #[error("evaluation failed: {0}")]
    Eval(#[from] refine_core::EvalError),

    /// Constraint unification failed.
    #[error("unification failed: {0}")]
    Constraint(#[from] refine_core::ConstraintError),

    /// Error when IO operations fail.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error when JSON serialization/deserialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RefineCliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = RefineCliError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "configuration error: missing field");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RefineCliError = io_err.into();
        assert!(matches!(err, RefineCliError::Io(_)));
    }

    #[test]
    fn json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RefineCliError = json_err.into();
        assert!(matches!(err, RefineCliError::Json(_)));
    }

    #[test]
    fn eval_error_converts() {
        let eval_err = refine_core::EvalError::UnboundVariable(refine_util::Symbol::intern("x"));
        let err: RefineCliError = eval_err.into();
        assert!(matches!(err, RefineCliError::Eval(_)));
    }
}
