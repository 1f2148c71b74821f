//! The five error kinds spec.md §7 defines, plus the unifier's own error.

use crate::constraint::Constraint;
use refine_util::Symbol;
use thiserror::Error;

/// Where an error occurred, for diagnostics. Intentionally coarse — the
/// core has no source spans (parsing is out of scope), so a site is just
/// a short description of the construct being evaluated.
pub type Site = &'static str;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("unbound variable `{0}`")]
    UnboundVariable(Symbol),

    #[error("type mismatch at {site}: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: Constraint,
        actual: Constraint,
        site: Site,
    },

    #[error("assertion failed: value does not satisfy {constraint}{}", .message.as_ref().map(|m| format!(" ({m})")).unwrap_or_default())]
    AssertionFailed {
        constraint: Constraint,
        message: Option<String>,
    },

    #[error("force-now received a residual value with constraint {0}")]
    ForceNowFailed(Constraint),

    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Failure mode of [`crate::constraint::Constraint::solve`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConstraintError {
    #[error("occurs check failed: var({var}) occurs in {ty}")]
    Occurs { var: u32, ty: Constraint },

    #[error("cannot unify {lhs} with {rhs}")]
    Mismatch { lhs: Constraint, rhs: Constraint },
}

pub type ConstraintResult<T> = std::result::Result<T, ConstraintError>;
