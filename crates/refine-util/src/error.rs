//! Error types for refine-util's own operations.

use thiserror::Error;

/// Error type for symbol interning operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    /// A symbol's raw index does not correspond to any interned string.
    #[error("symbol index {0} is not interned")]
    NotFound(u32),
}

/// Result type alias for symbol operations.
pub type SymbolResult<T> = std::result::Result<T, SymbolError>;
