//! refine-util — foundation utilities shared by the refinement-typed
//! staged evaluator.
//!
//! [`Symbol`]: an interned string handle, used for variable names, field
//! names, and built-in names throughout `refine-core`. Interning turns name
//! comparisons (which happen on every environment lookup and every
//! `hasField` check) into integer comparisons. Small, reusable
//! infrastructure a compiler-shaped crate keeps at its root so every other
//! crate can depend on it without depending on each other.

mod error;
mod symbol;

pub use error::{SymbolError, SymbolResult};
pub use symbol::Symbol;

// Re-export commonly used hash collections so downstream crates agree on
// one hasher instead of picking `std::collections::HashMap` ad hoc.
pub use rustc_hash::{FxHashMap, FxHashSet};
