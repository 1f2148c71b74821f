//! Command modules for the refine CLI.
//!
//! This module contains implementations for all available subcommands.
//! Each subcommand is implemented in its own file.

pub mod eval;
pub mod prove;
pub mod simplify;

pub use eval::{run_eval, EvalArgs};
pub use prove::{run_prove, ProveArgs};
pub use simplify::{run_simplify, SimplifyArgs};
