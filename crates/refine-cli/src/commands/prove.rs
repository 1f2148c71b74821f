//! `refine prove`: read a JSON object `{"antecedent": ..., "goal": ...}`
//! and report whether the antecedent implies the goal.

use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use refine_core::Constraint;
use serde::Deserialize;
use tracing::debug;

use crate::error::{RefineCliError, Result};

#[derive(Debug, Deserialize)]
struct ProveInput {
    antecedent: Constraint,
    goal: Constraint,
}

#[derive(Debug, Args)]
pub struct ProveArgs {
    /// Path to a JSON file holding `{antecedent, goal}`. Reads stdin
    /// when omitted.
    pub input: Option<PathBuf>,
}

fn read_input(path: &Option<PathBuf>) -> Result<String> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Same sound-but-incomplete tri-state `RefinementContext::prove` uses,
/// applied directly to a pair of constraints instead of a provenance
/// lookup.
fn prove(antecedent: &Constraint, goal: &Constraint) -> &'static str {
    if antecedent.implies(goal) {
        "true"
    } else if antecedent.implies(&goal.negate()) {
        "false"
    } else {
        "unknown"
    }
}

pub fn run_prove(args: &ProveArgs) -> Result<()> {
    let source = read_input(&args.input)?;
    let input: ProveInput =
        serde_json::from_str(&source).map_err(|e| RefineCliError::Decode(e.to_string()))?;
    debug!(antecedent = ?input.antecedent, goal = ?input.goal, "checking implication");

    println!("{}", prove(&input.antecedent, &input.goal));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_bound_implies_itself() {
        assert_eq!(prove(&Constraint::Gte(5.0), &Constraint::Gte(5.0)), "true");
    }

    #[test]
    fn contradictory_bound_is_false() {
        assert_eq!(prove(&Constraint::Gte(5.0), &Constraint::Lte(0.0)), "false");
    }

    #[test]
    fn unrelated_classification_is_unknown() {
        assert_eq!(prove(&Constraint::IsNumber, &Constraint::Gt(0.0)), "unknown");
    }
}
