//! `refine eval`: read a JSON-encoded expression tree and evaluate it.

use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use refine_core::{evaluate, Environment, Evaluator, Expression, NullResolver, RefinementContext, SValue};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{RefineCliError, Result};

#[derive(Debug, Args)]
pub struct EvalArgs {
    /// Path to a JSON file holding the expression to evaluate. Reads
    /// stdin when omitted.
    pub input: Option<PathBuf>,

    /// Emit the result as JSON instead of the human-readable form.
    #[arg(long)]
    pub json: bool,
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

pub fn run_eval(args: &EvalArgs, config: &Config) -> Result<()> {
    let source = read_input(&args.input)?;
    let expr: Expression =
        serde_json::from_str(&source).map_err(|e| RefineCliError::Decode(e.to_string()))?;
    debug!(?expr, "parsed expression");

    let mut evaluator = Evaluator::new(Box::new(NullResolver));
    evaluator.seed_var_ids(config.var_id_seed);
    let env = Environment::empty();
    let ctx = RefinementContext::empty();

    let result = evaluate(&expr, &env, &ctx, &mut evaluator)?;
    info!("evaluation complete");

    if args.json {
        let json = if config.pretty {
            serde_json::to_string_pretty(&to_json(&result))?
        } else {
            serde_json::to_string(&to_json(&result))?
        };
        println!("{json}");
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &SValue) {
    match result {
        SValue::Now(value) => println!("{value}"),
        SValue::Later { residual, constraint, .. } => {
            println!("<residual> {residual:?}");
            println!("constraint: {}", constraint.simplify());
        }
    }
}

fn to_json(result: &SValue) -> serde_json::Value {
    match result {
        SValue::Now(value) => serde_json::json!({ "kind": "now", "value": format!("{value}") }),
        SValue::Later { residual, constraint, .. } => serde_json::json!({
            "kind": "later",
            "residual": residual,
            "constraint": constraint.simplify().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_literal_number() {
        let expr = Expression::num(3.0);
        let mut evaluator = Evaluator::new(Box::new(NullResolver));
        let env = Environment::empty();
        let ctx = RefinementContext::empty();
        let result = evaluate(&expr, &env, &ctx, &mut evaluator).unwrap();
        assert!(matches!(result, SValue::Now(refine_core::Value::Number(n)) if n == 3.0));
    }
}
