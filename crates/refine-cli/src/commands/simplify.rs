//! `refine simplify`: read a JSON-encoded constraint and print its
//! canonical simplified form.

use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use refine_core::Constraint;
use tracing::debug;

use crate::error::{RefineCliError, Result};

#[derive(Debug, Args)]
pub struct SimplifyArgs {
    /// Path to a JSON file holding the constraint to simplify. Reads
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

pub fn run_simplify(args: &SimplifyArgs) -> Result<()> {
    let source = read_input(&args.input)?;
    let constraint: Constraint =
        serde_json::from_str(&source).map_err(|e| RefineCliError::Decode(e.to_string()))?;
    debug!(?constraint, "parsed constraint");

    let simplified = constraint.simplify();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&simplified)?);
    } else {
        println!("{simplified}");
    }
    Ok(())
}
