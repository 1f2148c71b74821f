//! refine CLI - a command-line driver for the staged partial evaluator.
//!
//! This is the main entry point for the refine CLI application.
//! It uses clap for argument parsing and dispatches to appropriate
//! command handlers based on user input.

mod commands;
mod config;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{
    eval::{run_eval, EvalArgs},
    prove::{run_prove, ProveArgs},
    simplify::{run_simplify, SimplifyArgs},
};
use config::Config;
use error::{RefineCliError, Result};

/// refine - a staged partial evaluator with a refinement-type prover.
///
/// refine evaluates an expression tree, specializing everything that's
/// known and residualizing everything that isn't, and can answer
/// standalone questions about constraints along the way.
#[derive(Parser, Debug)]
#[command(name = "refine")]
#[command(author = "Refine Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A staged partial evaluator for refinement-typed expressions", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "REFINE_VERBOSE")]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "REFINE_CONFIG")]
    config: Option<PathBuf>,

    /// Disable color output
    #[arg(long, global = true, env = "REFINE_NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the refine CLI.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate an expression tree
    ///
    /// Reads a JSON-encoded expression, evaluates it against an empty
    /// environment and refinement context, and prints either the
    /// resulting concrete value or the residual expression plus its
    /// inferred constraint.
    Eval(EvalArgs),

    /// Simplify a constraint
    ///
    /// Reads a JSON-encoded constraint and prints its canonical,
    /// flattened, contradiction-checked form.
    Simplify(SimplifyArgs),

    /// Check whether one constraint implies another
    ///
    /// Reads a JSON object `{antecedent, goal}` and reports whether the
    /// antecedent proves, disproves, or can't decide the goal.
    Prove(ProveArgs),
}

/// Main entry point for the refine CLI.
fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.no_color)?;

    let config = load_config(cli.config.as_deref())?;

    execute_command(cli.command, &config)
}

/// Initialize the logging system.
fn init_logging(verbose: bool, no_color: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let subscriber = fmt::layer()
        .with_ansi(!no_color)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .map_err(|e| RefineCliError::Config(format!("failed to initialize logging: {e}")))?;

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

/// Execute the selected command.
fn execute_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Eval(args) => run_eval(&args, config),
        Commands::Simplify(args) => run_simplify(&args),
        Commands::Prove(args) => run_prove(&args),
    }
}
