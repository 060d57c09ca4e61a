mod commands;
mod input;
mod logging;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::capital::CapitalStructureArgs;
use commands::exit::ExitArgs;
use commands::scenario::{BatchArgs, ScenarioArgs};
use commands::scenarios::{MonteCarloArgs, SensitivityArgs};
use commands::schedule::DebtScheduleArgs;
use commands::waterfall::WaterfallArgs;

/// Leveraged-buyout capital structure engine
#[derive(Parser)]
#[command(
    name = "lbo",
    version,
    about = "Leveraged-buyout debt schedules, exit valuation and distribution waterfalls",
    long_about = "A CLI for evaluating leveraged-buyout capital structures with decimal \
                  precision. Validates sources and uses, projects the debt schedule with \
                  revolver draws and cash sweeps, values the exit and allocates proceeds \
                  through an LP/GP distribution waterfall. Inputs are JSON or YAML files, \
                  or JSON on stdin."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Single-line JSON output
    #[arg(long, global = true)]
    compact: bool,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a capital structure and reconcile sources and uses
    CapitalStructure(CapitalStructureArgs),
    /// Project the debt schedule period by period
    DebtSchedule(DebtScheduleArgs),
    /// Value the equity at the end of the hold period
    Exit(ExitArgs),
    /// Allocate proceeds through the LP/GP distribution waterfall
    Waterfall(WaterfallArgs),
    /// Run one scenario end to end
    Scenario(ScenarioArgs),
    /// Run a batch of independent scenarios in parallel
    Batch(BatchArgs),
    /// 2-way sensitivity grid over scenario parameters
    Sensitivity(SensitivityArgs),
    /// Monte Carlo simulation over exit multiple, EBITDA and rates
    MonteCarlo(MonteCarloArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::CapitalStructure(args) => commands::capital::run_capital_structure(args),
        Commands::DebtSchedule(args) => commands::schedule::run_debt_schedule(args),
        Commands::Exit(args) => commands::exit::run_exit(args),
        Commands::Waterfall(args) => commands::waterfall::run_waterfall(args),
        Commands::Scenario(args) => commands::scenario::run_scenario(args),
        Commands::Batch(args) => commands::scenario::run_batch(args),
        Commands::Sensitivity(args) => commands::scenarios::run_sensitivity(args),
        Commands::MonteCarlo(args) => commands::scenarios::run_monte_carlo(args),
        Commands::Version => {
            println!("lbo {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => match output::format_output(&cli.output, cli.compact, &value) {
            Ok(()) => process::exit(0),
            // Reader went away (e.g. `| head`)
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => process::exit(0),
            Err(e) => {
                eprintln!("{}: cannot write output: {}", "error".red().bold(), e);
                process::exit(1);
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
