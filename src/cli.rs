use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "provision")]
#[command(version)]
#[command(about = "Idempotent node provisioning: declare resources, converge the node", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge this node to its declared state
    Apply(ApplyArgs),

    /// Show what apply would do, without changing anything
    Plan(PlanArgs),

    /// Show the last recorded run
    Report(ReportArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Node config file (defaults to node.toml in the config directory)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Preview only; make no changes
    #[arg(long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Node config file (defaults to node.toml in the config directory)
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Args)]
pub struct ReportArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
