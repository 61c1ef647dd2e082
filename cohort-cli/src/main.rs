use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cohort", about = "A/B experiment assignment and reporting engine")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage experiments
    Experiment(commands::experiment::ExperimentArgs),
    /// Manage goal types
    Goal(commands::goal::GoalArgs),
    /// Build and inspect daily reports
    Report(commands::report::ReportArgs),
    /// Run the cohort HTTP server
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Experiment(args) => commands::experiment::run(args).await,
        Commands::Goal(args) => commands::goal::run(args).await,
        Commands::Report(args) => commands::report::run(args).await,
        Commands::Serve(args) => commands::serve::run(args).await,
    }
}
