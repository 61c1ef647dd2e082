//! Goal type registry commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Subcommand};
use cohort_core::{GoalType, Store, TursoStore};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

/// Goal type management arguments.
#[derive(Args, Debug)]
pub struct GoalArgs {
    /// Path to the embedded database
    #[arg(long, default_value = super::DEFAULT_DATABASE)]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: GoalCommands,
}

/// Goal type subcommands.
#[derive(Subcommand, Debug)]
pub enum GoalCommands {
    /// Register a new goal type
    Add {
        /// Unique goal name, used by tracking beacons (e.g. "signup")
        name: String,
    },

    /// List registered goal types
    List,
}

/// Run goal command.
pub async fn run(args: GoalArgs) -> Result<()> {
    let store = super::open_store(&args.database).await?;
    match args.command {
        GoalCommands::Add { name } => add_goal(&store, &name).await,
        GoalCommands::List => list_goals(&store).await,
    }
}

/// Register a new goal type.
async fn add_goal(store: &Arc<TursoStore>, name: &str) -> Result<()> {
    store.create_goal_type(&GoalType::new(name)).await?;
    println!("Registered goal type '{name}'");
    Ok(())
}

/// List registered goal types as a table.
async fn list_goals(store: &Arc<TursoStore>) -> Result<()> {
    let goal_types = store.list_goal_types().await?;
    if goal_types.is_empty() {
        println!("No goal types. Register one with 'cohort goal add <name>'.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Registered").fg(Color::Cyan),
    ]);

    for goal_type in goal_types {
        table.add_row(vec![
            Cell::new(&goal_type.name),
            Cell::new(goal_type.created_at.format("%Y-%m-%d").to_string()),
        ]);
    }

    println!("{table}");
    Ok(())
}
