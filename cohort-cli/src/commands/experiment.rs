//! Experiment management commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use cohort_core::{Experiment, ExperimentState, Store, TursoStore};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

/// Experiment management arguments.
#[derive(Args, Debug)]
pub struct ExperimentArgs {
    /// Path to the embedded database
    #[arg(long, default_value = super::DEFAULT_DATABASE)]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: ExperimentCommands,
}

/// Experiment subcommands.
#[derive(Subcommand, Debug)]
pub enum ExperimentCommands {
    /// Create a new experiment (disabled until enabled)
    Create {
        /// Unique experiment name
        name: String,

        /// First data-collection date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last data-collection date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// List all experiments
    List,

    /// Start splitting traffic into control and test
    Enable {
        /// Experiment name
        name: String,
    },

    /// Stop assigning visitors
    Disable {
        /// Experiment name
        name: String,
    },

    /// Conclude the experiment; the winning variant is served to everyone
    Promote {
        /// Experiment name
        name: String,
    },
}

/// Run experiment command.
pub async fn run(args: ExperimentArgs) -> Result<()> {
    let store = super::open_store(&args.database).await?;
    match args.command {
        ExperimentCommands::Create { name, start, end } => {
            create_experiment(&store, &name, start, end).await
        }
        ExperimentCommands::List => list_experiments(&store).await,
        ExperimentCommands::Enable { name } => {
            set_state(&store, &name, ExperimentState::Enabled).await
        }
        ExperimentCommands::Disable { name } => {
            set_state(&store, &name, ExperimentState::Disabled).await
        }
        ExperimentCommands::Promote { name } => {
            set_state(&store, &name, ExperimentState::Promoted).await
        }
    }
}

/// Create a new experiment.
async fn create_experiment(
    store: &Arc<TursoStore>,
    name: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            bail!("end date {end} is before start date {start}");
        }
    }

    let mut experiment = Experiment::new(name);
    experiment.start_date = start;
    experiment.end_date = end;
    store.create_experiment(&experiment).await?;

    println!("Created experiment '{name}' (disabled; run 'cohort experiment enable {name}')");
    Ok(())
}

/// List all experiments as a table.
async fn list_experiments(store: &Arc<TursoStore>) -> Result<()> {
    let experiments = store.list_experiments().await?;
    if experiments.is_empty() {
        println!("No experiments. Create one with 'cohort experiment create <name>'.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("State").fg(Color::Cyan),
        Cell::new("Start").fg(Color::Cyan),
        Cell::new("End").fg(Color::Cyan),
    ]);

    for experiment in experiments {
        table.add_row(vec![
            Cell::new(&experiment.name),
            Cell::new(experiment.state.as_str()),
            Cell::new(fmt_date(experiment.start_date)),
            Cell::new(fmt_date(experiment.end_date)),
        ]);
    }

    println!("{table}");
    Ok(())
}

/// Change an experiment's lifecycle state.
async fn set_state(store: &Arc<TursoStore>, name: &str, state: ExperimentState) -> Result<()> {
    let Some(experiment) = store.get_experiment(name).await? else {
        bail!("experiment '{name}' not found");
    };
    store.set_experiment_state(experiment.id, state).await?;

    println!("Experiment '{name}' is now {}", state.as_str());
    Ok(())
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn create_persists_a_disabled_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::commands::open_store(&dir.path().join("cohort.db"))
            .await
            .unwrap();

        create_experiment(&store, "signup-button", Some(date(2026, 1, 1)), None)
            .await
            .unwrap();

        let loaded = store.get_experiment("signup-button").await.unwrap().unwrap();
        assert_eq!(loaded.state, ExperimentState::Disabled);
        assert_eq!(loaded.start_date, Some(date(2026, 1, 1)));
    }

    #[tokio::test]
    async fn create_rejects_an_inverted_date_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::commands::open_store(&dir.path().join("cohort.db"))
            .await
            .unwrap();

        let result = create_experiment(
            &store,
            "backwards",
            Some(date(2026, 2, 1)),
            Some(date(2026, 1, 1)),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn enable_changes_the_stored_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::commands::open_store(&dir.path().join("cohort.db"))
            .await
            .unwrap();

        create_experiment(&store, "exp", None, None).await.unwrap();
        set_state(&store, "exp", ExperimentState::Enabled)
            .await
            .unwrap();

        let loaded = store.get_experiment("exp").await.unwrap().unwrap();
        assert_eq!(loaded.state, ExperimentState::Enabled);
    }

    #[tokio::test]
    async fn set_state_reports_unknown_experiments() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::commands::open_store(&dir.path().join("cohort.db"))
            .await
            .unwrap();

        let result = set_state(&store, "missing", ExperimentState::Enabled).await;
        assert!(result.is_err());
    }
}
