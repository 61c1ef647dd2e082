//! Daily report commands: the scheduled engagement batch and the merged
//! time-series view.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use cohort_core::{DailyReport, MemoryActivity, ReportBuilder, Store, TursoStore};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use tracing::info;

/// Report management arguments.
#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Path to the embedded database
    #[arg(long, default_value = super::DEFAULT_DATABASE)]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: ReportCommands,
}

/// Report subcommands.
#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Build the persisted engagement reports for one date (the nightly
    /// batch; re-running overwrites)
    Run {
        /// Report date (YYYY-MM-DD); defaults to yesterday
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the merged daily series for an experiment, newest first
    Show {
        /// Experiment name
        name: String,

        /// First date, inclusive (YYYY-MM-DD); defaults to the
        /// experiment's reporting window
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

/// Run report command.
pub async fn run(args: ReportArgs) -> Result<()> {
    let store = super::open_store(&args.database).await?;
    match args.command {
        ReportCommands::Run { date } => run_batch(&store, date).await,
        ReportCommands::Show { name, start, end } => show_series(&store, &name, start, end).await,
    }
}

/// Build the engagement reports for one date across all experiments.
///
/// The external activity tracker is wired per deployment; without one,
/// participants reduce to zero engagement and the batch still records
/// cohort sizes.
async fn run_batch(store: &Arc<TursoStore>, date: Option<NaiveDate>) -> Result<()> {
    let date = match date {
        Some(date) => date,
        None => match Utc::now().date_naive().pred_opt() {
            Some(yesterday) => yesterday,
            None => bail!("no reportable date before today"),
        },
    };

    let builder = ReportBuilder::new(store.clone(), Arc::new(MemoryActivity::new()));
    info!(%date, "building daily engagement reports");
    let outcome = builder.run_daily_batch(date).await?;

    println!(
        "Engagement batch for {date}: {} built, {} skipped, {} failed",
        outcome.built, outcome.skipped, outcome.failed
    );
    Ok(())
}

/// Print the merged time series for one experiment.
async fn show_series(
    store: &Arc<TursoStore>,
    name: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let Some(experiment) = store.get_experiment(name).await? else {
        bail!("experiment '{name}' not found");
    };

    let window = experiment.report_window(Utc::now().date_naive());
    let (Some(start), Some(end)) = (start.or(window.map(|w| w.0)), end.or(window.map(|w| w.1)))
    else {
        bail!("experiment '{name}' has no reporting window yet; pass --start and --end");
    };
    if end < start {
        bail!("end date {end} is before start date {start}");
    }

    let builder = ReportBuilder::new(store.clone(), Arc::new(MemoryActivity::new()));
    let days = builder.time_series(&experiment, start, end).await?;

    println!("{}", series_table(&days));
    Ok(())
}

/// Render the daily series as a table, one row per day.
fn series_table(days: &[DailyReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Date").fg(Color::Cyan),
        Cell::new("Cohort C/T").fg(Color::Cyan),
        Cell::new("Score C/T").fg(Color::Cyan),
        Cell::new("Eng. conf.").fg(Color::Cyan),
        Cell::new("Conv. C/T").fg(Color::Cyan),
        Cell::new("Rate C/T").fg(Color::Cyan),
        Cell::new("Improvement").fg(Color::Cyan),
        Cell::new("Conv. conf.").fg(Color::Cyan),
    ]);

    for day in days {
        let (scores, engagement_confidence) = match &day.activity {
            Some(activity) => (
                format!("{:.2} / {:.2}", activity.control_score, activity.test_score),
                fmt_percent(activity.confidence),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        let totals = &day.conversions.totals;

        table.add_row(vec![
            Cell::new(day.date.to_string()),
            Cell::new(format!(
                "{} / {}",
                day.conversions.control_size, day.conversions.test_size
            )),
            Cell::new(scores),
            Cell::new(engagement_confidence),
            Cell::new(format!("{} / {}", totals.control_count, totals.test_count)),
            Cell::new(format!(
                "{} / {}",
                fmt_rate(totals.control_rate),
                fmt_rate(totals.test_rate)
            )),
            Cell::new(fmt_percent(totals.improvement)),
            Cell::new(fmt_percent(totals.confidence)),
        ]);
    }
    table
}

fn fmt_percent(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.1}%"),
        None => "-".to_string(),
    }
}

fn fmt_rate(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.3}"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::{Experiment, ExperimentState};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn percent_and_rate_render_absent_values_as_dashes() {
        assert_eq!(fmt_percent(Some(87.25)), "87.2%");
        assert_eq!(fmt_percent(None), "-");
        assert_eq!(fmt_rate(Some(0.25)), "0.250");
        assert_eq!(fmt_rate(None), "-");
    }

    #[tokio::test]
    async fn batch_persists_reports_for_covered_experiments() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::commands::open_store(&dir.path().join("cohort.db"))
            .await
            .unwrap();

        let mut experiment = Experiment::new("exp");
        experiment.state = ExperimentState::Enabled;
        experiment.start_date = Some(date(2026, 1, 1));
        store.create_experiment(&experiment).await.unwrap();

        run_batch(&store, Some(date(2026, 1, 10))).await.unwrap();

        let report = store
            .get_engagement_report(experiment.id, date(2026, 1, 10))
            .await
            .unwrap();
        assert!(report.is_some());
    }

    #[tokio::test]
    async fn show_reports_unknown_experiments() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::commands::open_store(&dir.path().join("cohort.db"))
            .await
            .unwrap();

        let result = show_series(&store, "missing", None, None).await;
        assert!(result.is_err());
    }
}
