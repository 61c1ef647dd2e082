//! Daily report building.
//!
//! Engagement reports are built once per date by a batch run and
//! persisted; conversion reports are recomputed on every view. The
//! asymmetry is deliberate: engagement needs a full-cohort scan against
//! the external activity source and is worth amortizing, while conversion
//! counts are a cheap indexed query whose consumers want the latest data.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::activity::ActivityTracker;
use crate::aggregate::{AggregateError, Aggregator, ConversionSummary, GoalCounts};
use crate::experiment::{Experiment, ExperimentState};
use crate::stats;
use crate::storage::{self, Store};
use crate::types::ExperimentId;

/// Errors from report building.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] storage::Error),

    /// Aggregation error.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Persisted engagement comparison for one (experiment, date).
///
/// Rebuilt idempotently: re-running the batch for an already-reported
/// date overwrites the row with identical content when the underlying
/// data is unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEngagementReport {
    /// Experiment the report belongs to
    pub experiment_id: ExperimentId,

    /// Report date
    pub date: NaiveDate,

    /// Control cohort size as of the date
    pub control_size: u64,

    /// Test cohort size as of the date
    pub test_size: u64,

    /// Mean control engagement score (0 for an empty group)
    pub control_score: f64,

    /// Mean test engagement score (0 for an empty group)
    pub test_score: f64,

    /// Confidence that the means differ; absent when not computable
    pub confidence: Option<f64>,
}

/// Conversion comparison for one goal type (or the totals row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Conversions in the control group
    pub control_count: u64,

    /// Conversions in the test group
    pub test_count: u64,

    /// Conversions per control participant; absent for an empty group
    pub control_rate: Option<f64>,

    /// Conversions per test participant; absent for an empty group
    pub test_rate: Option<f64>,

    /// Relative rate improvement in percent; absent when undefined
    pub improvement: Option<f64>,

    /// Confidence that the rates differ; absent when not computable
    pub confidence: Option<f64>,
}

/// On-demand conversion report for one (experiment, date).
///
/// Never persisted; assembled fresh from the store on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSnapshot {
    /// Report date
    pub date: NaiveDate,

    /// Control cohort size as of the date
    pub control_size: u64,

    /// Test cohort size as of the date
    pub test_size: u64,

    /// Per-goal-type comparison rows
    pub goal_types: BTreeMap<String, ConversionStats>,

    /// Comparison across all goal types combined
    pub totals: ConversionStats,
}

/// Engagement figures of one time-series day, derived from the persisted
/// report at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityData {
    /// Control cohort size
    pub control_size: u64,

    /// Test cohort size
    pub test_size: u64,

    /// Mean control engagement score
    pub control_score: f64,

    /// Mean test engagement score
    pub test_score: f64,

    /// Relative score improvement in percent; absent when undefined
    pub improvement: Option<f64>,

    /// Stored confidence value
    pub confidence: Option<f64>,
}

impl ActivityData {
    fn from_report(report: &DailyEngagementReport) -> Self {
        Self {
            control_size: report.control_size,
            test_size: report.test_size,
            control_score: report.control_score,
            test_score: report.test_score,
            improvement: stats::improvement(report.control_score, report.test_score),
            confidence: report.confidence,
        }
    }
}

/// One day of the merged time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    /// Report date
    pub date: NaiveDate,

    /// Engagement data; absent when no report was built for the date
    pub activity: Option<ActivityData>,

    /// Fresh conversion data
    pub conversions: ConversionSnapshot,
}

/// Outcome of one engagement batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Reports built
    pub built: usize,
    /// Experiments skipped (not enabled, or date outside their range)
    pub skipped: usize,
    /// Experiments whose build failed
    pub failed: usize,
}

/// Builds daily reports from the aggregation and statistics layers.
pub struct ReportBuilder {
    store: Arc<dyn Store>,
    aggregator: Aggregator,
}

impl ReportBuilder {
    /// Create a new report builder.
    pub fn new(store: Arc<dyn Store>, activity: Arc<dyn ActivityTracker>) -> Self {
        let aggregator = Aggregator::new(store.clone(), activity);
        Self { store, aggregator }
    }

    /// Build and persist the engagement report for one date.
    ///
    /// Upserts on (experiment, date): recomputation overwrites, it never
    /// appends.
    #[instrument(skip(self, experiment), fields(experiment = %experiment.name), level = "debug")]
    pub async fn build_daily_engagement(
        &self,
        experiment: &Experiment,
        date: NaiveDate,
    ) -> Result<DailyEngagementReport, ReportError> {
        let summary = self.aggregator.engagement(experiment, date).await?;

        let confidence = match (summary.control.mean(), summary.test.mean()) {
            (Some(control_mean), Some(test_mean)) => stats::two_mean_confidence(
                summary.control.size,
                control_mean,
                summary.control.variance().unwrap_or(0.0),
                summary.test.size,
                test_mean,
                summary.test.variance().unwrap_or(0.0),
            ),
            _ => None,
        };

        let report = DailyEngagementReport {
            experiment_id: experiment.id,
            date,
            control_size: summary.control.size,
            test_size: summary.test.size,
            control_score: summary.control.mean().unwrap_or(0.0),
            test_score: summary.test.mean().unwrap_or(0.0),
            confidence,
        };
        self.store.upsert_engagement_report(&report).await?;
        Ok(report)
    }

    /// Fresh conversion report for one date, never persisted.
    #[instrument(skip(self, experiment), fields(experiment = %experiment.name), level = "debug")]
    pub async fn conversion_snapshot(
        &self,
        experiment: &Experiment,
        date: NaiveDate,
    ) -> Result<ConversionSnapshot, ReportError> {
        let summary = self.aggregator.conversions(experiment, date).await?;

        let goal_types = summary
            .goals
            .iter()
            .map(|(name, counts)| (name.clone(), conversion_stats(&summary, *counts)))
            .collect();
        let totals = conversion_stats(&summary, summary.totals());

        Ok(ConversionSnapshot {
            date: summary.date,
            control_size: summary.control_size,
            test_size: summary.test_size,
            goal_types,
            totals,
        })
    }

    /// The merged daily series for an inclusive date range, newest first.
    ///
    /// A missing engagement report is a data gap, not a fault: the day
    /// still appears, with `activity` absent and conversions computed
    /// fresh.
    #[instrument(skip(self, experiment), fields(experiment = %experiment.name), level = "debug")]
    pub async fn time_series(
        &self,
        experiment: &Experiment,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyReport>, ReportError> {
        let mut days = Vec::new();
        let mut current = end;
        while current >= start {
            let activity = match self
                .store
                .get_engagement_report(experiment.id, current)
                .await?
            {
                Some(report) => Some(ActivityData::from_report(&report)),
                None => {
                    warn!(
                        experiment = %experiment.name,
                        date = %current,
                        "no engagement report for date"
                    );
                    None
                }
            };
            let conversions = self.conversion_snapshot(experiment, current).await?;
            days.push(DailyReport {
                date: current,
                activity,
                conversions,
            });

            match current.pred_opt() {
                Some(previous) => current = previous,
                None => break,
            }
        }
        Ok(days)
    }

    /// Build engagement reports for every enabled experiment whose date
    /// range covers `date` (the scheduled batch entry point).
    ///
    /// Per-experiment failures are logged and skipped so one bad
    /// experiment cannot starve the rest of the batch.
    #[instrument(skip(self), level = "info")]
    pub async fn run_daily_batch(&self, date: NaiveDate) -> Result<BatchOutcome, ReportError> {
        let experiments = self.store.list_experiments().await?;

        let mut outcome = BatchOutcome::default();
        for experiment in experiments {
            if experiment.state != ExperimentState::Enabled || !experiment.covers(date) {
                outcome.skipped += 1;
                continue;
            }
            match self.build_daily_engagement(&experiment, date).await {
                Ok(_) => outcome.built += 1,
                Err(error) => {
                    warn!(
                        experiment = %experiment.name,
                        date = %date,
                        %error,
                        "daily engagement build failed"
                    );
                    outcome.failed += 1;
                }
            }
        }

        info!(
            built = outcome.built,
            skipped = outcome.skipped,
            failed = outcome.failed,
            date = %date,
            "daily engagement batch complete"
        );
        Ok(outcome)
    }
}

/// Rates, improvement, and confidence for one goal-count pair.
fn conversion_stats(summary: &ConversionSummary, counts: GoalCounts) -> ConversionStats {
    let control_rate =
        (summary.control_size > 0).then(|| counts.control as f64 / summary.control_size as f64);
    let test_rate = (summary.test_size > 0).then(|| counts.test as f64 / summary.test_size as f64);

    let improvement = match (control_rate, test_rate) {
        (Some(control), Some(test)) => stats::improvement(control, test),
        _ => None,
    };
    let confidence = stats::two_proportion_confidence(
        summary.control_size,
        counts.control,
        summary.test_size,
        counts.test,
    );

    ConversionStats {
        control_count: counts.control,
        test_count: counts.test,
        control_rate,
        test_rate,
        improvement,
        confidence,
    }
}
