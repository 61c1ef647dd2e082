//! Reduction of participants and events into per-day group summaries.
//!
//! Group membership for a date is the cumulative cohort: everyone enrolled
//! on or before it. Conversion counts cumulate the same way, so a rate is
//! always "conversions so far / participants so far".

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::instrument;

use crate::activity::{ActivityError, ActivityTracker};
use crate::experiment::Experiment;
use crate::participant::Group;
use crate::storage::{self, Store};

/// Errors from aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] storage::Error),

    /// The external activity source failed.
    #[error(transparent)]
    Activity(#[from] ActivityError),
}

/// Engagement accumulator for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupEngagement {
    /// Cohort size
    pub size: u64,
    /// Sum of daily scores (participants without activity contribute 0)
    pub score_sum: f64,
    /// Sum of squared daily scores, for the variance estimate
    pub score_sq_sum: f64,
}

impl GroupEngagement {
    fn add(&mut self, score: f64) {
        self.size += 1;
        self.score_sum += score;
        self.score_sq_sum += score * score;
    }

    /// Mean score; `None` for an empty group.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.size > 0).then(|| self.score_sum / self.size as f64)
    }

    /// Sample variance of the scores; `None` below two observations.
    #[must_use]
    pub fn variance(&self) -> Option<f64> {
        if self.size < 2 {
            return None;
        }
        let n = self.size as f64;
        let centered = self.score_sq_sum - self.score_sum * self.score_sum / n;
        // Guard against tiny negative residue from floating-point error.
        Some((centered / (n - 1.0)).max(0.0))
    }
}

/// Engagement reduction for one experiment and date.
#[derive(Debug, Clone, PartialEq)]
pub struct EngagementSummary {
    /// The report date
    pub date: NaiveDate,
    /// Control-group accumulator
    pub control: GroupEngagement,
    /// Test-group accumulator
    pub test: GroupEngagement,
}

/// Conversion counts for one goal type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoalCounts {
    /// Conversions in the control group
    pub control: u64,
    /// Conversions in the test group
    pub test: u64,
}

/// Conversion reduction for one experiment and date.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSummary {
    /// The report date
    pub date: NaiveDate,
    /// Control cohort size
    pub control_size: u64,
    /// Test cohort size
    pub test_size: u64,
    /// Cumulative conversion counts per goal type
    pub goals: BTreeMap<String, GoalCounts>,
}

impl ConversionSummary {
    /// Conversion counts summed across all goal types.
    #[must_use]
    pub fn totals(&self) -> GoalCounts {
        let mut totals = GoalCounts::default();
        for counts in self.goals.values() {
            totals.control += counts.control;
            totals.test += counts.test;
        }
        totals
    }
}

/// Reduces raw participant and event data into group summaries.
pub struct Aggregator {
    store: Arc<dyn Store>,
    activity: Arc<dyn ActivityTracker>,
}

impl Aggregator {
    /// Create a new aggregator.
    pub fn new(store: Arc<dyn Store>, activity: Arc<dyn ActivityTracker>) -> Self {
        Self { store, activity }
    }

    /// Engagement summary for the cohort as of `date`.
    ///
    /// Scans the full cohort and reads each participant's daily score from
    /// the external tracker; this is the expensive reduction that the
    /// report builder amortizes by persisting one row per day.
    #[instrument(skip(self, experiment), fields(experiment = %experiment.name), level = "debug")]
    pub async fn engagement(
        &self,
        experiment: &Experiment,
        date: NaiveDate,
    ) -> Result<EngagementSummary, AggregateError> {
        let participants = self
            .store
            .participants_enrolled_by(experiment.id, date)
            .await?;

        let mut control = GroupEngagement::default();
        let mut test = GroupEngagement::default();
        for participant in participants {
            let score = self
                .activity
                .daily_score(&participant.visitor, date)
                .await?
                .unwrap_or(0.0);
            match participant.group {
                Group::Control => control.add(score),
                Group::Test => test.add(score),
            }
        }

        Ok(EngagementSummary {
            date,
            control,
            test,
        })
    }

    /// Conversion summary for the cohort as of `date`.
    ///
    /// Cumulative counts over indexed rows; cheap enough to recompute per
    /// view request.
    #[instrument(skip(self, experiment), fields(experiment = %experiment.name), level = "debug")]
    pub async fn conversions(
        &self,
        experiment: &Experiment,
        date: NaiveDate,
    ) -> Result<ConversionSummary, AggregateError> {
        let sizes = self.store.group_sizes(experiment.id, date).await?;
        let tallies = self.store.conversion_counts(experiment.id, date).await?;

        let mut goals: BTreeMap<String, GoalCounts> = BTreeMap::new();
        for tally in tallies {
            let entry = goals.entry(tally.goal_type).or_default();
            match tally.group {
                Group::Control => entry.control += tally.count,
                Group::Test => entry.test += tally.count,
            }
        }

        Ok(ConversionSummary {
            date,
            control_size: sizes.control,
            test_size: sizes.test,
            goals,
        })
    }
}
