//! Storage trait and implementations for experiment data.
//!
//! The [`Store`] trait is the engine's only shared mutable surface. The
//! participant uniqueness invariant (at most one row per visitor per
//! experiment) is enforced here, by the backing database's constraints,
//! so that concurrent first-visits race safely without any in-process
//! locking.

mod error;
mod turso;

pub use error::{Error, Result};
pub use turso::TursoStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::experiment::{Experiment, ExperimentState};
use crate::goals::{GoalRecord, GoalType};
use crate::identity::VisitorIdentity;
use crate::participant::{Group, Participant};
use crate::reports::DailyEngagementReport;
use crate::types::ExperimentId;

/// Cohort sizes for one experiment as of a date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupSizes {
    /// Participants assigned to control, enrolled on or before the date
    pub control: u64,
    /// Participants assigned to test, enrolled on or before the date
    pub test: u64,
}

/// Cumulative conversion count for one goal type in one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalTally {
    /// Goal type name
    pub goal_type: String,
    /// Group the conversions belong to
    pub group: Group,
    /// Number of goal records
    pub count: u64,
}

/// Persistent store for experiments, participants, goals, and reports.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create an experiment. Fails if the name is taken.
    async fn create_experiment(&self, experiment: &Experiment) -> Result<()>;

    /// Get an experiment by name.
    async fn get_experiment(&self, name: &str) -> Result<Option<Experiment>>;

    /// List all experiments, newest first.
    async fn list_experiments(&self) -> Result<Vec<Experiment>>;

    /// Change an experiment's lifecycle state.
    async fn set_experiment_state(&self, id: ExperimentId, state: ExperimentState) -> Result<()>;

    /// Register a goal type. Fails if the name is taken.
    async fn create_goal_type(&self, goal_type: &GoalType) -> Result<()>;

    /// Get a goal type by name.
    async fn get_goal_type(&self, name: &str) -> Result<Option<GoalType>>;

    /// List all registered goal types, alphabetically.
    async fn list_goal_types(&self) -> Result<Vec<GoalType>>;

    /// Find the participant row binding a visitor to an experiment.
    async fn find_participant(
        &self,
        experiment_id: ExperimentId,
        visitor: &VisitorIdentity,
    ) -> Result<Option<Participant>>;

    /// Insert a participant unless the visitor already has one for the
    /// experiment; the uniqueness constraint decides atomically.
    ///
    /// Returns the durable row and whether this call created it. When a
    /// concurrent writer wins the race, the winner's row is returned with
    /// `created = false`.
    async fn insert_participant_if_absent(
        &self,
        participant: &Participant,
    ) -> Result<(Participant, bool)>;

    /// All participants of an experiment enrolled on or before a date
    /// (the cumulative cohort).
    async fn participants_enrolled_by(
        &self,
        experiment_id: ExperimentId,
        date: NaiveDate,
    ) -> Result<Vec<Participant>>;

    /// A visitor's participant rows across all enabled experiments.
    async fn active_enrollments_for(
        &self,
        visitor: &VisitorIdentity,
    ) -> Result<Vec<Participant>>;

    /// Cohort sizes per group as of a date.
    async fn group_sizes(&self, experiment_id: ExperimentId, date: NaiveDate)
    -> Result<GroupSizes>;

    /// Append a goal record.
    async fn insert_goal_record(&self, record: &GoalRecord) -> Result<()>;

    /// Cumulative-to-date conversion counts per goal type per group,
    /// restricted to participants enrolled on or before the date.
    async fn conversion_counts(
        &self,
        experiment_id: ExperimentId,
        date: NaiveDate,
    ) -> Result<Vec<GoalTally>>;

    /// Insert or overwrite the engagement report for (experiment, date).
    async fn upsert_engagement_report(&self, report: &DailyEngagementReport) -> Result<()>;

    /// Get the engagement report for (experiment, date), if built.
    async fn get_engagement_report(
        &self,
        experiment_id: ExperimentId,
        date: NaiveDate,
    ) -> Result<Option<DailyEngagementReport>>;
}
