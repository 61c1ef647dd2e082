//! Experiment assignment and statistical reporting engine.
//!
//! This crate runs controlled A/B experiments: it binds each visitor to a
//! control or test group exactly once, records goal conversions and
//! engagement activity for enrolled visitors, and reduces both into daily
//! statistical comparisons of the two groups.
//!
//! # Architecture
//!
//! - **Assignment** ([`AssignmentService`]) performs idempotent
//!   get-or-create of a visitor's permanent group, race-free under
//!   concurrent first-visits
//! - **Recording** ([`GoalRecorder`]) appends goal conversions per
//!   enabled enrollment
//! - **Aggregation** ([`Aggregator`]) reduces cumulative cohorts into
//!   group summaries
//! - **Statistics** ([`stats`]) computes z-based confidence for
//!   proportion and mean differences
//! - **Reports** ([`ReportBuilder`]) builds persisted daily engagement
//!   rows, on-demand conversion snapshots, and the merged time series
//!
//! All durable state lives behind the [`Store`] trait; the participant
//! uniqueness constraint it enforces is the engine's only shared mutable
//! resource.

mod activity;
mod aggregate;
mod analytics;
mod assignment;
mod experiment;
mod goals;
mod identity;
mod participant;
mod recorder;
mod reports;
pub mod stats;
pub mod storage;
mod types;

// Activity source
pub use activity::{ActivityError, ActivityTracker, MemoryActivity};

// Aggregation
pub use aggregate::{
    AggregateError, Aggregator, ConversionSummary, EngagementSummary, GoalCounts, GroupEngagement,
};

// Analytics dispatch
pub use analytics::{
    AnalyticsDispatcher, AnalyticsEvent, AnalyticsSink, NoopSink, SinkError, VisitorContext,
};

// Assignment
pub use assignment::{AssignError, Assignment, AssignmentService, GroupSplit, NotEligibleReason};

// Experiment model
pub use experiment::{Experiment, ExperimentState};

// Goal model
pub use goals::{GoalRecord, GoalType};

// Identity
pub use identity::{
    IdentityResolver, MemoryResolver, RequestContext, Visitor, VisitorIdentity,
};

// Participant model
pub use participant::{Group, Participant};

// Goal recording
pub use recorder::GoalRecorder;

// Reports
pub use reports::{
    ActivityData, BatchOutcome, ConversionSnapshot, ConversionStats, DailyEngagementReport,
    DailyReport, ReportBuilder, ReportError,
};

// Storage trait (re-export from storage module)
pub use storage::{Store, TursoStore};

// ID types
pub use types::{
    AnonymousId, ExperimentId, GoalRecordId, GoalTypeId, ParticipantId, UserId,
};
