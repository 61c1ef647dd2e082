//! Turso/libSQL implementation of experiment storage.
//!
//! This module provides persistent storage using Turso (libSQL).
//! It can connect to:
//! - Remote Turso database (cloud)
//! - Local embedded SQLite file
//!
//! The participant uniqueness invariant is carried by two partial unique
//! indexes, one per identity branch; `insert_participant_if_absent` is a
//! conditional insert against them followed by a re-read when the insert
//! was ignored. That is the whole concurrency story: racing first-visits
//! are settled by the database, not by locks.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Builder, Connection, Database};
use tracing::instrument;
use uuid::Uuid;

use super::{Error, GoalTally, GroupSizes, Result, Store};
use crate::experiment::{Experiment, ExperimentState};
use crate::goals::{GoalRecord, GoalType};
use crate::identity::VisitorIdentity;
use crate::participant::{Group, Participant};
use crate::reports::DailyEngagementReport;
use crate::types::{AnonymousId, ExperimentId, GoalTypeId, ParticipantId, UserId};

/// SQL schema for the experiments table.
const SCHEMA_EXPERIMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS experiments (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    state TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT,
    created_at TEXT NOT NULL
)
"#;

/// SQL schema for the goal types table.
const SCHEMA_GOAL_TYPES: &str = r#"
CREATE TABLE IF NOT EXISTS goal_types (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
)
"#;

/// SQL schema for the participants table.
///
/// Exactly one of user_id/anonymous_id is populated per row.
const SCHEMA_PARTICIPANTS: &str = r#"
CREATE TABLE IF NOT EXISTS participants (
    id TEXT PRIMARY KEY,
    experiment_id TEXT NOT NULL,
    user_id TEXT,
    anonymous_id TEXT,
    grp INTEGER NOT NULL,
    enrolled_on TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// Uniqueness: one row per (experiment, account).
const INDEX_PARTICIPANTS_USER: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS ux_participants_user
ON participants(experiment_id, user_id) WHERE user_id IS NOT NULL
"#;

/// Uniqueness: one row per (experiment, anonymous visitor).
const INDEX_PARTICIPANTS_ANONYMOUS: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS ux_participants_anonymous
ON participants(experiment_id, anonymous_id) WHERE anonymous_id IS NOT NULL
"#;

/// SQL schema for the goal records table.
const SCHEMA_GOAL_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS goal_records (
    id TEXT PRIMARY KEY,
    goal_type_id TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    recorded_on TEXT NOT NULL,
    recorded_at TEXT NOT NULL
)
"#;

/// SQL index for cumulative conversion queries.
const INDEX_GOAL_RECORDS: &str = r#"
CREATE INDEX IF NOT EXISTS idx_goal_records_participant
ON goal_records(participant_id, recorded_on)
"#;

/// SQL schema for the daily engagement reports table.
const SCHEMA_ENGAGEMENT_REPORTS: &str = r#"
CREATE TABLE IF NOT EXISTS daily_engagement_reports (
    experiment_id TEXT NOT NULL,
    date TEXT NOT NULL,
    control_size INTEGER NOT NULL,
    test_size INTEGER NOT NULL,
    control_score REAL NOT NULL,
    test_score REAL NOT NULL,
    confidence REAL,
    PRIMARY KEY (experiment_id, date)
)
"#;

const PARTICIPANT_COLUMNS: &str =
    "id, experiment_id, user_id, anonymous_id, grp, enrolled_on, created_at";

const EXPERIMENT_COLUMNS: &str = "id, name, state, start_date, end_date, created_at";

/// Turso-backed experiment storage.
#[derive(Clone)]
pub struct TursoStore {
    db: Arc<Database>,
}

impl TursoStore {
    /// Create a new store backed by a local embedded database.
    pub async fn new_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        let store = Self { db: Arc::new(db) };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create a new store connected to a remote Turso database.
    pub async fn new_remote(url: &str, token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await?;
        let store = Self { db: Arc::new(db) };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create a new in-memory store (for testing).
    pub async fn new_memory() -> Result<Self> {
        // A bare `:memory:` database is private to a single connection, so the
        // schema created here would be invisible to the fresh connection each
        // store method opens. A uniquely-named shared-cache in-memory database
        // is shared across this store's connections (like a file-backed one)
        // while staying isolated from other stores created in the same process.
        let uri = format!("file:{}?mode=memory&cache=shared", Uuid::new_v4());
        let db = Builder::new_local(uri).build().await?;
        let store = Self { db: Arc::new(db) };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Get a database connection.
    async fn conn(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    /// Ensure the database schema exists.
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(SCHEMA_EXPERIMENTS, ()).await?;
        conn.execute(SCHEMA_GOAL_TYPES, ()).await?;
        conn.execute(SCHEMA_PARTICIPANTS, ()).await?;
        conn.execute(INDEX_PARTICIPANTS_USER, ()).await?;
        conn.execute(INDEX_PARTICIPANTS_ANONYMOUS, ()).await?;
        conn.execute(SCHEMA_GOAL_RECORDS, ()).await?;
        conn.execute(INDEX_GOAL_RECORDS, ()).await?;
        conn.execute(SCHEMA_ENGAGEMENT_REPORTS, ()).await?;
        Ok(())
    }

    /// Parse an experiment from a database row.
    fn parse_experiment(row: &libsql::Row) -> Result<Experiment> {
        let id_str: String = row.get(0)?;
        let name: String = row.get(1)?;
        let state_str: String = row.get(2)?;
        let start_date_str: Option<String> = row.get(3)?;
        let end_date_str: Option<String> = row.get(4)?;
        let created_at_str: String = row.get(5)?;

        let state = ExperimentState::parse(&state_str)
            .ok_or_else(|| Error::InvalidData(format!("invalid experiment state: {state_str}")))?;

        Ok(Experiment {
            id: ExperimentId(parse_uuid(&id_str, "experiment id")?),
            name,
            state,
            start_date: start_date_str.as_deref().map(parse_date).transpose()?,
            end_date: end_date_str.as_deref().map(parse_date).transpose()?,
            created_at: parse_datetime(&created_at_str)?,
        })
    }

    /// Parse a participant from a database row.
    fn parse_participant(row: &libsql::Row) -> Result<Participant> {
        let id_str: String = row.get(0)?;
        let experiment_id_str: String = row.get(1)?;
        let user_id_str: Option<String> = row.get(2)?;
        let anonymous_id_str: Option<String> = row.get(3)?;
        let group_num: i64 = row.get(4)?;
        let enrolled_on_str: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;

        let visitor = match (user_id_str, anonymous_id_str) {
            (Some(user), None) => {
                VisitorIdentity::authenticated(UserId(parse_uuid(&user, "user id")?))
            }
            (None, Some(anon)) => {
                VisitorIdentity::anonymous(AnonymousId(parse_uuid(&anon, "anonymous id")?))
            }
            _ => {
                return Err(Error::InvalidData(
                    "participant must carry exactly one identity branch".to_string(),
                ));
            }
        };
        let group = Group::from_i64(group_num)
            .ok_or_else(|| Error::InvalidData(format!("invalid group: {group_num}")))?;

        Ok(Participant {
            id: ParticipantId(parse_uuid(&id_str, "participant id")?),
            experiment_id: ExperimentId(parse_uuid(&experiment_id_str, "experiment id")?),
            visitor,
            group,
            enrolled_on: parse_date(&enrolled_on_str)?,
            created_at: parse_datetime(&created_at_str)?,
        })
    }

    /// Parse a goal type from a database row.
    fn parse_goal_type(row: &libsql::Row) -> Result<GoalType> {
        let id_str: String = row.get(0)?;
        let name: String = row.get(1)?;
        let created_at_str: String = row.get(2)?;

        Ok(GoalType {
            id: GoalTypeId(parse_uuid(&id_str, "goal type id")?),
            name,
            created_at: parse_datetime(&created_at_str)?,
        })
    }

    /// Parse a daily engagement report from a database row.
    fn parse_report(row: &libsql::Row) -> Result<DailyEngagementReport> {
        let experiment_id_str: String = row.get(0)?;
        let date_str: String = row.get(1)?;
        let control_size: i64 = row.get(2)?;
        let test_size: i64 = row.get(3)?;
        let control_score: f64 = row.get(4)?;
        let test_score: f64 = row.get(5)?;
        let confidence: Option<f64> = row.get(6)?;

        Ok(DailyEngagementReport {
            experiment_id: ExperimentId(parse_uuid(&experiment_id_str, "experiment id")?),
            date: parse_date(&date_str)?,
            control_size: control_size as u64,
            test_size: test_size as u64,
            control_score,
            test_score,
            confidence,
        })
    }
}

#[async_trait]
impl Store for TursoStore {
    #[instrument(skip(self, experiment), fields(name = %experiment.name), level = "debug")]
    async fn create_experiment(&self, experiment: &Experiment) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO experiments (id, name, state, start_date, end_date, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                experiment.id.0.to_string(),
                experiment.name.clone(),
                experiment.state.as_str(),
                experiment.start_date.map(format_date),
                experiment.end_date.map(format_date),
                format_datetime(experiment.created_at)
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_experiment(&self, name: &str) -> Result<Option<Experiment>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE name = ?"),
                [name],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_experiment(&row)?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_experiments(&self) -> Result<Vec<Experiment>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EXPERIMENT_COLUMNS} FROM experiments ORDER BY created_at DESC, name"
                ),
                (),
            )
            .await?;

        let mut experiments = Vec::new();
        while let Some(row) = rows.next().await? {
            experiments.push(Self::parse_experiment(&row)?);
        }
        Ok(experiments)
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_experiment_state(&self, id: ExperimentId, state: ExperimentState) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE experiments SET state = ? WHERE id = ?",
            libsql::params![state.as_str(), id.0.to_string()],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, goal_type), fields(name = %goal_type.name), level = "debug")]
    async fn create_goal_type(&self, goal_type: &GoalType) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO goal_types (id, name, created_at) VALUES (?, ?, ?)",
            libsql::params![
                goal_type.id.0.to_string(),
                goal_type.name.clone(),
                format_datetime(goal_type.created_at)
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_goal_type(&self, name: &str) -> Result<Option<GoalType>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, created_at FROM goal_types WHERE name = ?",
                [name],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_goal_type(&row)?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_goal_types(&self) -> Result<Vec<GoalType>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, created_at FROM goal_types ORDER BY name",
                (),
            )
            .await?;

        let mut goal_types = Vec::new();
        while let Some(row) = rows.next().await? {
            goal_types.push(Self::parse_goal_type(&row)?);
        }
        Ok(goal_types)
    }

    #[instrument(skip(self, visitor), level = "debug")]
    async fn find_participant(
        &self,
        experiment_id: ExperimentId,
        visitor: &VisitorIdentity,
    ) -> Result<Option<Participant>> {
        let conn = self.conn().await?;
        let mut rows = match visitor {
            VisitorIdentity::Authenticated { user_id } => {
                conn.query(
                    &format!(
                        "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE experiment_id = ? AND user_id = ?"
                    ),
                    libsql::params![experiment_id.0.to_string(), user_id.0.to_string()],
                )
                .await?
            }
            VisitorIdentity::Anonymous { anonymous_id } => {
                conn.query(
                    &format!(
                        "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE experiment_id = ? AND anonymous_id = ?"
                    ),
                    libsql::params![experiment_id.0.to_string(), anonymous_id.0.to_string()],
                )
                .await?
            }
        };

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_participant(&row)?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self, participant), level = "debug")]
    async fn insert_participant_if_absent(
        &self,
        participant: &Participant,
    ) -> Result<(Participant, bool)> {
        let (user_id, anonymous_id) = identity_columns(&participant.visitor);

        let conn = self.conn().await?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO participants (id, experiment_id, user_id, anonymous_id, grp, enrolled_on, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    participant.id.0.to_string(),
                    participant.experiment_id.0.to_string(),
                    user_id,
                    anonymous_id,
                    participant.group.as_i64(),
                    format_date(participant.enrolled_on),
                    format_datetime(participant.created_at)
                ],
            )
            .await?;

        if changed > 0 {
            return Ok((participant.clone(), true));
        }

        // The uniqueness constraint swallowed the insert: a row for this
        // visitor already exists. Return the winner.
        match self
            .find_participant(participant.experiment_id, &participant.visitor)
            .await?
        {
            Some(winner) => Ok((winner, false)),
            None => Err(Error::InvalidData(
                "participant insert ignored but no existing row found".to_string(),
            )),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn participants_enrolled_by(
        &self,
        experiment_id: ExperimentId,
        date: NaiveDate,
    ) -> Result<Vec<Participant>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE experiment_id = ? AND enrolled_on <= ? ORDER BY enrolled_on"
                ),
                libsql::params![experiment_id.0.to_string(), format_date(date)],
            )
            .await?;

        let mut participants = Vec::new();
        while let Some(row) = rows.next().await? {
            participants.push(Self::parse_participant(&row)?);
        }
        Ok(participants)
    }

    #[instrument(skip(self, visitor), level = "debug")]
    async fn active_enrollments_for(
        &self,
        visitor: &VisitorIdentity,
    ) -> Result<Vec<Participant>> {
        let (column, value) = match visitor {
            VisitorIdentity::Authenticated { user_id } => ("user_id", user_id.0.to_string()),
            VisitorIdentity::Anonymous { anonymous_id } => {
                ("anonymous_id", anonymous_id.0.to_string())
            }
        };

        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT p.id, p.experiment_id, p.user_id, p.anonymous_id, p.grp, p.enrolled_on, p.created_at \
                     FROM participants p \
                     JOIN experiments e ON e.id = p.experiment_id \
                     WHERE e.state = 'enabled' AND p.{column} = ?"
                ),
                [value],
            )
            .await?;

        let mut participants = Vec::new();
        while let Some(row) = rows.next().await? {
            participants.push(Self::parse_participant(&row)?);
        }
        Ok(participants)
    }

    #[instrument(skip(self), level = "debug")]
    async fn group_sizes(
        &self,
        experiment_id: ExperimentId,
        date: NaiveDate,
    ) -> Result<GroupSizes> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT grp, COUNT(*) FROM participants WHERE experiment_id = ? AND enrolled_on <= ? GROUP BY grp",
                libsql::params![experiment_id.0.to_string(), format_date(date)],
            )
            .await?;

        let mut sizes = GroupSizes::default();
        while let Some(row) = rows.next().await? {
            let group_num: i64 = row.get(0)?;
            let count: i64 = row.get(1)?;
            match Group::from_i64(group_num) {
                Some(Group::Control) => sizes.control = count as u64,
                Some(Group::Test) => sizes.test = count as u64,
                None => {
                    return Err(Error::InvalidData(format!("invalid group: {group_num}")));
                }
            }
        }
        Ok(sizes)
    }

    #[instrument(skip(self, record), level = "debug")]
    async fn insert_goal_record(&self, record: &GoalRecord) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO goal_records (id, goal_type_id, participant_id, recorded_on, recorded_at) VALUES (?, ?, ?, ?, ?)",
            libsql::params![
                record.id.0.to_string(),
                record.goal_type_id.0.to_string(),
                record.participant_id.0.to_string(),
                format_date(record.recorded_on),
                format_datetime(record.recorded_at)
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn conversion_counts(
        &self,
        experiment_id: ExperimentId,
        date: NaiveDate,
    ) -> Result<Vec<GoalTally>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT gt.name, p.grp, COUNT(*) \
                 FROM goal_records gr \
                 JOIN participants p ON p.id = gr.participant_id \
                 JOIN goal_types gt ON gt.id = gr.goal_type_id \
                 WHERE p.experiment_id = ? AND p.enrolled_on <= ? AND gr.recorded_on <= ? \
                 GROUP BY gt.name, p.grp \
                 ORDER BY gt.name, p.grp",
                libsql::params![
                    experiment_id.0.to_string(),
                    format_date(date),
                    format_date(date)
                ],
            )
            .await?;

        let mut tallies = Vec::new();
        while let Some(row) = rows.next().await? {
            let goal_type: String = row.get(0)?;
            let group_num: i64 = row.get(1)?;
            let count: i64 = row.get(2)?;
            let group = Group::from_i64(group_num)
                .ok_or_else(|| Error::InvalidData(format!("invalid group: {group_num}")))?;
            tallies.push(GoalTally {
                goal_type,
                group,
                count: count as u64,
            });
        }
        Ok(tallies)
    }

    #[instrument(skip(self, report), fields(date = %report.date), level = "debug")]
    async fn upsert_engagement_report(&self, report: &DailyEngagementReport) -> Result<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO daily_engagement_reports (experiment_id, date, control_size, test_size, control_score, test_score, confidence) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (experiment_id, date) DO UPDATE SET \
                 control_size = excluded.control_size, \
                 test_size = excluded.test_size, \
                 control_score = excluded.control_score, \
                 test_score = excluded.test_score, \
                 confidence = excluded.confidence",
            libsql::params![
                report.experiment_id.0.to_string(),
                format_date(report.date),
                report.control_size as i64,
                report.test_size as i64,
                report.control_score,
                report.test_score,
                report.confidence
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_engagement_report(
        &self,
        experiment_id: ExperimentId,
        date: NaiveDate,
    ) -> Result<Option<DailyEngagementReport>> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT experiment_id, date, control_size, test_size, control_score, test_score, confidence \
                 FROM daily_engagement_reports WHERE experiment_id = ? AND date = ?",
                libsql::params![experiment_id.0.to_string(), format_date(date)],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_report(&row)?))
        } else {
            Ok(None)
        }
    }
}

/// Split an identity into its (user_id, anonymous_id) column values.
fn identity_columns(visitor: &VisitorIdentity) -> (Option<String>, Option<String>) {
    match visitor {
        VisitorIdentity::Authenticated { user_id } => (Some(user_id.0.to_string()), None),
        VisitorIdentity::Anonymous { anonymous_id } => (None, Some(anonymous_id.0.to_string())),
    }
}

/// Format a datetime for storage.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a datetime from storage.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidData(format!("invalid datetime: {s}")))
}

/// Format a date for storage (ISO, so string comparison is date order).
fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a date from storage.
fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::InvalidData(format!("invalid date: {s}")))
}

/// Parse a UUID from storage.
fn parse_uuid(s: &str, what: &str) -> Result<Uuid> {
    s.parse()
        .map_err(|_| Error::InvalidData(format!("invalid {what}: {s}")))
}
