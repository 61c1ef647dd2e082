//! Participant rows: the durable binding of a visitor to an experiment.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::VisitorIdentity;
use crate::types::{ExperimentId, ParticipantId};

/// The group a participant was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    /// Baseline behavior
    Control,
    /// Variant under test
    Test,
}

impl Group {
    /// Convert to the stored integer representation (control=0, test=1).
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Control => 0,
            Self::Test => 1,
        }
    }

    /// Parse from the stored integer representation.
    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Control),
            1 => Some(Self::Test),
            _ => None,
        }
    }

    /// Human-readable name, as forwarded to analytics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Test => "test",
        }
    }
}

/// One visitor's permanent membership in one experiment.
///
/// Created on first assignment and never mutated or deleted afterwards;
/// historical reports depend on its immutability. At most one row exists
/// per (visitor, experiment), enforced by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique identifier
    pub id: ParticipantId,

    /// Experiment this participant belongs to
    pub experiment_id: ExperimentId,

    /// The visitor bound by this row
    pub visitor: VisitorIdentity,

    /// Assigned group, fixed for the visitor's lifetime
    pub group: Group,

    /// Date of enrollment; cohorts are cumulative over this date
    pub enrolled_on: NaiveDate,

    /// When the row was created
    pub created_at: DateTime<Utc>,
}

impl Participant {
    /// Create a participant enrolled as of now.
    #[must_use]
    pub fn new(experiment_id: ExperimentId, visitor: VisitorIdentity, group: Group) -> Self {
        let now = Utc::now();
        Self {
            id: ParticipantId::new(),
            experiment_id,
            visitor,
            group,
            enrolled_on: now.date_naive(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnonymousId;

    #[test]
    fn group_integer_roundtrip() {
        assert_eq!(Group::Control.as_i64(), 0);
        assert_eq!(Group::Test.as_i64(), 1);
        assert_eq!(Group::from_i64(0), Some(Group::Control));
        assert_eq!(Group::from_i64(1), Some(Group::Test));
        assert_eq!(Group::from_i64(2), None);
    }

    #[test]
    fn group_as_str_returns_correct_values() {
        assert_eq!(Group::Control.as_str(), "control");
        assert_eq!(Group::Test.as_str(), "test");
    }

    #[test]
    fn new_participant_is_enrolled_today() {
        let participant = Participant::new(
            ExperimentId::new(),
            VisitorIdentity::anonymous(AnonymousId::new()),
            Group::Test,
        );
        assert_eq!(participant.enrolled_on, participant.created_at.date_naive());
    }

    #[test]
    fn participant_serialization_roundtrip() {
        let participant = Participant::new(
            ExperimentId::new(),
            VisitorIdentity::anonymous(AnonymousId::new()),
            Group::Control,
        );

        let json = serde_json::to_string(&participant).unwrap();
        let parsed: Participant = serde_json::from_str(&json).unwrap();
        assert_eq!(participant, parsed);
    }
}
