//! Goal types and goal conversion records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GoalRecordId, GoalTypeId, ParticipantId};

/// A named conversion action (e.g. "signup", "purchase").
///
/// Immutable reference data; goals are registered once and looked up by
/// name when beacons fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalType {
    /// Unique identifier
    pub id: GoalTypeId,

    /// Unique name used by tracking beacons
    pub name: String,

    /// When the goal type was registered
    pub created_at: DateTime<Utc>,
}

impl GoalType {
    /// Register a new goal type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GoalTypeId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// One conversion event for one participant.
///
/// Append-only; repeat conversions are individual rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    /// Unique identifier
    pub id: GoalRecordId,

    /// The converted goal
    pub goal_type_id: GoalTypeId,

    /// The participant who converted
    pub participant_id: ParticipantId,

    /// Calendar date of the conversion; reports cumulate over this
    pub recorded_on: NaiveDate,

    /// Exact time of the conversion
    pub recorded_at: DateTime<Utc>,
}

impl GoalRecord {
    /// Record a conversion happening now.
    #[must_use]
    pub fn new(goal_type_id: GoalTypeId, participant_id: ParticipantId) -> Self {
        let now = Utc::now();
        Self {
            id: GoalRecordId::new(),
            goal_type_id,
            participant_id,
            recorded_on: now.date_naive(),
            recorded_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_goal_record_is_dated_today() {
        let record = GoalRecord::new(GoalTypeId::new(), ParticipantId::new());
        assert_eq!(record.recorded_on, record.recorded_at.date_naive());
    }

    #[test]
    fn goal_type_serialization_roundtrip() {
        let goal = GoalType::new("signup");
        let json = serde_json::to_string(&goal).unwrap();
        let parsed: GoalType = serde_json::from_str(&json).unwrap();
        assert_eq!(goal, parsed);
    }
}
