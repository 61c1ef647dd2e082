//! Core identifier types for the cohort engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentId(pub Uuid);

impl ExperimentId {
    /// Create a new experiment ID with a UUIDv7 (time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a participant row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Create a new participant ID with a UUIDv7 (time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a goal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalTypeId(pub Uuid);

impl GoalTypeId {
    /// Create a new goal type ID with a UUIDv7 (time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for GoalTypeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a goal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalRecordId(pub Uuid);

impl GoalRecordId {
    /// Create a new goal record ID with a UUIDv7 (time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for GoalRecordId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable account id for an authenticated visitor.
///
/// Minted by the external identity system; the engine only stores and
/// compares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

/// Stable id for an anonymous visitor, minted on first contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnonymousId(pub Uuid);

impl AnonymousId {
    /// Mint a fresh anonymous visitor id (UUIDv7, creation-timestamped).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AnonymousId {
    fn default() -> Self {
        Self::new()
    }
}
