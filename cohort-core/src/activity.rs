//! External engagement-score source.
//!
//! Engagement scores live outside the engine (page views, session length,
//! whatever the site tracks); the aggregation step reads them through this
//! seam, keyed by visitor identity and date.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::identity::VisitorIdentity;

/// Error from the external activity source.
#[derive(Debug, Error)]
#[error("activity source unavailable: {0}")]
pub struct ActivityError(pub String);

/// Read-only source of per-visitor daily engagement scores.
#[async_trait]
pub trait ActivityTracker: Send + Sync {
    /// The engagement score for one visitor on one day, if the tracker
    /// recorded any activity.
    async fn daily_score(
        &self,
        visitor: &VisitorIdentity,
        date: NaiveDate,
    ) -> Result<Option<f64>, ActivityError>;
}

/// In-memory tracker for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryActivity {
    scores: RwLock<HashMap<(VisitorIdentity, NaiveDate), f64>>,
}

impl MemoryActivity {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the score for a visitor on a date.
    pub fn set_score(&self, visitor: VisitorIdentity, date: NaiveDate, score: f64) {
        self.scores
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((visitor, date), score);
    }
}

#[async_trait]
impl ActivityTracker for MemoryActivity {
    async fn daily_score(
        &self,
        visitor: &VisitorIdentity,
        date: NaiveDate,
    ) -> Result<Option<f64>, ActivityError> {
        Ok(self
            .scores
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(visitor.clone(), date))
            .copied())
    }
}
