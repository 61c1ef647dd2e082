//! Goal conversion recording.
//!
//! Recording is beacon-friendly: an unknown goal name is logged and
//! swallowed, and a visitor with no enrollments is a no-op. The tracking
//! pixel that triggers this path must always succeed from the client's
//! point of view.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::analytics::{AnalyticsDispatcher, AnalyticsEvent, VisitorContext};
use crate::goals::GoalRecord;
use crate::identity::Visitor;
use crate::storage::{self, Store};

/// Appends goal records for enrolled visitors.
pub struct GoalRecorder {
    store: Arc<dyn Store>,
    analytics: Arc<AnalyticsDispatcher>,
}

impl GoalRecorder {
    /// Create a new recorder.
    pub fn new(store: Arc<dyn Store>, analytics: Arc<AnalyticsDispatcher>) -> Self {
        Self { store, analytics }
    }

    /// Record a conversion for every enabled experiment the visitor is
    /// enrolled in. Returns the number of records written.
    ///
    /// Unknown goal names and unenrolled visitors both yield `Ok(0)`;
    /// neither is a caller-visible failure.
    #[instrument(skip(self, visitor), level = "debug")]
    pub async fn record_goal(
        &self,
        goal_name: &str,
        visitor: &Visitor,
    ) -> Result<usize, storage::Error> {
        let Some(goal_type) = self.store.get_goal_type(goal_name).await? else {
            warn!(goal = goal_name, "unknown goal type");
            return Ok(0);
        };

        let enrollments = self.store.active_enrollments_for(&visitor.identity).await?;
        if enrollments.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        for participant in &enrollments {
            let record = GoalRecord::new(goal_type.id, participant.id);
            self.store.insert_goal_record(&record).await?;
            written += 1;
        }

        debug!(goal = goal_name, written, "recorded goal conversions");
        self.analytics.dispatch(AnalyticsEvent::GoalRecorded {
            goal_type: goal_type.name,
            ctx: VisitorContext::of(visitor),
        });

        Ok(written)
    }
}
