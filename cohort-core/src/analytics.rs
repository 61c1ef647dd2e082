//! Fire-and-forget notifications to an external analytics tracker.
//!
//! Enrollment and goal events are pushed through a bounded queue drained
//! by a detached worker task. Delivery is best-effort: a full queue drops
//! the event and a failing sink is logged, so the assignment and recording
//! paths never block on or fail because of analytics.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::identity::{Visitor, VisitorIdentity};
use crate::participant::Group;

/// Error from the external analytics transport.
#[derive(Debug, Error)]
#[error("analytics delivery failed: {0}")]
pub struct SinkError(pub String);

/// Best-effort visitor context attached to every notification.
#[derive(Debug, Clone)]
pub struct VisitorContext {
    /// The visitor the event belongs to
    pub identity: VisitorIdentity,
    /// Remote address, when known
    pub remote_addr: Option<IpAddr>,
    /// When the event happened
    pub at: DateTime<Utc>,
}

impl VisitorContext {
    /// Context for a resolved visitor, stamped now.
    #[must_use]
    pub fn of(visitor: &Visitor) -> Self {
        Self {
            identity: visitor.identity.clone(),
            remote_addr: visitor.remote_addr,
            at: Utc::now(),
        }
    }
}

/// A notification queued for the external tracker.
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    /// A visitor was enrolled in an experiment for the first time
    Enrolled {
        experiment: String,
        group: Group,
        ctx: VisitorContext,
    },
    /// A goal conversion was recorded
    GoalRecorded { goal_type: String, ctx: VisitorContext },
}

/// External analytics transport (e.g. a third-party event tracker).
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Deliver an "Enrolled In Experiment" event.
    async fn enrolled(
        &self,
        experiment: &str,
        group: Group,
        ctx: &VisitorContext,
    ) -> Result<(), SinkError>;

    /// Deliver a "Goal Recorded" event.
    async fn goal_recorded(&self, goal_type: &str, ctx: &VisitorContext) -> Result<(), SinkError>;
}

/// Sink that drops every event; the default when no tracker is wired up.
pub struct NoopSink;

#[async_trait]
impl AnalyticsSink for NoopSink {
    async fn enrolled(
        &self,
        _experiment: &str,
        _group: Group,
        _ctx: &VisitorContext,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    async fn goal_recorded(
        &self,
        _goal_type: &str,
        _ctx: &VisitorContext,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Non-blocking front door to the analytics sink.
///
/// Events go through a bounded channel; a worker spawned at construction
/// drains it and calls the sink. Dropping the dispatcher closes the
/// channel and lets the worker finish the backlog and exit.
pub struct AnalyticsDispatcher {
    tx: mpsc::Sender<AnalyticsEvent>,
}

impl AnalyticsDispatcher {
    /// Spawn the worker task and return the dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(sink: Arc<dyn AnalyticsSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AnalyticsEvent>(capacity);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let result = match &event {
                    AnalyticsEvent::Enrolled {
                        experiment,
                        group,
                        ctx,
                    } => sink.enrolled(experiment, *group, ctx).await,
                    AnalyticsEvent::GoalRecorded { goal_type, ctx } => {
                        sink.goal_recorded(goal_type, ctx).await
                    }
                };
                if let Err(error) = result {
                    warn!(%error, "analytics delivery failed");
                }
            }
        });
        Self { tx }
    }

    /// Dispatcher that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::spawn(Arc::new(NoopSink), 1)
    }

    /// Enqueue an event without waiting. A full or closed queue drops the
    /// event; delivery is best-effort by contract.
    pub fn dispatch(&self, event: AnalyticsEvent) {
        if let Err(error) = self.tx.try_send(event) {
            warn!(%error, "analytics event dropped");
        }
    }
}
