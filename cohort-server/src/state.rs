//! Shared application state for the cohort server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cohort_core::{
    ActivityTracker, AnalyticsDispatcher, AnalyticsSink, AssignmentService, GoalRecorder,
    IdentityResolver, MemoryActivity, MemoryResolver, NoopSink, ReportBuilder, Store, TursoStore,
};

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Shared application state accessible by all handlers
pub struct AppState {
    /// Persistent experiment store
    pub store: Arc<dyn Store>,
    /// Assignment service
    pub assignment: Arc<AssignmentService>,
    /// Goal recorder
    pub recorder: Arc<GoalRecorder>,
    /// Report builder
    pub reports: Arc<ReportBuilder>,
    /// Identity resolver
    pub resolver: Arc<dyn IdentityResolver>,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Open the configured database with default collaborators: no
    /// analytics forwarding, no external activity source, and a resolver
    /// that requires explicit human confirmation.
    pub async fn open(config: &ServerConfig) -> Result<Self, ServerError> {
        let store = Arc::new(TursoStore::new_local(&config.database).await?);
        Ok(Self::with_components(
            store,
            Arc::new(MemoryActivity::new()),
            Arc::new(NoopSink),
            Arc::new(MemoryResolver::new()),
        ))
    }

    /// Create AppState with custom collaborators (real analytics and
    /// activity sources, or testing).
    pub fn with_components(
        store: Arc<dyn Store>,
        activity: Arc<dyn ActivityTracker>,
        sink: Arc<dyn AnalyticsSink>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        let analytics = Arc::new(AnalyticsDispatcher::spawn(sink, 256));
        let assignment = Arc::new(AssignmentService::new(store.clone(), analytics.clone()));
        let recorder = Arc::new(GoalRecorder::new(store.clone(), analytics));
        let reports = Arc::new(ReportBuilder::new(store.clone(), activity));
        Self {
            store,
            assignment,
            recorder,
            reports,
            resolver,
            started_at: Utc::now(),
        }
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
