//! HTTP server module

mod api;
mod beacon;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub use api::{
    ApiError, AssignResponse, ExperimentListResponse, ExperimentSummary, HealthResponse,
    ReportQuery, ReportResponse,
};
pub use beacon::TRANSPARENT_1X1_PNG;

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/goal/:name", get(beacon::record_goal))
        .route("/confirm-human", post(beacon::confirm_human))
        .route("/api/health", get(api::health))
        .route("/api/experiments", get(api::list_experiments))
        .route("/api/experiments/:name/assign", post(api::assign))
        .route("/api/experiments/:name/report", get(api::experiment_report))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use chrono::NaiveDate;
    use cohort_core::{
        Experiment, ExperimentState, GoalType, Group, MemoryActivity, MemoryResolver, NoopSink,
        Store, TursoStore,
    };
    use uuid::Uuid;

    const VISITOR_HEADER: &str = "x-cohort-visitor";

    async fn test_server() -> (TestServer, Arc<TursoStore>) {
        let store = Arc::new(TursoStore::new_memory().await.unwrap());
        let state = Arc::new(AppState::with_components(
            store.clone(),
            Arc::new(MemoryActivity::new()),
            Arc::new(NoopSink),
            Arc::new(MemoryResolver::new()),
        ));
        (TestServer::new(create_router(state)).unwrap(), store)
    }

    fn visitor_header(token: &str) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static(VISITOR_HEADER),
            HeaderValue::from_str(token).unwrap(),
        )
    }

    async fn create_enabled_experiment(store: &TursoStore, name: &str) -> Experiment {
        let mut experiment = Experiment::new(name);
        experiment.state = ExperimentState::Enabled;
        experiment.start_date = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        store.create_experiment(&experiment).await.unwrap();
        experiment
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let (server, _store) = test_server().await;

        let response = server.get("/api/health").await;
        response.assert_status_ok();

        let health: HealthResponse = response.json();
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn goal_beacon_returns_the_pixel_for_unknown_goals() {
        let (server, _store) = test_server().await;

        let response = server.get("/goal/never-registered").await;
        response.assert_status_ok();
        assert_eq!(response.header("content-type"), "image/png");
        assert_eq!(response.as_bytes().as_ref(), TRANSPARENT_1X1_PNG);
    }

    #[tokio::test]
    async fn confirm_human_returns_no_content() {
        let (server, _store) = test_server().await;
        let (name, value) = visitor_header(&Uuid::now_v7().to_string());

        let response = server.post("/confirm-human").add_header(name, value).await;
        response.assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn assign_requires_a_confirmed_visitor() {
        let (server, store) = test_server().await;
        create_enabled_experiment(&store, "signup-button").await;
        let token = Uuid::now_v7().to_string();

        // Not confirmed yet: refused, rendered as non-participation.
        let (name, value) = visitor_header(&token);
        let response = server
            .post("/api/experiments/signup-button/assign")
            .add_header(name, value)
            .await;
        response.assert_status_ok();
        let body: AssignResponse = response.json();
        assert!(!body.participating);
        assert!(body.group.is_none());

        // Confirm, then assignment sticks.
        let (name, value) = visitor_header(&token);
        server.post("/confirm-human").add_header(name, value).await;

        let (name, value) = visitor_header(&token);
        let first: AssignResponse = server
            .post("/api/experiments/signup-button/assign")
            .add_header(name, value)
            .await
            .json();
        assert!(first.participating);
        assert!(first.created);

        let (name, value) = visitor_header(&token);
        let second: AssignResponse = server
            .post("/api/experiments/signup-button/assign")
            .add_header(name, value)
            .await
            .json();
        assert_eq!(second.group, first.group);
        assert!(!second.created);
    }

    #[tokio::test]
    async fn assign_unknown_experiment_is_not_found() {
        let (server, _store) = test_server().await;
        let (name, value) = visitor_header(&Uuid::now_v7().to_string());

        let response = server
            .post("/api/experiments/missing/assign")
            .add_header(name, value)
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn goal_beacon_records_for_enrolled_visitors() {
        let (server, store) = test_server().await;
        let experiment = create_enabled_experiment(&store, "signup-button").await;
        store.create_goal_type(&GoalType::new("signup")).await.unwrap();
        let token = Uuid::now_v7().to_string();

        let (name, value) = visitor_header(&token);
        server.post("/confirm-human").add_header(name, value).await;
        let (name, value) = visitor_header(&token);
        server
            .post("/api/experiments/signup-button/assign")
            .add_header(name, value)
            .await;

        let (name, value) = visitor_header(&token);
        let response = server.get("/goal/signup").add_header(name, value).await;
        response.assert_status_ok();

        let tallies = store
            .conversion_counts(experiment.id, chrono::Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].count, 1);
    }

    #[tokio::test]
    async fn experiments_are_listed() {
        let (server, store) = test_server().await;
        create_enabled_experiment(&store, "one").await;
        create_enabled_experiment(&store, "two").await;

        let response = server.get("/api/experiments").await;
        response.assert_status_ok();
        let body: ExperimentListResponse = response.json();
        assert_eq!(body.experiments.len(), 2);
    }

    #[tokio::test]
    async fn report_returns_days_for_an_explicit_range() {
        let (server, store) = test_server().await;
        let experiment = create_enabled_experiment(&store, "exp").await;

        // One participant so the conversion snapshot has a cohort.
        let visitor = cohort_core::VisitorIdentity::anonymous(cohort_core::AnonymousId::new());
        let mut participant =
            cohort_core::Participant::new(experiment.id, visitor, Group::Control);
        participant.enrolled_on = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        store
            .insert_participant_if_absent(&participant)
            .await
            .unwrap();

        let response = server
            .get("/api/experiments/exp/report?start=2026-01-05&end=2026-01-07")
            .await;
        response.assert_status_ok();
        let body: ReportResponse = response.json();

        assert_eq!(body.days.len(), 3);
        assert_eq!(
            body.days[0].date,
            NaiveDate::from_ymd_opt(2026, 1, 7).unwrap()
        );
        // No engagement batch has run: every day is a gap, conversions
        // are still present.
        assert!(body.days.iter().all(|day| day.activity.is_none()));
        assert!(
            body.days
                .iter()
                .all(|day| day.conversions.control_size == 1)
        );
    }

    #[tokio::test]
    async fn report_for_unknown_experiment_is_not_found() {
        let (server, _store) = test_server().await;

        let response = server.get("/api/experiments/missing/report").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
