//! REST API handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDate, Utc};
use cohort_core::{AssignError, DailyReport, Experiment, ExperimentState, Group};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::beacon::request_context;
use crate::state::AppState;

/// Error responses for the JSON API.
#[derive(Debug)]
pub enum ApiError {
    /// Unknown experiment
    NotFound,
    /// Anything the caller cannot fix
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "not found"})),
            )
                .into_response(),
            ApiError::Internal(message) => {
                error!(%message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"error": "internal error"})),
                )
                    .into_response()
            }
        }
    }
}

impl From<cohort_core::storage::Error> for ApiError {
    fn from(error: cohort_core::storage::Error) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<cohort_core::ReportError> for ApiError {
    fn from(error: cohort_core::ReportError) -> Self {
        Self::Internal(error.to_string())
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Experiment metadata for list and report views
#[derive(Debug, Serialize, Deserialize)]
pub struct ExperimentSummary {
    /// Experiment name
    pub name: String,
    /// Lifecycle state
    pub state: ExperimentState,
    /// First data-collection date
    pub start_date: Option<NaiveDate>,
    /// Last data-collection date
    pub end_date: Option<NaiveDate>,
}

impl From<Experiment> for ExperimentSummary {
    fn from(experiment: Experiment) -> Self {
        Self {
            name: experiment.name,
            state: experiment.state,
            start_date: experiment.start_date,
            end_date: experiment.end_date,
        }
    }
}

/// Response for listing experiments
#[derive(Debug, Serialize, Deserialize)]
pub struct ExperimentListResponse {
    /// All experiments, newest first
    pub experiments: Vec<ExperimentSummary>,
}

/// List all experiments
pub async fn list_experiments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExperimentListResponse>, ApiError> {
    let experiments = state.store.list_experiments().await?;
    Ok(Json(ExperimentListResponse {
        experiments: experiments.into_iter().map(ExperimentSummary::from).collect(),
    }))
}

/// Assignment response
#[derive(Debug, Serialize, Deserialize)]
pub struct AssignResponse {
    /// Whether the visitor participates in the experiment
    pub participating: bool,
    /// The visitor's group, when participating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    /// Whether this request created the enrollment
    pub created: bool,
}

/// POST /api/experiments/:name/assign - resolve the visitor's group.
///
/// An ineligible visitor (disabled experiment, unconfirmed traffic) is a
/// normal `participating: false` answer, never a failure.
pub async fn assign(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AssignResponse>, ApiError> {
    let experiment = state
        .store
        .get_experiment(&name)
        .await?
        .ok_or(ApiError::NotFound)?;

    let ctx = request_context(&headers);
    let visitor = state.resolver.resolve(&ctx).await;

    match state.assignment.assign(&experiment, &visitor).await {
        Ok(assignment) => Ok(Json(AssignResponse {
            participating: true,
            group: Some(assignment.group),
            created: assignment.created,
        })),
        Err(AssignError::NotEligible(reason)) => {
            debug!(experiment = %name, %reason, "assignment refused");
            Ok(Json(AssignResponse {
                participating: false,
                group: None,
                created: false,
            }))
        }
        Err(AssignError::Storage(error)) => Err(ApiError::Internal(error.to_string())),
    }
}

/// Date range for a report request; defaults to the experiment's report
/// window.
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// First date (inclusive)
    pub start: Option<NaiveDate>,
    /// Last date (inclusive)
    pub end: Option<NaiveDate>,
}

/// Daily report response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    /// The experiment the series belongs to
    pub experiment: ExperimentSummary,
    /// Daily entries, newest first
    pub days: Vec<DailyReport>,
}

/// GET /api/experiments/:name/report - merged daily time series.
pub async fn experiment_report(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportResponse>, ApiError> {
    let experiment = state
        .store
        .get_experiment(&name)
        .await?
        .ok_or(ApiError::NotFound)?;

    let window = experiment.report_window(Utc::now().date_naive());
    let start = query.start.or(window.map(|w| w.0));
    let end = query.end.or(window.map(|w| w.1));

    let days = match (start, end) {
        (Some(start), Some(end)) if start <= end => {
            state.reports.time_series(&experiment, start, end).await?
        }
        _ => Vec::new(),
    };

    Ok(Json(ReportResponse {
        experiment: ExperimentSummary::from(experiment),
        days,
    }))
}
