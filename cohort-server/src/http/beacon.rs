//! Tracking beacon and human-confirmation endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use cohort_core::RequestContext;
use tracing::warn;

use crate::state::AppState;

/// Fixed 1x1 transparent PNG served by the goal beacon.
pub const TRANSPARENT_1X1_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x03, 0x00, 0x00, 0x00, 0x28,
    0xcb, 0x34, 0xbb, 0x00, 0x00, 0x00, 0x19, 0x74, 0x45, 0x58, 0x74, 0x53, 0x6f, 0x66, 0x74,
    0x77, 0x61, 0x72, 0x65, 0x00, 0x41, 0x64, 0x6f, 0x62, 0x65, 0x20, 0x49, 0x6d, 0x61, 0x67,
    0x65, 0x52, 0x65, 0x61, 0x64, 0x79, 0x71, 0xc9, 0x65, 0x3c, 0x00, 0x00, 0x00, 0x06, 0x50,
    0x4c, 0x54, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xa5, 0x67, 0xb9, 0xcf, 0x00, 0x00,
    0x00, 0x01, 0x74, 0x52, 0x4e, 0x53, 0x00, 0x40, 0xe6, 0xd8, 0x66, 0x00, 0x00, 0x00, 0x0c,
    0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x62, 0x60, 0x00, 0x08, 0x30, 0x00, 0x00, 0x02, 0x00,
    0x01, 0x4f, 0x6d, 0x59, 0xe1, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42,
    0x60, 0x82, 0x00,
];

/// Header carrying the opaque visitor token.
const VISITOR_HEADER: &str = "x-cohort-visitor";

/// Build the resolver context from request headers.
pub(crate) fn request_context(headers: &HeaderMap) -> RequestContext {
    let visitor_token = headers
        .get(VISITOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let remote_addr = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .and_then(|raw| raw.trim().parse().ok());
    RequestContext {
        visitor_token,
        remote_addr,
    }
}

/// GET /goal/:name - goal tracking pixel.
///
/// Always answers 200 with the transparent PNG, whatever happened inside;
/// client-side tracking pixels must never surface errors.
pub async fn record_goal(
    State(state): State<Arc<AppState>>,
    Path(goal_name): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let ctx = request_context(&headers);
    let visitor = state.resolver.resolve(&ctx).await;
    if let Err(error) = state.recorder.record_goal(&goal_name, &visitor).await {
        warn!(goal = %goal_name, %error, "goal recording failed");
    }
    ([(header::CONTENT_TYPE, "image/png")], TRANSPARENT_1X1_PNG)
}

/// POST /confirm-human - mark the requesting visitor as non-bot traffic.
pub async fn confirm_human(State(state): State<Arc<AppState>>, headers: HeaderMap) -> StatusCode {
    let ctx = request_context(&headers);
    state.resolver.confirm_human(&ctx).await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn png_constant_is_a_png() {
        // PNG magic bytes.
        assert_eq!(
            &TRANSPARENT_1X1_PNG[..8],
            &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]
        );
    }

    #[test]
    fn request_context_reads_visitor_and_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(VISITOR_HEADER, HeaderValue::from_static("token-123"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );

        let ctx = request_context(&headers);
        assert_eq!(ctx.visitor_token.as_deref(), Some("token-123"));
        assert_eq!(ctx.remote_addr, Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn request_context_is_empty_without_headers() {
        let ctx = request_context(&HeaderMap::new());
        assert!(ctx.visitor_token.is_none());
        assert!(ctx.remote_addr.is_none());
    }
}
