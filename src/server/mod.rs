//! HTTP boundary: metrics exposition and the interactive OAuth endpoints
//!
//! `/metrics` never fails a scrape over token trouble; the collector degrades
//! to its status gauge instead. The two oauth endpoints drive the operator's
//! one-time browser consent.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{AuthError, AuthorizationFlow, TokenManager};
use crate::collector::Collector;

#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenManager>,
    pub flow: Arc<AuthorizationFlow>,
    pub collector: Arc<Collector>,
    pub prometheus: PrometheusHandle,
}

/// Build the exporter router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/oauth.auth", get(auth_handler))
        .route("/oauth.redirect", get(redirect_handler))
        .with_state(state)
}

/// Collect, then render. Always 200: a stale token must degrade the scrape,
/// not fail it.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.collector.collect().await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}

/// Send the operator's browser to the vendor consent page, unless a
/// credential already exists.
async fn auth_handler(State(state): State<AppState>) -> Response {
    if state.tokens.is_authenticated().await {
        return "Authorized".into_response();
    }
    let url = state.flow.begin().await;
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

#[derive(Debug, Deserialize)]
struct RedirectQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Vendor redirect target: validate state, exchange the code.
async fn redirect_handler(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
) -> Response {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::warn!("Consent was denied: {} {}", error, description);
        return (
            StatusCode::BAD_REQUEST,
            format!("Authorization failed: {error} {description}"),
        )
            .into_response();
    }

    let (Some(code), Some(auth_state)) = (query.code, query.state) else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing code or state parameter".to_string(),
        )
            .into_response();
    };

    match state.flow.complete(code, auth_state).await {
        Ok(()) => (
            StatusCode::OK,
            "Authorization complete. Metrics are served at /metrics.",
        )
            .into_response(),
        Err(err @ (AuthError::StateMismatch | AuthError::Exchange(_))) => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
