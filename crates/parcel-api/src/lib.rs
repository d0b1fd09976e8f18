//! # parcel-api: Axum API Service for Parcel Tracking
//!
//! Senders create parcels addressed to a receiver, each parcel gets a
//! public tracking code, and its status moves through a fixed lifecycle
//! driven by three actor roles.
//!
//! ## API Surface
//!
//! | Route | Method | Caller |
//! |-------|--------|--------|
//! | `/api/v1/parcels` | POST | sender |
//! | `/api/v1/parcels/cancel/:id` | PATCH | sender |
//! | `/api/v1/parcels/confirm/:id` | PATCH | receiver |
//! | `/api/v1/parcels/status/:id` | PATCH | admin |
//! | `/api/v1/parcels/my-parcels` | GET | sender |
//! | `/api/v1/parcels/incoming` | GET | receiver |
//! | `/api/v1/parcels/:id` | GET | owner or admin |
//! | `/api/v1/parcels/toggle/block/:id` | PATCH | admin |
//! | `/api/v1/parcels/:id` | DELETE | admin |
//! | `/api/v1/parcels/track/:tracking_id` | GET | anyone |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! Health probes, `/metrics` and the tracking lookup are mounted outside
//! the auth middleware.
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros, served at `/openapi.json`.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod lifecycle;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();
    let metrics_on = state.config.metrics_enabled;

    let mut api = Router::new()
        .merge(routes::parcels::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(from_fn(auth::auth_middleware));

    // Anonymous tracking lookups are counted too.
    let mut public = routes::parcels::public_router();

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
        public = public
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());
    let public = public
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    if metrics_on {
        unauthenticated = unauthenticated
            .route("/metrics", axum::routing::get(prometheus_metrics))
            .layer(Extension(metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new()
        .merge(unauthenticated)
        .merge(public)
        .merge(api)
}

/// GET /metrics: Prometheus scrape endpoint.
///
/// Refreshes the parcel status gauge from the store, then encodes every
/// registered metric in text exposition format.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    metrics.refresh_parcel_gauge(&state.parcels.list());

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe.
///
/// Fails with 503 when the parcel store lock cannot be taken or the
/// database (when configured) does not answer.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if !state.parcels.is_accessible() {
        return (StatusCode::SERVICE_UNAVAILABLE, "parcel store locked").into_response();
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}
