//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`metrics`]: Prometheus request metrics and the parcel status gauge.
//!
//! Request tracing is `tower_http::trace::TraceLayer`, applied in `app()`.

pub mod metrics;
