//! # OpenAPI Specification Assembly
//!
//! Collects the utoipa-documented parcel routes into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// OpenAPI document for the parcel API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Parcel Tracking API",
        version = "0.1.0",
        description = "Parcel creation, status lifecycle, owner listings, admin moderation and public tracking."
    ),
    paths(
        crate::routes::parcels::create_parcel,
        crate::routes::parcels::cancel_parcel,
        crate::routes::parcels::confirm_delivery,
        crate::routes::parcels::update_status,
        crate::routes::parcels::my_parcels,
        crate::routes::parcels::incoming_parcels,
        crate::routes::parcels::get_parcel,
        crate::routes::parcels::toggle_block,
        crate::routes::parcels::delete_parcel,
        crate::routes::parcels::track_parcel,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::parcels::ContactInput,
        crate::routes::parcels::CreateParcelRequest,
        crate::routes::parcels::AnnotationRequest,
        crate::routes::parcels::UpdateStatusRequest,
        crate::routes::parcels::StatusLogResponse,
        crate::routes::parcels::ParcelResponse,
        crate::routes::parcels::TrackingEvent,
        crate::routes::parcels::TrackingResponse,
    )),
    tags(
        (name = "parcels", description = "Parcel creation, status changes and listings"),
        (name = "admin", description = "Admin moderation: block and soft delete"),
        (name = "tracking", description = "Anonymous tracking lookup"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
