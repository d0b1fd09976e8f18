//! # Parcels API
//!
//! Parcel creation, the three status-changing routes (sender cancel,
//! receiver confirm, admin update), owner listings, admin moderation and
//! the anonymous tracking lookup.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parcel_core::{ParcelId, Role, UserId};
use parcel_state::{Annotation, ContactRecord, Parcel, ParcelDetails, ParcelStatus, StatusLogEntry};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{OptionalJson, Validate, ValidatedJson};
use crate::lifecycle;
use crate::state::AppState;

const MAX_NOTE_LEN: usize = 1000;

// -- Request DTOs ---------------------------------------------------------------

/// Receiver contact details.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactInput {
    pub name: String,
    pub phone: String,
}

/// Request to create a parcel.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateParcelRequest {
    /// User id of the receiver.
    pub receiver: Uuid,
    pub parcel_type: String,
    /// Weight in kilograms, greater than 0.
    pub weight: f64,
    /// Delivery fee, defaults to 0.
    #[serde(default)]
    pub fee: f64,
    pub from_address: String,
    pub to_address: String,
    #[serde(default)]
    pub receiver_contact: Option<ContactInput>,
}

impl CreateParcelRequest {
    fn details(&self) -> ParcelDetails {
        ParcelDetails {
            parcel_type: self.parcel_type.clone(),
            weight: self.weight,
            fee: self.fee,
            from_address: self.from_address.clone(),
            to_address: self.to_address.clone(),
            receiver_contact: self.receiver_contact.as_ref().map(|c| ContactRecord {
                name: c.name.clone(),
                phone: c.phone.clone(),
            }),
        }
    }
}

impl Validate for CreateParcelRequest {
    fn validate(&self) -> Result<(), String> {
        self.details().validate().map_err(|e| e.to_string())
    }
}

/// Optional remark and location for cancel and confirm.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AnnotationRequest {
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl AnnotationRequest {
    fn into_annotation(self) -> Annotation {
        Annotation {
            note: self.note,
            location: self.location,
        }
    }
}

fn check_annotation(note: &Option<String>, location: &Option<String>) -> Result<(), String> {
    for (field, value) in [("note", note), ("location", location)] {
        if value.as_ref().is_some_and(|v| v.chars().count() > MAX_NOTE_LEN) {
            return Err(format!("{field} must not exceed {MAX_NOTE_LEN} characters"));
        }
    }
    Ok(())
}

impl Validate for AnnotationRequest {
    fn validate(&self) -> Result<(), String> {
        check_annotation(&self.note, &self.location)
    }
}

/// Admin request to set a parcel's status.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// Target status: requested, approved, dispatched, in_transit, delivered or canceled.
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl Validate for UpdateStatusRequest {
    fn validate(&self) -> Result<(), String> {
        if ParcelStatus::from_name(&self.status).is_none() {
            return Err(format!("unknown status: \"{}\"", self.status));
        }
        check_annotation(&self.note, &self.location)
    }
}

// -- Response DTOs ----------------------------------------------------------------

/// One status history entry, as seen by the parcel's parties and admins.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusLogResponse {
    #[schema(value_type = String)]
    pub status: ParcelStatus,
    pub timestamp: DateTime<Utc>,
    pub updated_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl From<&StatusLogEntry> for StatusLogResponse {
    fn from(e: &StatusLogEntry) -> Self {
        Self {
            status: e.status,
            timestamp: e.timestamp,
            updated_by: *e.updated_by.as_uuid(),
            note: e.note.clone(),
            location: e.location.clone(),
        }
    }
}

/// Full parcel record.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ParcelResponse {
    pub id: Uuid,
    pub tracking_id: String,
    pub sender: Uuid,
    pub receiver: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_contact: Option<ContactInput>,
    pub parcel_type: String,
    pub weight: f64,
    pub fee: f64,
    pub from_address: String,
    pub to_address: String,
    #[schema(value_type = String)]
    pub current_status: ParcelStatus,
    pub status_logs: Vec<StatusLogResponse>,
    pub is_deleted: bool,
    pub is_blocked: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Parcel> for ParcelResponse {
    fn from(p: &Parcel) -> Self {
        let d = p.details();
        Self {
            id: *p.id().as_uuid(),
            tracking_id: p.tracking_id().to_string(),
            sender: *p.sender().as_uuid(),
            receiver: *p.receiver().as_uuid(),
            receiver_contact: d.receiver_contact.as_ref().map(|c| ContactInput {
                name: c.name.clone(),
                phone: c.phone.clone(),
            }),
            parcel_type: d.parcel_type.clone(),
            weight: d.weight,
            fee: d.fee,
            from_address: d.from_address.clone(),
            to_address: d.to_address.clone(),
            current_status: p.current_status(),
            status_logs: p.status_logs().iter().map(StatusLogResponse::from).collect(),
            is_deleted: p.is_deleted(),
            is_blocked: p.is_blocked(),
            version: p.version(),
            created_at: p.created_at(),
            updated_at: p.updated_at(),
        }
    }
}

/// A history entry in the public tracking view. No actor identity.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TrackingEvent {
    #[schema(value_type = String)]
    pub status: ParcelStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Public tracking view. Omits sender, receiver and contact details.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TrackingResponse {
    pub tracking_id: String,
    pub parcel_type: String,
    pub weight: f64,
    pub from_address: String,
    pub to_address: String,
    #[schema(value_type = String)]
    pub current_status: ParcelStatus,
    pub status_logs: Vec<TrackingEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Parcel> for TrackingResponse {
    fn from(p: &Parcel) -> Self {
        let d = p.details();
        Self {
            tracking_id: p.tracking_id().to_string(),
            parcel_type: d.parcel_type.clone(),
            weight: d.weight,
            from_address: d.from_address.clone(),
            to_address: d.to_address.clone(),
            current_status: p.current_status(),
            status_logs: p
                .status_logs()
                .iter()
                .map(|e| TrackingEvent {
                    status: e.status,
                    timestamp: e.timestamp,
                    note: e.note.clone(),
                    location: e.location.clone(),
                })
                .collect(),
            created_at: p.created_at(),
            updated_at: p.updated_at(),
        }
    }
}

// -- Routers ----------------------------------------------------------------------

/// Authenticated parcel routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/parcels", post(create_parcel))
        .route("/api/v1/parcels/my-parcels", get(my_parcels))
        .route("/api/v1/parcels/incoming", get(incoming_parcels))
        .route("/api/v1/parcels/cancel/:id", patch(cancel_parcel))
        .route("/api/v1/parcels/confirm/:id", patch(confirm_delivery))
        .route("/api/v1/parcels/status/:id", patch(update_status))
        .route("/api/v1/parcels/toggle/block/:id", patch(toggle_block))
        .route("/api/v1/parcels/:id", get(get_parcel).delete(delete_parcel))
}

/// Anonymous tracking route.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/api/v1/parcels/track/:tracking_id", get(track_parcel))
}

// -- Handlers ---------------------------------------------------------------------

/// GET /api/v1/parcels/track/:tracking_id: Public tracking lookup.
#[utoipa::path(
    get,
    path = "/api/v1/parcels/track/{tracking_id}",
    params(("tracking_id" = String, Path, description = "Tracking code, TRK-YYYYMMDD-NNNNNN")),
    responses(
        (status = 200, description = "Parcel found", body = TrackingResponse),
        (status = 404, description = "Unknown tracking code", body = crate::error::ErrorBody),
    ),
    tag = "tracking"
)]
pub(crate) async fn track_parcel(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
) -> Result<Json<TrackingResponse>, AppError> {
    let parcel = lifecycle::lookup_by_tracking_id(&state, &tracking_id)?;
    Ok(Json(TrackingResponse::from(&parcel)))
}

/// POST /api/v1/parcels: Create a parcel as the authenticated sender.
#[utoipa::path(
    post,
    path = "/api/v1/parcels",
    request_body = CreateParcelRequest,
    responses(
        (status = 201, description = "Parcel created", body = ParcelResponse),
        (status = 403, description = "Caller is not a sender", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "parcels"
)]
pub(crate) async fn create_parcel(
    State(state): State<AppState>,
    caller: CallerIdentity,
    ValidatedJson(req): ValidatedJson<CreateParcelRequest>,
) -> Result<(StatusCode, Json<ParcelResponse>), AppError> {
    require_role(&caller, Role::Sender)?;
    let parcel = lifecycle::create_parcel(
        &state,
        &caller.actor,
        UserId::from_uuid(req.receiver),
        req.details(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ParcelResponse::from(&parcel))))
}

/// PATCH /api/v1/parcels/cancel/:id: Sender cancels before dispatch.
#[utoipa::path(
    patch,
    path = "/api/v1/parcels/cancel/{id}",
    params(("id" = Uuid, Path, description = "Parcel ID")),
    request_body(content = AnnotationRequest, description = "Optional note and location"),
    responses(
        (status = 200, description = "Parcel canceled", body = ParcelResponse),
        (status = 403, description = "Not the sender, or parcel blocked", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already dispatched or finished", body = crate::error::ErrorBody),
    ),
    tag = "parcels"
)]
pub(crate) async fn cancel_parcel(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<AnnotationRequest>,
) -> Result<Json<ParcelResponse>, AppError> {
    require_role(&caller, Role::Sender)?;
    let parcel = lifecycle::request_transition(
        &state,
        ParcelId::from_uuid(id),
        &caller.actor,
        ParcelStatus::Canceled,
        req.into_annotation(),
    )
    .await?;
    Ok(Json(ParcelResponse::from(&parcel)))
}

/// PATCH /api/v1/parcels/confirm/:id: Receiver confirms delivery.
#[utoipa::path(
    patch,
    path = "/api/v1/parcels/confirm/{id}",
    params(("id" = Uuid, Path, description = "Parcel ID")),
    request_body(content = AnnotationRequest, description = "Optional note and location"),
    responses(
        (status = 200, description = "Delivery confirmed", body = ParcelResponse),
        (status = 403, description = "Not the receiver, or parcel blocked", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Parcel is not in transit", body = crate::error::ErrorBody),
    ),
    tag = "parcels"
)]
pub(crate) async fn confirm_delivery(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    OptionalJson(req): OptionalJson<AnnotationRequest>,
) -> Result<Json<ParcelResponse>, AppError> {
    require_role(&caller, Role::Receiver)?;
    let parcel = lifecycle::request_transition(
        &state,
        ParcelId::from_uuid(id),
        &caller.actor,
        ParcelStatus::Delivered,
        req.into_annotation(),
    )
    .await?;
    Ok(Json(ParcelResponse::from(&parcel)))
}

/// PATCH /api/v1/parcels/status/:id: Admin sets any status.
#[utoipa::path(
    patch,
    path = "/api/v1/parcels/status/{id}",
    params(("id" = Uuid, Path, description = "Parcel ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ParcelResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Parcel is canceled, or concurrent update", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown status", body = crate::error::ErrorBody),
    ),
    tag = "parcels"
)]
pub(crate) async fn update_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> Result<Json<ParcelResponse>, AppError> {
    require_role(&caller, Role::Admin)?;
    let target = ParcelStatus::from_name(&req.status)
        .ok_or_else(|| AppError::Validation(format!("unknown status: \"{}\"", req.status)))?;
    let parcel = lifecycle::request_transition(
        &state,
        ParcelId::from_uuid(id),
        &caller.actor,
        target,
        Annotation {
            note: req.note,
            location: req.location,
        },
    )
    .await?;
    Ok(Json(ParcelResponse::from(&parcel)))
}

/// GET /api/v1/parcels/my-parcels: Parcels sent by the caller.
#[utoipa::path(
    get,
    path = "/api/v1/parcels/my-parcels",
    responses(
        (status = 200, description = "Sent parcels, newest first", body = Vec<ParcelResponse>),
        (status = 403, description = "Caller is not a sender", body = crate::error::ErrorBody),
    ),
    tag = "parcels"
)]
pub(crate) async fn my_parcels(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<ParcelResponse>>, AppError> {
    let parcels = lifecycle::list_sent(&state, &caller.actor)?;
    Ok(Json(parcels.iter().map(ParcelResponse::from).collect()))
}

/// GET /api/v1/parcels/incoming: Parcels addressed to the caller.
#[utoipa::path(
    get,
    path = "/api/v1/parcels/incoming",
    responses(
        (status = 200, description = "Incoming parcels, newest first", body = Vec<ParcelResponse>),
        (status = 403, description = "Caller is not a receiver", body = crate::error::ErrorBody),
    ),
    tag = "parcels"
)]
pub(crate) async fn incoming_parcels(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<ParcelResponse>>, AppError> {
    let parcels = lifecycle::list_incoming(&state, &caller.actor)?;
    Ok(Json(parcels.iter().map(ParcelResponse::from).collect()))
}

/// GET /api/v1/parcels/:id: Full parcel record.
#[utoipa::path(
    get,
    path = "/api/v1/parcels/{id}",
    params(("id" = Uuid, Path, description = "Parcel ID")),
    responses(
        (status = 200, description = "Parcel found", body = ParcelResponse),
        (status = 403, description = "Not the caller's parcel", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "parcels"
)]
pub(crate) async fn get_parcel(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelResponse>, AppError> {
    let parcel = lifecycle::get_parcel(&state, ParcelId::from_uuid(id), &caller.actor)?;
    Ok(Json(ParcelResponse::from(&parcel)))
}

/// PATCH /api/v1/parcels/toggle/block/:id: Admin blocks or unblocks a parcel.
#[utoipa::path(
    patch,
    path = "/api/v1/parcels/toggle/block/{id}",
    params(("id" = Uuid, Path, description = "Parcel ID")),
    responses(
        (status = 200, description = "Block flag flipped", body = ParcelResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub(crate) async fn toggle_block(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelResponse>, AppError> {
    let parcel = lifecycle::toggle_block(&state, ParcelId::from_uuid(id), &caller.actor).await?;
    Ok(Json(ParcelResponse::from(&parcel)))
}

/// DELETE /api/v1/parcels/:id: Admin soft-deletes a parcel.
#[utoipa::path(
    delete,
    path = "/api/v1/parcels/{id}",
    params(("id" = Uuid, Path, description = "Parcel ID")),
    responses(
        (status = 200, description = "Parcel deleted", body = ParcelResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub(crate) async fn delete_parcel(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ParcelResponse>, AppError> {
    let parcel = lifecycle::soft_delete(&state, ParcelId::from_uuid(id), &caller.actor).await?;
    Ok(Json(ParcelResponse::from(&parcel)))
}
