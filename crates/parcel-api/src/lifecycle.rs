//! # Parcel Lifecycle Manager
//!
//! The sole writer of parcel status and history. Every mutating route
//! funnels through here: sender cancel, receiver confirm, admin update,
//! block toggle and soft delete.
//!
//! Each call is one read of the store followed by one version-checked
//! save. When a pool is configured the Postgres write goes first and the
//! store is updated only once it succeeds. The rule
//! decision itself is [`parcel_state::evaluate_transition`]; this module
//! only adds I/O around it.
//!
//! ## Visibility
//!
//! A soft-deleted parcel is reported as not found by every operation here,
//! public tracking included.

use chrono::Utc;
use parcel_core::{Actor, ParcelId, Role, TrackingId, UserId};
use parcel_state::{Annotation, Parcel, ParcelDetails, ParcelStatus};

use crate::error::AppError;
use crate::state::{AppState, StoreError};

/// How many tracking codes `create_parcel` tries before giving up.
pub const TRACKING_ID_ATTEMPTS: usize = 5;

fn not_found(id: ParcelId) -> AppError {
    AppError::NotFound(format!("parcel {id} not found"))
}

/// Fetch a live (not deleted) parcel.
fn load_live(state: &AppState, id: ParcelId) -> Result<Parcel, AppError> {
    state
        .parcels
        .get(&id)
        .filter(|p| !p.is_deleted())
        .ok_or_else(|| not_found(id))
}

/// Create a parcel from `actor` to `receiver` with a fresh tracking code.
pub async fn create_parcel(
    state: &AppState,
    actor: &Actor,
    receiver: UserId,
    details: ParcelDetails,
) -> Result<Parcel, AppError> {
    create_parcel_with(state, actor, receiver, details, TrackingId::generate).await
}

/// [`create_parcel`] with an injectable tracking-code source.
///
/// A code already taken, in memory or in Postgres, is discarded and a new
/// one drawn, up to [`TRACKING_ID_ATTEMPTS`] times.
pub async fn create_parcel_with(
    state: &AppState,
    actor: &Actor,
    receiver: UserId,
    details: ParcelDetails,
    mut next_code: impl FnMut() -> TrackingId,
) -> Result<Parcel, AppError> {
    if actor.role != Role::Sender {
        return Err(AppError::Forbidden(format!(
            "only senders may create parcels, caller is '{}'",
            actor.role
        )));
    }
    details.validate()?;

    for attempt in 1..=TRACKING_ID_ATTEMPTS {
        let parcel = Parcel::create(next_code(), actor.id, receiver, details.clone(), Utc::now())?;

        match state.parcels.insert(parcel.clone()) {
            Ok(()) => {}
            Err(StoreError::DuplicateTrackingId(code)) => {
                tracing::warn!(tracking_id = %code, attempt, "tracking id collision, regenerating");
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(pool) = &state.db_pool {
            if let Err(e) = crate::db::parcels::insert(pool, &parcel).await {
                state.parcels.remove(&parcel.id());
                if crate::db::parcels::is_unique_violation(&e) {
                    tracing::warn!(
                        tracking_id = %parcel.tracking_id(),
                        attempt,
                        "tracking id collision in database, regenerating"
                    );
                    continue;
                }
                tracing::error!(parcel_id = %parcel.id(), error = %e, "failed to persist parcel to database");
                return Err(AppError::Internal(
                    "parcel could not be persisted".to_string(),
                ));
            }
        }

        tracing::info!(
            parcel_id = %parcel.id(),
            tracking_id = %parcel.tracking_id(),
            sender = %actor.id,
            receiver = %receiver,
            "parcel created"
        );
        return Ok(parcel);
    }

    tracing::warn!(
        attempts = TRACKING_ID_ATTEMPTS,
        "could not allocate a unique tracking id"
    );
    Err(AppError::Conflict(format!(
        "could not allocate a unique tracking id after {TRACKING_ID_ATTEMPTS} attempts"
    )))
}

/// Move a parcel to `target` on behalf of `actor`, reading it fresh.
pub async fn request_transition(
    state: &AppState,
    parcel_id: ParcelId,
    actor: &Actor,
    target: ParcelStatus,
    annotation: Annotation,
) -> Result<Parcel, AppError> {
    let snapshot = load_live(state, parcel_id)?;
    transition_from_snapshot(state, snapshot, actor, target, annotation).await
}

/// Apply a transition to an already-read parcel and save it against the
/// version it was read at.
///
/// If another writer saved in between, this returns `Conflict` and nothing
/// is written; the caller re-reads and retries.
pub async fn transition_from_snapshot(
    state: &AppState,
    mut parcel: Parcel,
    actor: &Actor,
    target: ParcelStatus,
    annotation: Annotation,
) -> Result<Parcel, AppError> {
    let from = parcel.current_status();
    if let Err(e) = parcel.transition(actor, target, annotation, Utc::now()) {
        tracing::warn!(
            parcel_id = %parcel.id(),
            actor_role = %actor.role,
            from = %from,
            to = %target,
            reason = %e,
            "transition rejected"
        );
        return Err(e.into());
    }

    let saved = save(state, parcel).await?;
    tracing::info!(
        parcel_id = %saved.id(),
        tracking_id = %saved.tracking_id(),
        actor_role = %actor.role,
        from = %from,
        to = %target,
        version = saved.version(),
        "parcel status changed"
    );
    Ok(saved)
}

/// Version-checked save. With a pool, Postgres is written first and the
/// store only after the row update lands, so a failed or lost database
/// write leaves the stored parcel as it was.
async fn save(state: &AppState, parcel: Parcel) -> Result<Parcel, AppError> {
    let expected = parcel.version();
    let save_rejected = |e: StoreError| {
        tracing::warn!(error = %e, "parcel save rejected");
        AppError::from(e)
    };

    if let Some(pool) = &state.db_pool {
        let stored = state
            .parcels
            .get(&parcel.id())
            .ok_or(StoreError::NotFound(parcel.id()))
            .map_err(save_rejected)?;
        if stored.version() != expected {
            return Err(save_rejected(StoreError::VersionConflict {
                id: parcel.id(),
                expected,
                actual: stored.version(),
            }));
        }

        let mut next = parcel.clone();
        next.set_version(expected + 1);
        let outcome = crate::db::parcels::update(pool, &next, expected).await;
        persist_outcome(parcel.id(), expected, outcome)?;
    }

    state.parcels.save(parcel, expected).map_err(save_rejected)
}

/// Map a row update result: no row matched means another writer got there.
fn persist_outcome(
    id: ParcelId,
    expected: u64,
    outcome: Result<bool, sqlx::Error>,
) -> Result<(), AppError> {
    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!(parcel_id = %id, expected_version = expected, "database row version moved on");
            Err(AppError::Conflict(format!("parcel {id} was modified concurrently")))
        }
        Err(e) => {
            tracing::error!(parcel_id = %id, error = %e, "failed to persist parcel update to database");
            Err(AppError::Internal("parcel could not be persisted".to_string()))
        }
    }
}

/// Public lookup by tracking code. No actor.
///
/// Malformed codes are reported as not found.
pub fn lookup_by_tracking_id(state: &AppState, code: &str) -> Result<Parcel, AppError> {
    let missing = || AppError::NotFound(format!("no parcel with tracking id {code}"));
    let code = TrackingId::new(code).map_err(|_| missing())?;
    state
        .parcels
        .get_by_tracking_id(&code)
        .filter(|p| !p.is_deleted())
        .ok_or_else(missing)
}

/// Read one parcel. Admins may read any; senders and receivers only their own.
pub fn get_parcel(state: &AppState, parcel_id: ParcelId, actor: &Actor) -> Result<Parcel, AppError> {
    let parcel = load_live(state, parcel_id)?;
    if !(actor.is_admin() || parcel.is_owned_by(actor)) {
        return Err(AppError::Forbidden(format!(
            "parcel {parcel_id} does not belong to the caller"
        )));
    }
    Ok(parcel)
}

/// Live parcels sent by the caller, newest first.
pub fn list_sent(state: &AppState, actor: &Actor) -> Result<Vec<Parcel>, AppError> {
    require(actor, Role::Sender)?;
    Ok(newest_first(
        state
            .parcels
            .filter(|p| !p.is_deleted() && p.sender() == actor.id),
    ))
}

/// Live parcels addressed to the caller, newest first.
pub fn list_incoming(state: &AppState, actor: &Actor) -> Result<Vec<Parcel>, AppError> {
    require(actor, Role::Receiver)?;
    Ok(newest_first(
        state
            .parcels
            .filter(|p| !p.is_deleted() && p.receiver() == actor.id),
    ))
}

fn newest_first(mut parcels: Vec<Parcel>) -> Vec<Parcel> {
    parcels.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    parcels
}

fn require(actor: &Actor, role: Role) -> Result<(), AppError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{role}' required, caller has '{}'",
            actor.role
        )))
    }
}

/// Flip the blocked flag. Admin only. Status and history are untouched.
pub async fn toggle_block(
    state: &AppState,
    parcel_id: ParcelId,
    actor: &Actor,
) -> Result<Parcel, AppError> {
    require(actor, Role::Admin)?;
    let mut parcel = load_live(state, parcel_id)?;
    let blocked = parcel.toggle_blocked(Utc::now());
    let saved = save(state, parcel).await?;
    tracing::info!(parcel_id = %parcel_id, blocked, "parcel block toggled");
    Ok(saved)
}

/// Soft-delete a parcel. Admin only.
///
/// Deleting an already-deleted parcel succeeds without writing.
pub async fn soft_delete(
    state: &AppState,
    parcel_id: ParcelId,
    actor: &Actor,
) -> Result<Parcel, AppError> {
    require(actor, Role::Admin)?;
    let mut parcel = state.parcels.get(&parcel_id).ok_or_else(|| not_found(parcel_id))?;
    if !parcel.mark_deleted(Utc::now()) {
        return Ok(parcel);
    }
    let saved = save(state, parcel).await?;
    tracing::info!(parcel_id = %parcel_id, "parcel soft-deleted");
    Ok(saved)
}
