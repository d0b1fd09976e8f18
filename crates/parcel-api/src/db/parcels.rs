//! Parcel persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `parcels` table.
//! Transition rules are enforced in parcel-state, not in SQL; the table
//! only enforces tracking-code uniqueness and the version check.

use chrono::{DateTime, Utc};
use parcel_core::{ParcelId, TrackingId, UserId};
use parcel_state::{
    ContactRecord, Parcel, ParcelDetails, ParcelSnapshot, ParcelStatus, StatusLogEntry,
};
use sqlx::PgPool;
use uuid::Uuid;

fn encode_json<T: serde::Serialize>(
    value: &T,
    what: &'static str,
) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, field = what, "failed to serialize parcel field");
        sqlx::Error::Encode(Box::new(e))
    })
}

fn to_db_version(version: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(version).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Insert a new parcel.
///
/// A tracking-code clash surfaces as a unique violation; callers detect it
/// with [`is_unique_violation`].
pub async fn insert(pool: &PgPool, parcel: &Parcel) -> Result<(), sqlx::Error> {
    let details = parcel.details();
    let contact = details
        .receiver_contact
        .as_ref()
        .map(|c| encode_json(c, "receiver_contact"))
        .transpose()?;
    let logs = encode_json(&parcel.status_logs(), "status_logs")?;

    sqlx::query(
        "INSERT INTO parcels (id, tracking_id, sender_id, receiver_id, parcel_type, weight, fee,
         from_address, to_address, receiver_contact, current_status, status_logs,
         is_deleted, is_blocked, version, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(parcel.id().as_uuid())
    .bind(parcel.tracking_id().as_str())
    .bind(parcel.sender().as_uuid())
    .bind(parcel.receiver().as_uuid())
    .bind(&details.parcel_type)
    .bind(details.weight)
    .bind(details.fee)
    .bind(&details.from_address)
    .bind(&details.to_address)
    .bind(contact)
    .bind(parcel.current_status().as_str())
    .bind(logs)
    .bind(parcel.is_deleted())
    .bind(parcel.is_blocked())
    .bind(to_db_version(parcel.version())?)
    .bind(parcel.created_at())
    .bind(parcel.updated_at())
    .execute(pool)
    .await?;

    Ok(())
}

/// Write the mutable columns of a saved parcel.
///
/// Only succeeds if the row is still at `expected_version`; returns
/// `Ok(false)` when it is not (or the row is missing).
pub async fn update(
    pool: &PgPool,
    parcel: &Parcel,
    expected_version: u64,
) -> Result<bool, sqlx::Error> {
    let logs = encode_json(&parcel.status_logs(), "status_logs")?;

    let result = sqlx::query(
        "UPDATE parcels SET current_status = $1, status_logs = $2, is_deleted = $3,
         is_blocked = $4, version = $5, updated_at = $6
         WHERE id = $7 AND version = $8",
    )
    .bind(parcel.current_status().as_str())
    .bind(logs)
    .bind(parcel.is_deleted())
    .bind(parcel.is_blocked())
    .bind(to_db_version(parcel.version())?)
    .bind(parcel.updated_at())
    .bind(parcel.id().as_uuid())
    .bind(to_db_version(expected_version)?)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load every parcel on startup. Rows that fail validation are skipped.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Parcel>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ParcelRow>(
        "SELECT id, tracking_id, sender_id, receiver_id, parcel_type, weight, fee,
         from_address, to_address, receiver_contact, current_status, status_logs,
         is_deleted, is_blocked, version, created_at, updated_at
         FROM parcels ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut parcels = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(parcel) = row.into_parcel() {
            parcels.push(parcel);
        }
    }
    Ok(parcels)
}

/// Whether a database error is a unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ParcelRow {
    id: Uuid,
    tracking_id: String,
    sender_id: Uuid,
    receiver_id: Uuid,
    parcel_type: String,
    weight: f64,
    fee: f64,
    from_address: String,
    to_address: String,
    receiver_contact: Option<serde_json::Value>,
    current_status: String,
    status_logs: serde_json::Value,
    is_deleted: bool,
    is_blocked: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ParcelRow {
    fn into_parcel(self) -> Option<Parcel> {
        let id = self.id;
        let skip = |reason: String| {
            tracing::warn!(parcel_id = %id, reason = %reason, "skipping invalid parcel row");
        };

        let tracking_id = match TrackingId::new(self.tracking_id) {
            Ok(t) => t,
            Err(e) => {
                skip(e.to_string());
                return None;
            }
        };
        let Some(current_status) = ParcelStatus::from_name(&self.current_status) else {
            skip(format!("unknown status {}", self.current_status));
            return None;
        };
        let status_logs: Vec<StatusLogEntry> = match serde_json::from_value(self.status_logs) {
            Ok(logs) => logs,
            Err(e) => {
                skip(format!("malformed status_logs: {e}"));
                return None;
            }
        };
        let receiver_contact: Option<ContactRecord> = match self
            .receiver_contact
            .map(serde_json::from_value::<ContactRecord>)
            .transpose()
        {
            Ok(contact) => contact,
            Err(e) => {
                skip(format!("malformed receiver_contact: {e}"));
                return None;
            }
        };
        let Ok(version) = u64::try_from(self.version) else {
            skip(format!("negative version {}", self.version));
            return None;
        };

        let snapshot = ParcelSnapshot {
            id: ParcelId::from_uuid(id),
            tracking_id,
            sender: UserId::from_uuid(self.sender_id),
            receiver: UserId::from_uuid(self.receiver_id),
            details: ParcelDetails {
                parcel_type: self.parcel_type,
                weight: self.weight,
                fee: self.fee,
                from_address: self.from_address,
                to_address: self.to_address,
                receiver_contact,
            },
            current_status,
            status_logs,
            is_deleted: self.is_deleted,
            is_blocked: self.is_blocked,
            version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        match Parcel::try_from(snapshot) {
            Ok(parcel) => Some(parcel),
            Err(e) => {
                skip(e.to_string());
                None
            }
        }
    }
}
