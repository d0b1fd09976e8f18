//! # Parcel Aggregate
//!
//! A single shipment from creation to delivery or cancellation. Status and
//! history are private: reads go through accessors and the only writer of
//! either is [`Parcel::transition`].

use chrono::{DateTime, Utc};
use parcel_core::{Actor, ParcelId, Role, TrackingId, UserId, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::{evaluate_transition, TransitionError};
use crate::status::ParcelStatus;

const MAX_TYPE_LEN: usize = 255;
const MAX_ADDRESS_LEN: usize = 500;

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    /// Status entered by this change.
    pub status: ParcelStatus,
    /// When the change was recorded.
    pub timestamp: DateTime<Utc>,
    /// Account that made the change.
    pub updated_by: UserId,
    /// Free-form remark supplied with the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Where the parcel was when the change was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Optional remark and location attached to a status change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Free-form remark.
    pub note: Option<String>,
    /// Current location.
    pub location: Option<String>,
}

/// Receiver contact details carried with the parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// Receiver's display name.
    pub name: String,
    /// Receiver's phone number.
    pub phone: String,
}

/// Descriptive fields supplied by the sender at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelDetails {
    /// Kind of item, e.g. "documents" or "electronics".
    pub parcel_type: String,
    /// Weight in kilograms.
    pub weight: f64,
    /// Delivery fee.
    #[serde(default)]
    pub fee: f64,
    /// Pickup address.
    pub from_address: String,
    /// Delivery address.
    pub to_address: String,
    /// Optional receiver contact.
    #[serde(default)]
    pub receiver_contact: Option<ContactRecord>,
}

impl ParcelDetails {
    /// Check every field, reporting the first violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_text("parcel_type", &self.parcel_type, MAX_TYPE_LEN)?;
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(ValidationError::InvalidWeight(self.weight));
        }
        if !self.fee.is_finite() || self.fee < 0.0 {
            return Err(ValidationError::InvalidFee(self.fee));
        }
        check_text("from_address", &self.from_address, MAX_ADDRESS_LEN)?;
        check_text("to_address", &self.to_address, MAX_ADDRESS_LEN)?;
        if let Some(contact) = &self.receiver_contact {
            check_text("receiver_contact.name", &contact.name, MAX_TYPE_LEN)?;
            check_text("receiver_contact.phone", &contact.phone, MAX_TYPE_LEN)?;
        }
        Ok(())
    }
}

fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    if value.chars().count() > max {
        return Err(ValidationError::FieldTooLong { field, max });
    }
    Ok(())
}

/// A persisted parcel failed its structural checks on load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RestoreError {
    /// The stored history has no entries.
    #[error("parcel {0} has an empty status log")]
    EmptyLog(ParcelId),

    /// The stored status disagrees with the last history entry.
    #[error("parcel {id} has status {current} but its last log entry is {last}")]
    StatusMismatch {
        /// Parcel identifier.
        id: ParcelId,
        /// Stored current status.
        current: ParcelStatus,
        /// Status of the last log entry.
        last: ParcelStatus,
    },

    /// The stored version is zero.
    #[error("parcel {0} has version 0")]
    ZeroVersion(ParcelId),
}

/// Flat, fully public view of a parcel for storage layers.
///
/// Convert into a [`Parcel`] with `Parcel::try_from`, which rejects
/// records that break the log invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelSnapshot {
    pub id: ParcelId,
    pub tracking_id: TrackingId,
    pub sender: UserId,
    pub receiver: UserId,
    pub details: ParcelDetails,
    pub current_status: ParcelStatus,
    pub status_logs: Vec<StatusLogEntry>,
    pub is_deleted: bool,
    pub is_blocked: bool,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A shipment record tracked from creation to a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    id: ParcelId,
    tracking_id: TrackingId,
    sender: UserId,
    receiver: UserId,
    details: ParcelDetails,
    current_status: ParcelStatus,
    status_logs: Vec<StatusLogEntry>,
    is_deleted: bool,
    is_blocked: bool,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Parcel {
    /// Create a parcel in `requested` with a single log entry by the sender.
    ///
    /// Fails if the details are invalid or the sender addresses themselves.
    pub fn create(
        tracking_id: TrackingId,
        sender: UserId,
        receiver: UserId,
        details: ParcelDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        details.validate()?;
        if sender == receiver {
            return Err(ValidationError::SelfAddressed);
        }
        Ok(Self {
            id: ParcelId::new(),
            tracking_id,
            sender,
            receiver,
            details,
            current_status: ParcelStatus::Requested,
            status_logs: vec![StatusLogEntry {
                status: ParcelStatus::Requested,
                timestamp: now,
                updated_by: sender,
                note: None,
                location: None,
            }],
            is_deleted: false,
            is_blocked: false,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> ParcelId {
        self.id
    }

    pub fn tracking_id(&self) -> &TrackingId {
        &self.tracking_id
    }

    pub fn sender(&self) -> UserId {
        self.sender
    }

    pub fn receiver(&self) -> UserId {
        self.receiver
    }

    pub fn details(&self) -> &ParcelDetails {
        &self.details
    }

    pub fn current_status(&self) -> ParcelStatus {
        self.current_status
    }

    /// History in chronological order. Never empty.
    pub fn status_logs(&self) -> &[StatusLogEntry] {
        &self.status_logs
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn is_blocked(&self) -> bool {
        self.is_blocked
    }

    /// Optimistic-concurrency counter. Starts at 1.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether `actor` is this parcel's party in its own role: the sender
    /// as sender, the receiver as receiver. Admins own nothing.
    pub fn is_owned_by(&self, actor: &Actor) -> bool {
        match actor.role {
            Role::Sender => self.sender == actor.id,
            Role::Receiver => self.receiver == actor.id,
            Role::Admin => false,
        }
    }

    /// Move the parcel to `target` on behalf of `actor`.
    ///
    /// On success the status is updated and exactly one entry is appended.
    /// On failure the parcel is unchanged. Entry timestamps never go
    /// backwards: a `now` earlier than the last entry is clamped to it.
    pub fn transition(
        &mut self,
        actor: &Actor,
        target: ParcelStatus,
        annotation: Annotation,
        now: DateTime<Utc>,
    ) -> Result<&StatusLogEntry, TransitionError> {
        evaluate_transition(self, actor, target)?;

        let timestamp = self
            .status_logs
            .last()
            .map_or(now, |last| last.timestamp.max(now));
        self.current_status = target;
        self.updated_at = timestamp;
        self.status_logs.push(StatusLogEntry {
            status: target,
            timestamp,
            updated_by: actor.id,
            note: annotation.note,
            location: annotation.location,
        });
        Ok(&self.status_logs[self.status_logs.len() - 1])
    }

    /// Flip the blocked flag, returning the new value.
    pub fn toggle_blocked(&mut self, now: DateTime<Utc>) -> bool {
        self.is_blocked = !self.is_blocked;
        self.updated_at = now;
        self.is_blocked
    }

    /// Mark the parcel as deleted. Returns `false` if it already was.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_deleted {
            return false;
        }
        self.is_deleted = true;
        self.updated_at = now;
        true
    }

    /// Record the version assigned by a successful save.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Flatten into a storage snapshot.
    pub fn snapshot(&self) -> ParcelSnapshot {
        ParcelSnapshot {
            id: self.id,
            tracking_id: self.tracking_id.clone(),
            sender: self.sender,
            receiver: self.receiver,
            details: self.details.clone(),
            current_status: self.current_status,
            status_logs: self.status_logs.clone(),
            is_deleted: self.is_deleted,
            is_blocked: self.is_blocked,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl TryFrom<ParcelSnapshot> for Parcel {
    type Error = RestoreError;

    fn try_from(s: ParcelSnapshot) -> Result<Self, Self::Error> {
        let last = s
            .status_logs
            .last()
            .ok_or(RestoreError::EmptyLog(s.id))?
            .status;
        if last != s.current_status {
            return Err(RestoreError::StatusMismatch {
                id: s.id,
                current: s.current_status,
                last,
            });
        }
        if s.version == 0 {
            return Err(RestoreError::ZeroVersion(s.id));
        }
        Ok(Self {
            id: s.id,
            tracking_id: s.tracking_id,
            sender: s.sender,
            receiver: s.receiver,
            details: s.details,
            current_status: s.current_status,
            status_logs: s.status_logs,
            is_deleted: s.is_deleted,
            is_blocked: s.is_blocked,
            version: s.version,
            created_at: s.created_at,
            updated_at: s.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn details() -> ParcelDetails {
        ParcelDetails {
            parcel_type: "documents".into(),
            weight: 2.5,
            fee: 10.0,
            from_address: "12 Mill Road".into(),
            to_address: "7 Harbour Street".into(),
            receiver_contact: None,
        }
    }

    fn tracking() -> TrackingId {
        TrackingId::new("TRK-20240131-482913").unwrap()
    }

    #[test]
    fn create_starts_requested_with_one_entry() {
        let sender = UserId::new();
        let now = Utc::now();
        let p = Parcel::create(tracking(), sender, UserId::new(), details(), now).unwrap();
        assert_eq!(p.current_status(), ParcelStatus::Requested);
        assert_eq!(p.status_logs().len(), 1);
        assert_eq!(p.status_logs()[0].updated_by, sender);
        assert_eq!(p.status_logs()[0].timestamp, now);
        assert_eq!(p.version(), 1);
        assert!(!p.is_deleted());
        assert!(!p.is_blocked());
    }

    #[test]
    fn create_rejects_self_addressed() {
        let me = UserId::new();
        let err = Parcel::create(tracking(), me, me, details(), Utc::now()).unwrap_err();
        assert_eq!(err, ValidationError::SelfAddressed);
    }

    #[test]
    fn details_validation() {
        let mut d = details();
        d.weight = 0.0;
        assert_eq!(d.validate(), Err(ValidationError::InvalidWeight(0.0)));

        let mut d = details();
        d.weight = f64::NAN;
        assert!(matches!(d.validate(), Err(ValidationError::InvalidWeight(_))));

        let mut d = details();
        d.fee = -0.01;
        assert_eq!(d.validate(), Err(ValidationError::InvalidFee(-0.01)));

        let mut d = details();
        d.fee = 0.0;
        assert!(d.validate().is_ok());

        let mut d = details();
        d.parcel_type = "   ".into();
        assert_eq!(d.validate(), Err(ValidationError::EmptyField("parcel_type")));

        let mut d = details();
        d.to_address = "x".repeat(501);
        assert_eq!(
            d.validate(),
            Err(ValidationError::FieldTooLong {
                field: "to_address",
                max: 500
            })
        );

        let mut d = details();
        d.receiver_contact = Some(ContactRecord {
            name: "Dana".into(),
            phone: "".into(),
        });
        assert_eq!(
            d.validate(),
            Err(ValidationError::EmptyField("receiver_contact.phone"))
        );
    }

    #[test]
    fn fee_defaults_to_zero_when_absent() {
        let d: ParcelDetails = serde_json::from_value(serde_json::json!({
            "parcel_type": "books",
            "weight": 1.0,
            "from_address": "a",
            "to_address": "b"
        }))
        .unwrap();
        assert_eq!(d.fee, 0.0);
        assert!(d.receiver_contact.is_none());
    }

    #[test]
    fn transition_timestamps_never_go_backwards() {
        let sender = UserId::new();
        let now = Utc::now();
        let mut p = Parcel::create(tracking(), sender, UserId::new(), details(), now).unwrap();
        let earlier = now - Duration::seconds(30);
        let entry = p
            .transition(
                &Actor::sender(sender),
                ParcelStatus::Canceled,
                Annotation::default(),
                earlier,
            )
            .unwrap();
        assert_eq!(entry.timestamp, now);
    }

    #[test]
    fn annotation_is_recorded() {
        let sender = UserId::new();
        let mut p =
            Parcel::create(tracking(), sender, UserId::new(), details(), Utc::now()).unwrap();
        let admin = Actor::admin(UserId::new());
        p.transition(
            &admin,
            ParcelStatus::Approved,
            Annotation {
                note: Some("checked".into()),
                location: Some("Hub A".into()),
            },
            Utc::now(),
        )
        .unwrap();
        let last = p.status_logs().last().unwrap();
        assert_eq!(last.updated_by, admin.id);
        assert_eq!(last.note.as_deref(), Some("checked"));
        assert_eq!(last.location.as_deref(), Some("Hub A"));
    }

    #[test]
    fn flags_do_not_touch_history() {
        let mut p =
            Parcel::create(tracking(), UserId::new(), UserId::new(), details(), Utc::now())
                .unwrap();
        assert!(p.toggle_blocked(Utc::now()));
        assert!(!p.toggle_blocked(Utc::now()));
        assert!(p.mark_deleted(Utc::now()));
        assert!(!p.mark_deleted(Utc::now()));
        assert_eq!(p.status_logs().len(), 1);
        assert_eq!(p.current_status(), ParcelStatus::Requested);
    }

    #[test]
    fn snapshot_restore_checks_invariants() {
        let p = Parcel::create(tracking(), UserId::new(), UserId::new(), details(), Utc::now())
            .unwrap();
        let restored = Parcel::try_from(p.snapshot()).unwrap();
        assert_eq!(restored, p);

        let mut empty = p.snapshot();
        empty.status_logs.clear();
        assert_eq!(Parcel::try_from(empty), Err(RestoreError::EmptyLog(p.id())));

        let mut mismatch = p.snapshot();
        mismatch.current_status = ParcelStatus::Delivered;
        assert!(matches!(
            Parcel::try_from(mismatch),
            Err(RestoreError::StatusMismatch { .. })
        ));

        let mut zero = p.snapshot();
        zero.version = 0;
        assert_eq!(Parcel::try_from(zero), Err(RestoreError::ZeroVersion(p.id())));
    }

    #[test]
    fn ownership_is_role_scoped() {
        let (sender, receiver) = (UserId::new(), UserId::new());
        let p = Parcel::create(tracking(), sender, receiver, details(), Utc::now()).unwrap();
        assert!(p.is_owned_by(&Actor::sender(sender)));
        assert!(p.is_owned_by(&Actor::receiver(receiver)));
        // Right account, wrong role.
        assert!(!p.is_owned_by(&Actor::receiver(sender)));
        assert!(!p.is_owned_by(&Actor::sender(receiver)));
        assert!(!p.is_owned_by(&Actor::admin(sender)));
    }
}
