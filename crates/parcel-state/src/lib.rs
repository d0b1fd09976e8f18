//! # parcel-state: Parcel Lifecycle Model
//!
//! The status machine and audit trail of a parcel, with no I/O.
//!
//! ## Modules
//!
//! - **Status** (`status.rs`): the six delivery statuses, their wire names
//!   and which of them are terminal.
//!
//! - **Parcel** (`parcel.rs`): the parcel aggregate, its validated creation
//!   details and the append-only [`StatusLogEntry`] history.
//!
//! - **Rules** (`rules.rs`): [`evaluate_transition`], the pure decision of
//!   whether an actor may move a parcel to a target status. Checks run in a
//!   fixed order: ownership, then role and target, then the blocked flag,
//!   then the source status.
//!
//! ## Invariants
//!
//! `Parcel::current_status()` always equals the status of the last log
//! entry, and the log is never empty. The only way to change the status is
//! [`Parcel::transition`], which appends exactly one entry on success and
//! leaves the parcel untouched on failure.

pub mod parcel;
pub mod rules;
pub mod status;

pub use parcel::{
    Annotation, ContactRecord, Parcel, ParcelDetails, ParcelSnapshot, RestoreError,
    StatusLogEntry,
};
pub use rules::{evaluate_transition, TransitionError};
pub use status::ParcelStatus;
