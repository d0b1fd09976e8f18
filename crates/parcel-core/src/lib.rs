#![deny(missing_docs)]

//! # parcel-core: Foundational Types for the Parcel Tracking Stack
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies. It uses only `serde`, `thiserror`,
//! `chrono`, `uuid`, and `rand_core` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** You cannot pass a [`UserId`]
//!    where a [`ParcelId`] is expected.
//!
//! 2. **[`TrackingId`] is validated at construction.** A tracking code that
//!    exists as a value always has the `TRK-YYYYMMDD-NNNNNN` shape.
//!
//! 3. **Explicit actor context.** Every mutating operation takes an
//!    [`Actor`] parameter; nothing reads the caller from ambient state.

pub mod actor;
pub mod error;
pub mod identity;
pub mod tracking;

pub use actor::{Actor, Role};
pub use error::ValidationError;
pub use identity::{ParcelId, UserId};
pub use tracking::TrackingId;
