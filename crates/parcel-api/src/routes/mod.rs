//! # Route Modules
//!
//! Each module defines Axum routers for one API surface area.
//! Routers are assembled in `lib.rs` into the application.

pub mod parcels;
