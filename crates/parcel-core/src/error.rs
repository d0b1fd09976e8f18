//! # Validation Errors
//!
//! Structured validation errors built with `thiserror`. Each variant carries
//! the offending input so a client can correct the request without guessing.

use thiserror::Error;

/// Validation failures for domain primitives and parcel creation input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Tracking code does not match `TRK-YYYYMMDD-NNNNNN`.
    #[error("invalid tracking id: \"{0}\" (expected TRK-YYYYMMDD-NNNNNN)")]
    InvalidTrackingId(String),

    /// Role string is not one of `sender`, `receiver`, `admin`.
    #[error("unknown role: \"{0}\" (expected sender, receiver or admin)")]
    UnknownRole(String),

    /// Weight must be a finite number strictly greater than zero.
    #[error("weight must be greater than 0, got {0}")]
    InvalidWeight(f64),

    /// Fee must be a finite number greater than or equal to zero.
    #[error("fee must not be negative, got {0}")]
    InvalidFee(f64),

    /// A required text field was empty or whitespace.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// A text field exceeded its length limit.
    #[error("{field} must not exceed {max} characters")]
    FieldTooLong {
        /// Name of the field.
        field: &'static str,
        /// Maximum permitted length in characters.
        max: usize,
    },

    /// The sender named themselves as the receiver.
    #[error("receiver must differ from sender")]
    SelfAddressed,
}
