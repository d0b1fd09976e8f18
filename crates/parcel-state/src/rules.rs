//! # Transition Rules
//!
//! Who may move a parcel where.
//!
//! | Role     | Must own | Target          | From                      |
//! |----------|----------|-----------------|---------------------------|
//! | sender   | sender   | `canceled`      | `requested`, `approved`   |
//! | receiver | receiver | `delivered`     | `in_transit`              |
//! | admin    | no       | any             | anything but `canceled`   |
//!
//! A blocked parcel refuses sender and receiver transitions; admins may
//! still move it.

use parcel_core::{Actor, ParcelId, Role, UserId};
use thiserror::Error;

use crate::parcel::Parcel;
use crate::status::ParcelStatus;

/// Why a requested transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The actor is not the parcel's sender or receiver as their role needs.
    #[error("{role} {actor} does not own parcel {parcel_id}")]
    NotOwner {
        parcel_id: ParcelId,
        actor: UserId,
        role: Role,
    },

    /// The actor's role may never request this target.
    #[error("role {role} may not move a parcel to {target}")]
    RoleNotPermitted { role: Role, target: ParcelStatus },

    /// The parcel is blocked and only an admin may move it.
    #[error("parcel {parcel_id} is blocked")]
    Blocked { parcel_id: ParcelId },

    /// The target is not reachable from the current status for this role.
    #[error("cannot move parcel from {from} to {to}")]
    InvalidTransition {
        from: ParcelStatus,
        to: ParcelStatus,
    },
}

impl TransitionError {
    /// The `(from, to)` pair when the refusal is about the current status.
    /// `None` means an authorization refusal.
    pub fn status_conflict(&self) -> Option<(ParcelStatus, ParcelStatus)> {
        match self {
            Self::InvalidTransition { from, to } => Some((*from, *to)),
            _ => None,
        }
    }
}

/// Decide whether `actor` may move `parcel` to `target`. Pure.
pub fn evaluate_transition(
    parcel: &Parcel,
    actor: &Actor,
    target: ParcelStatus,
) -> Result<(), TransitionError> {
    let from = parcel.current_status();
    let not_owner = || TransitionError::NotOwner {
        parcel_id: parcel.id(),
        actor: actor.id,
        role: actor.role,
    };

    let allowed_from: &[ParcelStatus] = match actor.role {
        Role::Sender => {
            if !parcel.is_owned_by(actor) {
                return Err(not_owner());
            }
            if target != ParcelStatus::Canceled {
                return Err(TransitionError::RoleNotPermitted {
                    role: actor.role,
                    target,
                });
            }
            &[ParcelStatus::Requested, ParcelStatus::Approved]
        }
        Role::Receiver => {
            if !parcel.is_owned_by(actor) {
                return Err(not_owner());
            }
            if target != ParcelStatus::Delivered {
                return Err(TransitionError::RoleNotPermitted {
                    role: actor.role,
                    target,
                });
            }
            &[ParcelStatus::InTransit]
        }
        Role::Admin => {
            if from == ParcelStatus::Canceled {
                return Err(TransitionError::InvalidTransition { from, to: target });
            }
            return Ok(());
        }
    };

    if parcel.is_blocked() {
        return Err(TransitionError::Blocked {
            parcel_id: parcel.id(),
        });
    }
    if !allowed_from.contains(&from) {
        return Err(TransitionError::InvalidTransition { from, to: target });
    }
    Ok(())
}
