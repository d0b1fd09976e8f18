//! # Actors and Roles
//!
//! The authenticated caller of a parcel operation. Credential checks happen
//! upstream; by the time an [`Actor`] exists its identity is trusted.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::UserId;

/// The role an account holds in the delivery workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates parcels and may cancel them before dispatch.
    Sender,
    /// Confirms delivery of parcels addressed to them.
    Receiver,
    /// Operates the delivery pipeline; may move any live parcel.
    Admin,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sender" => Ok(Self::Sender),
            "receiver" => Ok(Self::Receiver),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// An authenticated identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// The account identifier.
    pub id: UserId,
    /// The account's role.
    pub role: Role,
}

impl Actor {
    /// Construct an actor.
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Shorthand for a sender actor.
    pub fn sender(id: UserId) -> Self {
        Self::new(id, Role::Sender)
    }

    /// Shorthand for a receiver actor.
    pub fn receiver(id: UserId) -> Self {
        Self::new(id, Role::Receiver)
    }

    /// Shorthand for an admin actor.
    pub fn admin(id: UserId) -> Self {
        Self::new(id, Role::Admin)
    }

    /// Whether this actor holds the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
