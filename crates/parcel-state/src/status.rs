//! # Delivery Status
//!
//! `requested → approved → dispatched → in_transit → delivered`, with
//! `canceled` reachable from the early stages. Wire names are lowercase.

use serde::{Deserialize, Serialize};

/// Where a parcel is in the delivery workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    /// Created by the sender, awaiting admin approval.
    Requested,
    /// Approved for pickup.
    Approved,
    /// Handed to the carrier.
    Dispatched,
    /// Moving between hubs.
    InTransit,
    /// Received and confirmed. Terminal.
    Delivered,
    /// Withdrawn before dispatch. Terminal.
    Canceled,
}

impl ParcelStatus {
    /// Every status, in workflow order.
    pub const ALL: [ParcelStatus; 6] = [
        Self::Requested,
        Self::Approved,
        Self::Dispatched,
        Self::InTransit,
        Self::Delivered,
        Self::Canceled,
    ];

    /// The wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Approved => "approved",
            Self::Dispatched => "dispatched",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Canceled => "canceled",
        }
    }

    /// Parse a wire name. Returns `None` for anything else.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Whether this is `delivered` or `canceled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }
}

impl std::fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for status in ParcelStatus::ALL {
            assert_eq!(ParcelStatus::from_name(status.as_str()), Some(status));
        }
        assert_eq!(ParcelStatus::from_name("IN_TRANSIT"), None);
        assert_eq!(ParcelStatus::from_name("lost"), None);
    }

    #[test]
    fn serde_matches_wire_names() {
        for status in ParcelStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = ParcelStatus::ALL
            .into_iter()
            .filter(ParcelStatus::is_terminal)
            .collect();
        assert_eq!(terminal, vec![ParcelStatus::Delivered, ParcelStatus::Canceled]);
    }
}
