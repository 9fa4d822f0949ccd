use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::Location;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuyerRequestStatus {
    Draft,
    Submitted,
    Pending,
    Assigned,
    Confirmed,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Rejected,
}

impl BuyerRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Confirmed => "confirmed",
            Self::PickedUp => "picked_up",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    /// `submitted` is a legacy spelling of `pending`: both mean "awaiting
    /// admin review" and admit the same transitions.
    pub fn awaiting_review(&self) -> bool {
        matches!(self, Self::Submitted | Self::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled | Self::Rejected)
    }
}

impl fmt::Display for BuyerRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuyerRequestStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "confirmed" => Ok(Self::Confirmed),
            "picked_up" => Ok(Self::PickedUp),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown buyer request status: {other}")),
        }
    }
}

/// A buyer's declared transport need, tracked from draft through delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerRequest {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub order_number: String,
    pub load_description: String,
    pub origin: Location,
    pub destination: Location,
    pub quantity_tonnes: f64,
    pub required_by: NaiveDate,
    pub status: BuyerRequestStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub admin_action_at: Option<DateTime<Utc>>,
}

impl BuyerRequest {
    /// Human-readable order number, unique per request.
    pub fn order_number_for(id: Uuid, created_at: DateTime<Utc>) -> String {
        let hex = id.simple().to_string();
        format!(
            "ORD-{}-{}",
            created_at.format("%Y%m%d"),
            hex[..8].to_uppercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn submitted_and_pending_both_await_review() {
        assert!(BuyerRequestStatus::Submitted.awaiting_review());
        assert!(BuyerRequestStatus::Pending.awaiting_review());
        assert!(!BuyerRequestStatus::Draft.awaiting_review());
        assert!(!BuyerRequestStatus::Confirmed.awaiting_review());
    }

    #[test]
    fn terminal_statuses() {
        for status in [
            BuyerRequestStatus::Delivered,
            BuyerRequestStatus::Cancelled,
            BuyerRequestStatus::Rejected,
        ] {
            assert!(status.is_terminal());
        }
        assert!(!BuyerRequestStatus::InTransit.is_terminal());
    }

    #[test]
    fn order_number_embeds_date_and_id_prefix() {
        let id = Uuid::from_u128(0xabcdef01_2345_6789_abcd_ef0123456789);
        let at = Utc.with_ymd_and_hms(2026, 8, 6, 10, 0, 0).unwrap();
        let number = BuyerRequest::order_number_for(id, at);
        assert_eq!(number, "ORD-20260806-ABCDEF01");
    }
}
