use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrative area a vehicle is offered from or a load moves between.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub state: String,
    pub district: String,
    pub place: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taluk: Option<String>,
}

impl Location {
    pub fn is_complete(&self) -> bool {
        !self.state.trim().is_empty()
            && !self.district.trim().is_empty()
            && !self.place.trim().is_empty()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.place, self.district, self.state)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportOrderStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl TransportOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TransportOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportOrderStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown transport order status: {other}")),
        }
    }
}

/// A supplier's declaration of vehicle availability awaiting admin review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportOrder {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub location: Location,
    pub vehicle_number: String,
    pub body_type: String,
    pub driver_id: Option<Uuid>,
    pub status: TransportOrderStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub admin_action_at: Option<DateTime<Utc>>,
}
