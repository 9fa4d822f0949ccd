use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which record a confirmation originated from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum OriginRef {
    TransportOrder(Uuid),
    BuyerRequest(Uuid),
}

impl OriginRef {
    pub fn id(&self) -> Uuid {
        match self {
            Self::TransportOrder(id) | Self::BuyerRequest(id) => *id,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::TransportOrder(_) => "transport_order",
            Self::BuyerRequest(_) => "buyer_request",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::PickedUp => "picked_up",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// The single permitted forward step, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Assigned => Some(Self::PickedUp),
            Self::PickedUp => Some(Self::InTransit),
            Self::InTransit => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FulfillmentStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "assigned" => Ok(Self::Assigned),
            "picked_up" => Ok(Self::PickedUp),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown fulfillment status: {other}")),
        }
    }
}

/// Execution record created exactly once when an order is confirmed; tracks
/// physical fulfillment from assignment through delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmedOrder {
    pub id: Uuid,
    pub origin: OriginRef,
    /// Absent until a supplier is assigned to a buyer-request shipment;
    /// always present for transport-order confirmations.
    pub supplier_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub status: FulfillmentStatus,
    pub planned_pickup: Option<NaiveDate>,
    pub planned_delivery: Option<NaiveDate>,
    pub actual_pickup: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
