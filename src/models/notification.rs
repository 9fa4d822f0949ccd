use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient class of a notification feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Audience {
    Admin,
    Supplier(Uuid),
    Buyer(Uuid),
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Supplier(id) => write!(f, "supplier:{id}"),
            Self::Buyer(id) => write!(f, "buyer:{id}"),
        }
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == "admin" {
            return Ok(Self::Admin);
        }
        if let Some(id) = raw.strip_prefix("supplier:") {
            let id = Uuid::parse_str(id).map_err(|err| format!("bad supplier scope: {err}"))?;
            return Ok(Self::Supplier(id));
        }
        if let Some(id) = raw.strip_prefix("buyer:") {
            let id = Uuid::parse_str(id).map_err(|err| format!("bad buyer scope: {err}"))?;
            return Ok(Self::Buyer(id));
        }
        Err(format!("unknown audience scope: {raw}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for NotificationPriority {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown notification priority: {other}")),
        }
    }
}

/// One feed entry. Created only by the dispatcher; mutated only to flip
/// `is_read`. The `event_key` makes re-delivery of the same domain event a
/// no-op in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub audience: Audience,
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub message: String,
    pub is_read: bool,
    pub event_key: String,
    pub order_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Idempotency key: one notification per (order, status, audience).
    pub fn event_key_for(order_id: Uuid, status: &str, audience: &Audience) -> String {
        format!("{order_id}:{status}:{audience}")
    }
}
