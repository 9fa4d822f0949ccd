pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::confirmed::{ConfirmedOrder, FulfillmentStatus};
use crate::models::notification::{Audience, Notification};
use crate::models::order::TransportOrder;
use crate::models::party::{Buyer, Driver, Supplier, Vehicle};
use crate::models::request::{BuyerRequest, BuyerRequestStatus};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage operation timed out")]
    Timeout,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Timeouts are safe to retry for idempotent operations; an unavailable
    /// backend is reported, never papered over with retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Result of a guarded check-then-write. `StateMismatch` carries the status
/// the row actually had so callers can report it.
#[derive(Debug)]
pub enum Guarded<T> {
    Applied(T),
    NotFound,
    StateMismatch { current: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Confirm,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirm => "confirmed",
            Self::Reject => "rejected",
        }
    }
}

/// Current headcounts of the reference and order tables.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EntityCounts {
    pub suppliers: u64,
    pub buyers: u64,
    pub drivers: u64,
    pub vehicles: u64,
    pub transport_orders: u64,
    pub buyer_requests: u64,
    pub confirmed_orders: u64,
}

/// Outcome counts over orders submitted inside one time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub total: u64,
    pub confirmed: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub cancelled: u64,
}

/// Live fulfillment figures, independent of any window.
#[derive(Debug, Clone, Copy, Default)]
pub struct FulfillmentCounts {
    pub pending_review: u64,
    pub active_shipments: u64,
    pub awaiting_driver: u64,
    pub delivered_total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    OrderSubmitted,
    OrderConfirmed,
    OrderRejected,
    RequestSubmitted,
    ShipmentDelivered,
    ShipmentCancelled,
}

/// One row of the recent-activity feed, structured so no consumer ever has
/// to parse a display string back apart.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub kind: ActivityKind,
    pub subject: String,
    pub at: DateTime<Utc>,
}

/// Typed access to the order-shaped tables plus the reference lookups the
/// core needs. One implementation per backing store; exactly one store per
/// process.
#[async_trait]
pub trait OrderStore: Send + Sync {
    // reference entities
    async fn insert_supplier(&self, supplier: &Supplier) -> StorageResult<()>;
    async fn insert_buyer(&self, buyer: &Buyer) -> StorageResult<()>;
    async fn insert_driver(&self, driver: &Driver) -> StorageResult<()>;
    async fn insert_vehicle(&self, vehicle: &Vehicle) -> StorageResult<()>;
    async fn supplier(&self, id: Uuid) -> StorageResult<Option<Supplier>>;
    async fn buyer(&self, id: Uuid) -> StorageResult<Option<Buyer>>;
    async fn driver(&self, id: Uuid) -> StorageResult<Option<Driver>>;
    async fn vehicle(&self, id: Uuid) -> StorageResult<Option<Vehicle>>;
    async fn suppliers(&self) -> StorageResult<Vec<Supplier>>;
    async fn buyers(&self) -> StorageResult<Vec<Buyer>>;
    async fn drivers(&self) -> StorageResult<Vec<Driver>>;
    async fn vehicles(&self) -> StorageResult<Vec<Vehicle>>;
    async fn delete_driver(&self, id: Uuid) -> StorageResult<bool>;
    async fn delete_vehicle(&self, id: Uuid) -> StorageResult<bool>;

    // transport orders
    async fn insert_transport_order(&self, order: &TransportOrder) -> StorageResult<()>;
    async fn transport_order(&self, id: Uuid) -> StorageResult<Option<TransportOrder>>;
    async fn transport_orders(&self) -> StorageResult<Vec<TransportOrder>>;

    /// Hard-deletes an order, but only while it is still `pending`.
    async fn delete_pending_transport_order(&self, id: Uuid) -> StorageResult<Guarded<()>>;

    /// Guarded admin decision: `pending` → confirmed/rejected, stamping notes
    /// and the action timestamp. When confirming, the supplied ConfirmedOrder
    /// is inserted in the same transaction, so the order is never left
    /// confirmed without it.
    async fn decide_transport_order(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        notes: &str,
        confirmed: Option<&ConfirmedOrder>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<TransportOrder>>;

    // buyer requests
    async fn insert_buyer_request(&self, request: &BuyerRequest) -> StorageResult<()>;
    async fn buyer_request(&self, id: Uuid) -> StorageResult<Option<BuyerRequest>>;
    async fn buyer_requests(&self) -> StorageResult<Vec<BuyerRequest>>;

    /// Guarded `draft` → `pending`, stamping the submission time.
    async fn submit_buyer_request(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<BuyerRequest>>;

    /// Same contract as [`Self::decide_transport_order`], over requests in an
    /// awaiting-review status (`pending` or legacy `submitted`).
    async fn decide_buyer_request(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        notes: &str,
        confirmed: Option<&ConfirmedOrder>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<BuyerRequest>>;

    /// Unguarded status mirror driven by shipment advancement.
    async fn set_buyer_request_status(
        &self,
        id: Uuid,
        status: BuyerRequestStatus,
    ) -> StorageResult<()>;

    // confirmed orders
    async fn confirmed_order(&self, id: Uuid) -> StorageResult<Option<ConfirmedOrder>>;
    async fn confirmed_orders(&self) -> StorageResult<Vec<ConfirmedOrder>>;
    async fn confirmed_order_for_origin(
        &self,
        origin_id: Uuid,
    ) -> StorageResult<Option<ConfirmedOrder>>;

    /// Fills in supplier/driver/vehicle references on a live shipment;
    /// fields passed as `None` are left alone. Refused once terminal.
    async fn assign_confirmed_order(
        &self,
        id: Uuid,
        supplier_id: Option<Uuid>,
        driver_id: Option<Uuid>,
        vehicle_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<ConfirmedOrder>>;

    /// Guarded fulfillment step `from` → `to`, stamping actual pickup or
    /// delivery times as appropriate.
    async fn advance_confirmed_order(
        &self,
        id: Uuid,
        from: FulfillmentStatus,
        to: FulfillmentStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<ConfirmedOrder>>;

    async fn active_confirmed_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> StorageResult<Vec<ConfirmedOrder>>;
    async fn active_confirmed_orders_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> StorageResult<Vec<ConfirmedOrder>>;
    async fn pending_transport_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> StorageResult<Vec<TransportOrder>>;

    // notifications
    /// Returns `false` when a notification with the same event key already
    /// exists; re-delivery of an event is a no-op.
    async fn insert_notification(&self, notification: &Notification) -> StorageResult<bool>;
    async fn notifications(&self, audience: &Audience) -> StorageResult<Vec<Notification>>;
    async fn mark_notification_read(&self, id: Uuid) -> StorageResult<bool>;
    async fn mark_all_read(&self, audience: &Audience) -> StorageResult<u64>;
    async fn clear_notifications(&self, audience: &Audience) -> StorageResult<u64>;
    async fn unread_count(&self, audience: &Audience) -> StorageResult<u64>;

    // aggregates
    async fn entity_counts(&self) -> StorageResult<EntityCounts>;
    async fn window_stats(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<WindowStats>;
    async fn fulfillment_counts(&self) -> StorageResult<FulfillmentCounts>;
    async fn recent_activity(&self, limit: usize) -> StorageResult<Vec<ActivityRecord>>;
}

/// An unavailable store degrades reads to an explicitly empty result so
/// dashboards and feeds show "no data" instead of failing; every other
/// storage fault surfaces.
pub fn degrade_unavailable<T: Default>(result: StorageResult<T>) -> StorageResult<T> {
    match result {
        Err(StorageError::Unavailable(_)) => Ok(T::default()),
        other => other,
    }
}

/// Bounded retry for idempotent operations: up to `attempts` tries, sleeping
/// `base_delay * attempt` between them. Only timeouts are retried;
/// referential conflicts and hard backend faults surface immediately.
pub async fn with_retry<T, F, Fut, R>(
    attempts: u32,
    base_delay: Duration,
    op: F,
    on_retry: R,
) -> StorageResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = StorageResult<T>>,
    R: Fn(u32),
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::warn!(attempt, error = %err, "transient storage error, retrying");
                on_retry(attempt);
                tokio::time::sleep(base_delay * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}
