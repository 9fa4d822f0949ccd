use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::confirmed::{ConfirmedOrder, FulfillmentStatus, OriginRef};
use crate::models::order::{Location, TransportOrder, TransportOrderStatus};
use crate::models::request::{BuyerRequest, BuyerRequestStatus};
use crate::notify::{Dispatcher, OrderEvent, TransitionKind};
use crate::observability::metrics::Metrics;
use crate::storage::{Guarded, OrderStore, ReviewDecision};

/// Bounds for retrying idempotent operations on transient storage errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewTransportOrder {
    pub supplier_id: Uuid,
    pub location: Location,
    pub vehicle_number: String,
    pub body_type: String,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct NewBuyerRequest {
    pub buyer_id: Uuid,
    pub load_description: String,
    pub origin: Location,
    pub destination: Location,
    pub quantity_tonnes: f64,
    pub required_by: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AssignShipment {
    #[serde(default)]
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
    #[serde(default)]
    pub vehicle_id: Option<Uuid>,
}

/// Result of a confirmation: the updated order, the execution record created
/// with it, and whether notification fanout completed.
#[derive(Debug, Serialize)]
pub struct ConfirmOutcome {
    pub order: TransportOrder,
    pub confirmed_order: ConfirmedOrder,
    pub notified: bool,
}

#[derive(Debug, Serialize)]
pub struct RequestConfirmOutcome {
    pub request: BuyerRequest,
    pub confirmed_order: ConfirmedOrder,
    pub notified: bool,
}

/// The single authority for moving orders between states. Every mutation is a
/// guarded check-then-write against the store; the derived ConfirmedOrder is
/// inserted in the same storage transaction as the status flip. Notification
/// fanout happens after the write and never rolls it back; the `notified`
/// flag tells the caller whether it completed.
pub struct TransitionEngine {
    pub(crate) store: Arc<dyn OrderStore>,
    dispatcher: Dispatcher,
    pub(crate) metrics: Metrics,
    pub(crate) retry: RetryPolicy,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        dispatcher: Dispatcher,
        metrics: Metrics,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            metrics,
            retry,
        }
    }

    pub(crate) fn observe(&self, action: &str, outcome: &str, start: Instant) {
        self.metrics
            .transitions_total
            .with_label_values(&[action, outcome])
            .inc();
        self.metrics
            .transition_latency_seconds
            .with_label_values(&[action, outcome])
            .observe(start.elapsed().as_secs_f64());
    }

    async fn fan_out(&self, event: &OrderEvent, transition: TransitionKind) -> bool {
        match self.dispatcher.on_transition(event, transition).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    order_id = %event.order_id,
                    transition = transition.as_str(),
                    error = %err,
                    "notification fanout failed; transition stands"
                );
                false
            }
        }
    }

    fn transport_event(&self, order: &TransportOrder, submitter: String) -> OrderEvent {
        OrderEvent {
            order_id: order.id,
            reference: order.vehicle_number.clone(),
            route: order.location.to_string(),
            load: None,
            submitter,
            supplier_id: Some(order.supplier_id),
            buyer_id: None,
            driver_id: order.driver_id,
            vehicle_id: None,
        }
    }

    fn request_event(&self, request: &BuyerRequest, submitter: String) -> OrderEvent {
        OrderEvent {
            order_id: request.id,
            reference: request.order_number.clone(),
            route: format!("{} to {}", request.origin, request.destination),
            load: Some(request.load_description.clone()),
            submitter,
            supplier_id: None,
            buyer_id: Some(request.buyer_id),
            driver_id: None,
            vehicle_id: None,
        }
    }

    /// Supplier submits a vehicle availability order; lands in `pending` and
    /// raises an admin feed entry.
    pub async fn submit_order(
        &self,
        new: NewTransportOrder,
    ) -> Result<(TransportOrder, bool), AppError> {
        let start = Instant::now();

        if !new.location.is_complete() {
            return Err(AppError::Validation(
                "location requires state, district and place".to_string(),
            ));
        }
        if new.vehicle_number.trim().is_empty() {
            return Err(AppError::Validation("vehicle number cannot be empty".to_string()));
        }

        let supplier = self
            .store
            .supplier(new.supplier_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("supplier {} not found", new.supplier_id)))?;

        if let Some(driver_id) = new.driver_id {
            self.store
                .driver(driver_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        }

        let now = Utc::now();
        let order = TransportOrder {
            id: Uuid::new_v4(),
            supplier_id: new.supplier_id,
            location: new.location,
            vehicle_number: new.vehicle_number.trim().to_string(),
            body_type: new.body_type,
            driver_id: new.driver_id,
            status: TransportOrderStatus::Pending,
            admin_notes: None,
            created_at: now,
            submitted_at: now,
            admin_action_at: None,
        };

        self.store.insert_transport_order(&order).await?;

        let event = self.transport_event(&order, supplier.name);
        let notified = match self.dispatcher.on_submit(&event).await {
            Ok(()) => true,
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "submit notification failed");
                false
            }
        };

        info!(order_id = %order.id, supplier_id = %order.supplier_id, "order submitted");
        self.observe("submit", "success", start);
        Ok((order, notified))
    }

    /// Admin confirms a pending order. Flips status, records notes and the
    /// action time, and creates exactly one ConfirmedOrder (status
    /// `assigned`) in the same transaction.
    pub async fn confirm_order(&self, id: Uuid, notes: &str) -> Result<ConfirmOutcome, AppError> {
        let start = Instant::now();

        let existing = self
            .store
            .transport_order(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        let now = Utc::now();
        let confirmed = ConfirmedOrder {
            id: Uuid::new_v4(),
            origin: OriginRef::TransportOrder(id),
            supplier_id: Some(existing.supplier_id),
            driver_id: existing.driver_id,
            vehicle_id: None,
            status: FulfillmentStatus::Assigned,
            planned_pickup: None,
            planned_delivery: None,
            actual_pickup: None,
            actual_delivery: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        let order = match self
            .store
            .decide_transport_order(id, ReviewDecision::Confirm, notes, Some(&confirmed), now)
            .await?
        {
            Guarded::Applied(order) => order,
            Guarded::NotFound => {
                self.observe("confirm", "not_found", start);
                return Err(AppError::NotFound(format!("order {id} not found")));
            }
            Guarded::StateMismatch { current } => {
                self.observe("confirm", "invalid_state", start);
                return Err(AppError::InvalidState(format!(
                    "order {id} is {current}, only pending orders can be confirmed"
                )));
            }
        };

        let event = self.transport_event(&order, String::new());
        let notified = self.fan_out(&event, TransitionKind::Confirmed).await;

        info!(order_id = %id, confirmed_order_id = %confirmed.id, "order confirmed");
        self.observe("confirm", "success", start);
        Ok(ConfirmOutcome {
            order,
            confirmed_order: confirmed,
            notified,
        })
    }

    /// Admin rejects a pending order. Terminal; no ConfirmedOrder is created,
    /// however often this is retried.
    pub async fn reject_order(
        &self,
        id: Uuid,
        notes: &str,
    ) -> Result<(TransportOrder, bool), AppError> {
        let start = Instant::now();
        let now = Utc::now();

        let order = match self
            .store
            .decide_transport_order(id, ReviewDecision::Reject, notes, None, now)
            .await?
        {
            Guarded::Applied(order) => order,
            Guarded::NotFound => {
                self.observe("reject", "not_found", start);
                return Err(AppError::NotFound(format!("order {id} not found")));
            }
            Guarded::StateMismatch { current } => {
                self.observe("reject", "invalid_state", start);
                return Err(AppError::InvalidState(format!(
                    "order {id} is {current}, only pending orders can be rejected"
                )));
            }
        };

        let event = self.transport_event(&order, String::new());
        let notified = self.fan_out(&event, TransitionKind::Rejected).await;

        info!(order_id = %id, "order rejected");
        self.observe("reject", "success", start);
        Ok((order, notified))
    }

    /// Owner withdraws an order while it is still pending. Nothing downstream
    /// exists yet, so this is a hard delete. A confirmed order reports its
    /// execution record as the blocking reference instead.
    pub async fn withdraw_order(&self, id: Uuid) -> Result<(), AppError> {
        let start = Instant::now();

        match self.store.delete_pending_transport_order(id).await? {
            Guarded::Applied(()) => {
                info!(order_id = %id, "pending order withdrawn");
                self.observe("withdraw", "success", start);
                Ok(())
            }
            Guarded::NotFound => {
                self.observe("withdraw", "not_found", start);
                Err(AppError::NotFound(format!("order {id} not found")))
            }
            Guarded::StateMismatch { current } => {
                if let Some(shipment) = self.store.confirmed_order_for_origin(id).await? {
                    self.observe("withdraw", "conflict", start);
                    return Err(AppError::Conflict(vec![crate::error::BlockingRecord {
                        id: shipment.id,
                        summary: format!("shipment {} ({})", shipment.id, shipment.status),
                    }]));
                }
                self.observe("withdraw", "invalid_state", start);
                Err(AppError::InvalidState(format!(
                    "order {id} is {current}, only pending orders can be withdrawn"
                )))
            }
        }
    }

    /// Buyer creates a request; stays `draft` until submitted.
    pub async fn create_request(&self, new: NewBuyerRequest) -> Result<BuyerRequest, AppError> {
        if !new.origin.is_complete() || !new.destination.is_complete() {
            return Err(AppError::Validation(
                "origin and destination require state, district and place".to_string(),
            ));
        }
        if new.load_description.trim().is_empty() {
            return Err(AppError::Validation("load description cannot be empty".to_string()));
        }
        if new.quantity_tonnes <= 0.0 {
            return Err(AppError::Validation("quantity must be positive".to_string()));
        }

        self.store
            .buyer(new.buyer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("buyer {} not found", new.buyer_id)))?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let request = BuyerRequest {
            id,
            buyer_id: new.buyer_id,
            order_number: BuyerRequest::order_number_for(id, now),
            load_description: new.load_description,
            origin: new.origin,
            destination: new.destination,
            quantity_tonnes: new.quantity_tonnes,
            required_by: new.required_by,
            status: BuyerRequestStatus::Draft,
            admin_notes: None,
            created_at: now,
            submitted_at: None,
            admin_action_at: None,
        };

        self.store.insert_buyer_request(&request).await?;
        info!(request_id = %request.id, order_number = %request.order_number, "request drafted");
        Ok(request)
    }

    /// Buyer submits a draft for admin review; raises an admin feed entry.
    pub async fn submit_request(&self, id: Uuid) -> Result<(BuyerRequest, bool), AppError> {
        let start = Instant::now();
        let now = Utc::now();

        let request = match self.store.submit_buyer_request(id, now).await? {
            Guarded::Applied(request) => request,
            Guarded::NotFound => {
                self.observe("submit_request", "not_found", start);
                return Err(AppError::NotFound(format!("request {id} not found")));
            }
            Guarded::StateMismatch { current } => {
                self.observe("submit_request", "invalid_state", start);
                return Err(AppError::InvalidState(format!(
                    "request {id} is {current}, only drafts can be submitted"
                )));
            }
        };

        let buyer_name = self
            .store
            .buyer(request.buyer_id)
            .await
            .ok()
            .flatten()
            .map(|buyer| buyer.name)
            .unwrap_or_else(|| "buyer".to_string());

        let event = self.request_event(&request, buyer_name);
        let notified = match self.dispatcher.on_submit(&event).await {
            Ok(()) => true,
            Err(err) => {
                warn!(request_id = %id, error = %err, "submit notification failed");
                false
            }
        };

        info!(request_id = %id, "request submitted for review");
        self.observe("submit_request", "success", start);
        Ok((request, notified))
    }

    /// Admin confirms a request awaiting review; creates its ConfirmedOrder
    /// (unassigned until a supplier takes it) in the same transaction.
    pub async fn confirm_request(
        &self,
        id: Uuid,
        notes: &str,
    ) -> Result<RequestConfirmOutcome, AppError> {
        let start = Instant::now();
        let now = Utc::now();

        let confirmed = ConfirmedOrder {
            id: Uuid::new_v4(),
            origin: OriginRef::BuyerRequest(id),
            supplier_id: None,
            driver_id: None,
            vehicle_id: None,
            status: FulfillmentStatus::Assigned,
            planned_pickup: None,
            planned_delivery: None,
            actual_pickup: None,
            actual_delivery: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        let request = match self
            .store
            .decide_buyer_request(id, ReviewDecision::Confirm, notes, Some(&confirmed), now)
            .await?
        {
            Guarded::Applied(request) => request,
            Guarded::NotFound => {
                self.observe("confirm_request", "not_found", start);
                return Err(AppError::NotFound(format!("request {id} not found")));
            }
            Guarded::StateMismatch { current } => {
                self.observe("confirm_request", "invalid_state", start);
                return Err(AppError::InvalidState(format!(
                    "request {id} is {current}, only requests awaiting review can be confirmed"
                )));
            }
        };

        let event = self.request_event(&request, String::new());
        let notified = self.fan_out(&event, TransitionKind::Confirmed).await;

        info!(request_id = %id, confirmed_order_id = %confirmed.id, "request confirmed");
        self.observe("confirm_request", "success", start);
        Ok(RequestConfirmOutcome {
            request,
            confirmed_order: confirmed,
            notified,
        })
    }

    pub async fn reject_request(
        &self,
        id: Uuid,
        notes: &str,
    ) -> Result<(BuyerRequest, bool), AppError> {
        let start = Instant::now();
        let now = Utc::now();

        let request = match self
            .store
            .decide_buyer_request(id, ReviewDecision::Reject, notes, None, now)
            .await?
        {
            Guarded::Applied(request) => request,
            Guarded::NotFound => {
                self.observe("reject_request", "not_found", start);
                return Err(AppError::NotFound(format!("request {id} not found")));
            }
            Guarded::StateMismatch { current } => {
                self.observe("reject_request", "invalid_state", start);
                return Err(AppError::InvalidState(format!(
                    "request {id} is {current}, only requests awaiting review can be rejected"
                )));
            }
        };

        let event = self.request_event(&request, String::new());
        let notified = self.fan_out(&event, TransitionKind::Rejected).await;

        info!(request_id = %id, "request rejected");
        self.observe("reject_request", "success", start);
        Ok((request, notified))
    }

    /// Admin fills in the supplier, driver or vehicle on a live shipment.
    /// Every referenced record must exist; terminal shipments refuse.
    pub async fn assign_shipment(
        &self,
        id: Uuid,
        assign: AssignShipment,
    ) -> Result<ConfirmedOrder, AppError> {
        let start = Instant::now();

        if assign.supplier_id.is_none()
            && assign.driver_id.is_none()
            && assign.vehicle_id.is_none()
        {
            return Err(AppError::Validation(
                "assignment must name a supplier, driver or vehicle".to_string(),
            ));
        }

        if let Some(supplier_id) = assign.supplier_id {
            self.store
                .supplier(supplier_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("supplier {supplier_id} not found")))?;
        }
        if let Some(driver_id) = assign.driver_id {
            self.store
                .driver(driver_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        }
        if let Some(vehicle_id) = assign.vehicle_id {
            self.store
                .vehicle(vehicle_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("vehicle {vehicle_id} not found")))?;
        }

        match self
            .store
            .assign_confirmed_order(
                id,
                assign.supplier_id,
                assign.driver_id,
                assign.vehicle_id,
                Utc::now(),
            )
            .await?
        {
            Guarded::Applied(shipment) => {
                info!(shipment_id = %id, "shipment assignment updated");
                self.observe("assign", "success", start);
                Ok(shipment)
            }
            Guarded::NotFound => {
                self.observe("assign", "not_found", start);
                Err(AppError::NotFound(format!("shipment {id} not found")))
            }
            Guarded::StateMismatch { current } => {
                self.observe("assign", "invalid_state", start);
                Err(AppError::InvalidState(format!(
                    "shipment {id} is {current}, assignments are closed"
                )))
            }
        }
    }

    /// Supplier advances a shipment one step along
    /// assigned → picked_up → in_transit → delivered.
    pub async fn advance_shipment(
        &self,
        id: Uuid,
    ) -> Result<(ConfirmedOrder, bool), AppError> {
        let start = Instant::now();

        let shipment = self
            .store
            .confirmed_order(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;

        let Some(next) = shipment.status.next() else {
            self.observe("advance", "invalid_state", start);
            return Err(AppError::InvalidState(format!(
                "shipment {id} is {}, which has no further step",
                shipment.status
            )));
        };

        self.step_shipment(shipment, next, "advance", start).await
    }

    /// Cancels a shipment from any non-terminal state; mirrors onto the
    /// originating request.
    pub async fn cancel_shipment(&self, id: Uuid) -> Result<(ConfirmedOrder, bool), AppError> {
        let start = Instant::now();

        let shipment = self
            .store
            .confirmed_order(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("shipment {id} not found")))?;

        if shipment.status.is_terminal() {
            self.observe("cancel", "invalid_state", start);
            return Err(AppError::InvalidState(format!(
                "shipment {id} is already {}",
                shipment.status
            )));
        }

        self.step_shipment(shipment, FulfillmentStatus::Cancelled, "cancel", start)
            .await
    }

    async fn step_shipment(
        &self,
        shipment: ConfirmedOrder,
        to: FulfillmentStatus,
        action: &str,
        start: Instant,
    ) -> Result<(ConfirmedOrder, bool), AppError> {
        let now = Utc::now();
        let id = shipment.id;

        let updated = match self
            .store
            .advance_confirmed_order(id, shipment.status, to, now)
            .await?
        {
            Guarded::Applied(updated) => updated,
            Guarded::NotFound => {
                self.observe(action, "not_found", start);
                return Err(AppError::NotFound(format!("shipment {id} not found")));
            }
            Guarded::StateMismatch { current } => {
                self.observe(action, "invalid_state", start);
                return Err(AppError::InvalidState(format!(
                    "shipment {id} moved to {current} concurrently"
                )));
            }
        };

        let (event, transition) = self.shipment_event(&updated).await?;
        let notified = self.fan_out(&event, transition).await;

        info!(shipment_id = %id, status = %updated.status, "shipment stepped");
        self.observe(action, "success", start);
        Ok((updated, notified))
    }

    /// Resolves the origin for fanout and mirrors the fulfillment status onto
    /// an originating buyer request.
    async fn shipment_event(
        &self,
        shipment: &ConfirmedOrder,
    ) -> Result<(OrderEvent, TransitionKind), AppError> {
        let transition = match shipment.status {
            FulfillmentStatus::PickedUp => TransitionKind::PickedUp,
            FulfillmentStatus::InTransit => TransitionKind::InTransit,
            FulfillmentStatus::Delivered => TransitionKind::Delivered,
            FulfillmentStatus::Cancelled => TransitionKind::Cancelled,
            FulfillmentStatus::Assigned => TransitionKind::Confirmed,
        };

        let mut event = OrderEvent {
            order_id: shipment.origin.id(),
            reference: shipment.id.to_string(),
            route: String::new(),
            load: None,
            submitter: String::new(),
            supplier_id: shipment.supplier_id,
            buyer_id: None,
            driver_id: shipment.driver_id,
            vehicle_id: shipment.vehicle_id,
        };

        match shipment.origin {
            OriginRef::TransportOrder(origin_id) => {
                if let Some(order) = self.store.transport_order(origin_id).await? {
                    event.reference = order.vehicle_number.clone();
                    event.route = order.location.to_string();
                }
            }
            OriginRef::BuyerRequest(origin_id) => {
                if let Some(request) = self.store.buyer_request(origin_id).await? {
                    event.reference = request.order_number.clone();
                    event.route = format!("{} to {}", request.origin, request.destination);
                    event.buyer_id = Some(request.buyer_id);

                    let mirrored = match shipment.status {
                        FulfillmentStatus::Assigned => BuyerRequestStatus::Assigned,
                        FulfillmentStatus::PickedUp => BuyerRequestStatus::PickedUp,
                        FulfillmentStatus::InTransit => BuyerRequestStatus::InTransit,
                        FulfillmentStatus::Delivered => BuyerRequestStatus::Delivered,
                        FulfillmentStatus::Cancelled => BuyerRequestStatus::Cancelled,
                    };
                    self.store
                        .set_buyer_request_status(origin_id, mirrored)
                        .await?;
                }
            }
        }

        Ok((event, transition))
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast;

    use super::*;
    use crate::models::notification::{Audience, NotificationPriority};
    use crate::models::party::{Buyer, Driver, Supplier, Vehicle};
    use crate::storage::memory::MemoryStore;

    struct Harness {
        engine: TransitionEngine,
        store: Arc<MemoryStore>,
        dispatcher: Dispatcher,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let (events_tx, _rx) = broadcast::channel(64);
        let metrics = Metrics::new();
        let dispatcher = Dispatcher::new(store.clone(), events_tx, metrics.clone());
        let engine = TransitionEngine::new(
            store.clone(),
            dispatcher.clone(),
            metrics,
            RetryPolicy {
                attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        );
        Harness {
            engine,
            store,
            dispatcher,
        }
    }

    fn location() -> Location {
        Location {
            state: "Kerala".to_string(),
            district: "Ernakulam".to_string(),
            place: "Kochi".to_string(),
            taluk: Some("Kanayannur".to_string()),
        }
    }

    async fn seed_supplier(store: &MemoryStore) -> Supplier {
        let supplier = Supplier {
            id: Uuid::new_v4(),
            name: "Malabar Logistics".to_string(),
            phone: None,
            created_at: Utc::now(),
        };
        store.insert_supplier(&supplier).await.unwrap();
        supplier
    }

    async fn seed_buyer(store: &MemoryStore) -> Buyer {
        let buyer = Buyer {
            id: Uuid::new_v4(),
            name: "Cochin Mills".to_string(),
            phone: None,
            created_at: Utc::now(),
        };
        store.insert_buyer(&buyer).await.unwrap();
        buyer
    }

    async fn seed_driver(store: &MemoryStore, supplier_id: Uuid) -> Driver {
        let driver = Driver {
            id: Uuid::new_v4(),
            supplier_id,
            name: "Ravi".to_string(),
            licence_number: "KL-2020-0001234".to_string(),
            created_at: Utc::now(),
        };
        store.insert_driver(&driver).await.unwrap();
        driver
    }

    fn new_order(supplier_id: Uuid, driver_id: Option<Uuid>) -> NewTransportOrder {
        NewTransportOrder {
            supplier_id,
            location: location(),
            vehicle_number: "KL-07-AB-1234".to_string(),
            body_type: "container".to_string(),
            driver_id,
        }
    }

    #[tokio::test]
    async fn confirm_flips_pending_and_creates_exactly_one_confirmed_order() {
        let h = harness();
        let supplier = seed_supplier(&h.store).await;
        let (order, _) = h.engine.submit_order(new_order(supplier.id, None)).await.unwrap();
        assert_eq!(order.status, TransportOrderStatus::Pending);

        let outcome = h.engine.confirm_order(order.id, "ok").await.unwrap();
        assert_eq!(outcome.order.status, TransportOrderStatus::Confirmed);
        assert_eq!(outcome.order.admin_notes.as_deref(), Some("ok"));
        assert_eq!(outcome.confirmed_order.status, FulfillmentStatus::Assigned);
        assert_eq!(
            outcome.confirmed_order.origin,
            OriginRef::TransportOrder(order.id)
        );
        assert!(outcome.notified);

        // a second confirm fails the guard and adds nothing
        let err = h.engine.confirm_order(order.id, "again").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(h.store.confirmed_orders().await.unwrap().len(), 1);

        // supplier feed entry is high priority
        let feed = h
            .dispatcher
            .feed(&Audience::Supplier(supplier.id))
            .await
            .unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].priority, NotificationPriority::High);
    }

    #[tokio::test]
    async fn reject_is_terminal_and_never_creates_a_confirmed_order() {
        let h = harness();
        let supplier = seed_supplier(&h.store).await;
        let (order, _) = h.engine.submit_order(new_order(supplier.id, None)).await.unwrap();

        let (rejected, _) = h
            .engine
            .reject_order(order.id, "docs incomplete")
            .await
            .unwrap();
        assert_eq!(rejected.status, TransportOrderStatus::Rejected);
        assert!(h.store.confirmed_orders().await.unwrap().is_empty());

        let err = h.engine.reject_order(order.id, "again").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(h.store.confirmed_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_requires_an_existing_order() {
        let h = harness();
        let err = h.engine.confirm_order(Uuid::new_v4(), "ok").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn submit_validates_location_and_supplier() {
        let h = harness();
        let supplier = seed_supplier(&h.store).await;

        let mut incomplete = new_order(supplier.id, None);
        incomplete.location.district = String::new();
        let err = h.engine.submit_order(incomplete).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = h
            .engine
            .submit_order(new_order(Uuid::new_v4(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn withdraw_only_while_pending() {
        let h = harness();
        let supplier = seed_supplier(&h.store).await;

        let (order, _) = h.engine.submit_order(new_order(supplier.id, None)).await.unwrap();
        let outcome = h.engine.confirm_order(order.id, "ok").await.unwrap();
        let err = h.engine.withdraw_order(order.id).await.unwrap_err();
        let AppError::Conflict(blocking) = err else {
            panic!("expected the shipment to block the withdrawal");
        };
        assert_eq!(blocking[0].id, outcome.confirmed_order.id);

        let (pending, _) = h.engine.submit_order(new_order(supplier.id, None)).await.unwrap();
        h.engine.withdraw_order(pending.id).await.unwrap();
        assert!(h.store.transport_order(pending.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shipment_advances_in_order_and_mirrors_the_request() {
        let h = harness();
        let buyer = seed_buyer(&h.store).await;

        let request = h
            .engine
            .create_request(NewBuyerRequest {
                buyer_id: buyer.id,
                load_description: "20t of rubber".to_string(),
                origin: location(),
                destination: location(),
                quantity_tonnes: 20.0,
                required_by: Utc::now().date_naive(),
            })
            .await
            .unwrap();
        assert_eq!(request.status, BuyerRequestStatus::Draft);

        let (submitted, _) = h.engine.submit_request(request.id).await.unwrap();
        assert_eq!(submitted.status, BuyerRequestStatus::Pending);

        let outcome = h.engine.confirm_request(request.id, "ok").await.unwrap();
        let shipment_id = outcome.confirmed_order.id;

        for expected in [
            FulfillmentStatus::PickedUp,
            FulfillmentStatus::InTransit,
            FulfillmentStatus::Delivered,
        ] {
            let (shipment, _) = h.engine.advance_shipment(shipment_id).await.unwrap();
            assert_eq!(shipment.status, expected);
        }

        let mirrored = h.store.buyer_request(request.id).await.unwrap().unwrap();
        assert_eq!(mirrored.status, BuyerRequestStatus::Delivered);

        let err = h.engine.advance_shipment(shipment_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn cancel_rejected_for_terminal_shipments() {
        let h = harness();
        let supplier = seed_supplier(&h.store).await;
        let (order, _) = h.engine.submit_order(new_order(supplier.id, None)).await.unwrap();
        let outcome = h.engine.confirm_order(order.id, "ok").await.unwrap();

        let (cancelled, _) = h
            .engine
            .cancel_shipment(outcome.confirmed_order.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, FulfillmentStatus::Cancelled);

        let err = h
            .engine
            .cancel_shipment(outcome.confirmed_order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn draft_requests_cannot_be_confirmed() {
        let h = harness();
        let buyer = seed_buyer(&h.store).await;
        let request = h
            .engine
            .create_request(NewBuyerRequest {
                buyer_id: buyer.id,
                load_description: "timber".to_string(),
                origin: location(),
                destination: location(),
                quantity_tonnes: 5.0,
                required_by: Utc::now().date_naive(),
            })
            .await
            .unwrap();

        let err = h.engine.confirm_request(request.id, "ok").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(h.store.confirmed_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn driver_delete_blocked_by_live_references() {
        let h = harness();
        let supplier = seed_supplier(&h.store).await;
        let driver = seed_driver(&h.store, supplier.id).await;

        let (order, _) = h
            .engine
            .submit_order(new_order(supplier.id, Some(driver.id)))
            .await
            .unwrap();
        let outcome = h.engine.confirm_order(order.id, "ok").await.unwrap();
        assert_eq!(outcome.confirmed_order.driver_id, Some(driver.id));

        let err = h.engine.delete_driver(driver.id).await.unwrap_err();
        let AppError::Conflict(blocking) = err else {
            panic!("expected a conflict");
        };
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].id, outcome.confirmed_order.id);
        assert!(h.store.driver(driver.id).await.unwrap().is_some());

        // once the shipment reaches a terminal state the driver can go
        h.engine
            .cancel_shipment(outcome.confirmed_order.id)
            .await
            .unwrap();
        h.engine.delete_driver(driver.id).await.unwrap();
        assert!(h.store.driver(driver.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vehicle_delete_blocked_after_assignment() {
        let h = harness();
        let buyer = seed_buyer(&h.store).await;
        let supplier = seed_supplier(&h.store).await;

        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            supplier_id: supplier.id,
            registration_number: "KL-07-CD-5678".to_string(),
            body_type: "container".to_string(),
            created_at: Utc::now(),
        };
        h.store.insert_vehicle(&vehicle).await.unwrap();

        let request = h
            .engine
            .create_request(NewBuyerRequest {
                buyer_id: buyer.id,
                load_description: "cement".to_string(),
                origin: location(),
                destination: location(),
                quantity_tonnes: 12.0,
                required_by: Utc::now().date_naive(),
            })
            .await
            .unwrap();
        h.engine.submit_request(request.id).await.unwrap();
        let outcome = h.engine.confirm_request(request.id, "ok").await.unwrap();

        let shipment = h
            .engine
            .assign_shipment(
                outcome.confirmed_order.id,
                AssignShipment {
                    supplier_id: Some(supplier.id),
                    driver_id: None,
                    vehicle_id: Some(vehicle.id),
                },
            )
            .await
            .unwrap();
        assert_eq!(shipment.supplier_id, Some(supplier.id));
        assert_eq!(shipment.vehicle_id, Some(vehicle.id));

        let err = h.engine.delete_vehicle(vehicle.id).await.unwrap_err();
        let AppError::Conflict(blocking) = err else {
            panic!("expected a conflict");
        };
        assert_eq!(blocking.len(), 1);
        assert!(h.store.vehicle(vehicle.id).await.unwrap().is_some());

        for _ in 0..3 {
            h.engine.advance_shipment(shipment.id).await.unwrap();
        }
        h.engine.delete_vehicle(vehicle.id).await.unwrap();
        assert!(h.store.vehicle(vehicle.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn assignment_requires_existing_references() {
        let h = harness();
        let supplier = seed_supplier(&h.store).await;
        let (order, _) = h.engine.submit_order(new_order(supplier.id, None)).await.unwrap();
        let outcome = h.engine.confirm_order(order.id, "ok").await.unwrap();

        let err = h
            .engine
            .assign_shipment(
                outcome.confirmed_order.id,
                AssignShipment {
                    supplier_id: None,
                    driver_id: Some(Uuid::new_v4()),
                    vehicle_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = h
            .engine
            .assign_shipment(
                outcome.confirmed_order.id,
                AssignShipment {
                    supplier_id: None,
                    driver_id: None,
                    vehicle_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unreferenced_driver_deletes_cleanly() {
        let h = harness();
        let supplier = seed_supplier(&h.store).await;
        let driver = seed_driver(&h.store, supplier.id).await;

        h.engine.delete_driver(driver.id).await.unwrap();
        assert!(h.store.driver(driver.id).await.unwrap().is_none());
    }
}
