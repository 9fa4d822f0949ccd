use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::models::confirmed::{ConfirmedOrder, FulfillmentStatus, OriginRef};
use crate::models::notification::{Audience, Notification};
use crate::models::order::{TransportOrder, TransportOrderStatus};
use crate::models::party::{Buyer, Driver, Supplier, Vehicle};
use crate::models::request::{BuyerRequest, BuyerRequestStatus};
use crate::storage::{
    ActivityKind, ActivityRecord, EntityCounts, FulfillmentCounts, Guarded, OrderStore,
    ReviewDecision, StorageResult, WindowStats,
};

/// In-process store for tests and local development. Same contract as the
/// Postgres backend; never used as a fallback for it.
#[derive(Default)]
pub struct MemoryStore {
    suppliers: DashMap<Uuid, Supplier>,
    buyers: DashMap<Uuid, Buyer>,
    drivers: DashMap<Uuid, Driver>,
    vehicles: DashMap<Uuid, Vehicle>,
    transport_orders: DashMap<Uuid, TransportOrder>,
    buyer_requests: DashMap<Uuid, BuyerRequest>,
    confirmed_orders: DashMap<Uuid, ConfirmedOrder>,
    notifications: DashMap<Uuid, Notification>,
    event_keys: DashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn buyer_request_confirmed(status: BuyerRequestStatus) -> bool {
        matches!(
            status,
            BuyerRequestStatus::Confirmed
                | BuyerRequestStatus::Assigned
                | BuyerRequestStatus::PickedUp
                | BuyerRequestStatus::InTransit
                | BuyerRequestStatus::Delivered
        )
    }

    fn origin_submitted_at(&self, origin: &OriginRef) -> Option<DateTime<Utc>> {
        match origin {
            OriginRef::TransportOrder(id) => self
                .transport_orders
                .get(id)
                .map(|order| order.submitted_at),
            OriginRef::BuyerRequest(id) => self
                .buyer_requests
                .get(id)
                .and_then(|request| request.submitted_at),
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_supplier(&self, supplier: &Supplier) -> StorageResult<()> {
        self.suppliers.insert(supplier.id, supplier.clone());
        Ok(())
    }

    async fn insert_buyer(&self, buyer: &Buyer) -> StorageResult<()> {
        self.buyers.insert(buyer.id, buyer.clone());
        Ok(())
    }

    async fn insert_driver(&self, driver: &Driver) -> StorageResult<()> {
        self.drivers.insert(driver.id, driver.clone());
        Ok(())
    }

    async fn insert_vehicle(&self, vehicle: &Vehicle) -> StorageResult<()> {
        self.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn supplier(&self, id: Uuid) -> StorageResult<Option<Supplier>> {
        Ok(self.suppliers.get(&id).map(|entry| entry.clone()))
    }

    async fn buyer(&self, id: Uuid) -> StorageResult<Option<Buyer>> {
        Ok(self.buyers.get(&id).map(|entry| entry.clone()))
    }

    async fn driver(&self, id: Uuid) -> StorageResult<Option<Driver>> {
        Ok(self.drivers.get(&id).map(|entry| entry.clone()))
    }

    async fn vehicle(&self, id: Uuid) -> StorageResult<Option<Vehicle>> {
        Ok(self.vehicles.get(&id).map(|entry| entry.clone()))
    }

    async fn suppliers(&self) -> StorageResult<Vec<Supplier>> {
        Ok(self.suppliers.iter().map(|entry| entry.clone()).collect())
    }

    async fn buyers(&self) -> StorageResult<Vec<Buyer>> {
        Ok(self.buyers.iter().map(|entry| entry.clone()).collect())
    }

    async fn drivers(&self) -> StorageResult<Vec<Driver>> {
        Ok(self.drivers.iter().map(|entry| entry.clone()).collect())
    }

    async fn vehicles(&self) -> StorageResult<Vec<Vehicle>> {
        Ok(self.vehicles.iter().map(|entry| entry.clone()).collect())
    }

    async fn delete_driver(&self, id: Uuid) -> StorageResult<bool> {
        Ok(self.drivers.remove(&id).is_some())
    }

    async fn delete_vehicle(&self, id: Uuid) -> StorageResult<bool> {
        Ok(self.vehicles.remove(&id).is_some())
    }

    async fn insert_transport_order(&self, order: &TransportOrder) -> StorageResult<()> {
        self.transport_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn transport_order(&self, id: Uuid) -> StorageResult<Option<TransportOrder>> {
        Ok(self.transport_orders.get(&id).map(|entry| entry.clone()))
    }

    async fn transport_orders(&self) -> StorageResult<Vec<TransportOrder>> {
        let mut orders: Vec<TransportOrder> = self
            .transport_orders
            .iter()
            .map(|entry| entry.clone())
            .collect();
        orders.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(orders)
    }

    async fn delete_pending_transport_order(&self, id: Uuid) -> StorageResult<Guarded<()>> {
        let removed = self
            .transport_orders
            .remove_if(&id, |_, order| {
                order.status == TransportOrderStatus::Pending
            })
            .is_some();
        if removed {
            return Ok(Guarded::Applied(()));
        }

        match self.transport_orders.get(&id) {
            Some(order) => Ok(Guarded::StateMismatch {
                current: order.status.to_string(),
            }),
            None => Ok(Guarded::NotFound),
        }
    }

    async fn decide_transport_order(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        notes: &str,
        confirmed: Option<&ConfirmedOrder>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<TransportOrder>> {
        let Some(mut order) = self.transport_orders.get_mut(&id) else {
            return Ok(Guarded::NotFound);
        };

        if order.status != TransportOrderStatus::Pending {
            return Ok(Guarded::StateMismatch {
                current: order.status.to_string(),
            });
        }

        order.status = match decision {
            ReviewDecision::Confirm => TransportOrderStatus::Confirmed,
            ReviewDecision::Reject => TransportOrderStatus::Rejected,
        };
        order.admin_notes = Some(notes.to_string());
        order.admin_action_at = Some(at);

        // Insert while still holding the order guard so the pair is applied
        // as one unit, matching the Postgres transaction.
        if let Some(confirmed) = confirmed {
            self.confirmed_orders.insert(confirmed.id, confirmed.clone());
        }

        Ok(Guarded::Applied(order.clone()))
    }

    async fn insert_buyer_request(&self, request: &BuyerRequest) -> StorageResult<()> {
        self.buyer_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn buyer_request(&self, id: Uuid) -> StorageResult<Option<BuyerRequest>> {
        Ok(self.buyer_requests.get(&id).map(|entry| entry.clone()))
    }

    async fn buyer_requests(&self) -> StorageResult<Vec<BuyerRequest>> {
        let mut requests: Vec<BuyerRequest> = self
            .buyer_requests
            .iter()
            .map(|entry| entry.clone())
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn submit_buyer_request(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<BuyerRequest>> {
        let Some(mut request) = self.buyer_requests.get_mut(&id) else {
            return Ok(Guarded::NotFound);
        };

        if request.status != BuyerRequestStatus::Draft {
            return Ok(Guarded::StateMismatch {
                current: request.status.to_string(),
            });
        }

        request.status = BuyerRequestStatus::Pending;
        request.submitted_at = Some(at);
        Ok(Guarded::Applied(request.clone()))
    }

    async fn decide_buyer_request(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        notes: &str,
        confirmed: Option<&ConfirmedOrder>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<BuyerRequest>> {
        let Some(mut request) = self.buyer_requests.get_mut(&id) else {
            return Ok(Guarded::NotFound);
        };

        if !request.status.awaiting_review() {
            return Ok(Guarded::StateMismatch {
                current: request.status.to_string(),
            });
        }

        request.status = match decision {
            ReviewDecision::Confirm => BuyerRequestStatus::Confirmed,
            ReviewDecision::Reject => BuyerRequestStatus::Rejected,
        };
        request.admin_notes = Some(notes.to_string());
        request.admin_action_at = Some(at);

        if let Some(confirmed) = confirmed {
            self.confirmed_orders.insert(confirmed.id, confirmed.clone());
        }

        Ok(Guarded::Applied(request.clone()))
    }

    async fn set_buyer_request_status(
        &self,
        id: Uuid,
        status: BuyerRequestStatus,
    ) -> StorageResult<()> {
        if let Some(mut request) = self.buyer_requests.get_mut(&id) {
            request.status = status;
        }
        Ok(())
    }

    async fn confirmed_order(&self, id: Uuid) -> StorageResult<Option<ConfirmedOrder>> {
        Ok(self.confirmed_orders.get(&id).map(|entry| entry.clone()))
    }

    async fn confirmed_orders(&self) -> StorageResult<Vec<ConfirmedOrder>> {
        let mut orders: Vec<ConfirmedOrder> = self
            .confirmed_orders
            .iter()
            .map(|entry| entry.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn confirmed_order_for_origin(
        &self,
        origin_id: Uuid,
    ) -> StorageResult<Option<ConfirmedOrder>> {
        Ok(self
            .confirmed_orders
            .iter()
            .find(|entry| entry.origin.id() == origin_id)
            .map(|entry| entry.clone()))
    }

    async fn assign_confirmed_order(
        &self,
        id: Uuid,
        supplier_id: Option<Uuid>,
        driver_id: Option<Uuid>,
        vehicle_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<ConfirmedOrder>> {
        let Some(mut order) = self.confirmed_orders.get_mut(&id) else {
            return Ok(Guarded::NotFound);
        };

        if order.status.is_terminal() {
            return Ok(Guarded::StateMismatch {
                current: order.status.to_string(),
            });
        }

        if supplier_id.is_some() {
            order.supplier_id = supplier_id;
        }
        if driver_id.is_some() {
            order.driver_id = driver_id;
        }
        if vehicle_id.is_some() {
            order.vehicle_id = vehicle_id;
        }
        order.updated_at = at;

        Ok(Guarded::Applied(order.clone()))
    }

    async fn advance_confirmed_order(
        &self,
        id: Uuid,
        from: FulfillmentStatus,
        to: FulfillmentStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<Guarded<ConfirmedOrder>> {
        let Some(mut order) = self.confirmed_orders.get_mut(&id) else {
            return Ok(Guarded::NotFound);
        };

        if order.status != from {
            return Ok(Guarded::StateMismatch {
                current: order.status.to_string(),
            });
        }

        order.status = to;
        order.updated_at = at;
        match to {
            FulfillmentStatus::PickedUp => order.actual_pickup = Some(at),
            FulfillmentStatus::Delivered => order.actual_delivery = Some(at),
            _ => {}
        }

        Ok(Guarded::Applied(order.clone()))
    }

    async fn active_confirmed_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> StorageResult<Vec<ConfirmedOrder>> {
        Ok(self
            .confirmed_orders
            .iter()
            .filter(|entry| entry.driver_id == Some(driver_id) && !entry.status.is_terminal())
            .map(|entry| entry.clone())
            .collect())
    }

    async fn active_confirmed_orders_for_vehicle(
        &self,
        vehicle_id: Uuid,
    ) -> StorageResult<Vec<ConfirmedOrder>> {
        Ok(self
            .confirmed_orders
            .iter()
            .filter(|entry| entry.vehicle_id == Some(vehicle_id) && !entry.status.is_terminal())
            .map(|entry| entry.clone())
            .collect())
    }

    async fn pending_transport_orders_for_driver(
        &self,
        driver_id: Uuid,
    ) -> StorageResult<Vec<TransportOrder>> {
        Ok(self
            .transport_orders
            .iter()
            .filter(|entry| {
                entry.driver_id == Some(driver_id)
                    && entry.status == TransportOrderStatus::Pending
            })
            .map(|entry| entry.clone())
            .collect())
    }

    async fn insert_notification(&self, notification: &Notification) -> StorageResult<bool> {
        if !self.event_keys.insert(notification.event_key.clone()) {
            return Ok(false);
        }
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(true)
    }

    async fn notifications(&self, audience: &Audience) -> StorageResult<Vec<Notification>> {
        let mut feed: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| entry.audience == *audience)
            .map(|entry| entry.clone())
            .collect();
        feed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(feed)
    }

    async fn mark_notification_read(&self, id: Uuid) -> StorageResult<bool> {
        match self.notifications.get_mut(&id) {
            Some(mut notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, audience: &Audience) -> StorageResult<u64> {
        let mut updated = 0;
        for mut entry in self.notifications.iter_mut() {
            if entry.audience == *audience && !entry.is_read {
                entry.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn clear_notifications(&self, audience: &Audience) -> StorageResult<u64> {
        let ids: Vec<Uuid> = self
            .notifications
            .iter()
            .filter(|entry| entry.audience == *audience)
            .map(|entry| entry.id)
            .collect();

        let mut removed = 0;
        for id in ids {
            if let Some((_, notification)) = self.notifications.remove(&id) {
                self.event_keys.remove(&notification.event_key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn unread_count(&self, audience: &Audience) -> StorageResult<u64> {
        Ok(self
            .notifications
            .iter()
            .filter(|entry| entry.audience == *audience && !entry.is_read)
            .count() as u64)
    }

    async fn entity_counts(&self) -> StorageResult<EntityCounts> {
        Ok(EntityCounts {
            suppliers: self.suppliers.len() as u64,
            buyers: self.buyers.len() as u64,
            drivers: self.drivers.len() as u64,
            vehicles: self.vehicles.len() as u64,
            transport_orders: self.transport_orders.len() as u64,
            buyer_requests: self.buyer_requests.len() as u64,
            confirmed_orders: self.confirmed_orders.len() as u64,
        })
    }

    async fn window_stats(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StorageResult<WindowStats> {
        let mut stats = WindowStats::default();

        for order in self.transport_orders.iter() {
            if order.submitted_at < from || order.submitted_at >= until {
                continue;
            }
            stats.total += 1;
            match order.status {
                TransportOrderStatus::Confirmed => stats.confirmed += 1,
                TransportOrderStatus::Rejected => stats.rejected += 1,
                TransportOrderStatus::Pending => {}
            }
        }

        for request in self.buyer_requests.iter() {
            let Some(submitted_at) = request.submitted_at else {
                continue;
            };
            if submitted_at < from || submitted_at >= until {
                continue;
            }
            stats.total += 1;
            if Self::buyer_request_confirmed(request.status) {
                stats.confirmed += 1;
            } else if request.status == BuyerRequestStatus::Rejected {
                stats.rejected += 1;
            }
        }

        for shipment in self.confirmed_orders.iter() {
            let Some(submitted_at) = self.origin_submitted_at(&shipment.origin) else {
                continue;
            };
            if submitted_at < from || submitted_at >= until {
                continue;
            }
            match shipment.status {
                FulfillmentStatus::Delivered => stats.delivered += 1,
                FulfillmentStatus::Cancelled => stats.cancelled += 1,
                _ => {}
            }
        }

        Ok(stats)
    }

    async fn fulfillment_counts(&self) -> StorageResult<FulfillmentCounts> {
        let mut counts = FulfillmentCounts::default();

        counts.pending_review += self
            .transport_orders
            .iter()
            .filter(|entry| entry.status == TransportOrderStatus::Pending)
            .count() as u64;
        counts.pending_review += self
            .buyer_requests
            .iter()
            .filter(|entry| entry.status.awaiting_review())
            .count() as u64;

        for shipment in self.confirmed_orders.iter() {
            match shipment.status {
                FulfillmentStatus::Delivered => counts.delivered_total += 1,
                FulfillmentStatus::Cancelled => {}
                _ => {
                    counts.active_shipments += 1;
                    if shipment.driver_id.is_none() {
                        counts.awaiting_driver += 1;
                    }
                }
            }
        }

        Ok(counts)
    }

    async fn recent_activity(&self, limit: usize) -> StorageResult<Vec<ActivityRecord>> {
        let mut records = Vec::new();

        for order in self.transport_orders.iter() {
            records.push(ActivityRecord {
                kind: ActivityKind::OrderSubmitted,
                subject: order.vehicle_number.clone(),
                at: order.submitted_at,
            });
            if let Some(at) = order.admin_action_at {
                let kind = match order.status {
                    TransportOrderStatus::Confirmed => ActivityKind::OrderConfirmed,
                    TransportOrderStatus::Rejected => ActivityKind::OrderRejected,
                    TransportOrderStatus::Pending => continue,
                };
                records.push(ActivityRecord {
                    kind,
                    subject: order.vehicle_number.clone(),
                    at,
                });
            }
        }

        for request in self.buyer_requests.iter() {
            if let Some(at) = request.submitted_at {
                records.push(ActivityRecord {
                    kind: ActivityKind::RequestSubmitted,
                    subject: request.order_number.clone(),
                    at,
                });
            }
            if let Some(at) = request.admin_action_at {
                let kind = match request.status {
                    BuyerRequestStatus::Rejected => ActivityKind::OrderRejected,
                    _ => ActivityKind::OrderConfirmed,
                };
                records.push(ActivityRecord {
                    kind,
                    subject: request.order_number.clone(),
                    at,
                });
            }
        }

        for shipment in self.confirmed_orders.iter() {
            match shipment.status {
                FulfillmentStatus::Delivered => {
                    if let Some(at) = shipment.actual_delivery {
                        records.push(ActivityRecord {
                            kind: ActivityKind::ShipmentDelivered,
                            subject: shipment.id.to_string(),
                            at,
                        });
                    }
                }
                FulfillmentStatus::Cancelled => {
                    records.push(ActivityRecord {
                        kind: ActivityKind::ShipmentCancelled,
                        subject: shipment.id.to_string(),
                        at: shipment.updated_at,
                    });
                }
                _ => {}
            }
        }

        records.sort_by(|a, b| b.at.cmp(&a.at));
        records.truncate(limit);
        Ok(records)
    }
}
