use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::notification::{
    Audience, Notification, NotificationKind, NotificationPriority,
};
use crate::observability::metrics::Metrics;
use crate::storage::{OrderStore, StorageResult};

/// Structured payload handed from the transition engine to the dispatcher.
/// Carries everything a feed message needs so nothing is ever parsed back
/// out of a formatted string.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub order_id: Uuid,
    /// Vehicle registration for availability orders, order number for
    /// buyer requests.
    pub reference: String,
    pub route: String,
    pub load: Option<String>,
    pub submitter: String,
    pub supplier_id: Option<Uuid>,
    pub buyer_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
}

/// Status change driving a fanout. Kind and priority derive from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Confirmed,
    Rejected,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::PickedUp => "picked_up",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    fn notification_kind(&self) -> NotificationKind {
        match self {
            Self::Confirmed => NotificationKind::Success,
            Self::Rejected => NotificationKind::Error,
            Self::Cancelled => NotificationKind::Warning,
            Self::PickedUp | Self::InTransit | Self::Delivered => NotificationKind::Info,
        }
    }

    fn priority(&self) -> NotificationPriority {
        match self {
            Self::Confirmed | Self::Rejected => NotificationPriority::High,
            _ => NotificationPriority::Medium,
        }
    }

    fn phrase(&self) -> &'static str {
        match self {
            Self::Confirmed => "was confirmed",
            Self::Rejected => "was rejected",
            Self::PickedUp => "has been picked up",
            Self::InTransit => "is in transit",
            Self::Delivered => "was delivered",
            Self::Cancelled => "was cancelled",
        }
    }
}

/// Fans a single domain event out to one or more audience-scoped feeds and
/// owns the read/unread bookkeeping. Persistence is keyed per
/// (order, status, audience), so re-delivery of an event is a no-op.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn OrderStore>,
    events_tx: broadcast::Sender<Notification>,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn OrderStore>,
        events_tx: broadcast::Sender<Notification>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            events_tx,
            metrics,
        }
    }

    /// Admin feed entry for a newly submitted order.
    pub async fn on_submit(&self, event: &OrderEvent) -> StorageResult<()> {
        let load = event.load.as_deref().unwrap_or("vehicle availability");
        let message = format!(
            "New order {} from {}: {} ({})",
            event.reference, event.submitter, load, event.route
        );
        self.deliver(event, "submitted", Audience::Admin, NotificationKind::Info,
            NotificationPriority::Medium, message)
            .await
    }

    /// Party feeds for a completed transition. Each audience gets at most one
    /// entry per event, however often this is called.
    pub async fn on_transition(
        &self,
        event: &OrderEvent,
        transition: TransitionKind,
    ) -> StorageResult<()> {
        let message = format!("Order {} {}", event.reference, transition.phrase());

        if let Some(supplier_id) = event.supplier_id {
            self.deliver(
                event,
                transition.as_str(),
                Audience::Supplier(supplier_id),
                transition.notification_kind(),
                transition.priority(),
                message.clone(),
            )
            .await?;
        }

        if let Some(buyer_id) = event.buyer_id {
            self.deliver(
                event,
                transition.as_str(),
                Audience::Buyer(buyer_id),
                transition.notification_kind(),
                transition.priority(),
                message,
            )
            .await?;
        }

        Ok(())
    }

    async fn deliver(
        &self,
        event: &OrderEvent,
        status: &str,
        audience: Audience,
        kind: NotificationKind,
        priority: NotificationPriority,
        message: String,
    ) -> StorageResult<()> {
        let notification = Notification {
            id: Uuid::new_v4(),
            audience,
            kind,
            priority,
            message,
            is_read: false,
            event_key: Notification::event_key_for(event.order_id, status, &audience),
            order_id: Some(event.order_id),
            driver_id: event.driver_id,
            vehicle_id: event.vehicle_id,
            created_at: Utc::now(),
        };

        let inserted = self.store.insert_notification(&notification).await?;
        if !inserted {
            debug!(event_key = %notification.event_key, "duplicate event, notification skipped");
            return Ok(());
        }

        self.metrics
            .notifications_dispatched_total
            .with_label_values(&[kind.as_str()])
            .inc();

        let _ = self.events_tx.send(notification);
        Ok(())
    }

    // read-state bookkeeping, independent of the state machine

    pub async fn feed(&self, audience: &Audience) -> StorageResult<Vec<Notification>> {
        self.store.notifications(audience).await
    }

    pub async fn unread_count(&self, audience: &Audience) -> StorageResult<u64> {
        self.store.unread_count(audience).await
    }

    pub async fn mark_read(&self, id: Uuid) -> StorageResult<bool> {
        self.store.mark_notification_read(id).await
    }

    pub async fn mark_all_read(&self, audience: &Audience) -> StorageResult<u64> {
        self.store.mark_all_read(audience).await
    }

    pub async fn clear(&self, audience: &Audience) -> StorageResult<u64> {
        self.store.clear_notifications(audience).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast;

    use super::*;
    use crate::storage::memory::MemoryStore;

    fn dispatcher() -> (Dispatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let (events_tx, _rx) = broadcast::channel(16);
        (
            Dispatcher::new(store.clone(), events_tx, Metrics::new()),
            store,
        )
    }

    fn event(supplier_id: Option<Uuid>, buyer_id: Option<Uuid>) -> OrderEvent {
        OrderEvent {
            order_id: Uuid::new_v4(),
            reference: "KL-07-AB-1234".to_string(),
            route: "Kochi, Ernakulam, Kerala".to_string(),
            load: None,
            submitter: "Malabar Logistics".to_string(),
            supplier_id,
            buyer_id,
            driver_id: None,
            vehicle_id: None,
        }
    }

    #[tokio::test]
    async fn repeated_dispatch_creates_one_row_per_audience() {
        let (dispatcher, _store) = dispatcher();
        let supplier = Uuid::new_v4();
        let event = event(Some(supplier), None);

        dispatcher
            .on_transition(&event, TransitionKind::Confirmed)
            .await
            .unwrap();
        dispatcher
            .on_transition(&event, TransitionKind::Confirmed)
            .await
            .unwrap();

        let feed = dispatcher.feed(&Audience::Supplier(supplier)).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, NotificationKind::Success);
        assert_eq!(feed[0].priority, NotificationPriority::High);
    }

    #[tokio::test]
    async fn transition_fans_out_to_both_parties() {
        let (dispatcher, _store) = dispatcher();
        let supplier = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let event = event(Some(supplier), Some(buyer));

        dispatcher
            .on_transition(&event, TransitionKind::Delivered)
            .await
            .unwrap();

        assert_eq!(
            dispatcher
                .unread_count(&Audience::Supplier(supplier))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            dispatcher.unread_count(&Audience::Buyer(buyer)).await.unwrap(),
            1
        );
        assert_eq!(dispatcher.unread_count(&Audience::Admin).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unread_only_moves_on_explicit_read_state_calls() {
        let (dispatcher, _store) = dispatcher();
        let supplier = Uuid::new_v4();
        let scope = Audience::Supplier(supplier);

        dispatcher
            .on_transition(&event(Some(supplier), None), TransitionKind::Rejected)
            .await
            .unwrap();

        assert_eq!(dispatcher.unread_count(&scope).await.unwrap(), 1);

        // unrelated reads leave the count alone
        let _ = dispatcher.feed(&scope).await.unwrap();
        assert_eq!(dispatcher.unread_count(&scope).await.unwrap(), 1);

        assert_eq!(dispatcher.mark_all_read(&scope).await.unwrap(), 1);
        assert_eq!(dispatcher.unread_count(&scope).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn submit_notifies_admin_feed() {
        let (dispatcher, _store) = dispatcher();
        dispatcher.on_submit(&event(None, None)).await.unwrap();

        let feed = dispatcher.feed(&Audience::Admin).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, NotificationKind::Info);
        assert!(feed[0].message.contains("KL-07-AB-1234"));
        assert!(feed[0].message.contains("Malabar Logistics"));
    }
}
