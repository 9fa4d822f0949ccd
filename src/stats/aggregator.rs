use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::stats::alerts::{evaluate, Alert, AlertInputs, AlertThresholds};
use crate::stats::trend::{percent_change, relative_label, success_rate, trend_between, Trend};
use crate::storage::{
    degrade_unavailable, ActivityKind, ActivityRecord, OrderStore, StorageResult,
};

#[derive(Debug, Clone, Copy)]
pub struct StatsConfig {
    pub window_days: i64,
    pub activity_limit: usize,
    pub thresholds: AlertThresholds,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            activity_limit: 10,
            thresholds: AlertThresholds::default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Totals {
    pub suppliers: u64,
    pub buyers: u64,
    pub drivers: u64,
    pub vehicles: u64,
    pub users: u64,
    pub orders_total: u64,
    pub orders_today: u64,
    pub completed_orders: u64,
    pub pending_review: u64,
    pub active_shipments: u64,
}

#[derive(Debug, Serialize)]
pub struct TrendSummary {
    pub current_rate: f64,
    pub previous_rate: f64,
    pub trend: Trend,
    pub percent_change: f64,
}

#[derive(Debug, Serialize)]
pub struct ActivityEntry {
    pub message: String,
    pub at: DateTime<Utc>,
    pub relative: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardSnapshot {
    pub totals: Totals,
    pub success: TrendSummary,
    /// Rolling count of admin confirmations in the current window. Stands in
    /// for a document-verification figure; there is no review subsystem
    /// behind it.
    pub confirmations_in_window: u64,
    /// Rolling count of deliveries in the current window.
    pub deliveries_in_window: u64,
    pub activity: Vec<ActivityEntry>,
    pub alerts: Vec<Alert>,
}

/// Computes dashboard statistics from current store contents on every call;
/// stateless between calls, cheap and safe to poll.
pub struct StatsService {
    store: Arc<dyn OrderStore>,
    config: StatsConfig,
}

fn degraded<T: Default>(result: StorageResult<T>) -> Result<T, AppError> {
    degrade_unavailable(result).map_err(AppError::from)
}

fn activity_message(record: &ActivityRecord) -> String {
    match record.kind {
        ActivityKind::OrderSubmitted => {
            format!("Vehicle {} offered for transport", record.subject)
        }
        ActivityKind::OrderConfirmed => format!("Order {} confirmed", record.subject),
        ActivityKind::OrderRejected => format!("Order {} rejected", record.subject),
        ActivityKind::RequestSubmitted => {
            format!("Transport request {} submitted", record.subject)
        }
        ActivityKind::ShipmentDelivered => format!("Shipment {} delivered", record.subject),
        ActivityKind::ShipmentCancelled => format!("Shipment {} cancelled", record.subject),
    }
}

impl StatsService {
    pub fn new(store: Arc<dyn OrderStore>, config: StatsConfig) -> Self {
        Self { store, config }
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> Result<DashboardSnapshot, AppError> {
        let window = Duration::days(self.config.window_days);

        let current = degraded(self.store.window_stats(now - window, now).await)?;
        let previous = degraded(
            self.store
                .window_stats(now - window - window, now - window)
                .await,
        )?;

        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let today = degraded(self.store.window_stats(midnight, now).await)?;

        let counts = degraded(self.store.entity_counts().await)?;
        let fulfillment = degraded(self.store.fulfillment_counts().await)?;
        let records = degraded(self.store.recent_activity(self.config.activity_limit).await)?;

        let current_rate = success_rate(current.confirmed, current.total);
        let previous_rate = success_rate(previous.confirmed, previous.total);

        let activity = records
            .iter()
            .map(|record| ActivityEntry {
                message: activity_message(record),
                at: record.at,
                relative: relative_label(record.at, now),
            })
            .collect();

        let alerts = evaluate(
            &AlertInputs {
                pending_review: fulfillment.pending_review,
                success_rate: current_rate,
                window_total: current.total,
                awaiting_driver: fulfillment.awaiting_driver,
                cancelled_in_window: current.cancelled,
            },
            &self.config.thresholds,
        );

        Ok(DashboardSnapshot {
            totals: Totals {
                suppliers: counts.suppliers,
                buyers: counts.buyers,
                drivers: counts.drivers,
                vehicles: counts.vehicles,
                users: counts.suppliers + counts.buyers,
                orders_total: counts.transport_orders + counts.buyer_requests,
                orders_today: today.total,
                completed_orders: fulfillment.delivered_total,
                pending_review: fulfillment.pending_review,
                active_shipments: fulfillment.active_shipments,
            },
            success: TrendSummary {
                current_rate,
                previous_rate,
                trend: trend_between(current_rate, previous_rate),
                percent_change: percent_change(current_rate, previous_rate),
            },
            confirmations_in_window: current.confirmed,
            deliveries_in_window: current.delivered,
            activity,
            alerts,
        })
    }
}
