use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::engine::transition::{RetryPolicy, TransitionEngine};
use crate::models::notification::Notification;
use crate::notify::Dispatcher;
use crate::observability::metrics::Metrics;
use crate::stats::aggregator::{StatsConfig, StatsService};
use crate::stats::alerts::AlertThresholds;
use crate::storage::OrderStore;

pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub engine: TransitionEngine,
    pub dispatcher: Dispatcher,
    pub stats: StatsService,
    pub notification_events_tx: broadcast::Sender<Notification>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(store: Arc<dyn OrderStore>, config: &Config) -> Self {
        let (notification_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();

        let dispatcher = Dispatcher::new(
            store.clone(),
            notification_events_tx.clone(),
            metrics.clone(),
        );

        let engine = TransitionEngine::new(
            store.clone(),
            dispatcher.clone(),
            metrics.clone(),
            RetryPolicy {
                attempts: config.retry_attempts,
                base_delay: config.retry_base_delay,
            },
        );

        let stats = StatsService::new(
            store.clone(),
            StatsConfig {
                window_days: config.trend_window_days,
                activity_limit: config.activity_limit,
                thresholds: AlertThresholds {
                    pending_backlog: config.pending_backlog_threshold,
                    success_rate_floor: config.success_rate_floor,
                },
            },
        );

        Self {
            store,
            engine,
            dispatcher,
            stats,
            notification_events_tx,
            metrics,
        }
    }
}
