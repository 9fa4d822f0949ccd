use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub transition_latency_seconds: HistogramVec,
    pub notifications_dispatched_total: IntCounterVec,
    pub storage_retries_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Order transitions by action and outcome"),
            &["action", "outcome"],
        )
        .expect("valid transitions_total metric");

        let transition_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "transition_latency_seconds",
                "Latency of order transitions in seconds",
            ),
            &["action", "outcome"],
        )
        .expect("valid transition_latency_seconds metric");

        let notifications_dispatched_total = IntCounterVec::new(
            Opts::new(
                "notifications_dispatched_total",
                "Notifications persisted by kind",
            ),
            &["kind"],
        )
        .expect("valid notifications_dispatched_total metric");

        let storage_retries_total = IntCounter::new(
            "storage_retries_total",
            "Transient storage errors that triggered a retry",
        )
        .expect("valid storage_retries_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(transition_latency_seconds.clone()))
            .expect("register transition_latency_seconds");
        registry
            .register(Box::new(notifications_dispatched_total.clone()))
            .expect("register notifications_dispatched_total");
        registry
            .register(Box::new(storage_retries_total.clone()))
            .expect("register storage_retries_total");

        Self {
            registry,
            transitions_total,
            transition_latency_seconds,
            notifications_dispatched_total,
            storage_retries_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
