use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertThresholds {
    /// Pending-review count at or above which the backlog alert fires.
    pub pending_backlog: u64,
    /// Success-rate floor, in percent, under which the rate alert fires.
    pub success_rate_floor: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            pending_backlog: 10,
            success_rate_floor: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertInputs {
    pub pending_review: u64,
    pub success_rate: f64,
    pub window_total: u64,
    pub awaiting_driver: u64,
    pub cancelled_in_window: u64,
}

/// Evaluates the fixed rule list against current aggregates. Each rule yields
/// zero or one entry; when nothing fires, a single operational entry is
/// emitted so the list is never empty.
pub fn evaluate(inputs: &AlertInputs, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if inputs.pending_review >= thresholds.pending_backlog {
        alerts.push(Alert {
            severity: AlertSeverity::Warning,
            code: "review_backlog",
            message: format!("{} orders are waiting for review", inputs.pending_review),
        });
    }

    if inputs.window_total > 0 && inputs.success_rate < thresholds.success_rate_floor {
        alerts.push(Alert {
            severity: AlertSeverity::Critical,
            code: "low_success_rate",
            message: format!(
                "confirmation rate dropped to {:.1}% this window",
                inputs.success_rate
            ),
        });
    }

    if inputs.awaiting_driver > 0 {
        alerts.push(Alert {
            severity: AlertSeverity::Warning,
            code: "unassigned_shipments",
            message: format!(
                "{} active shipments have no driver assigned",
                inputs.awaiting_driver
            ),
        });
    }

    if inputs.cancelled_in_window > 0 {
        alerts.push(Alert {
            severity: AlertSeverity::Info,
            code: "cancellations",
            message: format!(
                "{} shipments were cancelled this window",
                inputs.cancelled_in_window
            ),
        });
    }

    if alerts.is_empty() {
        alerts.push(Alert {
            severity: AlertSeverity::Info,
            code: "operational",
            message: "All systems operational".to_string(),
        });
    }

    alerts
}
