use crate::alerts::{AlertDecision, Notifier};
use log::{error, info, warn};

/// Result of handing one decision to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The decision did not call for an alert
    NotNeeded,
    /// Alerting is disabled in configuration
    Disabled,
    /// The notifier accepted the alert
    Sent,
    /// The notifier failed; the failure was logged and dropped
    Failed,
}

/// Delivers alert decisions to the configured notifier
///
/// Delivery is best-effort and at-most-once: a failed notification is logged
/// and never retried, and never surfaces as an error to the caller so the
/// polling loop keeps running.
pub struct AlertManager {
    notifier: Option<Box<dyn Notifier>>,
}

impl AlertManager {
    /// Create a manager that sends through `notifier`
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }

    /// Create a manager that logs alerts but never sends them
    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    /// Send `decision` if it calls for an alert
    pub async fn dispatch(&self, decision: &AlertDecision) -> Delivery {
        if !decision.should_alert {
            return Delivery::NotNeeded;
        }

        warn!("{}", decision.message);

        let Some(notifier) = self.notifier.as_ref() else {
            info!("Alert notifications disabled, not sending: {}", decision.message);
            return Delivery::Disabled;
        };

        match notifier.notify(decision).await {
            Ok(()) => {
                info!(
                    "Sent {} notification for BG {} at {}",
                    notifier.name(),
                    decision.current_value,
                    decision.time_of_day
                );
                Delivery::Sent
            }
            Err(e) => {
                error!("Failed to send {} notification: {}", notifier.name(), e);
                Delivery::Failed
            }
        }
    }
}
