/// Threshold gate for readings and forecasts
pub mod evaluator;

/// Notification channels
pub mod notifier;

/// Alert dispatch
pub mod alert_manager;

pub use alert_manager::{AlertManager, Delivery};
pub use evaluator::{evaluate, AlertDecision, AlertReason, Breach};
pub use notifier::{MockNotifier, Notifier, WebhookNotifier, WebhookPayload};
