use crate::alerts::AlertDecision;
use crate::error::AlertError;
use log::info;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for alert delivery channels
pub trait Notifier: Send + Sync {
    fn notify<'a>(
        &'a self,
        decision: &'a AlertDecision,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;

    /// Short name used in log lines
    fn name(&self) -> &str;
}

/// JSON body posted to the alert webhook
#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookPayload {
    #[serde(rename = "Current BG")]
    pub current_bg: f64,
    #[serde(rename = "Expected BG")]
    pub expected_bg: i64,
    #[serde(rename = "Trend")]
    pub trend: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl From<&AlertDecision> for WebhookPayload {
    fn from(decision: &AlertDecision) -> Self {
        Self {
            current_bg: decision.current_value,
            expected_bg: decision.expected_value,
            trend: decision.trend.description().to_string(),
            timestamp: decision.time_of_day.clone(),
        }
    }
}

/// Posts alerts to a home-automation style webhook
///
/// Only an HTTP 200 answer counts as delivered.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a webhook notifier for `url`
    ///
    /// # Errors
    ///
    /// Returns `AlertError::HttpError` if the HTTP client cannot be built.
    pub fn new(url: String, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Notifier for WebhookNotifier {
    fn notify<'a>(
        &'a self,
        decision: &'a AlertDecision,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let payload = WebhookPayload::from(decision);

            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| AlertError::NotificationFailed(format!("Webhook request failed: {}", e)))?;

            let status = response.status();
            if status != StatusCode::OK {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AlertError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(())
        })
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Notifier that records deliveries instead of sending them
///
/// Used for dry runs and tests. Clones share the same delivery record.
#[derive(Clone, Default)]
pub struct MockNotifier {
    delivered: Arc<Mutex<Vec<AlertDecision>>>,
    failure: Option<String>,
}

impl MockNotifier {
    /// A mock that accepts every alert
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock that rejects every alert with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            delivered: Arc::new(Mutex::new(Vec::new())),
            failure: Some(message.into()),
        }
    }

    /// Alerts handed to this notifier so far, including rejected ones
    pub fn delivered(&self) -> Vec<AlertDecision> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl Notifier for MockNotifier {
    fn notify<'a>(
        &'a self,
        decision: &'a AlertDecision,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            if let Ok(mut delivered) = self.delivered.lock() {
                delivered.push(decision.clone());
            }

            match &self.failure {
                Some(message) => Err(AlertError::NotificationFailed(message.clone())),
                None => {
                    info!("MOCK NOTIFICATION - {}", decision.message);
                    Ok(())
                }
            }
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::evaluate;
    use crate::readings::TrendCode;
    use chrono::TimeZone;

    fn alert() -> AlertDecision {
        let ts = chrono_tz::US::Eastern
            .with_ymd_and_hms(2024, 6, 1, 3, 45, 0)
            .unwrap();
        evaluate(62.0, 48.9, TrendCode::SingleDown, ts)
    }

    #[test]
    fn test_payload_keys_and_values() {
        let payload = WebhookPayload::from(&alert());
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["Current BG"], 62.0);
        assert_eq!(json["Expected BG"], 48);
        assert_eq!(json["Trend"], "Going down");
        assert_eq!(json["Timestamp"], "03:45");
        assert_eq!(json.as_object().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_mock_notifier_records_alerts() {
        let notifier = MockNotifier::new();
        let decision = alert();

        notifier.notify(&decision).await.unwrap();
        notifier.notify(&decision).await.unwrap();

        assert_eq!(notifier.delivered().len(), 2);
        assert_eq!(notifier.delivered()[0], decision);
    }

    #[tokio::test]
    async fn test_failing_mock_returns_error() {
        let notifier = MockNotifier::failing("endpoint down");
        let result = notifier.notify(&alert()).await;
        assert!(matches!(result, Err(AlertError::NotificationFailed(m)) if m == "endpoint down"));
        assert_eq!(notifier.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_posts_payload_and_accepts_200() {
        let (base_url, server) = crate::test_support::serve_once(200, "{}").await;
        let notifier =
            WebhookNotifier::new(format!("{}/api/webhook/glucose_alert", base_url), Duration::from_secs(5))
                .unwrap();

        notifier.notify(&alert()).await.unwrap();

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /api/webhook/glucose_alert"));
        assert!(requests[0].contains("\"Expected BG\":48"));
        assert!(requests[0].contains("\"Timestamp\":\"03:45\""));
    }

    #[tokio::test]
    async fn test_webhook_non_200_is_an_error() {
        // Any 2xx other than 200 is not accepted as delivered either
        for status in [202u16, 404, 500] {
            let (base_url, server) = crate::test_support::serve_once(status, "nope").await;
            let notifier = WebhookNotifier::new(base_url, Duration::from_secs(5)).unwrap();

            let result = notifier.notify(&alert()).await;
            assert!(
                matches!(result, Err(AlertError::UnexpectedStatus { status: s, .. }) if s == status),
                "status {} should be rejected",
                status
            );
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_an_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:9/hook".to_string(), Duration::from_secs(2))
                .unwrap();
        let result = notifier.notify(&alert()).await;
        assert!(result.is_err());
    }
}
