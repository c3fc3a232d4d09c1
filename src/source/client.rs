use crate::error::SourceError;
use crate::readings::{normalize_timestamp, Sample, TrendCode};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Window used to look up the latest reading, in minutes
const CURRENT_READING_MINUTES: u32 = 10;

/// Sensor reporting interval, used to size history requests
const READING_INTERVAL_MINUTES: u32 = 5;

/// Trait for providers of timestamped readings
pub trait ReadingSource: Send + Sync {
    /// Readings from the last `minutes`, most recent first
    fn historical_readings<'a>(
        &'a self,
        minutes: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Sample>, SourceError>> + Send + 'a>>;

    /// The latest reading, or `None` when the source has nothing new
    fn current_reading<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Sample>, SourceError>> + Send + 'a>>;
}

/// Reading as it arrives on the wire
#[derive(Debug, Deserialize)]
struct WireReading {
    #[serde(alias = "Value")]
    value: f64,
    #[serde(alias = "Trend")]
    trend: WireTrend,
    #[serde(alias = "WT")]
    timestamp: String,
}

/// Trend is sent either as its numeric code or its name
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTrend {
    Code(u8),
    Name(String),
}

impl WireReading {
    fn into_sample(self) -> Result<Sample, SourceError> {
        let trend = match self.trend {
            WireTrend::Code(code) => TrendCode::from(code),
            WireTrend::Name(name) => TrendCode::from_name(&name),
        };
        Ok(Sample::new(
            normalize_timestamp(&self.timestamp)?,
            self.value,
            trend,
        ))
    }
}

/// HTTP reading source
///
/// Queries `GET {base_url}/readings?minutes=M&max_count=N`, which answers
/// with a JSON array of readings, most recent first. A static bearer token
/// is sent when configured.
pub struct HttpSource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSource {
    /// Create a source for `base_url`
    ///
    /// `timeout` bounds every request so a hung connection cannot stall the
    /// polling loop forever.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Transport` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Format the readings endpoint URL
    fn readings_url(&self, minutes: u32, max_count: u32) -> String {
        format!(
            "{}/readings?minutes={}&max_count={}",
            self.base_url.trim_end_matches('/'),
            minutes,
            max_count
        )
    }

    async fn fetch(&self, minutes: u32, max_count: u32) -> Result<Vec<Sample>, SourceError> {
        let mut request = self.client.get(self.readings_url(minutes, max_count));
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SourceError::Http { status, body });
        }

        let text = response.text().await?;
        let readings: Vec<WireReading> = serde_json::from_str(&text).map_err(|e| {
            SourceError::InvalidResponse(format!(
                "Failed to parse readings: {}. Response was: {}",
                e, text
            ))
        })?;

        readings.into_iter().map(WireReading::into_sample).collect()
    }
}

impl ReadingSource for HttpSource {
    fn historical_readings<'a>(
        &'a self,
        minutes: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Sample>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let max_count = (minutes / READING_INTERVAL_MINUTES).max(1);
            self.fetch(minutes, max_count).await
        })
    }

    fn current_reading<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Sample>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let readings = self.fetch(CURRENT_READING_MINUTES, 1).await?;
            Ok(readings.into_iter().next())
        })
    }
}
