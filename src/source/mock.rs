use crate::error::SourceError;
use crate::readings::{Sample, TrendCode};
use crate::source::ReadingSource;
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Reading source that replays scripted answers
///
/// Each call to `current_reading` pops the next scripted result. Once the
/// script runs out the source either reports a steady reading stamped with
/// the current time, or nothing at all.
pub struct MockSource {
    history: Vec<Sample>,
    script: Mutex<VecDeque<Result<Option<Sample>, SourceError>>>,
    steady_value: Option<f64>,
    call_count: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            steady_value: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// A source reporting a flat `value` every time it is polled, with a
    /// matching synthetic history
    pub fn steady(value: f64) -> Self {
        let now = Utc::now();
        let history = (1..=288)
            .map(|i| Sample::new(now - Duration::minutes(5 * i), value, TrendCode::Flat))
            .collect();

        Self {
            history,
            steady_value: Some(value),
            ..Self::new()
        }
    }

    /// Set the history answer; `history` is given most recent first
    pub fn with_history(mut self, history: Vec<Sample>) -> Self {
        self.history = history;
        self
    }

    /// Queue answers for `current_reading`
    pub fn with_script(self, script: Vec<Result<Option<Sample>, SourceError>>) -> Self {
        if let Ok(mut queue) = self.script.lock() {
            queue.extend(script);
        }
        self
    }

    /// Number of `current_reading` calls so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingSource for MockSource {
    fn historical_readings<'a>(
        &'a self,
        minutes: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Sample>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(newest) = self.history.first() else {
                return Ok(Vec::new());
            };
            let cutoff = newest.timestamp - Duration::minutes(i64::from(minutes));
            Ok(self
                .history
                .iter()
                .filter(|s| s.timestamp >= cutoff)
                .copied()
                .collect())
        })
    }

    fn current_reading<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Sample>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            let scripted = self.script.lock().ok().and_then(|mut q| q.pop_front());
            match scripted {
                Some(answer) => answer,
                None => Ok(self
                    .steady_value
                    .map(|value| Sample::new(Utc::now(), value, TrendCode::Flat))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, value: f64) -> Sample {
        Sample::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap(),
            value,
            TrendCode::Flat,
        )
    }

    #[tokio::test]
    async fn test_script_is_replayed_in_order() {
        let source = MockSource::new().with_script(vec![
            Err(SourceError::Transport("refused".to_string())),
            Ok(Some(at(5, 110.0))),
        ]);

        assert!(source.current_reading().await.is_err());
        assert_eq!(source.current_reading().await.unwrap(), Some(at(5, 110.0)));
        assert_eq!(source.current_reading().await.unwrap(), None);
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test]
    async fn test_history_is_limited_to_requested_minutes() {
        let source =
            MockSource::new().with_history(vec![at(30, 3.0), at(20, 2.0), at(10, 1.0)]);

        let recent = source.historical_readings(15).await.unwrap();
        assert_eq!(recent, vec![at(30, 3.0), at(20, 2.0)]);
    }

    #[tokio::test]
    async fn test_steady_source_reports_value() {
        let source = MockSource::steady(123.0);
        let reading = source.current_reading().await.unwrap().unwrap();
        assert_eq!(reading.value, 123.0);

        let history = source.historical_readings(1440).await.unwrap();
        assert!(!history.is_empty());
        assert!(history.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    }
}
