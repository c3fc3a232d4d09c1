//! Health tracking for the polling loop
//!
//! Counts how cycles end, how alert deliveries fare and how long it has been
//! since the last reading was stored. The loop asks for a summary after each
//! cycle and the monitor logs a warning when data has gone stale or
//! notifications keep failing.

use crate::readings::Timestamp;
use chrono::Duration;
use log::{debug, info, warn};
use std::collections::VecDeque;

/// Default age after which the newest sample counts as stale
pub const DEFAULT_STALE_AFTER_MINUTES: i64 = 15;

/// Notification results kept for the success rate
const MAX_NOTIFICATION_SAMPLES: usize = 100;

/// Success rate below which a warning is logged
const LOW_SUCCESS_RATE: f64 = 90.0;

/// How a single polling cycle ended, as far as health tracking cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Processed,
    ExhaustedRetries,
    Failed,
}

/// Snapshot of loop health
#[derive(Debug, Clone, PartialEq)]
pub struct LoopMetrics {
    pub cycles: u64,
    pub processed: u64,
    pub exhausted_retries: u64,
    pub failed: u64,
    pub successful_notifications: u64,
    pub failed_notifications: u64,
    /// Percentage (0-100) over the recent notifications
    pub notification_success_rate: f64,
    /// Minutes since the newest stored sample, if any
    pub minutes_since_last_sample: Option<i64>,
    /// Whether the newest sample is older than the staleness limit
    pub stale: bool,
    pub timestamp: Timestamp,
}

#[derive(Debug)]
pub struct LoopMonitor {
    processed: u64,
    exhausted_retries: u64,
    failed: u64,
    notification_results: VecDeque<bool>,
    last_sample: Option<Timestamp>,
    stale_after: Duration,
}

impl Default for LoopMonitor {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_STALE_AFTER_MINUTES))
    }
}

impl LoopMonitor {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            processed: 0,
            exhausted_retries: 0,
            failed: 0,
            notification_results: VecDeque::new(),
            last_sample: None,
            stale_after,
        }
    }

    /// Count one finished cycle
    pub fn record_cycle(&mut self, kind: CycleKind) {
        debug!("Recording cycle outcome: {:?}", kind);
        match kind {
            CycleKind::Processed => self.processed += 1,
            CycleKind::ExhaustedRetries => self.exhausted_retries += 1,
            CycleKind::Failed => self.failed += 1,
        }
    }

    /// Remember the timestamp of the newest stored sample
    pub fn record_sample(&mut self, timestamp: Timestamp) {
        if self.last_sample.map_or(true, |last| timestamp > last) {
            self.last_sample = Some(timestamp);
        }
    }

    /// Record whether an alert delivery succeeded
    pub fn record_notification_result(&mut self, success: bool) {
        self.notification_results.push_back(success);
        while self.notification_results.len() > MAX_NOTIFICATION_SAMPLES {
            self.notification_results.pop_front();
        }
    }

    pub fn last_sample(&self) -> Option<Timestamp> {
        self.last_sample
    }

    /// Whether the newest sample is older than the staleness limit at `now`
    ///
    /// An empty history is not considered stale; there is nothing to age.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.last_sample
            .map_or(false, |last| now.signed_duration_since(last) > self.stale_after)
    }

    fn notification_success_rate(&self) -> (u64, u64, f64) {
        if self.notification_results.is_empty() {
            return (0, 0, 100.0);
        }

        let successful = self.notification_results.iter().filter(|ok| **ok).count() as u64;
        let total = self.notification_results.len() as u64;
        let rate = (successful as f64 / total as f64) * 100.0;

        (successful, total - successful, rate)
    }

    /// Summarize loop health at `now`, logging warnings for problems
    pub fn collect_metrics(&self, now: Timestamp) -> LoopMetrics {
        let (successful_notifications, failed_notifications, notification_success_rate) =
            self.notification_success_rate();
        let minutes_since_last_sample = self
            .last_sample
            .map(|last| now.signed_duration_since(last).num_minutes());
        let stale = self.is_stale(now);

        let metrics = LoopMetrics {
            cycles: self.processed + self.exhausted_retries + self.failed,
            processed: self.processed,
            exhausted_retries: self.exhausted_retries,
            failed: self.failed,
            successful_notifications,
            failed_notifications,
            notification_success_rate,
            minutes_since_last_sample,
            stale,
            timestamp: now,
        };

        info!(
            "Loop health: cycles={}, processed={}, exhausted={}, failed={}, notification_success={:.1}%",
            metrics.cycles,
            metrics.processed,
            metrics.exhausted_retries,
            metrics.failed,
            metrics.notification_success_rate
        );

        if stale {
            warn!(
                "No new reading for {} minutes (last at {})",
                minutes_since_last_sample.unwrap_or_default(),
                self.last_sample.map(|t| t.to_rfc3339()).unwrap_or_default()
            );
        }

        if notification_success_rate < LOW_SUCCESS_RATE
            && successful_notifications + failed_notifications > 0
        {
            warn!(
                "Low notification success rate: {:.1}%",
                notification_success_rate
            );
        }

        metrics
    }
}
