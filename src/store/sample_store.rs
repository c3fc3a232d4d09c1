//! Ordered in-memory series of samples with a durable append mirror
//!
//! The store never reorders, truncates or rewrites samples. Persistence is
//! best-effort: the in-memory series stays authoritative for the lifetime of
//! the process even when the mirror cannot be written.

use crate::error::StoreError;
use crate::readings::{Sample, Timestamp};
use crate::store::ReadingSink;
use chrono::{Duration, Utc};
use log::{debug, error, info};

/// Time span selecting samples for a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Samples within the given span ending now
    Trailing(Duration),
    /// The full series
    All,
}

impl Window {
    pub fn hours(hours: i64) -> Self {
        Window::Trailing(Duration::hours(hours))
    }

    pub fn minutes(minutes: i64) -> Self {
        Window::Trailing(Duration::minutes(minutes))
    }
}

/// Append-only sample series
pub struct SampleStore {
    /// Samples in chronological (insertion) order
    samples: Vec<Sample>,
    /// Durable mirror, absent when persistence is disabled
    sink: Option<Box<dyn ReadingSink>>,
    seeded: bool,
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStore {
    /// Create an empty store without persistence
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            sink: None,
            seeded: false,
        }
    }

    /// Create an empty store that mirrors appends into `sink`
    pub fn with_sink(sink: Box<dyn ReadingSink>) -> Self {
        Self {
            samples: Vec::new(),
            sink: Some(sink),
            seeded: false,
        }
    }

    /// Replace the store contents with the startup history
    ///
    /// The caller is responsible for putting `samples` in chronological order
    /// with normalized timestamps. Seeding does not write to the mirror; use
    /// [`SampleStore::persist`] for that.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadySeeded` on a second call and
    /// `StoreError::Ordering` if `samples` is not chronological, leaving the
    /// store untouched in both cases.
    pub fn seed(&mut self, samples: Vec<Sample>) -> Result<(), StoreError> {
        if self.seeded {
            return Err(StoreError::AlreadySeeded);
        }

        if let Some(pair) = samples
            .windows(2)
            .find(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(StoreError::Ordering {
                last: pair[0].timestamp,
                new: pair[1].timestamp,
            });
        }

        info!("Seeding sample store with {} samples", samples.len());
        self.samples = samples;
        self.seeded = true;
        Ok(())
    }

    /// Add one sample to the tail of the series
    ///
    /// Samples sharing the last stored timestamp are accepted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Ordering` if `sample` is strictly earlier than
    /// the last stored sample; the store is left unchanged.
    pub fn append(&mut self, sample: Sample) -> Result<(), StoreError> {
        if let Some(last) = self.samples.last() {
            if sample.timestamp < last.timestamp {
                return Err(StoreError::Ordering {
                    last: last.timestamp,
                    new: sample.timestamp,
                });
            }
        }

        self.samples.push(sample);
        debug!(
            "Appended sample {} at {}, series length {}",
            sample.value,
            sample.timestamp,
            self.samples.len()
        );
        Ok(())
    }

    /// Mirror one sample into durable storage
    ///
    /// Failures are logged here; callers may ignore the result.
    pub fn persist(&mut self, sample: &Sample) -> Result<(), StoreError> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };

        sink.append(sample).map_err(|e| {
            error!(
                "Failed to persist sample at {}: {}. Keeping in-memory copy",
                sample.timestamp, e
            );
            StoreError::Persistence(e.to_string())
        })
    }

    /// Append then persist, the per-cycle path
    ///
    /// # Errors
    ///
    /// Only ordering failures are returned. A persistence failure is logged
    /// and the in-memory append stands.
    pub fn record(&mut self, sample: Sample) -> Result<(), StoreError> {
        self.append(sample)?;
        let _ = self.persist(&sample);
        Ok(())
    }

    /// Samples within `window` ending now
    pub fn snapshot(&self, window: Window) -> &[Sample] {
        self.snapshot_at(window, Utc::now())
    }

    /// Samples within `window` ending at `now`
    ///
    /// Returns a contiguous, ordered view of the series with timestamps in
    /// `[now - window, now]`.
    pub fn snapshot_at(&self, window: Window, now: Timestamp) -> &[Sample] {
        match window {
            Window::All => &self.samples,
            Window::Trailing(span) => {
                let cutoff = now - span;
                let start = self.samples.partition_point(|s| s.timestamp < cutoff);
                let end = self.samples.partition_point(|s| s.timestamp <= now);
                if start >= end {
                    &[]
                } else {
                    &self.samples[start..end]
                }
            }
        }
    }

    /// The full series
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }
}
