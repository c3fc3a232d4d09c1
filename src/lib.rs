/// Error types for every stage of the watcher
pub mod error;

/// Readings, trend codes and timestamp normalization
pub mod readings;

/// In-memory sample series and its durable CSV mirror
pub mod store;

/// Least-squares trend fit and forecast
pub mod trend;

/// Alert gate and notification delivery
pub mod alerts;

/// Remote reading sources
pub mod source;

/// Bounded fixed-delay retry
pub mod retry;

/// Polling loop and its scheduling
pub mod poller;

/// Live labels and chart window views
pub mod display;

/// Loop health tracking
pub mod monitoring;

/// Configuration management
pub mod config;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{AlertError, ConfigError, SourceError, StoreError, TrendError};
pub use poller::{CycleOutcome, LoopContext, PollSettings};
pub use readings::{Sample, Timestamp, TrendCode};
