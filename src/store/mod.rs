/// In-memory sample series
pub mod sample_store;

/// CSV reading log
pub mod reading_log;

pub use reading_log::{CsvReadingLog, LogRecord, ReadingSink};
pub use sample_store::{SampleStore, Window};

#[cfg(test)]
pub use reading_log::MockReadingSink;
