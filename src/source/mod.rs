/// Reading source trait and HTTP client
pub mod client;

/// Scripted source for dry runs and tests
pub mod mock;

pub use client::{HttpSource, ReadingSource};
pub use mock::MockSource;
