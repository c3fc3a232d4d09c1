use crate::readings::Timestamp;
use thiserror::Error;

/// Errors that can occur while fetching readings from the remote source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Connection to reading source failed: {0}")]
    Transport(String),

    #[error("Reading source returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response from reading source: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Whether this is a network-level failure rather than a bad answer
    pub fn is_transport(&self) -> bool {
        matches!(self, SourceError::Transport(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        // Body decoding is the only failure that is not the network's fault
        if e.is_decode() {
            SourceError::InvalidResponse(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

/// Errors raised by the sample store and its persistence mirror
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Out-of-order sample: {new} is earlier than last stored {last}")]
    Ordering { last: Timestamp, new: Timestamp },

    #[error("Sample store has already been seeded")]
    AlreadySeeded,

    #[error("Failed to persist sample: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Errors from the trend fit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrendError {
    #[error("Not enough data for trend fit: need {required} samples, have {available}")]
    NotEnoughData { required: usize, available: usize },

    #[error("Trend window must hold at least 2 samples, got {0}")]
    InvalidWindow(usize),
}

/// Errors that can occur when sending alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("Notification endpoint returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
