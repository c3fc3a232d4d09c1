//! Configuration loading and validation

#[allow(clippy::module_inception)]
mod config;

pub use config::{
    AlertsConfig, Config, DisplayConfig, NotifierKind, PollingConfig, SourceConfig, SourceKind,
    StorageConfig, TrendConfig, ENV_LOG_PATH, ENV_SOURCE_TOKEN, ENV_SOURCE_URL, ENV_WEBHOOK_URL,
};
