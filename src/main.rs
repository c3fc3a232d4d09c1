use anyhow::Context;
use clap::Parser;
use glucowatch::alerts::{AlertManager, MockNotifier, WebhookNotifier};
use glucowatch::config::{Config, NotifierKind, SourceKind};
use glucowatch::error::ConfigError;
use glucowatch::monitoring::LoopMonitor;
use glucowatch::poller::LoopContext;
use glucowatch::source::{HttpSource, MockSource, ReadingSource};
use glucowatch::store::{CsvReadingLog, SampleStore};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

/// Command-line arguments for the glucose watcher
#[derive(Parser)]
#[command(
    name = "glucowatch",
    about = "Continuous glucose monitor poller with trend forecasting and alerts",
    long_about = "Polls a continuous glucose monitoring service every five minutes, keeps a \
                  rolling series of readings, forecasts the value 20 minutes ahead and sends a \
                  webhook alert when both the reading and the forecast are out of range."
)]
struct Cli {
    /// TOML settings file; defaults are used when it is missing
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level (same as RUST_LOG=debug)
    #[arg(short, long)]
    verbose: bool,

    /// Load history, poll once and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    /// The config path to load, if one was given
    ///
    /// A path that does not exist yet is accepted and left to `load_config`,
    /// which falls back to defaults. A directory or a path that is not valid
    /// UTF-8 is rejected.
    fn config_path(&self) -> Result<Option<&str>, String> {
        let Some(path) = self.config.as_deref() else {
            return Ok(None);
        };

        if path.is_dir() {
            return Err(format!("{} is a directory, expected a TOML file", path.display()));
        }
        if path.extension().map_or(false, |ext| ext != "toml") {
            warn!("{} does not look like a TOML file", path.display());
        }

        path.to_str()
            .map(Some)
            .ok_or_else(|| format!("{} is not valid UTF-8", path.display()))
    }
}

/// Load configuration from file or use defaults
///
/// An unreadable file falls back to defaults with a warning, an invalid one
/// with an error. Environment overrides are applied before validation.
fn load_config(config_path: Option<&str>) -> Config {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            match Config::from_file(Path::new(path)) {
                Ok(config) => config,
                Err(ConfigError::ReadError(_)) => {
                    warn!(
                        "Configuration file '{}' not found or unreadable, using defaults",
                        path
                    );
                    Config::default()
                }
                Err(e) => {
                    error!("Configuration error in '{}': {}", path, e);
                    warn!("Using default configuration due to invalid config file");
                    Config::default()
                }
            }
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    config.apply_env_overrides();

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        warn!("Using default configuration due to invalid settings");
        return Config::default();
    }

    config
}

/// Wire up the polling loop described by `config`
fn build_context(config: &Config) -> anyhow::Result<LoopContext> {
    let tz = config.timezone()?;

    let source: Box<dyn ReadingSource> = match config.source.kind {
        SourceKind::Http => {
            info!("Polling readings from {}", config.source.base_url);
            Box::new(
                HttpSource::new(
                    config.source.base_url.clone(),
                    config.source.token.clone(),
                    Duration::from_secs(config.source.request_timeout_secs),
                )
                .context("Failed to create reading source")?,
            )
        }
        SourceKind::Mock => {
            warn!(
                "Using mock reading source with a steady {} mg/dL",
                config.source.mock_value
            );
            Box::new(MockSource::steady(config.source.mock_value))
        }
    };

    let store = if config.storage.enabled {
        let log = CsvReadingLog::new(config.storage.log_path.clone(), tz);
        info!("Mirroring readings to {}", log.path().display());
        SampleStore::with_sink(Box::new(log))
    } else {
        SampleStore::new()
    };

    let alerts = if !config.alerts.enabled {
        warn!("Alert notifications are disabled");
        AlertManager::disabled()
    } else {
        match config.alerts.notifier {
            NotifierKind::Webhook => {
                let url = config
                    .alerts
                    .webhook_url
                    .clone()
                    .context("alerts.webhook_url is not set")?;
                let notifier =
                    WebhookNotifier::new(url, Duration::from_secs(config.alerts.timeout_secs))
                        .context("Failed to create webhook notifier")?;
                info!("Sending alerts to {}", notifier.url());
                AlertManager::new(Box::new(notifier))
            }
            NotifierKind::Mock => {
                info!("Using mock notifier, alerts are only logged");
                AlertManager::new(Box::new(MockNotifier::new()))
            }
        }
    };

    Ok(
        LoopContext::new(source, store, alerts, config.poll_settings())
            .with_monitor(LoopMonitor::new(config.stale_after()))
            .with_estimator(config.estimator())
            .with_display(tz, config.display.show_arrows),
    )
}

/// Bootstrap and poll on a single-threaded runtime
fn run(config: Config, once: bool) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let mut context = build_context(&config)?;
        context
            .bootstrap()
            .await
            .context("Failed to load reading history")?;

        if once {
            let outcome = context.cycle().await;
            info!("Single cycle finished: {:?}", outcome.kind());
            return Ok(());
        }

        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        ctrlc::set_handler(move || {
            info!("Received interrupt signal (SIGINT), shutting down gracefully...");
            if let Err(e) = shutdown_sender.send(true) {
                error!("Failed to send shutdown signal: {}", e);
            }
        })
        .expect("Error setting SIGINT handler for graceful shutdown");

        info!("glucowatch is running. Press Ctrl+C to stop.");
        context.run(shutdown_receiver).await;
        Ok(())
    })
}

fn main() {
    // A .env file may carry credentials and RUST_LOG
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting glucowatch");

    let config_path = match cli.config_path() {
        Ok(path) => path,
        Err(e) => {
            error!("Invalid --config argument: {}", e);
            std::process::exit(1);
        }
    };

    let config = load_config(config_path);

    if let Err(e) = run(config, cli.once) {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("glucowatch shutdown complete");
}
