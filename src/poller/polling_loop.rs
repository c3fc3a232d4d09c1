use crate::alerts::{evaluate, AlertManager, Delivery};
use crate::display::{build_views, DisplayState, WindowView};
use crate::error::StoreError;
use crate::monitoring::LoopMonitor;
use crate::poller::schedule::{CycleOutcome, CycleTimer, PollSettings, PollState};
use crate::readings::Sample;
use crate::retry::RetryOutcome;
use crate::source::ReadingSource;
use crate::store::SampleStore;
use crate::trend::TrendEstimator;
use chrono::Utc;
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use tokio::sync::watch;

/// Everything one polling loop owns
///
/// The loop runs one cycle at a time and is the only writer of its store,
/// so none of this state is shared.
pub struct LoopContext {
    source: Box<dyn ReadingSource>,
    store: SampleStore,
    alerts: AlertManager,
    monitor: LoopMonitor,
    estimator: TrendEstimator,
    settings: PollSettings,
    display_tz: Tz,
    show_arrows: bool,
    display: DisplayState,
    views: Vec<WindowView>,
    state: PollState,
}

impl LoopContext {
    pub fn new(
        source: Box<dyn ReadingSource>,
        store: SampleStore,
        alerts: AlertManager,
        settings: PollSettings,
    ) -> Self {
        Self {
            source,
            store,
            alerts,
            monitor: LoopMonitor::default(),
            estimator: TrendEstimator::default(),
            settings,
            display_tz: chrono_tz::US::Eastern,
            show_arrows: false,
            display: DisplayState::default(),
            views: Vec::new(),
            state: PollState::Idle,
        }
    }

    pub fn with_monitor(mut self, monitor: LoopMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_estimator(mut self, estimator: TrendEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Zone used for alert times and the arrow toggle for chart views
    pub fn with_display(mut self, tz: Tz, show_arrows: bool) -> Self {
        self.display_tz = tz;
        self.show_arrows = show_arrows;
        self
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn views(&self) -> &[WindowView] {
        &self.views
    }

    pub fn monitor(&self) -> &LoopMonitor {
        &self.monitor
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    fn transition(&mut self, next: PollState) {
        debug!("Poll state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Load the startup history into the store
    ///
    /// History arrives most recent first; it is put in chronological order,
    /// seeded, and mirrored to the reading log. A source that stays down
    /// leaves the store empty and polling starts from scratch.
    ///
    /// Returns the number of samples seeded.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadySeeded` if called twice.
    pub async fn bootstrap(&mut self) -> Result<usize, StoreError> {
        let minutes = self.settings.history_minutes;
        info!("Fetching {} minutes of reading history", minutes);

        let source = &self.source;
        let outcome = self
            .settings
            .retry
            .run(|_| source.historical_readings(minutes))
            .await;

        let mut history = match outcome {
            RetryOutcome::Succeeded { value, .. } => value,
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                error!(
                    "Could not fetch reading history after {} attempts: {}. Starting with an empty series",
                    attempts, last_error
                );
                Vec::new()
            }
        };

        history.reverse();
        // Stable, so equal timestamps keep their delivered order
        history.sort_by_key(|s| s.timestamp);

        let count = history.len();
        self.store.seed(history)?;

        let mut mirrored = 0;
        for sample in self.store.samples().to_vec() {
            if self.store.persist(&sample).is_err() {
                warn!(
                    "Stopped mirroring history to the reading log after {} of {} samples",
                    mirrored, count
                );
                break;
            }
            mirrored += 1;
        }

        if let Some(last) = self.store.last().copied() {
            self.monitor.record_sample(last.timestamp);
            let fit = self.estimator.fit(self.store.samples()).ok();
            self.display = DisplayState::from_latest(&last, fit.as_ref());
            self.log_display();
        }
        self.views = build_views(&self.store, Utc::now(), self.show_arrows, &self.estimator);

        info!("Seeded {} samples from history", count);
        Ok(count)
    }

    /// Fetch, store and evaluate one reading
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.transition(PollState::Fetching);

        let source = &self.source;
        let outcome = self
            .settings
            .retry
            .run_until_some(|attempt| {
                debug!("Fetching current reading, attempt {}", attempt);
                source.current_reading()
            })
            .await;

        match outcome {
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                self.transition(PollState::ExhaustedRetries);
                match &last_error {
                    Some(e) => error!(
                        "Failed to fetch current reading after {} attempts: {}",
                        attempts, e
                    ),
                    None => error!(
                        "No new reading from the source after {} attempts",
                        attempts
                    ),
                }
                CycleOutcome::ExhaustedRetries {
                    attempts,
                    last_error,
                }
            }
            RetryOutcome::Succeeded {
                value: sample,
                attempts,
            } => {
                self.transition(PollState::Succeeded);
                if attempts > 1 {
                    info!("Fetched current reading after {} attempts", attempts);
                }
                self.transition(PollState::Processing);
                self.process(sample).await
            }
        }
    }

    async fn process(&mut self, sample: Sample) -> CycleOutcome {
        if let Err(e) = self.store.record(sample) {
            error!("Dropping reading: {}", e);
            return CycleOutcome::Failed(e.to_string());
        }
        self.monitor.record_sample(sample.timestamp);

        let fit = match self.estimator.fit(self.store.samples()) {
            Ok(fit) => Some(fit),
            Err(e) => {
                debug!("No forecast yet: {}", e);
                None
            }
        };

        self.display = DisplayState::from_latest(&sample, fit.as_ref());
        self.log_display();

        let delivery = match &fit {
            Some(fit) => {
                let decision = evaluate(
                    sample.value,
                    fit.forecast,
                    sample.trend,
                    sample.local_time(&self.display_tz),
                );
                debug!("{}", decision.message);

                let delivery = self.alerts.dispatch(&decision).await;
                match delivery {
                    Delivery::Sent => self.monitor.record_notification_result(true),
                    Delivery::Failed => self.monitor.record_notification_result(false),
                    Delivery::NotNeeded | Delivery::Disabled => {}
                }
                delivery
            }
            None => Delivery::NotNeeded,
        };

        self.views = build_views(&self.store, Utc::now(), self.show_arrows, &self.estimator);

        CycleOutcome::Processed {
            sample,
            forecast: fit.map(|f| f.forecast),
            delivery,
        }
    }

    /// Run one cycle and record its outcome with the monitor
    pub async fn cycle(&mut self) -> CycleOutcome {
        let outcome = self.run_cycle().await;
        self.monitor.record_cycle(outcome.kind());
        self.monitor.collect_metrics(Utc::now());
        outcome
    }

    /// Poll until `shutdown` turns true or its sender goes away
    ///
    /// A cycle already in progress is finished before shutdown is noticed.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut timer = CycleTimer::new();
        self.transition(PollState::Scheduled);
        timer.arm(self.settings.initial_delay);
        info!(
            "Polling loop started, first poll in {:?}",
            self.settings.initial_delay
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = timer.wait() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            self.transition(PollState::Idle);
            let outcome = self.cycle().await;

            let delay = outcome.next_delay(&self.settings);
            self.transition(PollState::Scheduled);
            timer.arm(delay);
            info!("Next poll in {:?}", delay);
        }

        timer.cancel();
        self.transition(PollState::Idle);
        info!("Polling loop stopped");
    }

    fn log_display(&self) {
        info!(
            "{} | {} | {}",
            self.display.current, self.display.trend, self.display.expected
        );
    }
}
