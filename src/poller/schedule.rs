use crate::alerts::Delivery;
use crate::error::SourceError;
use crate::monitoring::CycleKind;
use crate::readings::Sample;
use crate::retry::RetryPolicy;
use log::warn;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Pause before the first cycle after startup
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(600);

/// Regular interval between cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Pause after a cycle that used up all its fetch attempts
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// History requested at startup, in minutes
pub const DEFAULT_HISTORY_MINUTES: u32 = 1440;

/// Timing knobs for the polling loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub cooldown: Duration,
    pub retry: RetryPolicy,
    pub history_minutes: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            interval: DEFAULT_POLL_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
            retry: RetryPolicy::default(),
            history_minutes: DEFAULT_HISTORY_MINUTES,
        }
    }
}

/// Where the loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Succeeded,
    ExhaustedRetries,
    Processing,
    Scheduled,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollState::Idle => "Idle",
            PollState::Fetching => "Fetching",
            PollState::Succeeded => "Succeeded",
            PollState::ExhaustedRetries => "ExhaustedRetries",
            PollState::Processing => "Processing",
            PollState::Scheduled => "Scheduled",
        };
        f.write_str(name)
    }
}

/// How one cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A new sample was stored and evaluated
    Processed {
        sample: Sample,
        /// `None` while there are too few samples to fit
        forecast: Option<f64>,
        delivery: Delivery,
    },
    /// No fetch attempt produced a reading
    ///
    /// `last_error` is `None` when the final attempt came back empty.
    ExhaustedRetries {
        attempts: u32,
        last_error: Option<SourceError>,
    },
    /// The reading could not be stored
    Failed(String),
}

impl CycleOutcome {
    /// The one delay the next cycle is scheduled with
    ///
    /// A cycle that ran out of attempts retries after the short cooldown;
    /// everything else waits for the regular interval.
    pub fn next_delay(&self, settings: &PollSettings) -> Duration {
        match self {
            CycleOutcome::ExhaustedRetries { .. } => settings.cooldown,
            _ => settings.interval,
        }
    }

    pub fn kind(&self) -> CycleKind {
        match self {
            CycleOutcome::Processed { .. } => CycleKind::Processed,
            CycleOutcome::ExhaustedRetries { .. } => CycleKind::ExhaustedRetries,
            CycleOutcome::Failed(_) => CycleKind::Failed,
        }
    }
}

/// The single pending wake-up of the polling loop
///
/// At most one deadline is armed at a time. Arming again replaces the old
/// deadline, which is logged since it means two paths tried to schedule.
#[derive(Debug, Default)]
pub struct CycleTimer {
    deadline: Option<Instant>,
}

impl CycleTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule the next wake-up `delay` from now
    pub fn arm(&mut self, delay: Duration) {
        if self.deadline.is_some() {
            warn!("Replacing pending poll timer with a new one in {:?}", delay);
        }
        self.deadline = Some(Instant::now() + delay);
    }

    /// Drop the pending wake-up, if any
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left until the pending wake-up
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Wait for the pending wake-up and disarm it
    ///
    /// Never resolves while nothing is armed. Dropping the future before it
    /// resolves keeps the deadline armed.
    pub async fn wait(&mut self) {
        match self.deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_delay_per_outcome() {
        let settings = PollSettings::default();

        let exhausted = CycleOutcome::ExhaustedRetries {
            attempts: 5,
            last_error: Some(SourceError::Transport("refused".to_string())),
        };
        assert_eq!(exhausted.next_delay(&settings), Duration::from_secs(60));

        let nothing_returned = CycleOutcome::ExhaustedRetries {
            attempts: 5,
            last_error: None,
        };
        assert_eq!(nothing_returned.next_delay(&settings), Duration::from_secs(60));
        assert_eq!(
            CycleOutcome::Failed("ordering".to_string()).next_delay(&settings),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_outcome_kinds() {
        let exhausted = CycleOutcome::ExhaustedRetries {
            attempts: 5,
            last_error: None,
        };
        assert_eq!(exhausted.kind(), CycleKind::ExhaustedRetries);
        assert_eq!(
            CycleOutcome::Failed(String::new()).kind(),
            CycleKind::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_after_delay() {
        let mut timer = CycleTimer::new();
        let start = Instant::now();

        timer.arm(Duration::from_secs(300));
        assert!(timer.is_armed());
        timer.wait().await;

        assert_eq!(start.elapsed(), Duration::from_secs(300));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_pending_deadline() {
        let mut timer = CycleTimer::new();
        let start = Instant::now();

        timer.arm(Duration::from_secs(300));
        timer.arm(Duration::from_secs(60));
        assert_eq!(timer.remaining(), Some(Duration::from_secs(60)));

        timer.wait().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let mut timer = CycleTimer::new();
        timer.arm(Duration::from_secs(1));
        timer.cancel();
        assert!(!timer.is_armed());

        let fired = tokio::time::timeout(Duration::from_secs(10), timer.wait()).await;
        assert!(fired.is_err());
    }
}
