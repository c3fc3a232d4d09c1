//! Live display state and per-window chart views
//!
//! No rendering happens here. The polling loop keeps a `DisplayState` with
//! the three status labels and rebuilds the `WindowView`s after each new
//! sample; a front end only has to draw them.

use crate::readings::{Sample, Timestamp, UNITS};
use crate::store::{SampleStore, Window};
use crate::trend::{TrendEstimator, TrendResult};
use log::debug;
use std::fmt;

/// Minimum samples a window needs before a trend overlay is drawn
pub const MIN_OVERLAY_SAMPLES: usize = 10;

/// Placeholder shown while the forecast cannot be computed
pub const CALCULATING: &str = "Calculating...";

/// Chart time ranges offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayWindow {
    OneHour,
    ThreeHours,
    SixHours,
    TwelveHours,
    OneDay,
    All,
}

impl DisplayWindow {
    pub const ALL: [DisplayWindow; 6] = [
        DisplayWindow::OneHour,
        DisplayWindow::ThreeHours,
        DisplayWindow::SixHours,
        DisplayWindow::TwelveHours,
        DisplayWindow::OneDay,
        DisplayWindow::All,
    ];

    pub fn window(self) -> Window {
        match self {
            DisplayWindow::OneHour => Window::hours(1),
            DisplayWindow::ThreeHours => Window::hours(3),
            DisplayWindow::SixHours => Window::hours(6),
            DisplayWindow::TwelveHours => Window::hours(12),
            DisplayWindow::OneDay => Window::hours(24),
            DisplayWindow::All => Window::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DisplayWindow::OneHour => "1h",
            DisplayWindow::ThreeHours => "3h",
            DisplayWindow::SixHours => "6h",
            DisplayWindow::TwelveHours => "12h",
            DisplayWindow::OneDay => "24h",
            DisplayWindow::All => "Max",
        }
    }
}

impl fmt::Display for DisplayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The three status labels shown next to the chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub current: String,
    pub trend: String,
    pub expected: String,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            current: "Current BG: --".to_string(),
            trend: "Trend: --".to_string(),
            expected: format!("Expected BG in 20 mins: {}", CALCULATING),
        }
    }
}

impl DisplayState {
    /// Labels for `latest`, with the forecast when a fit is available
    pub fn from_latest(latest: &Sample, fit: Option<&TrendResult>) -> Self {
        let expected = match fit {
            Some(fit) => format!(
                "Expected BG in {} mins: {} {}",
                fit.horizon_minutes,
                fit.forecast_whole(),
                UNITS
            ),
            None => format!("Expected BG in 20 mins: {}", CALCULATING),
        };

        Self {
            current: format!("Current BG: {} {}", latest.value, UNITS),
            trend: format!("Trend: {}", latest.trend.description()),
            expected,
        }
    }
}

/// One arrow annotation placed above a sample
#[derive(Debug, Clone, PartialEq)]
pub struct ArrowMark {
    pub timestamp: Timestamp,
    pub value: f64,
    pub arrow: &'static str,
}

/// Everything needed to draw one chart window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowView {
    pub window: DisplayWindow,
    pub samples: Vec<Sample>,
    /// Empty unless arrows are switched on
    pub arrows: Vec<ArrowMark>,
    /// Present only when the window holds enough samples
    pub trend_overlay: Option<TrendResult>,
}

/// Build the view for one window ending at `now`
pub fn build_view(
    store: &SampleStore,
    window: DisplayWindow,
    now: Timestamp,
    show_arrows: bool,
    estimator: &TrendEstimator,
) -> WindowView {
    let samples = store.snapshot_at(window.window(), now);

    let arrows = if show_arrows {
        samples
            .iter()
            .filter_map(|s| {
                s.trend.arrow().map(|arrow| ArrowMark {
                    timestamp: s.timestamp,
                    value: s.value,
                    arrow,
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    // Same fit as the forecast, over the newest samples of this window
    let trend_overlay = if samples.len() >= MIN_OVERLAY_SAMPLES {
        match estimator.fit(samples) {
            Ok(fit) => {
                debug!(
                    "{} window: {} samples, slope {:.3} mg/dL/min",
                    window,
                    samples.len(),
                    fit.slope_per_minute
                );
                Some(fit)
            }
            Err(e) => {
                debug!("{} window: no trend overlay: {}", window, e);
                None
            }
        }
    } else {
        None
    };

    WindowView {
        window,
        samples: samples.to_vec(),
        arrows,
        trend_overlay,
    }
}

/// Build views for every display window
pub fn build_views(
    store: &SampleStore,
    now: Timestamp,
    show_arrows: bool,
    estimator: &TrendEstimator,
) -> Vec<WindowView> {
    DisplayWindow::ALL
        .iter()
        .map(|&window| build_view(store, window, now, show_arrows, estimator))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::TrendCode;
    use chrono::{Duration, TimeZone, Utc};

    fn store_with(count: i64, spacing_minutes: i64, end: Timestamp) -> SampleStore {
        let mut store = SampleStore::new();
        let samples = (0..count)
            .rev()
            .map(|i| {
                Sample::new(
                    end - Duration::minutes(i * spacing_minutes),
                    100.0 + (count - i) as f64,
                    TrendCode::FortyFiveUp,
                )
            })
            .collect();
        store.seed(samples).unwrap();
        store
    }

    fn end() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_labels() {
        let state = DisplayState::default();
        assert_eq!(state.expected, "Expected BG in 20 mins: Calculating...");
    }

    #[test]
    fn test_labels_from_latest() {
        let fit = TrendEstimator::default()
            .fit(store_with(6, 5, end()).samples())
            .unwrap();
        let latest = Sample::new(end(), 106.0, TrendCode::FortyFiveUp);

        let state = DisplayState::from_latest(&latest, Some(&fit));
        assert_eq!(state.current, "Current BG: 106 mg/dL");
        assert_eq!(state.trend, "Trend: Trending up");
        assert_eq!(
            state.expected,
            format!("Expected BG in 20 mins: {} mg/dL", fit.forecast_whole())
        );
        assert!((fit.forecast - 110.0).abs() < 1e-9);

        let state = DisplayState::from_latest(&latest, None);
        assert_eq!(state.expected, "Expected BG in 20 mins: Calculating...");
    }

    #[test]
    fn test_one_view_per_window() {
        let store = store_with(30, 5, end());
        let views = build_views(&store, end(), false, &TrendEstimator::default());

        let labels: Vec<_> = views.iter().map(|v| v.window.label()).collect();
        assert_eq!(labels, vec!["1h", "3h", "6h", "12h", "24h", "Max"]);
    }

    #[test]
    fn test_overlay_requires_ten_samples() {
        // 13 samples in the last hour, 30 in total
        let store = store_with(30, 5, end());
        let estimator = TrendEstimator::default();

        let hour = build_view(&store, DisplayWindow::OneHour, end(), false, &estimator);
        assert_eq!(hour.samples.len(), 13);
        assert!(hour.trend_overlay.is_some());

        let sparse = store_with(9, 5, end());
        let view = build_view(&sparse, DisplayWindow::All, end(), false, &estimator);
        assert_eq!(view.samples.len(), 9);
        assert!(view.trend_overlay.is_none());
    }

    #[test]
    fn test_overlay_fits_newest_samples_only() {
        // Falls for the first half hour, then rises 5 mg/dL every 5 minutes
        let mut store = SampleStore::new();
        let samples = (0..12)
            .map(|i| {
                let value = if i < 6 {
                    200.0 - i as f64 * 10.0
                } else {
                    100.0 + (i - 6) as f64 * 5.0
                };
                Sample::new(
                    end() - Duration::minutes((11 - i) * 5),
                    value,
                    TrendCode::Flat,
                )
            })
            .collect();
        store.seed(samples).unwrap();

        let view = build_view(
            &store,
            DisplayWindow::All,
            end(),
            false,
            &TrendEstimator::default(),
        );
        assert_eq!(view.samples.len(), 12);

        let overlay = view.trend_overlay.unwrap();
        assert_eq!(overlay.window_samples.len(), 6);
        assert_eq!(overlay.window_start, end() - Duration::minutes(25));
        assert!((overlay.slope_per_minute - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_up_label() {
        let latest = Sample::new(end(), 150.0, TrendCode::SingleUp);
        let state = DisplayState::from_latest(&latest, None);
        assert_eq!(state.trend, "Trend: Going up");
    }

    #[test]
    fn test_arrows_follow_toggle() {
        let store = store_with(12, 5, end());
        let estimator = TrendEstimator::default();

        let off = build_view(&store, DisplayWindow::OneHour, end(), false, &estimator);
        assert!(off.arrows.is_empty());

        let on = build_view(&store, DisplayWindow::OneHour, end(), true, &estimator);
        assert_eq!(on.arrows.len(), on.samples.len());
        assert_eq!(on.arrows[0].arrow, TrendCode::FortyFiveUp.arrow().unwrap());
    }

    #[test]
    fn test_empty_store_views() {
        let store = SampleStore::new();
        let views = build_views(&store, end(), true, &TrendEstimator::default());
        assert!(views
            .iter()
            .all(|v| v.samples.is_empty() && v.trend_overlay.is_none()));
    }
}
