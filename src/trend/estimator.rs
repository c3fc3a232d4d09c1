use crate::error::TrendError;
use crate::readings::{Sample, Timestamp};
use serde::{Deserialize, Serialize};

/// Number of trailing samples the live forecast is fitted over
pub const DEFAULT_WINDOW_SIZE: usize = 6;

/// How far ahead the live forecast projects, in minutes
pub const DEFAULT_HORIZON_MINUTES: f64 = 20.0;

/// Below this spread the elapsed-minute axis is treated as a single point
const DEGENERATE_SXX: f64 = 1e-12;

/// Linear fit over a trailing window of samples
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendResult {
    /// Rate of change in mg/dL per minute
    pub slope_per_minute: f64,
    /// Fitted value at the window's first timestamp
    pub intercept: f64,
    /// Last observed value projected forward by the horizon
    pub forecast: f64,
    /// Horizon the forecast was projected over, in minutes
    pub horizon_minutes: f64,
    /// Timestamp the elapsed-minute axis is measured from
    pub window_start: Timestamp,
    /// (elapsed minutes, value) pairs the fit was computed over
    pub window_samples: Vec<(f64, f64)>,
}

impl TrendResult {
    /// Fitted line `m * x + c` evaluated at each window x-value
    pub fn fitted_values(&self) -> Vec<f64> {
        self.window_samples
            .iter()
            .map(|(x, _)| self.slope_per_minute * x + self.intercept)
            .collect()
    }

    /// Forecast truncated to whole mg/dL, as shown to the user
    pub fn forecast_whole(&self) -> i64 {
        self.forecast.trunc() as i64
    }
}

/// Fixed window and horizon the polling loop fits with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendEstimator {
    pub window_size: usize,
    pub horizon_minutes: f64,
}

impl Default for TrendEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE, DEFAULT_HORIZON_MINUTES)
    }
}

impl TrendEstimator {
    pub fn new(window_size: usize, horizon_minutes: f64) -> Self {
        Self {
            window_size,
            horizon_minutes,
        }
    }

    /// Fit the configured window over `samples`
    pub fn fit(&self, samples: &[Sample]) -> Result<TrendResult, TrendError> {
        fit(samples, self.window_size, self.horizon_minutes)
    }
}

/// Fit a least-squares line to the last `window_size` samples
///
/// Each sample's x-value is the number of minutes since the first sample in
/// the window. The forecast is anchored at the last observed value:
/// `last_value + slope * horizon_minutes`.
///
/// When every x-value coincides (readings inside the same instant) the slope
/// is defined as 0 and the intercept is the mean value.
///
/// # Errors
///
/// Returns `TrendError::InvalidWindow` if `window_size < 2` and
/// `TrendError::NotEnoughData` if fewer than `window_size` samples exist.
pub fn fit(
    samples: &[Sample],
    window_size: usize,
    horizon_minutes: f64,
) -> Result<TrendResult, TrendError> {
    if window_size < 2 {
        return Err(TrendError::InvalidWindow(window_size));
    }
    if samples.len() < window_size {
        return Err(TrendError::NotEnoughData {
            required: window_size,
            available: samples.len(),
        });
    }

    let window = &samples[samples.len() - window_size..];
    let window_start = window[0].timestamp;

    let points: Vec<(f64, f64)> = window
        .iter()
        .map(|s| {
            let elapsed = s.timestamp.signed_duration_since(window_start);
            (elapsed.num_milliseconds() as f64 / 60_000.0, s.value)
        })
        .collect();

    let (slope, intercept) = least_squares(&points);
    let last_value = points[points.len() - 1].1;

    Ok(TrendResult {
        slope_per_minute: slope,
        intercept,
        forecast: last_value + slope * horizon_minutes,
        horizon_minutes,
        window_start,
        window_samples: points,
    })
}

/// Ordinary least squares in centered form, returns (slope, intercept)
fn least_squares(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });

    if sxx < DEGENERATE_SXX {
        return (0.0, mean_y);
    }

    let slope = sxy / sxx;
    (slope, mean_y - slope * mean_x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::TrendCode;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: &[f64], spacing_minutes: i64) -> Vec<Sample> {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                Sample::new(
                    start + Duration::minutes(i as i64 * spacing_minutes),
                    *v,
                    TrendCode::Flat,
                )
            })
            .collect()
    }

    #[test]
    fn test_not_enough_data() {
        let samples = series(&[100.0, 105.0, 110.0], 5);
        assert_eq!(
            fit(&samples, 6, 20.0),
            Err(TrendError::NotEnoughData {
                required: 6,
                available: 3
            })
        );
        assert!(fit(&[], 2, 20.0).is_err());
    }

    #[test]
    fn test_window_must_hold_two_samples() {
        let samples = series(&[100.0, 105.0], 5);
        assert_eq!(fit(&samples, 1, 20.0), Err(TrendError::InvalidWindow(1)));
        assert_eq!(fit(&samples, 0, 20.0), Err(TrendError::InvalidWindow(0)));
    }

    #[test]
    fn test_perfectly_linear_input() {
        let samples = series(&[100.0, 105.0, 110.0, 115.0, 120.0, 125.0], 5);
        let result = fit(&samples, 6, 20.0).unwrap();

        assert!((result.slope_per_minute - 1.0).abs() < 1e-12);
        assert!((result.intercept - 100.0).abs() < 1e-9);
        assert!((result.forecast - 145.0).abs() < 1e-9);
        assert_eq!(result.forecast_whole(), 145);
        assert_eq!(
            result.window_samples.iter().map(|p| p.0).collect::<Vec<_>>(),
            vec![0.0, 5.0, 10.0, 15.0, 20.0, 25.0]
        );
    }

    #[test]
    fn test_uses_only_trailing_window() {
        // Early samples fall steeply, the last six rise by 2 per 5 minutes
        let samples = series(
            &[300.0, 250.0, 200.0, 100.0, 102.0, 104.0, 106.0, 108.0, 110.0],
            5,
        );
        let result = fit(&samples, 6, 20.0).unwrap();
        assert!((result.slope_per_minute - 0.4).abs() < 1e-9);
        assert_eq!(result.window_start, samples[3].timestamp);
    }

    #[test]
    fn test_forecast_anchored_at_last_observation() {
        // Noisy window where the fitted endpoint differs from the last value
        let samples = series(&[100.0, 110.0, 100.0, 110.0, 100.0, 120.0], 5);
        let result = fit(&samples, 6, 20.0).unwrap();

        let last_x = 25.0;
        let line_projection =
            result.slope_per_minute * (last_x + 20.0) + result.intercept;
        let anchored = 120.0 + result.slope_per_minute * 20.0;

        assert!((result.forecast - anchored).abs() < 1e-9);
        assert!((result.forecast - line_projection).abs() > 1e-6);
    }

    #[test]
    fn test_degenerate_timestamps_yield_flat_slope() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let samples: Vec<Sample> = [90.0, 95.0, 100.0]
            .iter()
            .map(|v| Sample::new(start, *v, TrendCode::Flat))
            .collect();

        let result = fit(&samples, 3, 20.0).unwrap();
        assert_eq!(result.slope_per_minute, 0.0);
        assert!((result.intercept - 95.0).abs() < 1e-12);
        assert_eq!(result.forecast, 100.0);
        assert!(result.slope_per_minute.is_finite());
    }

    #[test]
    fn test_sub_minute_spacing_uses_fractional_minutes() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let samples: Vec<Sample> = (0..4)
            .map(|i| {
                Sample::new(
                    start + Duration::seconds(i * 30),
                    100.0 + i as f64,
                    TrendCode::Flat,
                )
            })
            .collect();

        let result = fit(&samples, 4, 20.0).unwrap();
        // One mg/dL per 30 seconds
        assert!((result.slope_per_minute - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_fitted_values_follow_line() {
        let samples = series(&[100.0, 105.0, 110.0, 115.0, 120.0, 125.0], 5);
        let result = fit(&samples, 6, 20.0).unwrap();
        let fitted = result.fitted_values();
        for (fitted, (_, observed)) in fitted.iter().zip(result.window_samples.iter()) {
            assert!((fitted - observed).abs() < 1e-9);
        }
    }

    #[test]
    fn test_falling_forecast_truncates_toward_zero() {
        let samples = series(&[90.0, 85.5, 81.0, 76.5, 72.0, 67.5], 5);
        let result = fit(&samples, 6, 20.0).unwrap();
        // slope -0.9/min, forecast 67.5 - 18 = 49.5
        assert!((result.forecast - 49.5).abs() < 1e-9);
        assert_eq!(result.forecast_whole(), 49);
    }
}
