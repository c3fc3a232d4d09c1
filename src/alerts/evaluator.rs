//! Two-stage out-of-range gate
//!
//! An alert needs both the live reading and its forecast to be out of range.
//! A single transient spike is ignored while the forecast is still safe.

use crate::readings::{TrendCode, UNITS};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Live reading must fall outside `[CURRENT_LOW, CURRENT_HIGH]`
pub const CURRENT_LOW: f64 = 80.0;
pub const CURRENT_HIGH: f64 = 250.0;

/// Forecast must fall outside `[FORECAST_LOW, FORECAST_HIGH]`
pub const FORECAST_LOW: f64 = 70.0;
pub const FORECAST_HIGH: f64 = 300.0;

/// Which side of a range a value fell on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Breach {
    Below,
    Above,
}

impl Breach {
    fn check(value: f64, low: f64, high: f64) -> Option<Self> {
        if value < low {
            Some(Breach::Below)
        } else if value > high {
            Some(Breach::Above)
        } else {
            None
        }
    }
}

/// Both gates that fired for an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertReason {
    pub current: Breach,
    pub forecast: Breach,
}

/// Verdict for one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDecision {
    pub should_alert: bool,
    /// Set exactly when `should_alert` is true
    pub reason: Option<AlertReason>,
    /// Rendered summary line
    pub message: String,
    pub current_value: f64,
    /// Forecast truncated to whole mg/dL
    pub expected_value: i64,
    pub trend: TrendCode,
    /// Reading time as HH:MM in the display zone
    pub time_of_day: String,
}

/// Decide whether a reading and its forecast warrant an alert
pub fn evaluate(
    current_value: f64,
    forecast_value: f64,
    trend: TrendCode,
    timestamp: DateTime<Tz>,
) -> AlertDecision {
    let current = Breach::check(current_value, CURRENT_LOW, CURRENT_HIGH);
    let forecast = Breach::check(forecast_value, FORECAST_LOW, FORECAST_HIGH);

    let reason = match (current, forecast) {
        (Some(current), Some(forecast)) => Some(AlertReason { current, forecast }),
        _ => None,
    };

    let expected_value = forecast_value.trunc() as i64;
    let time_of_day = timestamp.format("%H:%M").to_string();

    let message = if reason.is_some() {
        format!(
            "ALERT! BG out of range: {current_value} {UNITS} - Expected BG: {expected_value} {UNITS} - Current Trend: {} - Current Time: {time_of_day}",
            trend.description()
        )
    } else {
        format!(
            "BG {current_value} {UNITS} - Expected BG: {expected_value} {UNITS} - Current Trend: {} - Current Time: {time_of_day}",
            trend.description()
        )
    };

    AlertDecision {
        should_alert: reason.is_some(),
        reason,
        message,
        current_value,
        expected_value,
        trend,
        time_of_day,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_local(hour: u32, minute: u32) -> DateTime<Tz> {
        chrono_tz::US::Eastern
            .with_ymd_and_hms(2024, 6, 1, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_both_low_alerts() {
        let decision = evaluate(60.0, 65.0, TrendCode::SingleDown, at_local(7, 5));
        assert!(decision.should_alert);
        assert_eq!(
            decision.reason,
            Some(AlertReason {
                current: Breach::Below,
                forecast: Breach::Below
            })
        );
        assert_eq!(
            decision.message,
            "ALERT! BG out of range: 60 mg/dL - Expected BG: 65 mg/dL - Current Trend: Going down - Current Time: 07:05"
        );
    }

    #[test]
    fn test_forecast_back_in_range_suppresses_alert() {
        let decision = evaluate(60.0, 100.0, TrendCode::SingleDown, at_local(7, 5));
        assert!(!decision.should_alert);
        assert_eq!(decision.reason, None);
        assert!(!decision.message.starts_with("ALERT"));
    }

    #[test]
    fn test_current_in_range_suppresses_alert() {
        let decision = evaluate(90.0, 50.0, TrendCode::DoubleDown, at_local(7, 5));
        assert!(!decision.should_alert);
    }

    #[test]
    fn test_both_high_alerts() {
        let decision = evaluate(260.0, 320.7, TrendCode::DoubleUp, at_local(22, 40));
        assert!(decision.should_alert);
        assert_eq!(decision.expected_value, 320);
        assert_eq!(
            decision.reason,
            Some(AlertReason {
                current: Breach::Above,
                forecast: Breach::Above
            })
        );
        assert!(decision.message.contains("Going up fast"));
        assert!(decision.message.ends_with("22:40"));
    }

    #[test]
    fn test_mixed_sides_still_alert() {
        // Falling fast from a high: current high, forecast already low
        let decision = evaluate(255.0, 60.0, TrendCode::DoubleDown, at_local(3, 0));
        assert!(decision.should_alert);
        assert_eq!(
            decision.reason,
            Some(AlertReason {
                current: Breach::Above,
                forecast: Breach::Below
            })
        );
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        assert!(!evaluate(80.0, 50.0, TrendCode::Flat, at_local(1, 0)).should_alert);
        assert!(!evaluate(250.0, 350.0, TrendCode::Flat, at_local(1, 0)).should_alert);
        assert!(!evaluate(50.0, 70.0, TrendCode::Flat, at_local(1, 0)).should_alert);
        assert!(!evaluate(300.0, 300.0, TrendCode::Flat, at_local(1, 0)).should_alert);
        assert!(evaluate(79.0, 69.0, TrendCode::Flat, at_local(1, 0)).should_alert);
    }

    #[test]
    fn test_unknown_trend_renders_fallback() {
        let decision = evaluate(60.0, 40.0, TrendCode::Unknown(9), at_local(12, 0));
        assert!(decision.message.contains("Current Trend: Unknown"));
    }

    #[test]
    fn test_time_of_day_uses_given_zone() {
        let utc_noon = chrono::Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let decision = evaluate(
            60.0,
            40.0,
            TrendCode::Flat,
            utc_noon.with_timezone(&chrono_tz::US::Eastern),
        );
        assert_eq!(decision.time_of_day, "07:00");
    }
}
