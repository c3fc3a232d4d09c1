//! Core reading types for the glucose watcher
//!
//! Defines the timestamped [`Sample`], the directional [`TrendCode`] reported
//! by the sensor, and timestamp normalization for the formats the remote
//! source is known to emit.

use crate::error::SourceError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Unit suffix used in every rendered value
pub const UNITS: &str = "mg/dL";

/// Direction of travel reported alongside each reading
///
/// Codes 1 through 7 are the sensor's known directions. Anything else
/// (0 = none, 8 = not computable, 9 = rate out of range, or garbage) is kept
/// as `Unknown` with the raw code so it survives a round trip to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum TrendCode {
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
    Unknown(u8),
}

impl TrendCode {
    /// Numeric code as reported by the sensor
    pub fn code(self) -> u8 {
        match self {
            TrendCode::DoubleUp => 1,
            TrendCode::SingleUp => 2,
            TrendCode::FortyFiveUp => 3,
            TrendCode::Flat => 4,
            TrendCode::FortyFiveDown => 5,
            TrendCode::SingleDown => 6,
            TrendCode::DoubleDown => 7,
            TrendCode::Unknown(code) => code,
        }
    }

    /// Human-readable phrase used in labels and alert messages
    pub fn description(self) -> &'static str {
        match self {
            TrendCode::DoubleUp => "Going up fast",
            TrendCode::SingleUp => "Going up",
            TrendCode::FortyFiveUp => "Trending up",
            TrendCode::Flat => "Steady",
            TrendCode::FortyFiveDown => "Trending down",
            TrendCode::SingleDown => "Going down",
            TrendCode::DoubleDown => "Going down fast",
            TrendCode::Unknown(_) => "Unknown",
        }
    }

    /// Arrow glyph for chart annotations, `None` for unknown directions
    pub fn arrow(self) -> Option<&'static str> {
        match self {
            TrendCode::DoubleUp => Some("↑↑"),
            TrendCode::SingleUp => Some("↑"),
            TrendCode::FortyFiveUp => Some("↗"),
            TrendCode::Flat => Some("→"),
            TrendCode::FortyFiveDown => Some("↘"),
            TrendCode::SingleDown => Some("↓"),
            TrendCode::DoubleDown => Some("↓↓"),
            TrendCode::Unknown(_) => None,
        }
    }

    /// Parse a direction name as used by the sensor's web API
    ///
    /// Names are matched case-insensitively; unrecognized names map to
    /// `Unknown(0)`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "doubleup" => TrendCode::DoubleUp,
            "singleup" => TrendCode::SingleUp,
            "fortyfiveup" => TrendCode::FortyFiveUp,
            "flat" => TrendCode::Flat,
            "fortyfivedown" => TrendCode::FortyFiveDown,
            "singledown" => TrendCode::SingleDown,
            "doubledown" => TrendCode::DoubleDown,
            "notcomputable" => TrendCode::Unknown(8),
            "rateoutofrange" => TrendCode::Unknown(9),
            _ => TrendCode::Unknown(0),
        }
    }
}

impl From<u8> for TrendCode {
    fn from(code: u8) -> Self {
        match code {
            1 => TrendCode::DoubleUp,
            2 => TrendCode::SingleUp,
            3 => TrendCode::FortyFiveUp,
            4 => TrendCode::Flat,
            5 => TrendCode::FortyFiveDown,
            6 => TrendCode::SingleDown,
            7 => TrendCode::DoubleDown,
            other => TrendCode::Unknown(other),
        }
    }
}

impl From<TrendCode> for u8 {
    fn from(trend: TrendCode) -> Self {
        trend.code()
    }
}

impl std::fmt::Display for TrendCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// One timestamped glucose reading
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// When the sensor took the reading, normalized to UTC
    pub timestamp: Timestamp,
    /// Glucose value in mg/dL
    pub value: f64,
    /// Direction reported with the reading
    pub trend: TrendCode,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: f64, trend: TrendCode) -> Self {
        Self {
            timestamp,
            value,
            trend,
        }
    }

    /// Timestamp converted to the display zone
    pub fn local_time(&self, tz: &Tz) -> DateTime<Tz> {
        self.timestamp.with_timezone(tz)
    }
}

/// Formats accepted for timezone-naive timestamps, which are taken as UTC
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Normalize a source timestamp to UTC
///
/// Accepts RFC 3339 (any offset), the log's own `%Y-%m-%d %H:%M:%S%z` form,
/// the web API's `Date(<epoch millis>[±hhmm])` form and timezone-naive
/// date-times, which are assumed to already be UTC.
///
/// # Errors
///
/// Returns `SourceError::InvalidResponse` if none of the formats match.
pub fn normalize_timestamp(raw: &str) -> Result<Timestamp, SourceError> {
    let text = raw.trim();

    if let Some(inner) = text
        .trim_start_matches('/')
        .trim_end_matches('/')
        .strip_prefix("Date(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        // Offset suffix is informational only, epoch millis are already UTC
        let digits: String = inner
            .chars()
            .enumerate()
            .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
            .map(|(_, c)| c)
            .collect();
        let millis: i64 = digits.parse().map_err(|_| {
            SourceError::InvalidResponse(format!("Invalid epoch timestamp: {}", raw))
        })?;
        return Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
            SourceError::InvalidResponse(format!("Epoch timestamp out of range: {}", raw))
        });
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(SourceError::InvalidResponse(format!(
        "Unrecognized timestamp format: {}",
        raw
    )))
}
