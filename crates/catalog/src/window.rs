use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Canonical lookback windows an operation can be compiled with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    OneWeek,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 7] = [
        TimeWindow::FifteenMinutes,
        TimeWindow::ThirtyMinutes,
        TimeWindow::OneHour,
        TimeWindow::SixHours,
        TimeWindow::TwelveHours,
        TimeWindow::OneDay,
        TimeWindow::OneWeek,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            TimeWindow::FifteenMinutes => "15m",
            TimeWindow::ThirtyMinutes => "30m",
            TimeWindow::OneHour => "1h",
            TimeWindow::SixHours => "6h",
            TimeWindow::TwelveHours => "12h",
            TimeWindow::OneDay => "24h",
            TimeWindow::OneWeek => "7d",
        }
    }

    pub fn duration(&self) -> Duration {
        let secs = match self {
            TimeWindow::FifteenMinutes => 15 * 60,
            TimeWindow::ThirtyMinutes => 30 * 60,
            TimeWindow::OneHour => 3_600,
            TimeWindow::SixHours => 6 * 3_600,
            TimeWindow::TwelveHours => 12 * 3_600,
            TimeWindow::OneDay => 24 * 3_600,
            TimeWindow::OneWeek => 7 * 86_400,
        };
        Duration::from_secs(secs)
    }

    fn from_secs(secs: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.duration().as_secs() == secs)
    }

    /// Parse a canonical token or a human spelling ("1 hour", "last 30 minutes",
    /// "a day", "1 week"). Only spans that land exactly on a supported window
    /// are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let text = raw.trim().to_lowercase();
        let text = text
            .strip_prefix("last ")
            .or_else(|| text.strip_prefix("past "))
            .unwrap_or(&text)
            .trim();

        let split = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
        let (digits, unit) = text.split_at(split);
        let unit = unit.trim();

        let (count, unit) = if digits.is_empty() {
            let unit = unit
                .strip_prefix("an ")
                .or_else(|| unit.strip_prefix("a "))
                .unwrap_or(unit)
                .trim();
            (1, unit)
        } else {
            (digits.parse::<u64>().ok()?, unit)
        };

        let unit_secs = match unit {
            "m" | "min" | "mins" | "minute" | "minutes" => 60,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
            "d" | "day" | "days" => 86_400,
            "w" | "wk" | "week" | "weeks" => 7 * 86_400,
            _ => return None,
        };

        Self::from_secs(count.checked_mul(unit_secs)?)
    }

    /// Like [`parse`](Self::parse) but never fails: unknown spellings fall back
    /// to one hour.
    pub fn normalize(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            warn!(window = %raw, fallback = "1h", "unrecognized time window");
            TimeWindow::default()
        })
    }

    /// Read a window from an untyped parameter value. Missing → default.
    pub fn from_param(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => TimeWindow::default(),
            Some(Value::String(s)) => Self::normalize(s),
            Some(other) => {
                warn!(window = %other, fallback = "1h", "time window is not a string");
                TimeWindow::default()
            }
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
