// rca-engine-rs/src/time_range.rs
// Turns a temporal hint (or its absence) into a concrete UTC window.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::classifier::TemporalHint;
use crate::types::TimeWindow;

/// Relative phrases reaching further back than this are rejected.
const MAX_LOOKBACK_DAYS: i64 = 30;

/// Largest accepted buffer around a single instant.
pub const MAX_BUFFER_MINUTES: i64 = MAX_LOOKBACK_DAYS * 24 * 60;

static RELATIVE_PARTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:(\d+)\s*)?(minute|min|hour|hr|day|week)s?\b").expect("relative parts pattern is valid")
});

/// How a window was obtained. Anything other than `Explicit`/`Relative`
/// means the window was assumed and is disclosed in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum WindowOrigin {
    /// No temporal hint in the query.
    Default,
    Explicit,
    Relative,
    /// A hint was present but could not be interpreted.
    Fallback { hint: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedWindow {
    pub window: TimeWindow,
    pub origin: WindowOrigin,
}

impl ResolvedWindow {
    pub fn is_assumed(&self) -> bool {
        matches!(self.origin, WindowOrigin::Default | WindowOrigin::Fallback { .. })
    }
}

enum Parsed {
    Instant(DateTime<Utc>),
    Span(TimeWindow),
}

/// Resolve `hint` against `now`.
///
/// Single instants always get `buffer_minutes` on both sides; relative
/// phrases produce `[now - N, now]`. Never fails: an unparsable hint falls
/// back to the default window around `now`.
pub fn resolve(hint: Option<&TemporalHint>, now: DateTime<Utc>, buffer_minutes: i64) -> ResolvedWindow {
    let buffer = Duration::minutes(buffer_minutes.clamp(0, MAX_BUFFER_MINUTES));
    let default_window = TimeWindow::around(now, buffer);

    let Some(hint) = hint else {
        return ResolvedWindow {
            window: default_window,
            origin: WindowOrigin::Default,
        };
    };

    let parsed = match hint {
        TemporalHint::Absolute(text) => parse_absolute(text).map(|p| (p, WindowOrigin::Explicit)),
        TemporalHint::Epoch(text) => parse_epoch(text).map(|t| (Parsed::Instant(t), WindowOrigin::Explicit)),
        TemporalHint::TimeOfDay(text) => {
            parse_time_of_day(text, now, buffer).map(|t| (Parsed::Instant(t), WindowOrigin::Explicit))
        }
        TemporalHint::Relative(text) => {
            parse_relative(text, now).map(|w| (Parsed::Span(w), WindowOrigin::Relative))
        }
    };

    match parsed {
        Ok((Parsed::Instant(instant), origin)) => ResolvedWindow {
            window: TimeWindow::around(instant, buffer),
            origin,
        },
        Ok((Parsed::Span(window), origin)) => ResolvedWindow { window, origin },
        Err(reason) => {
            tracing::warn!(hint = %hint.text(), %reason, "time hint unparsable, using default window");
            ResolvedWindow {
                window: default_window,
                origin: WindowOrigin::Fallback {
                    hint: hint.text().to_string(),
                    reason,
                },
            }
        }
    }
}

fn parse_absolute(text: &str) -> Result<Parsed, String> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(Parsed::Instant(dt.with_timezone(&Utc)));
    }

    let normalized = text.replacen('T', " ", 1);
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M%:z", "%Y-%m-%d %H:%M:%S%z", "%Y-%m-%d %H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Ok(Parsed::Instant(dt.with_timezone(&Utc)));
        }
    }

    // Timestamps without an offset are taken as UTC.
    let naive = normalized
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim();
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Ok(Parsed::Instant(Utc.from_utc_datetime(&dt)));
        }
    }

    // A bare date covers the whole day.
    match NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        Ok(date) => {
            let start = date
                .and_hms_opt(0, 0, 0)
                .map(|dt| Utc.from_utc_datetime(&dt))
                .ok_or_else(|| format!("invalid date {:?}", text))?;
            Ok(Parsed::Span(TimeWindow::new(start, start + Duration::days(1))))
        }
        Err(e) => Err(format!("not a valid timestamp: {}", e)),
    }
}

fn parse_epoch(text: &str) -> Result<DateTime<Utc>, String> {
    let value: i64 = text
        .trim()
        .parse()
        .map_err(|e| format!("not an integer: {}", e))?;
    let instant = if text.trim().len() == 13 {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    };
    instant.ok_or_else(|| format!("epoch {} is out of range", value))
}

fn parse_time_of_day(text: &str, now: DateTime<Utc>, buffer: Duration) -> Result<DateTime<Utc>, String> {
    let time = NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|e| format!("not a valid time of day: {}", e))?;
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(time));
    // A clock time later than now refers to yesterday.
    if today > now + buffer {
        Ok(today - Duration::days(1))
    } else {
        Ok(today)
    }
}

fn parse_relative(text: &str, now: DateTime<Utc>) -> Result<TimeWindow, String> {
    let lower = text.to_ascii_lowercase();

    if lower.trim() == "yesterday" {
        return Ok(TimeWindow::new(now - Duration::hours(24), now));
    }
    if lower.trim() == "today" {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt))
            .ok_or_else(|| "cannot compute start of day".to_string())?;
        return Ok(TimeWindow::new(midnight, now));
    }

    let caps = RELATIVE_PARTS_RE
        .captures(&lower)
        .ok_or_else(|| format!("no duration in {:?}", text))?;
    let amount: i64 = match caps.get(1) {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|e| format!("bad amount {:?}: {}", m.as_str(), e))?,
        None => 1,
    };
    if amount == 0 {
        return Err("zero-length duration".to_string());
    }

    let minutes_per_unit = match &caps[2] {
        "minute" | "min" => 1,
        "hour" | "hr" => 60,
        "day" => 24 * 60,
        "week" => 7 * 24 * 60,
        other => return Err(format!("unknown unit {:?}", other)),
    };
    let minutes = amount
        .checked_mul(minutes_per_unit)
        .filter(|m| *m <= MAX_LOOKBACK_DAYS * 24 * 60)
        .ok_or_else(|| format!("lookback exceeds {} days", MAX_LOOKBACK_DAYS))?;

    Ok(TimeWindow::new(now - Duration::minutes(minutes), now))
}
