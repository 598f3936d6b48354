//! Time utilities for schedule timestamps and the display offset

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::warn;

use crate::config::defaults::DEFAULT_TIMEZONE_OFFSET;
use crate::errors::{AppError, AppResult};

static DISPLAY_OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-])(\d{1,2}):(\d{2})$").expect("static regex is valid"));

static XMLTV_OFFSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-])(\d{2})(\d{2})$").expect("static regex is valid"));

/// Parse an XMLTV timestamp (`YYYYMMDDhhmmss ±hhmm`) into an absolute instant
///
/// Whitespace between the local time and the offset is optional. Timestamps
/// without an offset, or with an out-of-range field, yield `None`.
pub fn parse_xmltv_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let local = value.get(..14)?;
    if !local.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(local, "%Y%m%d%H%M%S").ok()?;

    let caps = XMLTV_OFFSET_RE.captures(value.get(14..)?.trim())?;
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = caps[3].parse().ok()?;
    if minutes > 59 {
        return None;
    }
    let sign = if &caps[1] == "-" { -1 } else { 1 };
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Local offset used to present schedule times
///
/// Only affects formatting. Stored instants and every comparison stay in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOffset {
    offset: FixedOffset,
}

impl DisplayOffset {
    /// Parse a `±H:MM` / `±HH:MM` offset
    pub fn parse(value: &str) -> AppResult<Self> {
        let value = value.trim();
        let caps = DISPLAY_OFFSET_RE.captures(value).ok_or_else(|| {
            AppError::configuration(format!(
                "Invalid timezone offset '{value}'. Expected format like '+1:00' or '-05:30'"
            ))
        })?;

        let hours: i32 = caps[2]
            .parse()
            .map_err(|_| AppError::configuration(format!("Invalid hours in offset '{value}'")))?;
        let minutes: i32 = caps[3]
            .parse()
            .map_err(|_| AppError::configuration(format!("Invalid minutes in offset '{value}'")))?;

        if minutes > 59 {
            return Err(AppError::configuration(format!(
                "Minute component too large in offset '{value}'"
            )));
        }

        let sign = if &caps[1] == "-" { -1 } else { 1 };
        let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(|| {
            AppError::configuration(format!("Offset '{value}' is out of range"))
        })?;

        Ok(Self { offset })
    }

    /// Parse, falling back to the default offset on invalid input
    pub fn parse_or_default(value: &str) -> Self {
        match Self::parse(value) {
            Ok(offset) => offset,
            Err(e) => {
                warn!("{}; falling back to {}", e, DEFAULT_TIMEZONE_OFFSET);
                Self::default()
            }
        }
    }

    pub fn fixed_offset(&self) -> FixedOffset {
        self.offset
    }

    /// `HH:MM` in the display offset
    pub fn format_time(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.offset).format("%H:%M").to_string()
    }
}

impl Default for DisplayOffset {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl fmt::Display for DisplayOffset {
    /// Renders in the configuration syntax, e.g. `+1:00`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.offset.local_minus_utc();
        let sign = if seconds < 0 { '-' } else { '+' };
        let seconds = seconds.abs();
        write!(f, "{}{}:{:02}", sign, seconds / 3600, (seconds % 3600) / 60)
    }
}
