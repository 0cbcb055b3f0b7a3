//! General utilities shared across the application.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol_constants::TICKS_PER_SECOND;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Formats upstream ticks as a DIDL-Lite duration (`H:MM:SS.mmm`).
#[must_use]
pub fn format_duration_ticks(ticks: u64) -> String {
    let total_ms = ticks / (TICKS_PER_SECOND / 1000);
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Parses a DLNA normal-play-time value (`123.5` or `0:02:03.500`) into ticks.
#[must_use]
pub fn parse_npt_ticks(npt: &str) -> Option<u64> {
    let npt = npt.trim();
    let seconds: f64 = if npt.contains(':') {
        let mut parts = npt.split(':').rev();
        let secs: f64 = parts.next()?.parse().ok()?;
        let mins: f64 = parts.next().unwrap_or("0").parse().ok()?;
        let hours: f64 = parts.next().unwrap_or("0").parse().ok()?;
        hours * 3600.0 + mins * 60.0 + secs
    } else {
        npt.parse().ok()?
    };
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some((seconds * TICKS_PER_SECOND as f64) as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// XML
// ─────────────────────────────────────────────────────────────────────────────

/// Escapes the five XML special characters (`& < > " '`).
#[must_use]
pub fn escape_xml(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_formats_hours_minutes_seconds_millis() {
        // 1h 2m 3.456s
        let ticks = (3600 + 120 + 3) * TICKS_PER_SECOND + 4_560_000;
        assert_eq!(format_duration_ticks(ticks), "1:02:03.456");
        assert_eq!(format_duration_ticks(0), "0:00:00.000");
    }

    #[test]
    fn npt_parses_seconds_and_clock_forms() {
        assert_eq!(parse_npt_ticks("10"), Some(10 * TICKS_PER_SECOND));
        assert_eq!(parse_npt_ticks("0:01:30"), Some(90 * TICKS_PER_SECOND));
        assert_eq!(parse_npt_ticks("1:00:00.5"), Some(36005 * TICKS_PER_SECOND / 10));
        assert_eq!(parse_npt_ticks("abc"), None);
        assert_eq!(parse_npt_ticks("-4"), None);
    }

    #[test]
    fn escape_xml_handles_special_characters() {
        assert_eq!(escape_xml("a & b <c>"), "a &amp; b &lt;c&gt;");
        assert_eq!(escape_xml("plain"), "plain");
    }
}
