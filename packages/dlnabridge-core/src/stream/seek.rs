//! Resume positions and byte-to-time progress estimation.

use std::time::Duration;

use axum::http::HeaderMap;

use crate::protocol_constants::{TICKS_PER_SECOND, TIME_SEEK_RANGE_HEADER};
use crate::utils::parse_npt_ticks;

/// Resume position requested by the client, in ticks.
///
/// An explicit `StartTimeTicks` query value wins over a DLNA
/// `TimeSeekRange.dlna.org: npt=<start>-[<end>]` header.
#[must_use]
pub fn requested_start_ticks(query_ticks: Option<u64>, headers: &HeaderMap) -> Option<u64> {
    query_ticks
        .or_else(|| {
            headers
                .get(TIME_SEEK_RANGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_time_seek_range)
        })
        .filter(|ticks| *ticks > 0)
}

/// Start of a `npt=<start>-[<end>]` range, in ticks.
#[must_use]
pub fn parse_time_seek_range(value: &str) -> Option<u64> {
    let value = value.trim();
    let npt = value
        .get(..4)
        .filter(|p| p.eq_ignore_ascii_case("npt="))
        .map(|_| &value[4..])?;
    let (start, _) = npt.split_once('-')?;
    parse_npt_ticks(start)
}

/// Parses `bytes <first>-<last>/<total>` into `(first, total)`.
#[must_use]
pub fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (first, _) = range.split_once('-')?;
    let first = first.trim().parse().ok()?;
    let total = total.trim().parse().ok();
    Some((first, total))
}

/// Estimates the playback position of a relayed stream.
///
/// With a known size and runtime the position is proportional to the bytes
/// delivered (plus the range offset). Otherwise, as for transcoded output,
/// wall-clock time since the first byte is added to the resume position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEstimator {
    start_ticks: u64,
    byte_offset: u64,
    total_bytes: Option<u64>,
    duration_ticks: Option<u64>,
}

impl ProgressEstimator {
    #[must_use]
    pub fn by_bytes(byte_offset: u64, total_bytes: Option<u64>, duration_ticks: Option<u64>) -> Self {
        Self {
            start_ticks: 0,
            byte_offset,
            total_bytes: total_bytes.filter(|t| *t > 0),
            duration_ticks,
        }
    }

    #[must_use]
    pub fn by_time(start_ticks: u64, duration_ticks: Option<u64>) -> Self {
        Self {
            start_ticks,
            byte_offset: 0,
            total_bytes: None,
            duration_ticks,
        }
    }

    #[must_use]
    pub fn position(&self, delivered: u64, elapsed: Duration) -> u64 {
        let ticks = match (self.total_bytes, self.duration_ticks) {
            (Some(total), Some(duration)) => {
                let sent = (self.byte_offset + delivered).min(total);
                (u128::from(sent) * u128::from(duration) / u128::from(total)) as u64
            }
            _ => {
                let played = elapsed.as_millis() as u64 * (TICKS_PER_SECOND / 1000);
                self.start_ticks.saturating_add(played)
            }
        };
        match self.duration_ticks {
            Some(duration) => ticks.min(duration),
            None => ticks,
        }
    }
}
