//! ---
//! rchan_section: "01-core-functionality"
//! rchan_subsection: "module"
//! rchan_type: "source"
//! rchan_scope: "code"
//! rchan_description: "Shared primitives and utilities for the core runtime."
//! rchan_version: "v0.0.0-prealpha"
//! rchan_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wall-clock timestamp attached to emitted events.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Return `value` unless it is zero, in which case `fallback` is used.
///
/// Zero periods are treated as "unset" so that a zeroed configuration field
/// never produces a busy-looping timer.
pub fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

/// Convert a duration into whole milliseconds, saturating at `u64::MAX`.
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
