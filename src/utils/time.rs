use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

/// Drops sub-millisecond precision so timestamps survive a round trip through
/// snapshot keys.
pub(crate) fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

/// Time left until `deadline`, zero if it already passed
pub(crate) fn duration_until(
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}

/// Returns a creation time strictly after `previous`, so two chains never share a
/// directory even when captured within the same millisecond.
pub(crate) fn strictly_after(
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let now = truncate_to_millis(now);
    match previous {
        Some(prev) if now <= prev => prev + chrono::Duration::milliseconds(1),
        _ => now,
    }
}
