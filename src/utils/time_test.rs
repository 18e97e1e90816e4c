use std::time::Duration;

use chrono::TimeZone;
use chrono::Utc;

use crate::utils::time::duration_until;
use crate::utils::time::strictly_after;
use crate::utils::time::truncate_to_millis;

#[test]
fn test_truncate_to_millis_drops_nanos() {
    let t = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
    let truncated = truncate_to_millis(t);
    assert_eq!(truncated.timestamp_millis(), t.timestamp_millis());
    assert_eq!(truncated.timestamp_subsec_nanos(), 123_000_000);
}

#[test]
fn test_duration_until_past_deadline_is_zero() {
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    assert_eq!(duration_until(now - chrono::Duration::seconds(5), now), Duration::ZERO);
    assert_eq!(
        duration_until(now + chrono::Duration::seconds(5), now),
        Duration::from_secs(5)
    );
}

#[test]
fn test_strictly_after_bumps_colliding_timestamps() {
    let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    assert_eq!(strictly_after(None, now), now);
    assert_eq!(
        strictly_after(Some(now), now),
        now + chrono::Duration::milliseconds(1)
    );
    let earlier = now - chrono::Duration::seconds(1);
    assert_eq!(strictly_after(Some(earlier), now), now);
}
