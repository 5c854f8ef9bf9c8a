//! Remaining time derived from absolute timestamps.
//!
//! Nothing here decrements a counter. A throttled or backgrounded WebView
//! that misses ticks still shows the right value on the next render,
//! because every reading is `end_at - now`.

use super::record::{TimerRecord, TimerState};

/// Whole seconds left on `record` at `now_ms`, rounded up.
pub fn remaining_secs(record: &TimerRecord, now_ms: i64) -> u64 {
    match record.state {
        TimerState::Active => record
            .end_at_ms
            .map(|end_at| secs_until(end_at, now_ms))
            .unwrap_or(0),
        TimerState::Paused => record.remaining_secs_at_pause.unwrap_or(0),
        TimerState::Idle => record.duration_secs,
        TimerState::Finished => 0,
    }
}

/// `max(0, ceil((end_at - now) / 1000))`.
pub fn secs_until(end_at_ms: i64, now_ms: i64) -> u64 {
    let left_ms = end_at_ms.saturating_sub(now_ms);
    if left_ms <= 0 {
        return 0;
    }
    u64::try_from(left_ms).map_or(0, |ms| ms.div_ceil(1000))
}

/// An Active timer at or past its end. Surfaced to the user, never
/// transitioned on their behalf.
pub fn is_expired(record: &TimerRecord, now_ms: i64) -> bool {
    record.state == TimerState::Active && record.end_at_ms.is_some_and(|end_at| now_ms >= end_at)
}

/// `mm:ss`, or `h:mm:ss` past the hour.
pub fn format_remaining(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::record::RecipeRef;

    fn record(state: TimerState) -> TimerRecord {
        let mut r = TimerRecord::new("t".into(), 90, String::new(), &RecipeRef::new("r", "Soup"), 0);
        r.state = state;
        r
    }

    #[test]
    fn rounds_partial_seconds_up() {
        assert_eq!(secs_until(10_000, 0), 10);
        assert_eq!(secs_until(10_000, 1), 10);
        assert_eq!(secs_until(10_000, 9_001), 1);
        assert_eq!(secs_until(10_000, 10_000), 0);
        assert_eq!(secs_until(10_000, 99_999), 0);
    }

    #[test]
    fn remaining_per_state() {
        let mut active = record(TimerState::Active);
        active.end_at_ms = Some(30_000);
        assert_eq!(remaining_secs(&active, 0), 30);

        let mut paused = record(TimerState::Paused);
        paused.remaining_secs_at_pause = Some(12);
        assert_eq!(remaining_secs(&paused, 1_000_000), 12);

        assert_eq!(remaining_secs(&record(TimerState::Idle), 5), 90);
        assert_eq!(remaining_secs(&record(TimerState::Finished), 5), 0);
    }

    #[test]
    fn expiry_only_for_active() {
        let mut active = record(TimerState::Active);
        active.end_at_ms = Some(1_000);
        assert!(!is_expired(&active, 999));
        assert!(is_expired(&active, 1_000));
        assert!(!is_expired(&record(TimerState::Finished), 1_000));
    }

    #[test]
    fn formats_clock_text() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(75), "01:15");
        assert_eq!(format_remaining(3_725), "1:02:05");
    }
}
