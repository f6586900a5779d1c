use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::model::{DailyWindow, Span};

// ── Slot generation primitives ───────────────────────────────────

/// Deterministic session-slot id from the local date and start time.
pub fn slot_id(date: NaiveDate, start_minute: u32) -> String {
    format!("{date}-{:02}:{:02}", start_minute / 60, start_minute % 60)
}

/// Convert a local (business-timezone) date + minute-of-day to UTC.
pub(crate) fn local_to_utc(date: NaiveDate, minute: u32, tz: &FixedOffset) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN) + Duration::minutes(minute as i64);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        // Fixed offsets are never ambiguous; treat the input as UTC if chrono disagrees.
        _ => DateTime::from_naive_utc_and_offset(naive, Utc),
    }
}

/// Session block id for a local start time, if that start lands exactly on
/// the window's tiling. Misaligned starts (off-grid minute, sub-minute
/// offset, outside the window, or a block that would overrun it) get `None` —
/// they would occupy a block `session_blocks` never displays.
pub(crate) fn aligned_block_id(
    local: DateTime<FixedOffset>,
    window: DailyWindow,
    duration_minutes: u32,
) -> Option<String> {
    use chrono::Timelike;
    if duration_minutes == 0 || local.time().second() != 0 || local.time().nanosecond() != 0 {
        return None;
    }
    let minute = local.time().hour() * 60 + local.time().minute();
    if minute < window.start_minute
        || (minute - window.start_minute) % duration_minutes != 0
        || minute + duration_minutes > window.end_minute
    {
        return None;
    }
    Some(slot_id(local.date_naive(), minute))
}

/// Partition `[window.start_minute, window.end_minute)` into consecutive
/// blocks of `duration_minutes`. The trailing remainder that would exceed the
/// window produces no block. Returns `(slot_id, span)` pairs; no gaps, no
/// overlaps.
pub fn session_blocks(
    date: NaiveDate,
    window: DailyWindow,
    duration_minutes: u32,
    tz: &FixedOffset,
) -> Vec<(String, Span)> {
    if duration_minutes == 0 {
        return Vec::new();
    }
    let mut blocks = Vec::new();
    let mut start = window.start_minute;
    while start + duration_minutes <= window.end_minute {
        let end = start + duration_minutes;
        blocks.push((
            slot_id(date, start),
            Span::new(local_to_utc(date, start, tz), local_to_utc(date, end, tz)),
        ));
        start = end;
    }
    blocks
}

/// Continuous-mode candidate spans: every `granularity_minutes` across
/// business hours, keeping only candidates that finish by close.
pub fn continuous_candidates(
    date: NaiveDate,
    open_minute: u32,
    close_minute: u32,
    granularity_minutes: u32,
    duration_minutes: u32,
    tz: &FixedOffset,
) -> Vec<Span> {
    if granularity_minutes == 0 || duration_minutes == 0 {
        return Vec::new();
    }
    let mut candidates = Vec::new();
    let mut start = open_minute;
    while start < close_minute {
        let end = start + duration_minutes;
        if end <= close_minute {
            candidates.push(Span::new(
                local_to_utc(date, start, tz),
                local_to_utc(date, end, tz),
            ));
        }
        start += granularity_minutes;
    }
    candidates
}
