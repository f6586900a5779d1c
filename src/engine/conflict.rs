use chrono::{DateTime, Datelike, Utc};
use ulid::Ulid;

use crate::limits::MAX_SPAN_DURATION_MINUTES;
use crate::model::{Booking, Span};

use super::EngineError;

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::Validation("span start must be before end"));
    }
    if span.start.year() < 2000 || span.end.year() > 2200 {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_minutes() > MAX_SPAN_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Scan `bookings` for the first active one whose interval overlaps `span`,
/// skipping `exclude` (the booking being rescheduled). Cancelled bookings
/// never conflict. Callers pass the booking set for one resource — one staff
/// member's day, or the whole eligible pool when no staff is chosen yet.
/// Pure: no side effects, no locking.
pub fn find_conflict<'a>(
    bookings: &'a [Booking],
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Booking> {
    bookings.iter().find(|b| {
        b.is_active() && Some(b.id) != exclude && b.span.overlaps(span)
    })
}

/// Session occupancy: active bookings only.
pub fn count_active(bookings: &[Booking]) -> u32 {
    bookings.iter().filter(|b| b.is_active()).count() as u32
}
