//! Hard input limits. Everything user-supplied is bounded before it reaches
//! the journal.

pub const MAX_NAME_LEN: usize = 128;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_PAYMENT_FIELD_LEN: usize = 64;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;
pub const MAX_SESSION_ID_LEN: usize = 64;

pub const MAX_SERVICES: usize = 10_000;
pub const MAX_STAFF: usize = 10_000;
pub const MAX_SPECIALIZATIONS: usize = 32;

/// A single appointment never spans more than a day.
pub const MAX_SPAN_DURATION_MINUTES: i64 = 24 * 60;

pub const MINUTES_PER_DAY: u32 = 24 * 60;
