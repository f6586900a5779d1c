use chrono::{FixedOffset, Offset, Utc};

/// Engine configuration. Every knob has a `RESERVA_*` environment variable
/// and a default matching the business rules.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Business-local timezone. Pricing rules and slot windows are evaluated
    /// in this offset; everything is stored as UTC.
    pub tz: FixedOffset,
    /// Continuous-mode business hours, minutes of the local day.
    pub open_minute: u32,
    pub close_minute: u32,
    /// Continuous-mode candidate granularity.
    pub granularity_minutes: u32,
    /// Confirmed bookings cannot be cancelled closer to start than this.
    pub cancel_cutoff_minutes: i64,
    /// Journal appends between snapshot compactions.
    pub compact_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tz: Utc.fix(),
            open_minute: 9 * 60,
            close_minute: 18 * 60,
            granularity_minutes: 30,
            cancel_cutoff_minutes: 120,
            compact_threshold: 1000,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tz = env_parse::<i32>("RESERVA_TZ_OFFSET_MINUTES")
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .unwrap_or(defaults.tz);
        Self {
            tz,
            open_minute: env_parse("RESERVA_OPEN_MINUTE").unwrap_or(defaults.open_minute),
            close_minute: env_parse("RESERVA_CLOSE_MINUTE").unwrap_or(defaults.close_minute),
            granularity_minutes: env_parse("RESERVA_SLOT_GRANULARITY_MINUTES")
                .unwrap_or(defaults.granularity_minutes),
            cancel_cutoff_minutes: env_parse("RESERVA_CANCEL_CUTOFF_MINUTES")
                .unwrap_or(defaults.cancel_cutoff_minutes),
            compact_threshold: env_parse("RESERVA_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
        }
    }
}
