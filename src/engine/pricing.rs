use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};

use crate::model::{Money, Quote, Surcharge, SurchargeKind};

/// Weekend surcharge rate, applied to the base price.
pub const WEEKEND_RATE: f64 = 0.10;
/// Flat surcharge for bookings starting at or after this local hour.
pub const EVENING_START_HOUR: u32 = 17;
pub const EVENING_SURCHARGE: Money = 50_000;
/// Flat surcharge for weekend bookings starting within [10, 14) local.
pub const PEAK_START_HOUR: u32 = 10;
pub const PEAK_END_HOUR: u32 = 14;
pub const PEAK_SURCHARGE: Money = 30_000;

/// Price a booking start time. Rules are evaluated independently in a fixed
/// order and summed; each surcharge is computed against the original base
/// price, never against another surcharge.
pub fn quote(base_price: Money, local: DateTime<FixedOffset>) -> Quote {
    let mut surcharges = Vec::new();
    let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
    let hour = local.hour();

    if weekend {
        surcharges.push(Surcharge {
            kind: SurchargeKind::Weekend,
            amount: (base_price as f64 * WEEKEND_RATE).round() as Money,
        });
    }
    if hour >= EVENING_START_HOUR {
        surcharges.push(Surcharge {
            kind: SurchargeKind::Evening,
            amount: EVENING_SURCHARGE,
        });
    }
    if weekend && (PEAK_START_HOUR..PEAK_END_HOUR).contains(&hour) {
        surcharges.push(Surcharge {
            kind: SurchargeKind::PeakHour,
            amount: PEAK_SURCHARGE,
        });
    }

    let total = base_price + surcharges.iter().map(|s| s.amount).sum::<Money>();
    Quote {
        base: base_price,
        surcharges,
        total,
    }
}
