use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minor currency units — the only money type.
pub type Money = i64;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Service categories — drive the specialization table in `engine::assign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    Grooming,
    QuickWash,
    Training,
    HealthCheck,
    SpecialCare,
    Daycare,
}

/// Minutes-of-day window a session service runs within, e.g. 540..1080 for 9:00–18:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWindow {
    pub start_minute: u32,
    pub end_minute: u32,
}

/// Inclusive date range a session service is offered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ValidPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A bookable service. `capacity` present means a session service (many
/// participants share one time block); absent means a continuous appointment
/// booked exclusively against one staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub category: ServiceCategory,
    pub duration_minutes: u32,
    pub base_price: Money,
    pub auto_approve: bool,
    pub resource_required: bool,
    pub capacity: Option<u32>,
    pub daily_window: Option<DailyWindow>,
    pub valid_period: Option<ValidPeriod>,
}

impl Service {
    pub fn is_session(&self) -> bool {
        self.capacity.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaffStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: Ulid,
    pub name: String,
    pub specializations: HashSet<String>,
    pub status: StaffStatus,
}

impl Staff {
    pub fn is_active(&self) -> bool {
        self.status == StaffStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurchargeKind {
    Weekend,
    Evening,
    PeakHour,
}

/// One itemized surcharge line, kept on the booking for receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surcharge {
    pub kind: SurchargeKind,
    pub amount: Money,
}

/// Priced booking: base price plus itemized surcharges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub base: Money,
    pub surcharges: Vec<Surcharge>,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

/// A persisted booking. Never physically deleted — cancellation is a status
/// change, and the journal keeps the full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub pet_id: Option<Ulid>,
    pub service_id: Ulid,
    pub staff_id: Option<Ulid>,
    pub session_id: Option<String>,
    pub span: Span,
    pub status: BookingStatus,
    pub final_price: Money,
    pub surcharges: Vec<Surcharge>,
    pub payment_method: Option<String>,
    pub payment_status: String,
    pub contact: Contact,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Cancelled bookings release their slot; everything else holds it.
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Available,
    Full,
}

/// A displayed session time block with computed occupancy. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: u32,
    pub capacity: u32,
    pub occupied: u32,
    pub remaining: u32,
    pub status: SlotStatus,
}

/// A continuous-mode candidate start time with its computed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub price: Quote,
}

/// The unit of conflict-freedom: check-then-write is serialized per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// Continuous appointments: one staff member's day.
    Staff { staff_id: Ulid, date: NaiveDate },
    /// Session services: one capacity-limited time block.
    Session { session_id: String },
    /// Bookings with no assigned staff still serialize their own lifecycle.
    Unassigned { booking_id: Ulid },
}

/// Input contract for booking creation. `payment_method`/`payment_status`
/// come from the payment collaborator and are stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: Ulid,
    pub customer_id: Ulid,
    pub pet_id: Option<Ulid>,
    pub start: DateTime<Utc>,
    pub contact: Contact,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub payment_status: Option<String>,
    pub session_id: Option<String>,
    pub idempotency_key: Option<String>,
}

/// The event types — flat, no nesting. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ServiceRegistered {
        service: Service,
    },
    StaffRegistered {
        staff: Staff,
    },
    StaffStatusChanged {
        id: Ulid,
        status: StaffStatus,
    },
    BookingCreated {
        booking: Box<Booking>,
    },
    BookingCancelled {
        id: Ulid,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    BookingRescheduled {
        id: Ulid,
        span: Span,
        session_id: Option<String>,
        at: DateTime<Utc>,
    },
    BookingStatusChanged {
        id: Ulid,
        status: BookingStatus,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    #[test]
    fn span_basics() {
        let s = Span::new(at(9, 0), at(10, 30));
        assert_eq!(s.duration_minutes(), 90);
    }

    #[test]
    fn span_overlap_half_open() {
        let a = Span::new(at(9, 0), at(10, 30));
        let b = Span::new(at(10, 0), at(11, 0));
        let c = Span::new(at(10, 30), at(11, 0));
        assert!(a.overlaps(&b));
        assert!(a.overlaps(&a));
        assert!(!a.overlaps(&c)); // touching boundary, not a conflict
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn valid_period_inclusive() {
        let p = ValidPeriod {
            start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        };
        assert!(p.contains(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()));
        assert!(p.contains(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()));
        assert!(!p.contains(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()));
    }

    #[test]
    fn terminal_states() {
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(!BookingStatus::InProgress.is_terminal());
    }

    #[test]
    fn booking_serializes_to_json_for_api_payloads() {
        let booking = Booking {
            id: Ulid::new(),
            customer_id: Ulid::new(),
            pet_id: None,
            service_id: Ulid::new(),
            staff_id: None,
            session_id: Some("2025-06-02-09:00".into()),
            span: Span::new(at(9, 0), at(12, 0)),
            status: BookingStatus::Confirmed,
            final_price: 80_000,
            surcharges: vec![],
            payment_method: None,
            payment_status: "unpaid".into(),
            contact: Contact {
                name: "Dewi".into(),
                phone: "+62-811-000".into(),
            },
            notes: None,
            cancel_reason: None,
            idempotency_key: None,
            created_at: at(8, 0),
            updated_at: at(8, 0),
            completed_at: None,
            cancelled_at: None,
        };
        let json = serde_json::to_string(&booking).unwrap();
        let decoded: Booking = serde_json::from_str(&json).unwrap();
        assert_eq!(booking, decoded);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::StaffRegistered {
            staff: Staff {
                id: Ulid::new(),
                name: "Ana".into(),
                specializations: ["grooming".to_string()].into_iter().collect(),
                status: StaffStatus::Active,
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
