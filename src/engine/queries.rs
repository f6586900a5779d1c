use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::{continuous_candidates, session_blocks};
use super::conflict::{count_active, find_conflict};
use super::{Engine, EngineError, eligible_staff};

impl Engine {
    // ── Lookups ──────────────────────────────────────────────

    pub fn booking(&self, id: &Ulid) -> Result<Booking, EngineError> {
        self.store.get(id).ok_or(EngineError::NotFound(*id))
    }

    pub fn bookings_by_customer(&self, customer_id: &Ulid) -> Vec<Booking> {
        self.store.by_customer(customer_id)
    }

    pub fn bookings_by_staff_and_date(&self, staff_id: Ulid, date: NaiveDate) -> Vec<Booking> {
        self.store.by_staff_and_date(staff_id, date)
    }

    pub fn bookings_by_session(&self, session_id: &str) -> Vec<Booking> {
        self.store.by_session(session_id)
    }

    pub fn list_services(&self) -> Vec<Service> {
        let mut services: Vec<Service> =
            self.services.iter().map(|e| e.value().clone()).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    pub fn list_staff(&self) -> Vec<Staff> {
        let mut pool = self.staff_pool();
        pool.sort_by(|a, b| a.name.cmp(&b.name));
        pool
    }

    // ── Availability ─────────────────────────────────────────

    /// Session-mode slots for one local date: the service's daily window
    /// tiled into fixed blocks, each annotated with live occupancy. A date
    /// outside the validity period yields an empty list, not an error.
    pub fn session_slots(
        &self,
        service_id: &Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, EngineError> {
        let service = self
            .service(service_id)
            .ok_or(EngineError::NotFound(*service_id))?;
        let Some(capacity) = service.capacity else {
            return Err(EngineError::Validation("not a session service"));
        };
        if service.resource_required {
            return Err(EngineError::Validation(
                "session availability for a service that books an exclusive resource",
            ));
        }
        let Some(window) = service.daily_window else {
            return Err(EngineError::Validation("session service has no daily window"));
        };
        if let Some(period) = service.valid_period
            && !period.contains(date)
        {
            return Ok(Vec::new());
        }

        let slots = session_blocks(date, window, service.duration_minutes, &self.config.tz)
            .into_iter()
            .map(|(id, span)| {
                let occupied = count_active(&self.store.by_session(&id));
                Slot {
                    id,
                    start: span.start,
                    end: span.end,
                    duration_minutes: service.duration_minutes,
                    capacity,
                    occupied,
                    remaining: capacity.saturating_sub(occupied),
                    status: if occupied >= capacity {
                        SlotStatus::Full
                    } else {
                        SlotStatus::Available
                    },
                }
            })
            .collect();
        Ok(slots)
    }

    /// Continuous-mode start candidates for one local date: every granularity
    /// step inside business hours with no active booking across the eligible
    /// pool overlapping it, each priced for its start time.
    pub fn continuous_slots(
        &self,
        service_id: &Ulid,
        date: NaiveDate,
    ) -> Result<Vec<SlotCandidate>, EngineError> {
        let service = self
            .service(service_id)
            .ok_or(EngineError::NotFound(*service_id))?;
        if service.capacity.is_some() {
            return Err(EngineError::Validation("not a continuous service"));
        }
        if !service.resource_required {
            return Err(EngineError::Validation(
                "continuous availability for a service that books no exclusive resource",
            ));
        }

        let pool = eligible_staff(service.category, &self.staff_pool());
        let pool_bookings: Vec<Booking> = pool
            .iter()
            .flat_map(|s| self.store.by_staff_and_date(s.id, date))
            .collect();

        let candidates = continuous_candidates(
            date,
            self.config.open_minute,
            self.config.close_minute,
            self.config.granularity_minutes,
            service.duration_minutes,
            &self.config.tz,
        )
        .into_iter()
        .filter(|span| find_conflict(&pool_bookings, span, None).is_none())
        .map(|span| SlotCandidate {
            start: span.start,
            end: span.end,
            price: super::pricing::quote(service.base_price, self.local(span.start)),
        })
        .collect();
        Ok(candidates)
    }
}
