use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::info;
use ulid::Ulid;

use crate::auth::{CurrentUser, PERM_BOOKING_MANAGEMENT, PERM_SERVICE_BOOKING};
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::aligned_block_id;
use super::conflict::{count_active, find_conflict, now, validate_span};
use super::{Candidate, Engine, EngineError, eligible_staff};

impl Engine {
    // ── Catalog ──────────────────────────────────────────────

    pub async fn register_service(&self, service: Service) -> Result<(), EngineError> {
        if self.service_count() >= MAX_SERVICES {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        if service.name.is_empty() || service.name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation("service name length"));
        }
        if service.duration_minutes == 0
            || service.duration_minutes as i64 > MAX_SPAN_DURATION_MINUTES
        {
            return Err(EngineError::Validation("service duration out of range"));
        }
        if service.base_price < 0 {
            return Err(EngineError::Validation("negative base price"));
        }
        if let Some(capacity) = service.capacity {
            if capacity == 0 {
                return Err(EngineError::Validation("session capacity must be positive"));
            }
            let Some(window) = service.daily_window else {
                return Err(EngineError::Validation("session service needs a daily window"));
            };
            if window.start_minute >= window.end_minute || window.end_minute > MINUTES_PER_DAY {
                return Err(EngineError::Validation("daily window out of range"));
            }
        }

        let event = Event::ServiceRegistered { service };
        self.persist_and_apply(None, &event).await
    }

    pub async fn register_staff(&self, staff: Staff) -> Result<(), EngineError> {
        if self.staff_count() >= MAX_STAFF {
            return Err(EngineError::LimitExceeded("too many staff"));
        }
        if staff.name.is_empty() || staff.name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation("staff name length"));
        }
        if staff.specializations.len() > MAX_SPECIALIZATIONS {
            return Err(EngineError::LimitExceeded("too many specializations"));
        }

        let event = Event::StaffRegistered { staff };
        self.persist_and_apply(None, &event).await
    }

    pub async fn set_staff_status(
        &self,
        id: Ulid,
        status: StaffStatus,
    ) -> Result<(), EngineError> {
        if self.staff_member(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::StaffStatusChanged { id, status };
        self.persist_and_apply(None, &event).await
    }

    // ── Booking lifecycle ────────────────────────────────────

    /// Create a booking. Availability shown earlier is advisory only: the
    /// conflict (or capacity) check reruns here against live state, under the
    /// booking's resource-key lock, and the journal append commits inside the
    /// same critical section.
    pub async fn create_booking(
        &self,
        req: CreateBookingRequest,
        caller: &CurrentUser,
        deadline: Option<StdDuration>,
    ) -> Result<Booking, EngineError> {
        if !self
            .permissions
            .has_permission(caller.role, PERM_SERVICE_BOOKING)
        {
            return Err(EngineError::Permission(PERM_SERVICE_BOOKING));
        }
        let service = self
            .service(&req.service_id)
            .ok_or(EngineError::NotFound(req.service_id))?;
        validate_create_request(&req, &service)?;

        // A retry of an already-committed create returns the original booking
        // before any conflict check would reject it against itself.
        if let Some(ref key) = req.idempotency_key
            && let Some(owner) = self.store.idempotency_owner(key)
        {
            return self.committed_booking(owner).await;
        }

        let span = Span::new(
            req.start,
            req.start + Duration::minutes(service.duration_minutes as i64),
        );
        validate_span(&span)?;

        let local_start = self.local(span.start);
        let price = super::pricing::quote(service.base_price, local_start);
        let created_at = now();

        // Resolve the resource key, lock it, and rerun the availability check
        // against the live store. The guard is held through the commit.
        let mut staff_id = None;
        let mut session_id = None;
        let _guard;

        if let Some(capacity) = service.capacity {
            let date = self.business_date(span.start);
            if let Some(period) = service.valid_period
                && !period.contains(date)
            {
                return Err(EngineError::Validation("date outside service validity period"));
            }
            let Some(window) = service.daily_window else {
                return Err(EngineError::Validation("session service has no daily window"));
            };
            // The block is always derived from the start time; an explicit
            // session id may only confirm it, never redirect capacity.
            let Some(block) = aligned_block_id(local_start, window, service.duration_minutes)
            else {
                return Err(EngineError::Validation("start is not a session block boundary"));
            };
            if let Some(ref requested) = req.session_id
                && *requested != block
            {
                return Err(EngineError::Validation("session id does not match start time"));
            }

            _guard = Some(
                self.lock_resource(
                    ResourceKey::Session {
                        session_id: block.clone(),
                    },
                    deadline,
                )
                .await?,
            );
            if let Some(ref key) = req.idempotency_key
                && let Some(owner) = self.store.idempotency_owner(key)
            {
                return self.committed_booking(owner).await;
            }
            let occupied = count_active(&self.store.by_session(&block));
            if occupied >= capacity {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::CapacityExceeded(capacity));
            }
            session_id = Some(block);
        } else {
            let date = self.business_date(span.start);
            let eligible = eligible_staff(service.category, &self.staff_pool());
            let candidates: Vec<Candidate> = eligible
                .into_iter()
                .map(|staff| {
                    let active_load =
                        count_active(&self.store.by_staff_and_date(staff.id, date)) as usize;
                    Candidate { staff, active_load }
                })
                .collect();

            match self.strategy.select(&candidates) {
                Some(picked) => {
                    _guard = Some(
                        self.lock_resource(
                            ResourceKey::Staff {
                                staff_id: picked,
                                date,
                            },
                            deadline,
                        )
                        .await?,
                    );
                    if let Some(ref key) = req.idempotency_key
                        && let Some(owner) = self.store.idempotency_owner(key)
                    {
                        return self.committed_booking(owner).await;
                    }
                    let existing = self.store.by_staff_and_date(picked, date);
                    if let Some(hit) = find_conflict(&existing, &span, None) {
                        metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                        return Err(EngineError::Conflict(hit.id));
                    }
                    staff_id = Some(picked);
                }
                // No eligible staff: create unassigned, pending manual
                // assignment. No staff means nothing to double-book.
                None => _guard = None,
            }
        }

        let booking = Booking {
            id: Ulid::new(),
            customer_id: req.customer_id,
            pet_id: req.pet_id,
            service_id: service.id,
            staff_id,
            session_id,
            span,
            status: if service.auto_approve {
                BookingStatus::Confirmed
            } else {
                BookingStatus::Pending
            },
            final_price: price.total,
            surcharges: price.surcharges,
            payment_method: req.payment_method,
            payment_status: req.payment_status.unwrap_or_else(|| "unpaid".into()),
            contact: req.contact,
            notes: req.notes,
            cancel_reason: None,
            idempotency_key: req.idempotency_key,
            created_at,
            updated_at: created_at,
            completed_at: None,
            cancelled_at: None,
        };

        // Deduplicate retried creates: the first claim of a key wins, a
        // repeat returns the original booking instead of inserting twice.
        if let Some(ref key) = booking.idempotency_key {
            let owner = self.store.claim_idempotency(key, booking.id);
            if owner != booking.id {
                return self.committed_booking(owner).await;
            }
        }

        let event = Event::BookingCreated {
            booking: Box::new(booking.clone()),
        };
        if let Err(e) = self.persist_and_apply(Some(booking.customer_id), &event).await {
            if let Some(ref key) = booking.idempotency_key {
                self.store.release_idempotency(key);
            }
            return Err(e);
        }

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            booking = %booking.id,
            service = %booking.service_id,
            status = booking.status.as_str(),
            "booking created"
        );
        Ok(booking)
    }

    /// Resolve a rival idempotency claim to its booking. The key is claimed
    /// before the winner's journal append, so the row can lag the claim by
    /// one commit; a claim whose commit failed was released, and the wait
    /// ends in `Busy` (retryable).
    async fn committed_booking(&self, owner: Ulid) -> Result<Booking, EngineError> {
        for _ in 0..200 {
            if let Some(booking) = self.store.get(&owner) {
                return Ok(booking);
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        Err(EngineError::Busy)
    }

    /// Cancel a booking. Confirmed bookings lock in two hours before start;
    /// terminal bookings reject rather than silently no-op.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        reason: Option<String>,
        caller: &CurrentUser,
    ) -> Result<Booking, EngineError> {
        if !self
            .permissions
            .has_permission(caller.role, PERM_SERVICE_BOOKING)
        {
            return Err(EngineError::Permission(PERM_SERVICE_BOOKING));
        }
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(EngineError::LimitExceeded("cancel reason too long"));
        }

        let booking = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
        let _guard = self.lock_resource(self.booking_key(&booking), None).await?;
        // Re-read under the lock — another caller may have raced us here.
        let booking = self.store.get(&id).ok_or(EngineError::NotFound(id))?;

        match booking.status {
            BookingStatus::Completed => {
                return Err(EngineError::InvalidState("cannot cancel a completed booking"));
            }
            BookingStatus::Cancelled => {
                return Err(EngineError::InvalidState("booking already cancelled"));
            }
            BookingStatus::Confirmed => {
                let cutoff =
                    booking.span.start - Duration::minutes(self.config.cancel_cutoff_minutes);
                if now() > cutoff {
                    return Err(EngineError::InvalidState("too close to appointment"));
                }
            }
            BookingStatus::Pending | BookingStatus::InProgress => {}
        }

        let event = Event::BookingCancelled {
            id,
            reason,
            at: now(),
        };
        self.persist_and_apply(Some(booking.customer_id), &event).await?;

        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!(booking = %id, "booking cancelled");
        self.store.get(&id).ok_or(EngineError::NotFound(id))
    }

    /// Move a booking to a new start time. The conflict check excludes the
    /// booking itself and runs under the new resource key's lock; on any
    /// failure the booking is untouched. Success always resets the status to
    /// Pending — a moved booking re-requires confirmation.
    pub async fn reschedule_booking(
        &self,
        id: Ulid,
        new_start: chrono::DateTime<Utc>,
        caller: &CurrentUser,
        deadline: Option<StdDuration>,
    ) -> Result<Booking, EngineError> {
        if !self
            .permissions
            .has_permission(caller.role, PERM_SERVICE_BOOKING)
        {
            return Err(EngineError::Permission(PERM_SERVICE_BOOKING));
        }

        let booking = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
        if booking.status.is_terminal() {
            return Err(EngineError::InvalidState("cannot reschedule a terminal booking"));
        }
        let service = self
            .service(&booking.service_id)
            .ok_or(EngineError::NotFound(booking.service_id))?;

        let new_span = Span::new(
            new_start,
            new_start + Duration::minutes(service.duration_minutes as i64),
        );
        validate_span(&new_span)?;

        let new_date = self.business_date(new_start);
        let mut new_session = None;
        let _guard;

        if let Some(capacity) = service.capacity {
            if let Some(period) = service.valid_period
                && !period.contains(new_date)
            {
                return Err(EngineError::Validation("date outside service validity period"));
            }
            let Some(window) = service.daily_window else {
                return Err(EngineError::Validation("session service has no daily window"));
            };
            let local = self.local(new_start);
            let Some(block) = aligned_block_id(local, window, service.duration_minutes) else {
                return Err(EngineError::Validation("start is not a session block boundary"));
            };
            _guard = self
                .lock_resource(
                    ResourceKey::Session {
                        session_id: block.clone(),
                    },
                    deadline,
                )
                .await?;
            let occupied = self
                .store
                .by_session(&block)
                .iter()
                .filter(|b| b.is_active() && b.id != id)
                .count() as u32;
            if occupied >= capacity {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::CapacityExceeded(capacity));
            }
            new_session = Some(block);
        } else if let Some(staff_id) = booking.staff_id {
            _guard = self
                .lock_resource(
                    ResourceKey::Staff {
                        staff_id,
                        date: new_date,
                    },
                    deadline,
                )
                .await?;
            let existing = self.store.by_staff_and_date(staff_id, new_date);
            if let Some(hit) = find_conflict(&existing, &new_span, Some(id)) {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Conflict(hit.id));
            }
        } else {
            _guard = self
                .lock_resource(ResourceKey::Unassigned { booking_id: id }, deadline)
                .await?;
        }

        // Status may have flipped while we waited on the lock.
        let current = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
        if current.status.is_terminal() {
            return Err(EngineError::InvalidState("cannot reschedule a terminal booking"));
        }

        let event = Event::BookingRescheduled {
            id,
            span: new_span,
            session_id: new_session,
            at: now(),
        };
        self.persist_and_apply(Some(booking.customer_id), &event).await?;

        metrics::counter!(observability::BOOKINGS_RESCHEDULED_TOTAL).increment(1);
        info!(booking = %id, "booking rescheduled");
        self.store.get(&id).ok_or(EngineError::NotFound(id))
    }

    /// Staff/manager status transition. Terminal states reject any further
    /// transition; reaching Completed stamps `completed_at`.
    pub async fn update_status(
        &self,
        id: Ulid,
        new_status: BookingStatus,
        caller: &CurrentUser,
    ) -> Result<Booking, EngineError> {
        if !self
            .permissions
            .has_permission(caller.role, PERM_BOOKING_MANAGEMENT)
        {
            return Err(EngineError::Permission(PERM_BOOKING_MANAGEMENT));
        }

        let booking = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
        let _guard = self.lock_resource(self.booking_key(&booking), None).await?;
        let booking = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
        if booking.status.is_terminal() {
            return Err(EngineError::InvalidState("no transitions out of a terminal status"));
        }

        let event = Event::BookingStatusChanged {
            id,
            status: new_status,
            at: now(),
        };
        self.persist_and_apply(Some(booking.customer_id), &event).await?;
        self.store.get(&id).ok_or(EngineError::NotFound(id))
    }
}

fn validate_create_request(
    req: &CreateBookingRequest,
    service: &Service,
) -> Result<(), EngineError> {
    if req.contact.name.is_empty() {
        return Err(EngineError::Validation("customer contact name required"));
    }
    if req.contact.phone.is_empty() {
        return Err(EngineError::Validation("customer contact phone required"));
    }
    if req.contact.name.len() > MAX_NAME_LEN || req.contact.phone.len() > MAX_PHONE_LEN {
        return Err(EngineError::LimitExceeded("contact field too long"));
    }
    if service.resource_required && req.pet_id.is_none() {
        return Err(EngineError::Validation("pet required for this service"));
    }
    if let Some(ref s) = req.session_id {
        if s.len() > MAX_SESSION_ID_LEN {
            return Err(EngineError::LimitExceeded("session id too long"));
        }
        if !service.is_session() {
            return Err(EngineError::Validation("session id given for a continuous service"));
        }
    }
    if let Some(ref notes) = req.notes
        && notes.len() > MAX_NOTES_LEN
    {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    if let Some(ref m) = req.payment_method
        && m.len() > MAX_PAYMENT_FIELD_LEN
    {
        return Err(EngineError::LimitExceeded("payment method too long"));
    }
    if let Some(ref s) = req.payment_status
        && s.len() > MAX_PAYMENT_FIELD_LEN
    {
        return Err(EngineError::LimitExceeded("payment status too long"));
    }
    if let Some(ref k) = req.idempotency_key
        && k.len() > MAX_IDEMPOTENCY_KEY_LEN
    {
        return Err(EngineError::LimitExceeded("idempotency key too long"));
    }
    Ok(())
}
