use chrono::NaiveDate;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::Booking;

/// The authoritative booking table plus secondary indexes. Storage only — all
/// mutation policy lives in the lifecycle operations, which hold the relevant
/// resource-key lock while calling in here.
pub struct BookingStore {
    bookings: DashMap<Ulid, Booking>,
    by_customer: DashMap<Ulid, Vec<Ulid>>,
    by_staff_date: DashMap<(Ulid, NaiveDate), Vec<Ulid>>,
    by_session: DashMap<String, Vec<Ulid>>,
    idempotency: DashMap<String, Ulid>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            by_customer: DashMap::new(),
            by_staff_date: DashMap::new(),
            by_session: DashMap::new(),
            idempotency: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Insert a new booking and index it. `date` is the business-local date
    /// of the booking start, used for the staff-day index.
    pub fn insert(&self, booking: Booking, date: NaiveDate) {
        let id = booking.id;
        self.by_customer.entry(booking.customer_id).or_default().push(id);
        if let Some(staff_id) = booking.staff_id {
            self.by_staff_date.entry((staff_id, date)).or_default().push(id);
        }
        if let Some(ref session_id) = booking.session_id {
            self.by_session.entry(session_id.clone()).or_default().push(id);
        }
        if let Some(ref key) = booking.idempotency_key {
            self.idempotency.insert(key.clone(), id);
        }
        self.bookings.insert(id, booking);
    }

    pub fn get(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    /// Snapshot of every booking, in no particular order.
    pub fn all(&self) -> Vec<Booking> {
        self.bookings.iter().map(|e| e.value().clone()).collect()
    }

    /// Apply a patch to one booking under its entry lock, returning the
    /// updated copy. Indexes are not touched — use the move helpers when a
    /// patch changes the booking's date or session.
    pub fn update<F>(&self, id: &Ulid, patch: F) -> Option<Booking>
    where
        F: FnOnce(&mut Booking),
    {
        let mut entry = self.bookings.get_mut(id)?;
        patch(entry.value_mut());
        Some(entry.value().clone())
    }

    /// Re-home a booking in the staff-day index after a reschedule.
    pub fn move_staff_index(&self, id: Ulid, staff_id: Ulid, from: NaiveDate, to: NaiveDate) {
        if from == to {
            return;
        }
        if let Some(mut ids) = self.by_staff_date.get_mut(&(staff_id, from)) {
            ids.retain(|b| *b != id);
        }
        self.by_staff_date.entry((staff_id, to)).or_default().push(id);
    }

    /// Re-home a booking in the session index after a reschedule.
    pub fn move_session_index(&self, id: Ulid, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some(mut ids) = self.by_session.get_mut(from) {
            ids.retain(|b| *b != id);
        }
        self.by_session.entry(to.to_string()).or_default().push(id);
    }

    /// Drop index entries whose id lists emptied out after rehoming.
    pub fn prune_empty_indexes(&self) {
        self.by_customer.retain(|_, ids| !ids.is_empty());
        self.by_staff_date.retain(|_, ids| !ids.is_empty());
        self.by_session.retain(|_, ids| !ids.is_empty());
    }

    fn collect(&self, ids: Option<Vec<Ulid>>) -> Vec<Booking> {
        ids.unwrap_or_default()
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn by_customer(&self, customer_id: &Ulid) -> Vec<Booking> {
        self.collect(self.by_customer.get(customer_id).map(|e| e.value().clone()))
    }

    pub fn by_staff_and_date(&self, staff_id: Ulid, date: NaiveDate) -> Vec<Booking> {
        self.collect(
            self.by_staff_date
                .get(&(staff_id, date))
                .map(|e| e.value().clone()),
        )
    }

    pub fn by_session(&self, session_id: &str) -> Vec<Booking> {
        self.collect(self.by_session.get(session_id).map(|e| e.value().clone()))
    }

    /// Claim an idempotency key for `id`. Returns the id that owns the key —
    /// `id` itself if this call won, or the earlier booking on a retry.
    pub fn claim_idempotency(&self, key: &str, id: Ulid) -> Ulid {
        *self.idempotency.entry(key.to_string()).or_insert(id)
    }

    pub fn idempotency_owner(&self, key: &str) -> Option<Ulid> {
        self.idempotency.get(key).map(|e| *e.value())
    }

    pub fn release_idempotency(&self, key: &str) {
        self.idempotency.remove(key);
    }
}
