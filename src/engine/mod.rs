mod assign;
mod availability;
mod conflict;
mod error;
mod mutations;
mod pricing;
mod queries;
mod store;

pub use assign::{
    AssignmentStrategy, Candidate, LeastLoaded, RoundRobin, SeededRandom, eligible_staff,
    required_specializations,
};
pub use availability::{continuous_candidates, session_blocks, slot_id};
pub use conflict::{count_active, find_conflict};
pub use error::EngineError;
pub use pricing::quote;
pub use store::BookingStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::auth::PermissionCheck;
use crate::config::EngineConfig;
use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Snapshot {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceSnapshot {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(
    journal: &mut Journal,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    journal: &mut Journal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Snapshot { events, response } => {
            let result = Journal::write_snapshot_file(journal.path(), &events)
                .and_then(|()| journal.swap_snapshot_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceSnapshot { response } => {
            let _ = response.send(journal.appends_since_snapshot());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: service/staff catalog, the booking store, the
/// per-resource-key lock table, and the journal behind them. Construct once
/// and share via `Arc`.
pub struct Engine {
    pub store: BookingStore,
    services: DashMap<Ulid, Service>,
    staff: DashMap<Ulid, Staff>,
    /// One async mutex per resource key. Check-then-write runs under exactly
    /// one of these; different keys never contend.
    locks: DashMap<ResourceKey, Arc<Mutex<()>>>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    /// Held shared by every commit, exclusively by snapshots: a committed
    /// append is always applied before snapshot state is collected.
    snapshot_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
    pub(super) permissions: Arc<dyn PermissionCheck>,
    pub(super) strategy: Box<dyn AssignmentStrategy>,
    pub(super) config: EngineConfig,
}

impl Engine {
    pub fn new(
        journal_path: PathBuf,
        notify: Arc<NotifyHub>,
        permissions: Arc<dyn PermissionCheck>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        Self::with_strategy(
            journal_path,
            notify,
            permissions,
            config,
            Box::new(RoundRobin::new()),
        )
    }

    pub fn with_strategy(
        journal_path: PathBuf,
        notify: Arc<NotifyHub>,
        permissions: Arc<dyn PermissionCheck>,
        config: EngineConfig,
        strategy: Box<dyn AssignmentStrategy>,
    ) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            store: BookingStore::new(),
            services: DashMap::new(),
            staff: DashMap::new(),
            locks: DashMap::new(),
            journal_tx,
            snapshot_gate: RwLock::new(()),
            notify,
            permissions,
            strategy,
            config,
        };

        for event in &events {
            engine.apply(event);
        }

        Ok(engine)
    }

    /// Apply one event to in-memory state. Replay and live commits share this
    /// path, so a reloaded engine always matches the one that wrote the
    /// journal. Events against terminal bookings are skipped — terminal
    /// states have no outgoing transitions, under replay as in life.
    pub(super) fn apply(&self, event: &Event) {
        match event {
            Event::ServiceRegistered { service } => {
                self.services.insert(service.id, service.clone());
            }
            Event::StaffRegistered { staff } => {
                self.staff.insert(staff.id, staff.clone());
            }
            Event::StaffStatusChanged { id, status } => {
                if let Some(mut s) = self.staff.get_mut(id) {
                    s.status = *status;
                }
            }
            Event::BookingCreated { booking } => {
                let date = self.business_date(booking.span.start);
                self.store.insert((**booking).clone(), date);
            }
            Event::BookingCancelled { id, reason, at } => {
                self.store.update(id, |b| {
                    if b.status.is_terminal() {
                        return;
                    }
                    b.status = BookingStatus::Cancelled;
                    b.cancel_reason = reason.clone();
                    b.cancelled_at = Some(*at);
                    b.updated_at = *at;
                });
            }
            Event::BookingRescheduled {
                id,
                span,
                session_id,
                at,
            } => {
                let Some(old) = self.store.get(id) else { return };
                if old.status.is_terminal() {
                    return;
                }
                let old_date = self.business_date(old.span.start);
                let new_date = self.business_date(span.start);
                if let Some(staff_id) = old.staff_id {
                    self.store.move_staff_index(*id, staff_id, old_date, new_date);
                }
                if let (Some(from), Some(to)) = (&old.session_id, session_id) {
                    self.store.move_session_index(*id, from, to);
                }
                self.store.update(id, |b| {
                    b.span = *span;
                    if session_id.is_some() {
                        b.session_id = session_id.clone();
                    }
                    // Moving a booking always re-requires confirmation.
                    b.status = BookingStatus::Pending;
                    b.updated_at = *at;
                });
            }
            Event::BookingStatusChanged { id, status, at } => {
                self.store.update(id, |b| {
                    if b.status.is_terminal() {
                        return;
                    }
                    b.status = *status;
                    b.updated_at = *at;
                    if *status == BookingStatus::Completed {
                        b.completed_at = Some(*at);
                    }
                });
            }
        }
    }

    /// Write an event via the background group-commit writer.
    async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Journal("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Journal(e.to_string()))
    }

    /// Journal-append + apply + notify in one call. The append is the commit
    /// point: state changes only after the event is durable.
    pub(super) async fn persist_and_apply(
        &self,
        customer_id: Option<Ulid>,
        event: &Event,
    ) -> Result<(), EngineError> {
        let _gate = self.snapshot_gate.read().await;
        self.journal_append(event).await?;
        self.apply(event);
        if let Some(customer_id) = customer_id {
            self.notify.send(customer_id, event);
        }
        Ok(())
    }

    /// Acquire the exclusive lock for one resource key. With a deadline, a
    /// lock not acquired in time fails with `Busy` and the operation is
    /// safely retryable.
    pub(super) async fn lock_resource(
        &self,
        key: ResourceKey,
        deadline: Option<Duration>,
    ) -> Result<OwnedMutexGuard<()>, EngineError> {
        let lock = self.locks.entry(key).or_default().clone();
        let wait_start = std::time::Instant::now();
        let guard = match deadline {
            None => lock.lock_owned().await,
            Some(deadline) => match tokio::time::timeout(deadline, lock.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    metrics::counter!(crate::observability::LOCK_BUSY_TOTAL).increment(1);
                    return Err(EngineError::Busy);
                }
            },
        };
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());
        Ok(guard)
    }

    /// Drop lock-table entries nobody holds or waits on. Safe against
    /// concurrent acquisition: `remove_if` runs under the shard lock, and
    /// `lock_resource` clones the Arc under that same shard lock, so a
    /// strong count of one means the map holds the only reference.
    pub(crate) fn evict_idle_locks(&self) {
        let keys: Vec<ResourceKey> = self.locks.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }

    /// The resource key a booking's lifecycle serializes on.
    pub(super) fn booking_key(&self, booking: &Booking) -> ResourceKey {
        if let Some(ref session_id) = booking.session_id {
            ResourceKey::Session {
                session_id: session_id.clone(),
            }
        } else if let Some(staff_id) = booking.staff_id {
            ResourceKey::Staff {
                staff_id,
                date: self.business_date(booking.span.start),
            }
        } else {
            ResourceKey::Unassigned {
                booking_id: booking.id,
            }
        }
    }

    pub fn service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn staff_member(&self, id: &Ulid) -> Option<Staff> {
        self.staff.get(id).map(|e| e.value().clone())
    }

    pub fn staff_pool(&self) -> Vec<Staff> {
        self.staff.iter().map(|e| e.value().clone()).collect()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(super) fn local(&self, t: DateTime<Utc>) -> DateTime<FixedOffset> {
        t.with_timezone(&self.config.tz)
    }

    pub(super) fn business_date(&self, t: DateTime<Utc>) -> NaiveDate {
        self.local(t).date_naive()
    }

    pub(super) fn service_count(&self) -> usize {
        self.services.len()
    }

    pub(super) fn staff_count(&self) -> usize {
        self.staff.len()
    }

    /// Rewrite the journal with only the events needed to recreate the
    /// current state: the catalog, then one creation event per booking in
    /// its present form.
    pub async fn snapshot_journal(&self) -> Result<(), EngineError> {
        // Exclusive against persist_and_apply: nothing commits between
        // collecting state and rewriting the file, so no committed append
        // can be applied late and fall out of the snapshot.
        let _gate = self.snapshot_gate.write().await;
        let mut events: Vec<Event> = Vec::new();
        for entry in self.services.iter() {
            events.push(Event::ServiceRegistered {
                service: entry.value().clone(),
            });
        }
        for entry in self.staff.iter() {
            events.push(Event::StaffRegistered {
                staff: entry.value().clone(),
            });
        }
        for booking in self.store.all() {
            events.push(Event::BookingCreated {
                booking: Box::new(booking),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Snapshot {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Journal("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Journal(e.to_string()))
    }

    pub async fn journal_appends_since_snapshot(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceSnapshot { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
