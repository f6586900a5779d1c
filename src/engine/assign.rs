use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ulid::Ulid;

use crate::model::{ServiceCategory, Staff};

/// Explicit category → specialization table. A staff member qualifies with
/// any one of the listed specializations; there is no implicit matching
/// beyond this table.
pub fn required_specializations(category: ServiceCategory) -> &'static [&'static str] {
    match category {
        ServiceCategory::Grooming | ServiceCategory::QuickWash => &["grooming", "basic_care"],
        ServiceCategory::Training => &["training", "behavior"],
        ServiceCategory::HealthCheck | ServiceCategory::SpecialCare => {
            &["healthcare", "veterinary"]
        }
        ServiceCategory::Daycare => &["basic_care", "grooming"],
    }
}

/// Filter the pool down to active staff holding at least one required
/// specialization for the category.
pub fn eligible_staff(category: ServiceCategory, pool: &[Staff]) -> Vec<Staff> {
    let required = required_specializations(category);
    pool.iter()
        .filter(|s| s.is_active() && required.iter().any(|r| s.specializations.contains(*r)))
        .cloned()
        .collect()
}

/// An eligible staff member plus their active booking count on the target date.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub staff: Staff,
    pub active_load: usize,
}

/// Pluggable staff selection. Returning `None` on an empty candidate list is
/// not an error — the booking is created unassigned, pending manual
/// assignment.
pub trait AssignmentStrategy: Send + Sync {
    fn select(&self, candidates: &[Candidate]) -> Option<Ulid>;
}

/// Deterministic default: cycle through candidates in order.
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl AssignmentStrategy for RoundRobin {
    fn select(&self, candidates: &[Candidate]) -> Option<Ulid> {
        if candidates.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[idx].staff.id)
    }
}

/// Fewest active bookings on the target date wins; id breaks ties so the
/// result is stable.
pub struct LeastLoaded;

impl AssignmentStrategy for LeastLoaded {
    fn select(&self, candidates: &[Candidate]) -> Option<Ulid> {
        candidates
            .iter()
            .min_by_key(|c| (c.active_load, c.staff.id))
            .map(|c| c.staff.id)
    }
}

/// Random pick from a seeded RNG. The seed makes test runs reproducible; the
/// engine never hardcodes nondeterminism.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl AssignmentStrategy for SeededRandom {
    fn select(&self, candidates: &[Candidate]) -> Option<Ulid> {
        if candidates.is_empty() {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let idx = rng.gen_range(0..candidates.len());
        Some(candidates[idx].staff.id)
    }
}
