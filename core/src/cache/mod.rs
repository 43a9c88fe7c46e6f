//! Process-wide table of compiled units, keyed by fully-qualified name.
//!
//! A request for an absent name inserts an empty slot (the pending state)
//! and then produces the unit outside of any lock. Two threads may therefore
//! build the same unit at once. The first to fill the slot wins; every other
//! caller receives the winner and its own unit is dropped and counted in
//! [`UnitCache::discarded_builds`]. Callers never observe two different
//! units for one name.
//!
//! There is no eviction or invalidation: once filled, a slot is final.


use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use ecow::EcoString;
use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::api::NotCompiled;
use crate::unit::CompiledUnit;

type Slot = Arc<OnceLock<Arc<CompiledUnit>>>;

static GLOBAL: Lazy<Arc<UnitCache>> = Lazy::new(|| Arc::new(UnitCache::new()));

#[derive(Debug, Default)]
pub struct UnitCache {
    units: DashMap<EcoString, Slot>,
    discarded: AtomicUsize,
}

impl UnitCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared instance used by compilers built without an explicit cache.
    pub fn global() -> Arc<UnitCache> {
        Arc::clone(&GLOBAL)
    }

    /// Slot for `name`, inserting a pending one if absent.
    fn slot(&self, name: &str) -> Slot {
        if let Some(slot) = self.units.get(name) {
            return slot.value().clone();
        }
        self.units
            .entry(name.into())
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .value()
            .clone()
    }

    /// Return the unit cached under `name`, producing it first if needed.
    ///
    /// A failed production leaves the slot pending, so a later request runs
    /// its producer again.
    pub fn get_or_create<E>(
        &self,
        name: &str,
        produce: impl FnOnce() -> Result<CompiledUnit, E>,
    ) -> Result<Arc<CompiledUnit>, E> {
        let slot = self.slot(name);
        if let Some(unit) = slot.get() {
            return Ok(unit.clone());
        }

        let built = Arc::new(produce()?);
        let winner = slot.get_or_init(|| built.clone());
        if Arc::ptr_eq(winner, &built) {
            debug!(unit = name, routines = built.routines.len(), "installed compiled unit");
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            warn!(unit = name, "another thread installed this unit first; discarding the duplicate build");
        }
        Ok(winner.clone())
    }

    /// The finished unit cached under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<CompiledUnit>, NotCompiled> {
        self.units
            .get(name)
            .and_then(|slot| slot.get().cloned())
            .ok_or_else(|| NotCompiled { name: name.into() })
    }

    /// Number of builds that lost a race and were dropped.
    pub fn discarded_builds(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Number of names with a slot, finished or pending.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
