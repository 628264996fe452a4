//! Process-wide association of errors and promises with the zone they were
//! raised in.
//!
//! Both tables are keyed by the address of the shared allocation and hold the
//! key weakly, so an entry never keeps an error or a promise alive. Dead
//! entries are pruned lazily whenever a new entry is inserted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use lazy_static::lazy_static;

use crate::errors::ExecutionError;
use crate::host::promise::{Promise, PromiseCell};
use crate::zone::InteractionZone;

pub(crate) struct WeakTable<K: ?Sized> {
    entries: Mutex<HashMap<usize, (Weak<K>, InteractionZone)>>,
}

impl<K: ?Sized> WeakTable<K> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Associates `key` with `zone` unless an association already exists.
    fn insert_if_absent(&self, key: &Arc<K>, zone: &InteractionZone) -> bool {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, (weak, _)| weak.strong_count() > 0);

        let addr = address(key);
        if entries.contains_key(&addr) {
            return false;
        }
        entries.insert(addr, (Arc::downgrade(key), zone.clone()));
        true
    }

    fn get(&self, key: &Arc<K>) -> Option<InteractionZone> {
        let entries = self.entries.lock().unwrap();
        let (weak, zone) = entries.get(&address(key))?;
        // A stale entry may share the address of a newer allocation.
        if weak.strong_count() > 0 && std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(key)) {
            Some(zone.clone())
        } else {
            None
        }
    }

    /// Removes the entry at `addr`. Used while the key itself is being dropped,
    /// when no `Arc` to it can be produced any more.
    fn take_by_address(&self, addr: usize) -> Option<InteractionZone> {
        self.entries.lock().unwrap().remove(&addr).map(|(_, zone)| zone)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

fn address<K: ?Sized>(key: &Arc<K>) -> usize {
    Arc::as_ptr(key) as *const () as usize
}

lazy_static! {
    static ref ERROR_ZONES: WeakTable<anyhow::Error> = WeakTable::new();
    static ref PROMISE_ZONES: WeakTable<PromiseCell> = WeakTable::new();
}

/// Allocates `error` to `zone`. An error that already has a zone keeps it.
pub fn allocate_error(error: &ExecutionError, zone: &InteractionZone) -> bool {
    allocate_error_if_absent(error, zone)
}

pub(crate) fn allocate_error_if_absent(error: &ExecutionError, zone: &InteractionZone) -> bool {
    let added = ERROR_ZONES.insert_if_absent(error.key(), zone);
    if added {
        log::trace!("error '{}' allocated to zone '{}'", error, zone.name());
    }
    added
}

/// The zone `error` was thrown in, if it was thrown inside a zone.
pub fn error_zone(error: &ExecutionError) -> Option<InteractionZone> {
    ERROR_ZONES.get(error.key())
}

/// Allocates `promise` to `zone`. A promise that already has a zone keeps it.
pub fn allocate_promise(promise: &Promise, zone: &InteractionZone) -> bool {
    PROMISE_ZONES.insert_if_absent(promise.cell(), zone)
}

/// The zone that was current when `promise` was created through a patched constructor.
pub fn promise_zone(promise: &Promise) -> Option<InteractionZone> {
    PROMISE_ZONES.get(promise.cell())
}

pub(crate) fn take_promise_zone(addr: usize) -> Option<InteractionZone> {
    PROMISE_ZONES.take_by_address(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneOptions;

    #[test]
    fn first_allocation_wins() {
        let a = InteractionZone::root().create("a", ZoneOptions::default());
        let b = InteractionZone::root().create("b", ZoneOptions::default());
        let err = ExecutionError::msg("x");

        assert!(error_zone(&err).is_none());
        assert!(allocate_error(&err, &a));
        assert!(!allocate_error(&err, &b));
        assert!(error_zone(&err.clone()).unwrap().ptr_eq(&a));
    }

    #[test]
    fn entries_do_not_keep_keys_alive() {
        let table: WeakTable<u32> = WeakTable::new();
        let zone = InteractionZone::root();
        let key = Arc::new(1);
        table.insert_if_absent(&key, &zone);
        drop(key);

        let other = Arc::new(2);
        table.insert_if_absent(&other, &zone);
        assert_eq!(table.len(), 1);
        assert!(table.get(&other).is_some());
    }

    #[test]
    fn promises_are_allocated_by_identity() {
        let zone = InteractionZone::root().create("p", ZoneOptions::default());
        let (promise, _resolver) = Promise::new();
        let other = Promise::resolved(1.0.into());

        assert!(allocate_promise(&promise, &zone));
        assert!(promise_zone(&promise.clone()).unwrap().ptr_eq(&zone));
        assert!(promise_zone(&other).is_none());
    }
}
