use std::sync::Arc;

use crate::event::InteractionEvent;
use crate::reporting::ErrorEvent;

use super::zone::{InteractionZone, WeakZone};

/// Callback receiving interaction events of one type.
pub type InteractionListener = Arc<dyn Fn(&InteractionEvent) + Send + Sync>;

/// Callback receiving errors raised in (or bubbled into) a zone.
pub type ErrorListener = Arc<dyn Fn(&ErrorEvent) -> ErrorPropagation + Send + Sync>;

/// What an error listener wants to happen after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPropagation {
    /// Keep bubbling to ancestor zones and the default reporting
    #[default]
    Propagate,
    /// Stop bubbling and suppress the default reporting for this occurrence
    Suppress,
}

/// A listener together with the zone it was registered from.
pub(crate) struct Registered<L: ?Sized> {
    pub listener: Arc<L>,
    zone: WeakZone,
}

impl<L: ?Sized> Clone for Registered<L> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            zone: self.zone.clone(),
        }
    }
}

impl<L: ?Sized> Registered<L> {
    /// The registering zone, or `fallback` when that zone is gone.
    pub fn zone_or(&self, fallback: &InteractionZone) -> InteractionZone {
        self.zone.upgrade().unwrap_or_else(|| {
            log::debug!("registering zone of a listener was dropped, running it in zone '{fallback}'");
            fallback.clone()
        })
    }
}

/// Insertion-ordered listener set, deduplicated by listener identity.
pub(crate) struct ListenerSet<L: ?Sized> {
    entries: Vec<Registered<L>>,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    /// Adds the listener unless it is already present. Returns true if added.
    pub fn insert(&mut self, listener: Arc<L>, zone: &InteractionZone) -> bool {
        if self.contains(&listener) {
            return false;
        }
        self.entries.push(Registered {
            listener,
            zone: zone.downgrade(),
        });
        true
    }

    pub fn remove(&mut self, listener: &Arc<L>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|r| !same_listener(&r.listener, listener));
        before != self.entries.len()
    }

    pub fn contains(&self, listener: &Arc<L>) -> bool {
        self.entries.iter().any(|r| same_listener(&r.listener, listener))
    }

    pub fn snapshot(&self) -> Vec<Registered<L>> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    // Compare data pointers only; vtables may differ between codegen units.
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneOptions;

    #[test]
    fn insert_is_deduplicated_by_identity() {
        let zone = InteractionZone::root().create("listeners", ZoneOptions::default());
        let mut set: ListenerSet<dyn Fn(&InteractionEvent) + Send + Sync> = ListenerSet::default();

        let a: InteractionListener = Arc::new(|_| {});
        let b: InteractionListener = Arc::new(|_| {});

        assert!(set.insert(a.clone(), &zone));
        assert!(!set.insert(a.clone(), &zone));
        assert!(set.insert(b.clone(), &zone));
        assert_eq!(set.len(), 2);

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&b));
    }

    #[test]
    fn registering_zone_falls_back_when_dropped() {
        let root = InteractionZone::root();
        let mut set: ListenerSet<dyn Fn(&InteractionEvent) + Send + Sync> = ListenerSet::default();
        {
            let short_lived = root.create("short", ZoneOptions::default());
            set.insert(Arc::new(|_| {}), &short_lived);
        }
        let registered = set.snapshot().pop().unwrap();
        assert!(registered.zone_or(&root).ptr_eq(&root));
    }
}
