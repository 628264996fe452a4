//! Detection proxies: wrappers that turn operations on a host object into
//! interaction events.
//!
//! A proxy handle behaves like the object it wraps. Every property read,
//! write, delete and call made through it is forwarded to the original first
//! and reported afterwards as a [`PROXY_INTERACTION`] event, to the zone
//! current at the operation and to every zone attached with
//! [`add_listener_zone`](InteractionDetectionProxy::add_listener_zone).
//! Objects read through a proxy come back wrapped as well.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use interaction_zone::config::ZoneOptions;
//! use interaction_zone::event::InteractionEvent;
//! use interaction_zone::host::{PlainObject, Value};
//! use interaction_zone::proxy::{InteractionDetectionProxy, ProxyInteraction, PROXY_INTERACTION};
//! use interaction_zone::zone::InteractionZone;
//!
//! let detector = InteractionDetectionProxy::new(PlainObject::from_entries([("a", 1)])).unwrap();
//! let zone = InteractionZone::root().create("form", ZoneOptions::default());
//!
//! let seen = Arc::new(Mutex::new(vec![]));
//! let s = seen.clone();
//! zone.add_interaction_listener(PROXY_INTERACTION, Arc::new(move |event: &InteractionEvent| {
//!     let data = event.data::<ProxyInteraction>().unwrap();
//!     s.lock().unwrap().push(data.property.clone().unwrap().to_string());
//! }));
//!
//! zone.execute(|| detector.proxy().set("a", 22)).unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec!["a".to_string()]);
//! assert_eq!(detector.original().get("a").unwrap(), Value::from(22));
//! ```

mod object;
mod trigger;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use lazy_static::lazy_static;

use crate::host::{Detection, HostObject, ObjectRef, Value, WeakObjectRef};
use crate::zone::InteractionZone;

use object::ProxyObject;

pub use trigger::{ProxyInteraction, ProxyTrigger, PROXY_INTERACTION};

lazy_static! {
    /// Live detectors by the address of their original object.
    static ref DETECTORS: Mutex<HashMap<usize, (WeakObjectRef, Weak<ProxyObject>)>> = Mutex::new(HashMap::new());
}

/// A detector: the proxy handle around an object plus its listener zones.
///
/// Clones refer to the same detector.
#[derive(Clone)]
pub struct InteractionDetectionProxy {
    inner: Arc<ProxyObject>,
}

impl InteractionDetectionProxy {
    /// The detector of `original`, created if it has none.
    ///
    /// Passing a proxy handle returns the detector behind it. Returns `None`
    /// when the class of `original` is excluded from detection.
    pub fn new(original: ObjectRef) -> Option<Self> {
        if let Some(existing) = Self::of(&original) {
            return Some(existing);
        }
        if original.detection() == Detection::Excluded {
            log::trace!("{:?} is excluded from detection", original);
            return None;
        }

        let mut detectors = DETECTORS.lock().unwrap();
        if let Some((known, inner)) = detectors.get(&original.addr()) {
            let same = known.upgrade().map(|k| k.ptr_eq(&original)).unwrap_or(false);
            if let (true, Some(inner)) = (same, inner.upgrade()) {
                return Some(Self { inner });
            }
        }

        detectors.retain(|_, (_, inner)| inner.strong_count() > 0);
        let inner = ProxyObject::new(original.clone(), Arc::new(RwLock::new(vec![])));
        detectors.insert(original.addr(), (original.downgrade(), Arc::downgrade(&inner)));
        Some(Self { inner })
    }

    /// Wraps an object value. Primitives, zones, errors and excluded objects
    /// are returned unchanged.
    pub fn wrap(value: Value) -> Value {
        match value {
            Value::Object(o) => match Self::new(o.clone()) {
                Some(detector) => Value::Object(detector.proxy()),
                None => Value::Object(o),
            },
            other => other,
        }
    }

    /// The detector behind the proxy handle `proxy`.
    pub fn of(proxy: &ObjectRef) -> Option<Self> {
        proxy.downcast_arc::<ProxyObject>().map(|inner| Self { inner })
    }

    /// The handle to use in place of the original.
    pub fn proxy(&self) -> ObjectRef {
        let inner: Arc<dyn HostObject> = self.inner.clone();
        ObjectRef::from_arc(inner)
    }

    pub fn original(&self) -> &ObjectRef {
        self.inner.original()
    }

    /// Also reports to `zone`, whatever zone is current. Returns whether it was added.
    pub fn add_listener_zone(&self, zone: &InteractionZone) -> bool {
        let mut zones = self.inner.listener_zones().write().unwrap();
        if zones.iter().any(|z| z.ptr_eq(zone)) {
            return false;
        }
        zones.push(zone.clone());
        true
    }

    pub fn remove_listener_zone(&self, zone: &InteractionZone) -> bool {
        let mut zones = self.inner.listener_zones().write().unwrap();
        let before = zones.len();
        zones.retain(|z| !z.ptr_eq(zone));
        zones.len() != before
    }

    pub fn listener_zones(&self) -> Vec<InteractionZone> {
        self.inner.listener_zones().read().unwrap().clone()
    }
}

impl PartialEq for InteractionDetectionProxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for InteractionDetectionProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InteractionDetectionProxy({:?})", self.original())
    }
}
