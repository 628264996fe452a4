// src/zone/zone.rs
//! [`InteractionZone`] and [`ZoneId`].
//!
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::{Arc, RwLock, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allocation;
use crate::config::ZoneOptions;
use crate::errors::ExecutionError;
use crate::event::InteractionEvent;
use crate::reporting::ErrorEvent;

use super::current::{self, ZoneGuard};
use super::listeners::{ErrorListener, ErrorPropagation, InteractionListener, ListenerSet};
use super::trigger::{InteractionType, TriggerMask, ALL_TRIGGERS};

/// A unique identifier for a zone, represented as a UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId(Uuid);

impl ZoneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type InteractionListeners = ListenerSet<dyn Fn(&InteractionEvent) + Send + Sync>;
type ErrorListeners = ListenerSet<dyn Fn(&ErrorEvent) -> ErrorPropagation + Send + Sync>;

struct ZoneInner {
    /// ID of the zone
    id: ZoneId,
    /// Name of the zone, only used for debugging
    name: String,
    /// Owning zone, `None` for the root
    parent: Option<InteractionZone>,
    /// Never bubble interactions and errors to the parent
    isolated: bool,
    /// Discard interactions raised while this zone is current
    silent: bool,

    /// Allowed trigger bits per interaction type (absent means all bits)
    trigger_mapping: RwLock<HashMap<InteractionType, TriggerMask>>,
    /// Interaction listeners per interaction type
    interaction_listeners: RwLock<HashMap<InteractionType, InteractionListeners>>,
    /// Error listeners
    error_listeners: RwLock<ErrorListeners>,
}

/// A node in the hierarchical execution-context tree.
///
/// `InteractionZone` is a cheap handle; clones refer to the same zone and
/// [`ptr_eq`](Self::ptr_eq) compares zone identity. A zone lives as long as a
/// handle to it (or to one of its children) exists.
#[derive(Clone)]
pub struct InteractionZone {
    inner: Arc<ZoneInner>,
}

/// Non-owning reference to a zone.
#[derive(Clone)]
pub struct WeakZone {
    inner: Weak<ZoneInner>,
}

impl WeakZone {
    pub fn upgrade(&self) -> Option<InteractionZone> {
        self.inner.upgrade().map(|inner| InteractionZone { inner })
    }
}

impl InteractionZone {
    pub(crate) fn new_root() -> Self {
        Self::new_with_parent("Default", None, ZoneOptions::default().isolate(true))
    }

    fn new_with_parent(name: &str, parent: Option<InteractionZone>, options: ZoneOptions) -> Self {
        Self {
            inner: Arc::new(ZoneInner {
                id: ZoneId::new(),
                name: name.to_string(),
                parent,
                isolated: options.isolate,
                silent: options.silent,
                trigger_mapping: RwLock::new(HashMap::new()),
                interaction_listeners: RwLock::new(HashMap::new()),
                error_listeners: RwLock::new(ListenerSet::default()),
            }),
        }
    }

    /// The zone active in the calling flow of control.
    pub fn current() -> InteractionZone {
        current::current()
    }

    /// The isolated "Default" zone that is current when nothing else is.
    pub fn root() -> InteractionZone {
        current::root()
    }

    /// Creates a child zone of this zone.
    pub fn create(&self, name: impl Into<String>, options: ZoneOptions) -> InteractionZone {
        let name = name.into();
        log::trace!("zone '{}' creates child '{}' ({:?})", self.inner.name, name, options);
        Self::new_with_parent(&name, Some(self.clone()), options)
    }

    pub fn id(&self) -> ZoneId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent zone. Always `None` for the root; isolated zones still have one.
    pub fn parent(&self) -> Option<&InteractionZone> {
        self.inner.parent.as_ref()
    }

    pub fn is_isolated(&self) -> bool {
        self.inner.isolated
    }

    pub fn is_silent(&self) -> bool {
        self.inner.silent
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    pub fn ptr_eq(&self, other: &InteractionZone) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// True if `other` is this zone or one of its descendants.
    pub fn contains(&self, other: &InteractionZone) -> bool {
        let mut zone = Some(other);
        while let Some(z) = zone {
            if z.ptr_eq(self) {
                return true;
            }
            zone = z.parent();
        }
        false
    }

    pub fn downgrade(&self) -> WeakZone {
        WeakZone {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ****************************************
    // ** Execution

    /// Runs `f` with this zone as the current zone.
    ///
    /// The previous zone is restored on return and while unwinding from a panic.
    pub fn execute<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = ZoneGuard::enter(self);
        f()
    }

    /// Runs a fallible `f` with this zone as the current zone.
    ///
    /// An error is normalized into an [`ExecutionError`], allocated to the zone
    /// that was current when it was raised and returned unchanged in identity.
    pub fn try_execute<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, ExecutionError>
    where
        E: Into<ExecutionError>,
    {
        let _guard = ZoneGuard::enter(self);
        f().map_err(|e| {
            let error = e.into();
            // Nested zones allocate first; the innermost zone wins.
            allocation::allocate_error_if_absent(&error, &current::current());
            error
        })
    }

    /// Returns a closure that always runs `f` inside this zone.
    pub fn wrap<A, R, F>(&self, f: F) -> impl Fn(A) -> R + Send + Sync + 'static
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let zone = self.clone();
        move |arg| zone.execute(|| f(arg))
    }

    /// Like [`wrap`](Self::wrap), for callbacks that run once.
    pub fn wrap_once<A, R, F>(&self, f: F) -> impl FnOnce(A) -> R + Send + 'static
    where
        F: FnOnce(A) -> R + Send + 'static,
    {
        let zone = self.clone();
        move |arg| zone.execute(|| f(arg))
    }

    // ****************************************
    // ** Listener registries

    /// Registers `listener` for events of `interaction_type`. Adding the same
    /// listener twice is a no-op; returns whether it was added.
    ///
    /// The listener runs in the zone that is current here. That zone is held
    /// weakly: once every handle to it is dropped, the listener runs in the
    /// zone dispatching the event instead.
    pub fn add_interaction_listener(&self, interaction_type: InteractionType, listener: InteractionListener) -> bool {
        let registering = Self::current();
        let mut listeners = self.inner.interaction_listeners.write().unwrap();
        listeners
            .entry(interaction_type)
            .or_default()
            .insert(listener, &registering)
    }

    /// Removes `listener`, or every listener of the type when `None`.
    pub fn remove_interaction_listener(
        &self,
        interaction_type: InteractionType,
        listener: Option<&InteractionListener>,
    ) -> bool {
        let mut listeners = self.inner.interaction_listeners.write().unwrap();
        match listener {
            Some(listener) => {
                let Some(set) = listeners.get_mut(&interaction_type) else {
                    return false;
                };
                let removed = set.remove(listener);
                if set.is_empty() {
                    listeners.remove(&interaction_type);
                }
                removed
            }
            None => listeners.remove(&interaction_type).is_some(),
        }
    }

    pub fn interaction_listener_count(&self, interaction_type: InteractionType) -> usize {
        self.inner
            .interaction_listeners
            .read()
            .unwrap()
            .get(&interaction_type)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Registers an error listener; duplicates are ignored.
    ///
    /// Like interaction listeners it runs in the registering zone, held weakly,
    /// and falls back to the zone the error bubbled into.
    pub fn add_error_listener(&self, listener: ErrorListener) -> bool {
        let registering = Self::current();
        self.inner.error_listeners.write().unwrap().insert(listener, &registering)
    }

    pub fn remove_error_listener(&self, listener: &ErrorListener) -> bool {
        self.inner.error_listeners.write().unwrap().remove(listener)
    }

    // ****************************************
    // ** Trigger restrictions

    /// Sets (overwrites) the trigger bits this zone lets through for `interaction_type`.
    pub fn add_trigger_restriction(&self, interaction_type: InteractionType, allowed: impl Into<TriggerMask>) {
        let allowed = allowed.into();
        log::trace!("zone '{}' restricts '{}' to {:#b}", self.inner.name, interaction_type, allowed);
        self.inner
            .trigger_mapping
            .write()
            .unwrap()
            .insert(interaction_type, allowed);
    }

    /// The allowed trigger bits for `interaction_type` (all bits when unrestricted).
    pub fn trigger_mask(&self, interaction_type: InteractionType) -> TriggerMask {
        self.inner
            .trigger_mapping
            .read()
            .unwrap()
            .get(&interaction_type)
            .copied()
            .unwrap_or(ALL_TRIGGERS)
    }

    // ****************************************
    // ** Interaction dispatch

    /// Pushes an interaction into the current zone.
    ///
    /// Returns `false` without building an event when the current zone's
    /// restriction for `interaction_type` excludes every bit of `trigger`, or
    /// when the current zone is silent.
    pub fn push_interaction<D>(interaction_type: InteractionType, trigger: impl Into<TriggerMask>, data: D) -> bool
    where
        D: Any + Send + Sync,
    {
        let trigger = trigger.into();
        let zone = Self::current();

        if zone.is_silent() || zone.trigger_mask(interaction_type) & trigger == 0 {
            return false;
        }

        let event = InteractionEvent::new(interaction_type, trigger, zone.clone(), data);
        zone.dispatch(&event)
    }

    /// Dispatches `event` starting at this zone and bubbling to its ancestors.
    ///
    /// Returns `true` once any zone in the chain let the event through.
    pub fn dispatch(&self, event: &InteractionEvent) -> bool {
        let mut zone = self.clone();
        let mut passed = false;

        loop {
            if event.was_dispatched_to(&zone) {
                break;
            }

            if zone.trigger_mask(event.interaction_type()) & event.trigger() == 0 {
                // A restrictive zone blocks everything above it
                break;
            }

            event.mark_dispatched(&zone);
            passed = true;
            zone.call_interaction_listeners(event);

            if zone.is_isolated() {
                break;
            }
            match zone.parent() {
                Some(parent) => zone = parent.clone(),
                None => break,
            }
        }

        passed
    }

    fn call_interaction_listeners(&self, event: &InteractionEvent) {
        let listeners = {
            let guard = self.inner.interaction_listeners.read().unwrap();
            match guard.get(&event.interaction_type()) {
                Some(set) => set.snapshot(),
                None => return,
            }
        };

        log::trace!(
            "zone '{}' dispatches '{}' ({:#b}) to {} listener(s)",
            self.inner.name,
            event.interaction_type(),
            event.trigger(),
            listeners.len()
        );

        self.execute(|| {
            for registered in &listeners {
                let listener = &registered.listener;
                registered.zone_or(self).execute(|| listener(event));
            }
        });
    }

    // ****************************************
    // ** Error bubbling

    /// Runs the error listeners of this zone and its ancestors.
    ///
    /// Returns `true` when a listener suppressed the error, meaning the default
    /// reporting must not happen.
    pub fn call_error_listener(&self, error: &ErrorEvent) -> bool {
        let mut zone = self.clone();

        loop {
            let listeners = zone.inner.error_listeners.read().unwrap().snapshot();
            let suppressed = listeners.iter().any(|registered| {
                let listener = &registered.listener;
                registered.zone_or(&zone).execute(|| listener(error)) == ErrorPropagation::Suppress
            });

            if suppressed {
                log::debug!("error suppressed in zone '{}': {}", zone.inner.name, error);
                return true;
            }
            if zone.is_isolated() {
                return false;
            }
            match zone.parent() {
                Some(parent) => zone = parent.clone(),
                None => return false,
            }
        }
    }
}

impl PartialEq for InteractionZone {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for InteractionZone {}

impl fmt::Debug for InteractionZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionZone")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("isolated", &self.inner.isolated)
            .field("silent", &self.inner.silent)
            .finish_non_exhaustive()
    }
}

impl Display for InteractionZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.name)
    }
}
