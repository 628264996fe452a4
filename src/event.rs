use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::zone::{InteractionType, InteractionZone, TriggerMask, ZoneId};

/// One interaction, as delivered to interaction listeners.
///
/// The event is immutable apart from the set of zones it has already been
/// dispatched to, which keeps a zone from seeing the same event twice when it
/// is reachable over several dispatch paths.
pub struct InteractionEvent {
    interaction_type: InteractionType,
    trigger: TriggerMask,
    origin: InteractionZone,
    data: Arc<dyn Any + Send + Sync>,
    stacktrace: Backtrace,
    dispatched: Mutex<Vec<ZoneId>>,
}

impl InteractionEvent {
    pub fn new<D>(interaction_type: InteractionType, trigger: TriggerMask, origin: InteractionZone, data: D) -> Self
    where
        D: Any + Send + Sync,
    {
        Self {
            interaction_type,
            trigger,
            origin,
            data: Arc::new(data),
            stacktrace: Backtrace::capture(),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub fn interaction_type(&self) -> InteractionType {
        self.interaction_type
    }

    pub fn trigger(&self) -> TriggerMask {
        self.trigger
    }

    /// True if any bit of `mask` is set in the trigger.
    pub fn has_trigger(&self, mask: impl Into<TriggerMask>) -> bool {
        self.trigger & mask.into() != 0
    }

    /// The zone that was current when the interaction was pushed.
    pub fn origin(&self) -> &InteractionZone {
        &self.origin
    }

    /// The payload, if it is a `T`.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    pub fn raw_data(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.data
    }

    /// Captured when the event was created. Empty unless `RUST_BACKTRACE` is set.
    pub fn stacktrace(&self) -> &Backtrace {
        &self.stacktrace
    }

    pub fn was_dispatched_to(&self, zone: &InteractionZone) -> bool {
        self.dispatched.lock().unwrap().contains(&zone.id())
    }

    pub(crate) fn mark_dispatched(&self, zone: &InteractionZone) {
        self.dispatched.lock().unwrap().push(zone.id());
    }
}

impl fmt::Debug for InteractionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionEvent")
            .field("interaction_type", &self.interaction_type)
            .field("trigger", &format_args!("{:#b}", self.trigger))
            .field("origin", &self.origin.name())
            .finish_non_exhaustive()
    }
}
