// src/zone.rs
//! Zone system: [`InteractionZone`], [`InteractionType`] and the zone-bound
//! future/callback adapters.
//!
mod current;
mod future;
mod listeners;
mod trigger;
mod zone;

pub use future::{spawn, ZoneFutureExt, ZonedFuture};
pub use listeners::{ErrorListener, ErrorPropagation, InteractionListener};
pub use trigger::{InteractionType, TriggerMask, ALL_TRIGGERS, NO_TRIGGERS};
pub use zone::{InteractionZone, WeakZone, ZoneId};

pub(crate) use current::in_execute;
