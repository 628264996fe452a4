//! Interaction zones.
//!
//! An [`InteractionZone`](zone::InteractionZone) is an ambient execution
//! context: code running inside [`execute`](zone::InteractionZone::execute)
//! sees the zone as current, and interactions or errors raised there bubble up
//! the zone hierarchy to the listeners registered on the way.
//!
//! - [`zone`]: the zone tree, the current-zone stack, listener registries,
//!   trigger restrictions and dispatch. Futures keep their zone across
//!   `.await` with [`ZoneFutureExt`](zone::ZoneFutureExt).
//! - [`allocation`] and [`reporting`]: errors and promises remember the zone
//!   they were raised in; uncaught errors and unhandled rejections are
//!   reported to that zone's error listeners.
//! - [`patcher`]: makes the asynchronous entry points of a global scope
//!   (promises, event targets, observers, timers) resume in the right zone.
//! - [`proxy`]: detection proxies that report reads, writes and calls on an
//!   object as interaction events.
//! - [`host`]: the host object model all of the above operates on.

pub mod allocation;
pub mod config;
pub mod errors;
pub mod event;
pub mod host;
pub mod patcher;
pub mod proxy;
pub mod reporting;
pub mod zone;

pub use errors::ExecutionError;
pub use zone::{InteractionZone, ZoneId};
