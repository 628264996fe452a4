//! The browser-like global object.
//!
//! [`standard_globals`] builds a fresh global scope holding the host classes
//! and timer functions; [`global_this`] is the process-wide instance that the
//! patcher is normally enabled on. Network classes (`WebSocket`,
//! `XMLHttpRequest`) are not provided by this host.

use lazy_static::lazy_static;

use super::event_target::{event_target_class, event_target_subclass};
use super::object::{ObjectRef, PlainObject};
use super::observer::observer_class;
use super::promise::promise_class;
use super::timers::Scheduler;
use super::value::Value;

lazy_static! {
    static ref GLOBAL_THIS: ObjectRef = standard_globals();
}

/// A new global object with the standard host classes and functions.
pub fn standard_globals() -> ObjectRef {
    let event_target = event_target_class();
    let abort_signal = event_target_subclass("AbortSignal", &event_target, &["onabort"]);
    let message_port = event_target_subclass("MessagePort", &event_target, &["onmessage", "onmessageerror"]);

    let mut entries: Vec<(&str, Value)> = vec![
        ("Promise", promise_class().into()),
        ("EventTarget", event_target.into()),
        ("AbortSignal", abort_signal.into()),
        ("MessagePort", message_port.into()),
        ("ResizeObserver", observer_class("ResizeObserver").into()),
        ("MutationObserver", observer_class("MutationObserver").into()),
        ("IntersectionObserver", observer_class("IntersectionObserver").into()),
    ];
    entries.extend(
        Scheduler::global()
            .functions()
            .into_iter()
            .map(|(name, f)| (name, Value::Object(f))),
    );

    PlainObject::from_entries(entries)
}

/// The process-wide global object.
pub fn global_this() -> &'static ObjectRef {
    &GLOBAL_THIS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ClassObject;

    #[test]
    fn standard_globals_expose_classes_and_timers() {
        let globals = standard_globals();
        for name in ["Promise", "EventTarget", "AbortSignal", "ResizeObserver", "setTimeout", "queueMicrotask"] {
            assert!(globals.has(name), "missing {name}");
        }
        assert!(!globals.has("WebSocket"));

        let abort_signal = globals.get("AbortSignal").unwrap();
        let abort_signal = abort_signal.as_object().unwrap();
        let event_target = globals.get("EventTarget").unwrap();
        let base = abort_signal.downcast::<ClassObject>().unwrap().base().unwrap();
        assert!(base.ptr_eq(event_target.as_object().unwrap()));
    }

    #[test]
    fn global_this_is_shared() {
        assert!(global_this().ptr_eq(global_this()));
        assert!(global_this().get("setTimeout").unwrap().is_callable());
    }
}
