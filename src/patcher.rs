//! Binds the asynchronous entry points of a global scope to zones.
//!
//! [`GlobalScopePatcher::enable`] replaces the names listed in a
//! [`GlobalScopeDescriptor`] on a global object with zone-aware versions:
//!
//! - the promise class allocates new promises to the zone they were created in
//!   and runs continuations in the zone that registered them,
//! - event target classes run listeners in the zone that added them,
//! - other classes and free functions run their callback arguments in the
//!   zone of the call that received them.
//!
//! Patched classes extend the originals, so instances stay `instance_of` the
//! original class. Patching is best effort: names that are missing or of the
//! wrong shape are skipped and logged.
//!
//! ```rust
//! use interaction_zone::config::GlobalScopeDescriptor;
//! use interaction_zone::host::globals::standard_globals;
//! use interaction_zone::patcher::GlobalScopePatcher;
//!
//! let globals = standard_globals();
//! let patcher = GlobalScopePatcher::new(GlobalScopeDescriptor::default());
//! assert!(patcher.enable(&globals));
//! assert!(!patcher.enable(&globals));
//! ```

mod bind;
mod class;
mod events;

use crate::config::{GlobalScopeDescriptor, ZoneOptions};
use crate::host::{ObjectRef, Value};
use crate::zone::InteractionZone;

/// Marks a global object as patched.
pub const PATCHED_FLAG: &str = "__interaction_zone_patched__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchKind {
    Promise,
    EventTarget,
    Class,
    Function,
}

pub struct GlobalScopePatcher {
    descriptor: GlobalScopeDescriptor,
    /// Patch bookkeeping runs here so that detectors around the target stay quiet
    bookkeeping: InteractionZone,
}

impl GlobalScopePatcher {
    pub fn new(descriptor: GlobalScopeDescriptor) -> Self {
        let bookkeeping = InteractionZone::root().create("patcher", ZoneOptions::default().isolate(true).silent(true));
        Self { descriptor, bookkeeping }
    }

    pub fn descriptor(&self) -> &GlobalScopeDescriptor {
        &self.descriptor
    }

    /// Patches `target`. Returns `true` the first time, `false` once the target is marked patched.
    pub fn enable(&self, target: &ObjectRef) -> bool {
        self.bookkeeping.execute(|| {
            if is_patched(target) {
                log::debug!("global scope {:?} is already patched", target);
                return false;
            }

            for (name, kind) in self.patch_list() {
                patch_name(target, name, kind);
            }

            match target.set(PATCHED_FLAG, true) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("could not mark global scope as patched: {}", e);
                    false
                }
            }
        })
    }

    fn patch_list(&self) -> Vec<(&str, PatchKind)> {
        let d = &self.descriptor;
        let mut list = vec![];
        list.extend(d.promise.iter().map(|n| (n.as_str(), PatchKind::Promise)));
        list.extend(d.event_target.iter().map(|n| (n.as_str(), PatchKind::EventTarget)));
        list.extend(d.classes_with_events.iter().map(|n| (n.as_str(), PatchKind::EventTarget)));
        list.extend(d.classes.iter().map(|n| (n.as_str(), PatchKind::Class)));
        list.extend(d.functions.iter().map(|n| (n.as_str(), PatchKind::Function)));
        list
    }
}

impl Default for GlobalScopePatcher {
    fn default() -> Self {
        Self::new(GlobalScopeDescriptor::default())
    }
}

fn is_patched(target: &ObjectRef) -> bool {
    target.get(PATCHED_FLAG).map(|v| v.truthy()).unwrap_or(false)
}

fn patch_name(target: &ObjectRef, name: &str, kind: PatchKind) {
    let original = match target.get(name) {
        Ok(Value::Object(original)) => original,
        Ok(_) => {
            log::debug!("skipping '{}': not present on the global scope", name);
            return;
        }
        Err(e) => {
            log::warn!("skipping '{}': {}", name, e);
            return;
        }
    };

    let patched = match kind {
        PatchKind::Promise => class::patch_promise(&original),
        PatchKind::EventTarget => events::patch_event_target_class(&original),
        PatchKind::Class => class::patch_class(&original),
        PatchKind::Function if original.is_callable() => Some(bind::patch_function(&original)),
        PatchKind::Function => None,
    };

    let Some(patched) = patched else {
        log::warn!("skipping '{}': not a {:?}", name, kind);
        return;
    };

    match target.set(name, patched) {
        Ok(()) => log::trace!("patched '{}' as {:?}", name, kind),
        Err(e) => log::warn!("could not replace '{}': {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation;
    use crate::host::globals::standard_globals;
    use crate::host::{EventTargetObject, FunctionObject, PlainObject, Scheduler};
    use std::sync::{Arc, Mutex};

    fn zone_recorder(seen: &Arc<Mutex<Vec<String>>>) -> ObjectRef {
        let seen = seen.clone();
        FunctionObject::new("record", move |_, _| {
            seen.lock().unwrap().push(InteractionZone::current().name().to_string());
            Ok(Value::Undefined)
        })
    }

    #[test]
    fn enable_is_idempotent_and_skips_absent_names() {
        let _ = env_logger::builder().is_test(true).try_init();
        let globals = standard_globals();
        let original_promise = globals.get("Promise").unwrap();

        let patcher = GlobalScopePatcher::default();
        assert!(patcher.descriptor().classes_with_events.iter().any(|c| c == "WebSocket"));
        assert!(patcher.enable(&globals));
        assert!(!patcher.enable(&globals));
        assert!(!GlobalScopePatcher::default().enable(&globals));

        assert_ne!(globals.get("Promise").unwrap(), original_promise);
        assert!(!globals.has("WebSocket"));
        assert_eq!(globals.get(PATCHED_FLAG).unwrap(), Value::Bool(true));
    }

    #[test]
    fn wrong_shapes_are_left_alone() {
        let globals = PlainObject::from_entries([("Promise", Value::from(1)), ("setTimeout", Value::from("nope"))]);
        let descriptor = GlobalScopeDescriptor::builder()
            .promise("Promise")
            .function("setTimeout")
            .build()
            .unwrap();

        assert!(GlobalScopePatcher::new(descriptor).enable(&globals));
        assert_eq!(globals.get("Promise").unwrap(), Value::from(1));
        assert_eq!(globals.get("setTimeout").unwrap(), Value::from("nope"));
    }

    #[test]
    fn patched_globals_bind_to_zones() {
        let globals = standard_globals();
        GlobalScopePatcher::default().enable(&globals);
        let zone = InteractionZone::root().create("app", ZoneOptions::default());

        let promise_class = globals.get("Promise").unwrap();
        let executor = FunctionObject::new("executor", |_, _| Ok(Value::Undefined));
        let promise = zone
            .execute(|| promise_class.as_object().unwrap().construct(vec![executor.into()]))
            .unwrap();
        assert!(allocation::promise_zone(&promise.as_promise().unwrap()).unwrap().ptr_eq(&zone));

        let message_port = globals.get("MessagePort").unwrap();
        let port = message_port.as_object().unwrap().construct(vec![]).unwrap();
        let port = port.as_object().unwrap();
        let seen = Arc::new(Mutex::new(vec![]));
        zone.execute(|| port.set("onmessage", zone_recorder(&seen))).unwrap();
        EventTargetObject::fire(port, "message", Value::from("hi")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["app".to_string()]);
    }

    #[tokio::test]
    async fn patched_timers_run_callbacks_in_the_scheduling_zone() {
        let globals = PlainObject::from_entries(
            Scheduler::global()
                .functions()
                .into_iter()
                .map(|(name, f)| (name, Value::Object(f))),
        );
        GlobalScopePatcher::default().enable(&globals);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let callback = FunctionObject::new("callback", move |_, _| {
            let _ = tx.send(InteractionZone::current().name().to_string());
            Ok(Value::Undefined)
        });

        let zone = InteractionZone::root().create("scheduler", ZoneOptions::default());
        let set_timeout = globals.get("setTimeout").unwrap();
        zone.execute(|| set_timeout.as_object().unwrap().call(Value::Undefined, vec![callback.into(), 1.into()]))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), "scheduler");
    }
}
