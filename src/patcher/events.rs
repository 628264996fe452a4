use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::ExecutionError;
use crate::host::{ClassObject, FunctionObject, ObjectRef, Property, PropertyKey, Value, WeakObjectRef};
use crate::zone::InteractionZone;

use super::bind::bind_arguments;
use super::class::subclass;

/// Zone-bound wrappers of event listeners, keyed by the original listener.
///
/// Both sides are held weakly: the wrapper lives as long as some target has
/// it registered, the original as long as its owner keeps it.
#[derive(Default)]
struct WrapperCache {
    entries: Mutex<HashMap<usize, (WeakObjectRef, WeakObjectRef)>>,
}

impl WrapperCache {
    fn get(&self, listener: &ObjectRef) -> Option<ObjectRef> {
        let entries = self.entries.lock().unwrap();
        let (original, wrapper) = entries.get(&listener.addr())?;
        // The address may have been reused by a newer object.
        if !original.upgrade()?.ptr_eq(listener) {
            return None;
        }
        wrapper.upgrade()
    }

    fn get_or_wrap(&self, listener: &ObjectRef, wrap: impl FnOnce() -> ObjectRef) -> ObjectRef {
        if let Some(wrapper) = self.get(listener) {
            return wrapper;
        }

        let wrapper = wrap();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, (original, wrapper)| original.upgrade().is_some() && wrapper.upgrade().is_some());
        entries.insert(listener.addr(), (listener.downgrade(), wrapper.downgrade()));
        wrapper
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// A callable or `{ handleEvent }` listener. Other values are not listeners.
fn as_listener(value: &Value) -> Option<&ObjectRef> {
    let object = value.as_object()?;
    if object.is_callable() || object.get("handleEvent").map(|h| h.is_callable()).unwrap_or(false) {
        Some(object)
    } else {
        None
    }
}

fn listener_wrapper(listener: ObjectRef, zone: InteractionZone) -> ObjectRef {
    let name = listener.name().unwrap_or_else(|| "listener".to_string());
    FunctionObject::new(name, move |this, args| {
        zone.try_execute(|| {
            let args = bind_arguments(args, &zone);
            if listener.is_callable() {
                listener.call(this, args)
            } else {
                listener.invoke("handleEvent", args)
            }
        })
    })
}

/// A subclass of the event target class `original`. Listeners added through
/// it run in the zone that added them, and every `on<event>` accessor of the
/// class chain is rerouted through `addEventListener`.
pub(crate) fn patch_event_target_class(original: &ObjectRef) -> Option<ObjectRef> {
    let class = original.downcast::<ClassObject>()?;
    let builder = subclass(original, |_, _| {})?;

    let add_key = PropertyKey::from("addEventListener");
    let remove_key = PropertyKey::from("removeEventListener");
    let (add, remove) = match (class.member(&add_key), class.member(&remove_key)) {
        (Some(Property::Data(Value::Object(add))), Some(Property::Data(Value::Object(remove)))) => (add, remove),
        _ => {
            log::warn!("'{}' has no addEventListener/removeEventListener pair", class.class_name());
            return Some(builder.build());
        }
    };

    let cache = Arc::new(WrapperCache::default());
    let add = patched_add(add, cache.clone());
    let remove = patched_remove(remove, cache);

    let handlers: Vec<PropertyKey> = class
        .member_keys()
        .into_iter()
        .filter(|key| key.as_str().starts_with("on") && matches!(class.member(key), Some(Property::Accessor { .. })))
        .collect();

    let builder = handlers.iter().fold(builder, |builder, key| {
        let (get, set) = handler_accessor(key.as_str(), &add, &remove);
        builder.accessor(key.as_str(), Some(get), Some(set))
    });

    Some(
        builder
            .method_object("addEventListener", add)
            .method_object("removeEventListener", remove)
            .build(),
    )
}

fn patched_add(original: ObjectRef, cache: Arc<WrapperCache>) -> ObjectRef {
    let flags = original.function_flags();
    FunctionObject::with_flags("addEventListener", flags, move |this, mut args| {
        let zone = InteractionZone::current();
        let wrapped = args
            .get(1)
            .and_then(as_listener)
            .map(|listener| cache.get_or_wrap(listener, || listener_wrapper(listener.clone(), zone)));
        if let Some(wrapper) = wrapped {
            args[1] = Value::Object(wrapper);
        }
        original.call(this, args)
    })
}

fn patched_remove(original: ObjectRef, cache: Arc<WrapperCache>) -> ObjectRef {
    let flags = original.function_flags();
    FunctionObject::with_flags("removeEventListener", flags, move |this, mut args| {
        let wrapper = args.get(1).and_then(Value::as_object).and_then(|l| cache.get(l));
        if let Some(wrapper) = wrapper {
            args[1] = Value::Object(wrapper);
        }
        original.call(this, args)
    })
}

/// `on<event>` accessor pair. The last assigned value is remembered in an
/// internal slot of the instance so it reads back unchanged.
fn handler_accessor(name: &str, add: &ObjectRef, remove: &ObjectRef) -> (ObjectRef, ObjectRef) {
    let slot = PropertyKey::from(format!("[[zone {name}]]"));
    let event_type = Value::from(&name[2..]);

    let get_slot = slot.clone();
    let getter = FunctionObject::new(format!("get {name}"), move |this, _| {
        let Some(target) = this.as_object() else {
            return Ok(Value::Null);
        };
        Ok(match target.get(&get_slot)? {
            Value::Undefined => Value::Null,
            value => value,
        })
    });

    let (add, remove) = (add.clone(), remove.clone());
    let setter = FunctionObject::new(format!("set {name}"), move |this, args| {
        let Some(target) = this.as_object() else {
            return Ok(Value::Undefined);
        };
        let value = args.into_iter().next().unwrap_or_default();
        replace_handler(target, &slot, &event_type, value, &add, &remove)?;
        Ok(Value::Undefined)
    });

    (getter, setter)
}

fn replace_handler(
    target: &ObjectRef,
    slot: &PropertyKey,
    event_type: &Value,
    value: Value,
    add: &ObjectRef,
    remove: &ObjectRef,
) -> Result<(), ExecutionError> {
    let this = Value::Object(target.clone());
    let previous = target.get(slot)?;
    if as_listener(&previous).is_some() {
        remove.call(this.clone(), vec![event_type.clone(), previous])?;
    }

    target.set(slot, value.clone())?;
    if as_listener(&value).is_some() {
        add.call(this, vec![event_type.clone(), value])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneOptions;
    use crate::host::{event_target_class, event_target_subclass, EventTargetObject, PlainObject};

    fn zone_recorder(seen: &Arc<Mutex<Vec<String>>>) -> ObjectRef {
        let seen = seen.clone();
        FunctionObject::new("record", move |_, _| {
            seen.lock().unwrap().push(InteractionZone::current().name().to_string());
            Ok(Value::Undefined)
        })
    }

    fn abort_signal() -> (ObjectRef, ObjectRef) {
        let base = event_target_class();
        let original = event_target_subclass("AbortSignal", &base, &["onabort"]);
        let patched = patch_event_target_class(&original).unwrap();
        let instance = patched.construct(vec![]).unwrap().as_object().unwrap().clone();
        (original, instance)
    }

    fn count(target: &ObjectRef, event_type: &str) -> usize {
        target.downcast::<EventTargetObject>().unwrap().listener_count(event_type)
    }

    #[test]
    fn listeners_run_in_the_registering_zone() {
        let (original, signal) = abort_signal();
        assert!(signal.instance_of(&original));

        let seen = Arc::new(Mutex::new(vec![]));
        let zone = InteractionZone::root().create("registrar", ZoneOptions::default());
        zone.execute(|| signal.invoke("addEventListener", vec!["abort".into(), zone_recorder(&seen).into()]))
            .unwrap();

        EventTargetObject::fire(&signal, "abort", Value::Undefined).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["registrar".to_string()]);
    }

    #[test]
    fn repeated_add_and_remove_use_the_same_wrapper() {
        let (_, signal) = abort_signal();
        let seen = Arc::new(Mutex::new(vec![]));
        let listener: Value = zone_recorder(&seen).into();

        signal.invoke("addEventListener", vec!["abort".into(), listener.clone()]).unwrap();
        signal.invoke("addEventListener", vec!["abort".into(), listener.clone()]).unwrap();
        assert_eq!(count(&signal, "abort"), 1);

        signal.invoke("removeEventListener", vec!["abort".into(), listener]).unwrap();
        assert_eq!(count(&signal, "abort"), 0);
    }

    #[test]
    fn handle_event_objects_are_wrapped() {
        let (_, signal) = abort_signal();
        let seen = Arc::new(Mutex::new(vec![]));
        let handler = PlainObject::from_entries([("handleEvent", Value::from(zone_recorder(&seen)))]);

        let zone = InteractionZone::root().create("object-listener", ZoneOptions::default());
        zone.execute(|| signal.invoke("addEventListener", vec!["abort".into(), handler.into()]))
            .unwrap();
        EventTargetObject::fire(&signal, "abort", Value::Undefined).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["object-listener".to_string()]);
    }

    #[test]
    fn non_listeners_reach_the_host_unchanged() {
        let (_, signal) = abort_signal();
        let err = signal
            .invoke("addEventListener", vec!["abort".into(), 5.into()])
            .unwrap_err();
        assert!(err.message().starts_with("TypeError: Failed to execute 'addEventListener'"));
    }

    #[test]
    fn on_handlers_route_through_listeners() {
        let (_, signal) = abort_signal();
        let seen = Arc::new(Mutex::new(vec![]));
        let first = zone_recorder(&seen);
        let zone = InteractionZone::root().create("handler", ZoneOptions::default());

        assert_eq!(signal.get("onabort").unwrap(), Value::Null);
        zone.execute(|| signal.set("onabort", first.clone())).unwrap();
        assert_eq!(signal.get("onabort").unwrap(), Value::Object(first));
        assert_eq!(count(&signal, "abort"), 1);

        zone.execute(|| signal.set("onabort", zone_recorder(&seen))).unwrap();
        assert_eq!(count(&signal, "abort"), 1);

        EventTargetObject::fire(&signal, "abort", Value::Undefined).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["handler".to_string()]);

        signal.set("onabort", "not a function").unwrap();
        assert_eq!(signal.get("onabort").unwrap(), Value::from("not a function"));
        assert_eq!(count(&signal, "abort"), 0);
    }

    #[test]
    fn cache_drops_entries_of_dead_listeners() {
        let cache = WrapperCache::default();
        let listener = FunctionObject::new("l", |_, _| Ok(Value::Undefined));
        let wrapper = cache.get_or_wrap(&listener, || FunctionObject::new("w", |_, _| Ok(Value::Undefined)));
        assert!(cache.get(&listener).unwrap().ptr_eq(&wrapper));

        drop(wrapper);
        assert!(cache.get(&listener).is_none());

        let other = FunctionObject::new("other", |_, _| Ok(Value::Undefined));
        let _kept = cache.get_or_wrap(&other, || FunctionObject::new("w2", |_, _| Ok(Value::Undefined)));
        assert_eq!(cache.len(), 1);
    }
}
