use std::sync::RwLock;

use lazy_static::lazy_static;

use crate::errors::{ExecutionError, ObjectError};
use crate::reporting;

use super::class::ClassObject;
use super::function::{arg, receiver, FunctionFlags, FunctionObject};
use super::object::{
    ordinary_get, ordinary_set, HostObject, ObjectKind, ObjectRef, PlainObject, Property, PropertyKey, PropertyMap,
};
use super::value::Value;

/// An object that receives events.
///
/// Listeners are callables or objects with a `handleEvent` method. Errors
/// raised by listeners never reach the dispatcher; they are reported as
/// uncaught errors instead.
pub struct EventTargetObject {
    props: PropertyMap,
    class: Option<ObjectRef>,
    listeners: RwLock<Vec<(String, ObjectRef)>>,
}

impl EventTargetObject {
    pub fn new() -> ObjectRef {
        ObjectRef::new(Self::with_class(None))
    }

    pub fn instance(class: &ObjectRef) -> ObjectRef {
        ObjectRef::new(Self::with_class(Some(class.clone())))
    }

    fn with_class(class: Option<ObjectRef>) -> Self {
        Self {
            props: PropertyMap::new(),
            class,
            listeners: RwLock::new(vec![]),
        }
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .read()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }

    fn add_listener(&self, event_type: &str, listener: &Value) -> Result<(), ExecutionError> {
        let listener = match listener {
            Value::Undefined | Value::Null => return Ok(()),
            Value::Object(o) => o,
            other => {
                return Err(ObjectError::Type(format!(
                    "Failed to execute 'addEventListener': parameter 2 ({other}) is not of type 'Object'"
                ))
                .into())
            }
        };

        let mut listeners = self.listeners.write().unwrap();
        if !listeners.iter().any(|(t, l)| t == event_type && l.ptr_eq(listener)) {
            listeners.push((event_type.to_string(), listener.clone()));
        }
        Ok(())
    }

    fn remove_listener(&self, event_type: &str, listener: &Value) {
        if let Value::Object(listener) = listener {
            self.listeners
                .write()
                .unwrap()
                .retain(|(t, l)| !(t == event_type && l.ptr_eq(listener)));
        }
    }

    fn dispatch(&self, this: &Value, event: &ObjectRef) -> Result<(), ExecutionError> {
        let event_type = event.get("type")?.to_string();
        event.set("target", this.clone())?;

        let listeners: Vec<ObjectRef> = self
            .listeners
            .read()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == event_type)
            .map(|(_, l)| l.clone())
            .collect();

        let handler = self.props.get(&handler_slot(&format!("on{event_type}")));
        let handler = match handler {
            Some(Property::Data(Value::Object(h))) if h.is_callable() => Some(h),
            _ => None,
        };

        for listener in listeners.iter().chain(handler.iter()) {
            if let Err(error) = invoke_listener(listener, this, event) {
                reporting::report_uncaught_error(&error);
            }
        }
        Ok(())
    }

    /// Creates an event of `event_type` and dispatches it through `dispatchEvent`.
    pub fn fire(target: &ObjectRef, event_type: &str, detail: Value) -> Result<Value, ExecutionError> {
        let event = PlainObject::from_entries([("type", Value::from(event_type)), ("detail", detail)]);
        target.invoke("dispatchEvent", vec![Value::Object(event)])
    }
}

fn invoke_listener(listener: &ObjectRef, this: &Value, event: &ObjectRef) -> Result<Value, ExecutionError> {
    if listener.is_callable() {
        return listener.call(this.clone(), vec![Value::Object(event.clone())]);
    }
    match listener.get("handleEvent")? {
        Value::Object(f) if f.is_callable() => f.call(Value::Object(listener.clone()), vec![Value::Object(event.clone())]),
        _ => Ok(Value::Undefined),
    }
}

fn handler_slot(name: &str) -> PropertyKey {
    PropertyKey::from(format!("[[{name}]]"))
}

lazy_static! {
    static ref EVENT_TARGET_METHODS: Vec<(&'static str, ObjectRef)> = {
        let flags = FunctionFlags::NATIVE_RECEIVER | FunctionFlags::INTERNAL_MUTATION;
        vec![
            (
                "addEventListener",
                FunctionObject::with_flags("addEventListener", flags, |this, args| {
                    let target = receiver::<EventTargetObject>(&this, "EventTarget.prototype.addEventListener")?;
                    target.add_listener(&arg(&args, 0).to_string(), &arg(&args, 1))?;
                    Ok(Value::Undefined)
                }),
            ),
            (
                "removeEventListener",
                FunctionObject::with_flags("removeEventListener", flags, |this, args| {
                    let target = receiver::<EventTargetObject>(&this, "EventTarget.prototype.removeEventListener")?;
                    target.remove_listener(&arg(&args, 0).to_string(), &arg(&args, 1));
                    Ok(Value::Undefined)
                }),
            ),
            (
                "dispatchEvent",
                FunctionObject::with_flags("dispatchEvent", flags, |this, args| {
                    let target = receiver::<EventTargetObject>(&this, "EventTarget.prototype.dispatchEvent")?;
                    let event = arg(&args, 0);
                    let Some(event) = event.as_object() else {
                        return Err(ObjectError::Type("dispatchEvent expects an event object".into()).into());
                    };
                    target.dispatch(&this, event)?;
                    Ok(Value::Bool(true))
                }),
            ),
        ]
    };
}

fn builtin_method(key: &PropertyKey) -> Option<Value> {
    EVENT_TARGET_METHODS
        .iter()
        .find(|(name, _)| *key == *name)
        .map(|(_, f)| Value::Object(f.clone()))
}

impl HostObject for EventTargetObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::EventTarget
    }

    fn get(&self, receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        if let Some(value) = ordinary_get(&self.props, self.class.as_ref(), receiver, key)? {
            return Ok(value);
        }
        Ok(builtin_method(key).unwrap_or_default())
    }

    fn set(&self, receiver: &ObjectRef, key: &PropertyKey, value: Value) -> Result<(), ExecutionError> {
        ordinary_set(&self.props, self.class.as_ref(), receiver, key, value)
    }

    fn delete(&self, key: &PropertyKey) -> Result<bool, ExecutionError> {
        self.props.remove(key);
        Ok(true)
    }

    fn has(&self, key: &PropertyKey) -> bool {
        self.props.contains(key) || builtin_method(key).is_some()
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.props.keys()
    }

    fn class(&self) -> Option<ObjectRef> {
        self.class.clone()
    }
}

/// Native `on<event>` accessor pair backed by an internal slot of the instance.
fn handler_accessor(name: &str) -> (ObjectRef, ObjectRef) {
    let slot = handler_slot(name);
    let get_slot = slot.clone();
    let getter = FunctionObject::with_flags(format!("get {name}"), FunctionFlags::NATIVE_RECEIVER, move |this, _| {
        let target = receiver::<EventTargetObject>(&this, "on-handler getter")?;
        Ok(match target.props.get(&get_slot) {
            Some(Property::Data(v)) => v,
            _ => Value::Null,
        })
    });
    let setter = FunctionObject::with_flags(format!("set {name}"), FunctionFlags::NATIVE_RECEIVER, move |this, args| {
        let target = receiver::<EventTargetObject>(&this, "on-handler setter")?;
        // Non-callable handlers are stored as null
        let value = match arg(&args, 0) {
            v @ Value::Object(_) => v,
            _ => Value::Null,
        };
        target.props.insert(slot.clone(), Property::Data(value));
        Ok(Value::Undefined)
    });
    (getter, setter)
}

/// The `EventTarget` base class.
pub fn event_target_class() -> ObjectRef {
    ClassObject::builder("EventTarget")
        .constructor(|new_target, _| Ok(Value::Object(EventTargetObject::instance(new_target))))
        .with(|class| {
            EVENT_TARGET_METHODS
                .iter()
                .fold(class, |class, (name, f)| class.method_object(name, f.clone()))
        })
        .build()
}

/// A subclass of `base` with native `on<event>` handler properties.
pub fn event_target_subclass(name: &str, base: &ObjectRef, handlers: &[&str]) -> ObjectRef {
    ClassObject::builder(name)
        .extends(base)
        .with(|class| {
            handlers.iter().fold(class, |class, handler| {
                let (get, set) = handler_accessor(handler);
                class.accessor(handler, Some(get), Some(set))
            })
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn counting_listener(count: &Arc<Mutex<usize>>) -> ObjectRef {
        let c = count.clone();
        FunctionObject::new("listener", move |_, _| {
            *c.lock().unwrap() += 1;
            Ok(Value::Undefined)
        })
    }

    #[test]
    fn listeners_are_deduplicated_and_removable() {
        let target = EventTargetObject::new();
        let count = Arc::new(Mutex::new(0));
        let listener = counting_listener(&count);

        target.invoke("addEventListener", vec!["ping".into(), listener.clone().into()]).unwrap();
        target.invoke("addEventListener", vec!["ping".into(), listener.clone().into()]).unwrap();
        EventTargetObject::fire(&target, "ping", Value::Undefined).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);

        target.invoke("removeEventListener", vec!["ping".into(), listener.into()]).unwrap();
        EventTargetObject::fire(&target, "ping", Value::Undefined).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(target.downcast::<EventTargetObject>().unwrap().listener_count("ping"), 0);
    }

    #[test]
    fn handle_event_objects_receive_events_with_target() {
        let target = EventTargetObject::new();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let handler = PlainObject::new();
        handler
            .set(
                "handleEvent",
                FunctionObject::new("handleEvent", move |_, args| {
                    let event = arg(&args, 0);
                    let event = event.as_object().unwrap();
                    *s.lock().unwrap() = Some((event.get("detail")?, event.get("target")?));
                    Ok(Value::Undefined)
                }),
            )
            .unwrap();

        target.invoke("addEventListener", vec!["msg".into(), handler.into()]).unwrap();
        EventTargetObject::fire(&target, "msg", "hello".into()).unwrap();

        let (detail, event_target) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(detail, Value::from("hello"));
        assert_eq!(event_target, Value::Object(target));
    }

    #[test]
    fn non_object_listeners_are_type_errors() {
        let target = EventTargetObject::new();
        let err = target.invoke("addEventListener", vec!["x".into(), 5.into()]).unwrap_err();
        assert!(err.message().starts_with("TypeError: Failed to execute 'addEventListener'"));
        assert!(target.invoke("addEventListener", vec!["x".into(), Value::Null]).is_ok());
    }

    #[test]
    fn listener_errors_do_not_reach_the_dispatcher() {
        let target = EventTargetObject::new();
        let failing = FunctionObject::new("failing", |_, _| Err(ExecutionError::msg("listener failed")));
        let count = Arc::new(Mutex::new(0));
        target.invoke("addEventListener", vec!["x".into(), failing.into()]).unwrap();
        target.invoke("addEventListener", vec!["x".into(), counting_listener(&count).into()]).unwrap();

        assert_eq!(EventTargetObject::fire(&target, "x", Value::Undefined).unwrap(), Value::Bool(true));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn on_handler_properties_fire_after_listeners() {
        let base = event_target_class();
        let signal_class = event_target_subclass("AbortSignal", &base, &["onabort"]);
        let signal = signal_class.construct(vec![]).unwrap();
        let signal = signal.as_object().unwrap();
        assert!(signal.instance_of(&base));

        let order = Arc::new(Mutex::new(vec![]));
        let (o1, o2) = (order.clone(), order.clone());
        let listener = FunctionObject::new("listener", move |_, _| {
            o1.lock().unwrap().push("listener");
            Ok(Value::Undefined)
        });
        let handler = FunctionObject::new("handler", move |_, _| {
            o2.lock().unwrap().push("onabort");
            Ok(Value::Undefined)
        });

        assert_eq!(signal.get("onabort").unwrap(), Value::Null);
        signal.set("onabort", handler.clone()).unwrap();
        signal.invoke("addEventListener", vec!["abort".into(), listener.into()]).unwrap();
        assert_eq!(signal.get("onabort").unwrap(), Value::Object(handler));
        assert!(signal.keys().is_empty());

        EventTargetObject::fire(signal, "abort", Value::Undefined).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["listener", "onabort"]);

        signal.set("onabort", "not a function").unwrap();
        assert_eq!(signal.get("onabort").unwrap(), Value::Null);
    }
}
