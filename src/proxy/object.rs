use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::errors::ExecutionError;
use crate::event::InteractionEvent;
use crate::host::{Detection, FunctionFlags, HostObject, ObjectKind, ObjectRef, PropertyKey, Value, WeakObjectRef};
use crate::zone::{InteractionZone, TriggerMask};

use super::trigger::{ProxyInteraction, ProxyTrigger, PROXY_INTERACTION};

pub(crate) type ListenerZones = Arc<RwLock<Vec<InteractionZone>>>;

/// The object behind a proxy handle. Forwards every operation to `original`
/// and reports it afterwards.
pub(crate) struct ProxyObject {
    original: ObjectRef,
    this: Weak<ProxyObject>,
    listener_zones: ListenerZones,
    nested: Mutex<HashMap<usize, (WeakObjectRef, Weak<ProxyObject>)>>,
}

impl ProxyObject {
    pub(crate) fn new(original: ObjectRef, listener_zones: ListenerZones) -> Arc<Self> {
        Arc::new_cyclic(|this| ProxyObject {
            original,
            this: this.clone(),
            listener_zones,
            nested: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn original(&self) -> &ObjectRef {
        &self.original
    }

    pub(crate) fn listener_zones(&self) -> &ListenerZones {
        &self.listener_zones
    }

    fn handle(&self) -> Option<ObjectRef> {
        let this: Arc<dyn HostObject> = self.this.upgrade()?;
        Some(ObjectRef::from_arc(this))
    }

    /// Wraps an object read through this proxy. Nested proxies share the
    /// listener zones of this one.
    fn wrap_nested(&self, value: Value) -> Value {
        let object = match value {
            Value::Object(o) if !o.is::<ProxyObject>() && o.detection() == Detection::Enabled => o,
            other => return other,
        };

        let mut nested = self.nested.lock().unwrap();
        if let Some((original, proxy)) = nested.get(&object.addr()) {
            let same = original.upgrade().map(|o| o.ptr_eq(&object)).unwrap_or(false);
            if let (true, Some(proxy)) = (same, proxy.upgrade()) {
                return Value::Object(ObjectRef::from_arc(proxy));
            }
        }

        nested.retain(|_, (_, proxy)| proxy.strong_count() > 0);
        let proxy = ProxyObject::new(object.clone(), self.listener_zones.clone());
        nested.insert(object.addr(), (object.downgrade(), Arc::downgrade(&proxy)));
        Value::Object(ObjectRef::from_arc(proxy))
    }

    /// Dispatches an event to the current zone and to every listener zone.
    fn push(&self, trigger: ProxyTrigger, property: Option<PropertyKey>, value: Option<Value>) {
        let current = InteractionZone::current();
        if current.is_silent() {
            return;
        }

        let trigger = TriggerMask::from(trigger);
        let zones = self.listener_zones.read().unwrap().clone();
        let wanted = std::iter::once(&current)
            .chain(zones.iter())
            .any(|zone| zone.trigger_mask(PROXY_INTERACTION) & trigger != 0);
        if !wanted {
            return;
        }
        let Some(source) = self.handle() else {
            return;
        };

        let data = ProxyInteraction { source, property, value };
        let event = InteractionEvent::new(PROXY_INTERACTION, trigger, current.clone(), data);
        current.dispatch(&event);
        for zone in &zones {
            zone.dispatch(&event);
        }
    }

    /// Reports the settlement of a promise returned by a call, in the zone of the call.
    fn watch_settlement(&self, result: &Value) {
        let (Some(promise), Some(this)) = (result.as_promise(), self.this.upgrade()) else {
            return;
        };
        let zone = InteractionZone::current();
        promise.observe(move |settlement| {
            let value = match settlement {
                Ok(value) | Err(value) => value,
            };
            zone.execute(|| this.push(ProxyTrigger::ASYNC_FUNCTION_SETTLED, None, Some(value)));
        });
    }
}

/// The original object behind `value` when it is a proxy handle.
fn unwrap_receiver(value: Value) -> Value {
    let original = value
        .as_object()
        .and_then(|o| o.downcast::<ProxyObject>())
        .map(|proxy| proxy.original.clone());
    match original {
        Some(original) => Value::Object(original),
        None => value,
    }
}

impl HostObject for ProxyObject {
    fn kind(&self) -> ObjectKind {
        self.original.kind()
    }

    fn get(&self, _receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        // bind/call/apply go through the handle so only the eventual call is reported
        if self.original.is_callable() {
            if let Some(method) = self.handle().and_then(|h| crate::host::function_method(&h, key)) {
                return Ok(Value::Object(method));
            }
        }

        let result = self.original.as_host().get(&self.original, key).map(|v| self.wrap_nested(v));
        self.push(ProxyTrigger::PROPERTY_GET, Some(key.clone()), result.as_ref().ok().cloned());
        result
    }

    fn set(&self, _receiver: &ObjectRef, key: &PropertyKey, value: Value) -> Result<(), ExecutionError> {
        let result = self.original.as_host().set(&self.original, key, value.clone());
        self.push(ProxyTrigger::PROPERTY_SET, Some(key.clone()), Some(value));
        result
    }

    fn delete(&self, key: &PropertyKey) -> Result<bool, ExecutionError> {
        let result = self.original.as_host().delete(key);
        self.push(ProxyTrigger::PROPERTY_DELETE, Some(key.clone()), None);
        result
    }

    fn has(&self, key: &PropertyKey) -> bool {
        self.original.as_host().has(key)
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.original.keys()
    }

    fn is_callable(&self) -> bool {
        self.original.is_callable()
    }

    fn call(&self, this: Value, args: Vec<Value>) -> Result<Value, ExecutionError> {
        let flags = self.original.function_flags();
        let this = if flags.contains(FunctionFlags::NATIVE_RECEIVER) {
            unwrap_receiver(this)
        } else {
            this
        };

        let result = self.original.call(this, args);

        let mut trigger = ProxyTrigger::FUNCTION_CALL;
        if flags.contains(FunctionFlags::INTERNAL_MUTATION) {
            trigger |= ProxyTrigger::UNTRACKABLE_FUNCTION_CALL;
        }
        self.push(trigger, None, result.as_ref().ok().cloned());

        if let Ok(value) = &result {
            self.watch_settlement(value);
        }
        result
    }

    fn construct(&self, new_target: &ObjectRef, args: Vec<Value>) -> Result<Value, ExecutionError> {
        let new_target = match new_target.downcast::<ProxyObject>() {
            Some(proxy) => proxy.original.clone(),
            None => new_target.clone(),
        };
        self.original.construct_as(&new_target, args)
    }

    fn function_flags(&self) -> FunctionFlags {
        self.original.function_flags()
    }

    fn class(&self) -> Option<ObjectRef> {
        self.original.class()
    }

    fn detection(&self) -> Detection {
        self.original.detection()
    }

    fn name(&self) -> Option<String> {
        self.original.name()
    }
}
