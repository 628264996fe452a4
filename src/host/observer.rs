use std::sync::RwLock;

use crate::errors::{ExecutionError, ObjectError};
use crate::reporting;

use super::class::ClassObject;
use super::collections::ArrayObject;
use super::function::{arg, receiver, FunctionFlags};
use super::object::{ordinary_get, ordinary_set, HostObject, ObjectKind, ObjectRef, PropertyKey, PropertyMap};
use super::value::Value;

/// A callback-driven observer (`ResizeObserver`, `MutationObserver`, ...).
///
/// The host queues records with [`enqueue`](Self::enqueue) and delivers them
/// with [`notify`](Self::notify); the callback receives `(records, observer)`.
pub struct ObserverObject {
    props: PropertyMap,
    class: ObjectRef,
    callback: ObjectRef,
    targets: RwLock<Vec<ObjectRef>>,
    records: RwLock<Vec<Value>>,
}

impl ObserverObject {
    pub fn is_observing(&self, target: &ObjectRef) -> bool {
        self.targets.read().unwrap().iter().any(|t| t.ptr_eq(target))
    }

    pub fn target_count(&self) -> usize {
        self.targets.read().unwrap().len()
    }

    pub fn enqueue(&self, record: Value) {
        self.records.write().unwrap().push(record);
    }

    /// Delivers the queued records. Does nothing when there is nothing to
    /// deliver or nothing is observed.
    pub fn notify(&self, observer: &ObjectRef) {
        if self.targets.read().unwrap().is_empty() {
            return;
        }
        let records = std::mem::take(&mut *self.records.write().unwrap());
        if records.is_empty() {
            return;
        }

        let args = vec![Value::Object(ArrayObject::from_values(records)), Value::Object(observer.clone())];
        if let Err(error) = self.callback.call(Value::Object(observer.clone()), args) {
            reporting::report_uncaught_error(&error);
        }
    }
}

impl HostObject for ObserverObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Observer
    }

    fn get(&self, receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        Ok(ordinary_get(&self.props, Some(&self.class), receiver, key)?.unwrap_or_default())
    }

    fn set(&self, receiver: &ObjectRef, key: &PropertyKey, value: Value) -> Result<(), ExecutionError> {
        ordinary_set(&self.props, Some(&self.class), receiver, key, value)
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.props.keys()
    }

    fn class(&self) -> Option<ObjectRef> {
        Some(self.class.clone())
    }
}

fn target_arg(args: &[Value], method: &str) -> Result<ObjectRef, ExecutionError> {
    match arg(args, 0) {
        Value::Object(o) => Ok(o),
        other => Err(ObjectError::Type(format!("{method}: parameter 1 ({other}) is not an object")).into()),
    }
}

/// An observer class named `name`. `new Name(callback)` requires a callable.
pub fn observer_class(name: &str) -> ObjectRef {
    let mutating = FunctionFlags::NATIVE_RECEIVER | FunctionFlags::INTERNAL_MUTATION;
    let class_name = name.to_string();

    ClassObject::builder(name)
        .constructor(move |new_target, args| {
            let callback = arg(&args, 0);
            let Some(callback) = callback.as_callable() else {
                return Err(ObjectError::Type(format!(
                    "Failed to construct '{class_name}': parameter 1 is not of type 'Function'"
                ))
                .into());
            };
            Ok(Value::Object(ObjectRef::new(ObserverObject {
                props: PropertyMap::new(),
                class: new_target.clone(),
                callback: callback.clone(),
                targets: RwLock::new(vec![]),
                records: RwLock::new(vec![]),
            })))
        })
        .method_with_flags("observe", mutating, |this, args| {
            let observer = receiver::<ObserverObject>(&this, "observe")?;
            let target = target_arg(&args, "observe")?;
            if !observer.is_observing(&target) {
                observer.targets.write().unwrap().push(target);
            }
            Ok(Value::Undefined)
        })
        .method_with_flags("unobserve", mutating, |this, args| {
            let observer = receiver::<ObserverObject>(&this, "unobserve")?;
            let target = target_arg(&args, "unobserve")?;
            observer.targets.write().unwrap().retain(|t| !t.ptr_eq(&target));
            Ok(Value::Undefined)
        })
        .method_with_flags("disconnect", mutating, |this, _| {
            let observer = receiver::<ObserverObject>(&this, "disconnect")?;
            observer.targets.write().unwrap().clear();
            observer.records.write().unwrap().clear();
            Ok(Value::Undefined)
        })
        .method_with_flags("takeRecords", mutating, |this, _| {
            let observer = receiver::<ObserverObject>(&this, "takeRecords")?;
            let records = std::mem::take(&mut *observer.records.write().unwrap());
            Ok(Value::Object(ArrayObject::from_values(records)))
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FunctionObject, PlainObject};
    use std::sync::{Arc, Mutex};

    #[test]
    fn observe_notify_and_disconnect() {
        let class = observer_class("ResizeObserver");
        let delivered = Arc::new(Mutex::new(vec![]));
        let d = delivered.clone();
        let callback = FunctionObject::new("callback", move |_, args| {
            let records = arg(&args, 0);
            d.lock().unwrap().push(records.as_object().unwrap().get("length")?);
            Ok(Value::Undefined)
        });

        let observer = class.construct(vec![callback.into()]).unwrap();
        let observer = observer.as_object().unwrap();
        let target = PlainObject::new();
        observer.invoke("observe", vec![target.clone().into()]).unwrap();

        let inner = observer.downcast::<ObserverObject>().unwrap();
        assert!(inner.is_observing(&target));
        inner.enqueue("r1".into());
        inner.enqueue("r2".into());
        inner.notify(observer);
        inner.notify(observer);
        assert_eq!(*delivered.lock().unwrap(), vec![Value::from(2)]);

        inner.enqueue("r3".into());
        let taken = observer.invoke("takeRecords", vec![]).unwrap();
        assert_eq!(taken.as_object().unwrap().get("length").unwrap(), Value::from(1));

        observer.invoke("disconnect", vec![]).unwrap();
        inner.enqueue("r4".into());
        inner.notify(observer);
        assert_eq!(delivered.lock().unwrap().len(), 1);
        assert_eq!(inner.target_count(), 0);
    }

    #[test]
    fn constructor_requires_a_callback() {
        let class = observer_class("MutationObserver");
        let err = class.construct(vec![]).unwrap_err();
        assert_eq!(
            err.message(),
            "TypeError: Failed to construct 'MutationObserver': parameter 1 is not of type 'Function'"
        );
    }
}
