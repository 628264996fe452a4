use crate::allocation;
use crate::host::{ClassBuilder, ClassObject, ObjectRef, Property, Value};
use crate::zone::InteractionZone;

use super::bind::{bind_arguments, patch_function_with};

/// A subclass of `original` whose constructor, prototype methods and static
/// functions bind their callable arguments to the zone current at the call.
///
/// `None` when `original` is not a class.
pub(crate) fn patch_class(original: &ObjectRef) -> Option<ObjectRef> {
    Some(subclass(original, |_, _| {})?.build())
}

/// [`patch_class`] for a promise class. Every promise created through the
/// subclass, by `new` or as the result of a method, is allocated to the zone
/// current at its creation.
pub(crate) fn patch_promise(original: &ObjectRef) -> Option<ObjectRef> {
    Some(subclass(original, allocate_if_promise)?.build())
}

fn allocate_if_promise(value: &Value, zone: &InteractionZone) {
    if let Some(promise) = value.as_promise() {
        allocation::allocate_promise(&promise, zone);
    }
}

/// The patched constructor and members of `original`, ready for more overrides.
pub(super) fn subclass<F>(original: &ObjectRef, after_call: F) -> Option<ClassBuilder>
where
    F: Fn(&Value, &InteractionZone) + Clone + Send + Sync + 'static,
{
    let class = original.downcast::<ClassObject>()?;

    let base = original.clone();
    let construct_hook = after_call.clone();
    let builder = ClassObject::builder(class.class_name())
        .extends(original)
        .constructor(move |new_target, args| {
            let zone = InteractionZone::current();
            let instance = base.construct_as(new_target, bind_arguments(args, &zone))?;
            construct_hook(&instance, &zone);
            Ok(instance)
        });

    let builder = class.member_keys().into_iter().fold(builder, |builder, key| match class.member(&key) {
        Some(Property::Data(Value::Object(method))) if method.is_callable() => {
            builder.method_object(key.as_str(), patch_function_with(&method, after_call.clone()))
        }
        _ => builder,
    });

    let builder = original.keys().into_iter().fold(builder, |builder, key| match original.get(&key) {
        Ok(Value::Object(function)) if function.is_callable() => {
            builder.static_value(key.as_str(), patch_function_with(&function, after_call.clone()))
        }
        _ => builder,
    });

    Some(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoneOptions;
    use crate::host::{observer_class, promise_class, FunctionObject, ObserverObject, PlainObject};
    use std::sync::{Arc, Mutex};

    fn zone_recorder(seen: &Arc<Mutex<Vec<String>>>) -> ObjectRef {
        let seen = seen.clone();
        FunctionObject::new("record", move |_, _| {
            seen.lock().unwrap().push(InteractionZone::current().name().to_string());
            Ok(Value::Undefined)
        })
    }

    fn capture_resolver(slot: &Arc<Mutex<Option<ObjectRef>>>) -> ObjectRef {
        let slot = slot.clone();
        FunctionObject::new("executor", move |_, args| {
            *slot.lock().unwrap() = args[0].as_object().cloned();
            Ok(Value::Undefined)
        })
    }

    #[test]
    fn patched_promises_are_allocated_and_stay_instances_of_the_original() {
        let original = promise_class();
        let patched = patch_promise(&original).unwrap();
        let zone = InteractionZone::root().create("creator", ZoneOptions::default());

        let promise = zone
            .execute(|| patched.construct(vec![FunctionObject::new("executor", |_, _| Ok(Value::Undefined)).into()]))
            .unwrap();
        let promise = promise.as_promise().unwrap();

        assert!(allocation::promise_zone(&promise).unwrap().ptr_eq(&zone));
        assert!(promise.to_object().instance_of(&original));
        assert!(promise.to_object().instance_of(&patched));
    }

    #[test]
    fn continuations_run_in_the_registering_zone() {
        let patched = patch_promise(&promise_class()).unwrap();
        let creator = InteractionZone::root().create("creator", ZoneOptions::default());
        let registrar = InteractionZone::root().create("registrar", ZoneOptions::default());

        let resolve = Arc::new(Mutex::new(None));
        let promise = creator.execute(|| patched.construct(vec![capture_resolver(&resolve).into()])).unwrap();
        let promise = promise.as_object().unwrap().clone();

        let seen = Arc::new(Mutex::new(vec![]));
        let derived = registrar
            .execute(|| promise.invoke("then", vec![zone_recorder(&seen).into()]))
            .unwrap();
        assert!(allocation::promise_zone(&derived.as_promise().unwrap())
            .unwrap()
            .ptr_eq(&registrar));

        let resolve = resolve.lock().unwrap().clone().unwrap();
        resolve.call(Value::Undefined, vec![1.into()]).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["registrar".to_string()]);
    }

    #[test]
    fn static_constructors_allocate_their_promises() {
        let patched = patch_promise(&promise_class()).unwrap();
        let zone = InteractionZone::root().create("statics", ZoneOptions::default());

        let resolved = zone.execute(|| patched.invoke("resolve", vec![1.into()])).unwrap();
        assert!(allocation::promise_zone(&resolved.as_promise().unwrap()).unwrap().ptr_eq(&zone));
    }

    #[test]
    fn observer_callbacks_run_in_the_constructing_zone() {
        let original = observer_class("ResizeObserver");
        let patched = patch_class(&original).unwrap();
        let zone = InteractionZone::root().create("layout", ZoneOptions::default());

        let seen = Arc::new(Mutex::new(vec![]));
        let observer = zone.execute(|| patched.construct(vec![zone_recorder(&seen).into()])).unwrap();
        let observer = observer.as_object().unwrap();
        assert!(observer.instance_of(&original));

        observer.invoke("observe", vec![PlainObject::new().into()]).unwrap();
        let inner = observer.downcast::<ObserverObject>().unwrap();
        inner.enqueue("entry".into());
        inner.notify(observer);
        assert_eq!(*seen.lock().unwrap(), vec!["layout".to_string()]);
    }

    #[test]
    fn only_classes_can_be_patched() {
        assert!(patch_class(&PlainObject::new()).is_none());
        assert!(patch_promise(&FunctionObject::new("f", |_, _| Ok(Value::Undefined))).is_none());
    }
}
