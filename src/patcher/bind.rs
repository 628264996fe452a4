use crate::host::{FunctionObject, ObjectRef, Value};
use crate::zone::InteractionZone;

/// Binds a callable `value` to `zone`. Anything else is returned as is.
///
/// The bound function runs the original inside `zone` and binds its own
/// callable arguments to `zone` as well.
pub(crate) fn bind_to_zone(value: Value, zone: &InteractionZone) -> Value {
    match value {
        Value::Object(f) if f.is_callable() => Value::Object(zone_bound(f, zone.clone())),
        other => other,
    }
}

pub(crate) fn bind_arguments(args: Vec<Value>, zone: &InteractionZone) -> Vec<Value> {
    args.into_iter().map(|arg| bind_to_zone(arg, zone)).collect()
}

fn zone_bound(target: ObjectRef, zone: InteractionZone) -> ObjectRef {
    let name = target.name().unwrap_or_default();
    let flags = target.function_flags();
    FunctionObject::with_flags(name, flags, move |this, args| {
        zone.try_execute(|| target.call(this, bind_arguments(args, &zone)))
    })
}

/// A function that binds its callable arguments to the zone current at each call.
pub(crate) fn patch_function(original: &ObjectRef) -> ObjectRef {
    patch_function_with(original, |_, _| {})
}

/// Like [`patch_function`]; `after_call` sees every successful result
/// together with the calling zone.
pub(crate) fn patch_function_with<F>(original: &ObjectRef, after_call: F) -> ObjectRef
where
    F: Fn(&Value, &InteractionZone) + Send + Sync + 'static,
{
    let original = original.clone();
    let name = original.name().unwrap_or_default();
    FunctionObject::with_flags(name, original.function_flags(), move |this, args| {
        let zone = InteractionZone::current();
        let result = original.call(this, bind_arguments(args, &zone))?;
        after_call(&result, &zone);
        Ok(result)
    })
}
