use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::errors::{ExecutionError, ObjectError};

use super::collections::ArrayObject;
use super::object::{ordinary_get, ordinary_set, HostObject, ObjectKind, ObjectRef, PropertyKey, PropertyMap};
use super::value::Value;

/// A native function body: `(this, arguments) -> result`.
pub type NativeFn = Arc<dyn Fn(Value, Vec<Value>) -> Result<Value, ExecutionError> + Send + Sync>;

bitflags! {
    /// How a native function treats its receiver.
    pub struct FunctionFlags: u8 {
        /// The function needs the real object as `this`, not a wrapper around it
        const NATIVE_RECEIVER   = 0b0000_0001;
        /// The function mutates internal state that no property write reveals
        const INTERNAL_MUTATION = 0b0000_0010;
    }
}

pub struct FunctionObject {
    name: String,
    body: NativeFn,
    flags: FunctionFlags,
    props: PropertyMap,
}

impl FunctionObject {
    pub fn new<F>(name: impl Into<String>, body: F) -> ObjectRef
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, ExecutionError> + Send + Sync + 'static,
    {
        Self::with_flags(name, FunctionFlags::empty(), body)
    }

    pub fn with_flags<F>(name: impl Into<String>, flags: FunctionFlags, body: F) -> ObjectRef
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, ExecutionError> + Send + Sync + 'static,
    {
        ObjectRef::new(Self {
            name: name.into(),
            body: Arc::new(body),
            flags,
            props: PropertyMap::new(),
        })
    }
}

impl HostObject for FunctionObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Function
    }

    fn get(&self, receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        if let Some(value) = ordinary_get(&self.props, None, receiver, key)? {
            return Ok(value);
        }
        if *key == "name" {
            return Ok(Value::from(self.name.as_str()));
        }
        Ok(function_method(receiver, key).map(Value::Object).unwrap_or_default())
    }

    fn set(&self, receiver: &ObjectRef, key: &PropertyKey, value: Value) -> Result<(), ExecutionError> {
        ordinary_set(&self.props, None, receiver, key, value)
    }

    fn delete(&self, key: &PropertyKey) -> Result<bool, ExecutionError> {
        Ok(self.props.remove(key))
    }

    fn has(&self, key: &PropertyKey) -> bool {
        self.props.contains(key) || *key == "name"
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.props.keys()
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, this: Value, args: Vec<Value>) -> Result<Value, ExecutionError> {
        (self.body)(this, args)
    }

    fn function_flags(&self) -> FunctionFlags {
        self.flags
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

impl fmt::Debug for FunctionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}()", self.name)
    }
}

/// A function with a fixed `this` and leading arguments.
pub struct BoundFunction {
    target: ObjectRef,
    this: Value,
    args: Vec<Value>,
}

impl BoundFunction {
    pub fn new(target: ObjectRef, this: Value, args: Vec<Value>) -> ObjectRef {
        ObjectRef::new(Self { target, this, args })
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }
}

impl HostObject for BoundFunction {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Function
    }

    fn get(&self, receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        if *key == "name" {
            let name = self.target.name().unwrap_or_default();
            return Ok(Value::from(format!("bound {name}")));
        }
        Ok(function_method(receiver, key).map(Value::Object).unwrap_or_default())
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, _this: Value, args: Vec<Value>) -> Result<Value, ExecutionError> {
        let mut all = self.args.clone();
        all.extend(args);
        self.target.call(self.this.clone(), all)
    }

    fn name(&self) -> Option<String> {
        self.target.name().map(|n| format!("bound {n}"))
    }
}

/// `bind`, `call` and `apply` for the callable `target`.
///
/// The returned function captures `target`, so going through a wrapper
/// handle keeps going through that wrapper.
pub(crate) fn function_method(target: &ObjectRef, key: &PropertyKey) -> Option<ObjectRef> {
    let target = target.clone();
    match key.as_str() {
        "bind" => Some(FunctionObject::new("bind", move |_, mut args| {
            let this = if args.is_empty() { Value::Undefined } else { args.remove(0) };
            Ok(Value::Object(target.bind(this, args)))
        })),
        "call" => Some(FunctionObject::new("call", move |_, mut args| {
            let this = if args.is_empty() { Value::Undefined } else { args.remove(0) };
            target.call(this, args)
        })),
        "apply" => Some(FunctionObject::new("apply", move |_, args| {
            let mut args = args.into_iter();
            let this = args.next().unwrap_or_default();
            let list = match args.next() {
                None | Some(Value::Undefined) | Some(Value::Null) => vec![],
                Some(Value::Object(o)) => match o.downcast::<ArrayObject>() {
                    Some(array) => array.to_vec(),
                    None => return Err(ObjectError::Type("argument list must be an array".into()).into()),
                },
                Some(_) => return Err(ObjectError::Type("argument list must be an array".into()).into()),
            };
            target.call(this, list)
        })),
        _ => None,
    }
}

/// `this` as an `Arc<T>`, or the TypeError a native method raises on a foreign receiver.
pub(crate) fn receiver<T: HostObject>(this: &Value, method: &str) -> Result<Arc<T>, ExecutionError> {
    this.as_object()
        .and_then(|o| o.downcast_arc::<T>())
        .ok_or_else(|| ObjectError::Type(format!("{method} called on incompatible receiver {this}")).into())
}

/// Positional argument, `undefined` when missing.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adder() -> ObjectRef {
        FunctionObject::new("add", |this, args| {
            let base = this.as_number().unwrap_or(0.0);
            Ok(Value::from(args.iter().map(|a| a.to_number()).sum::<f64>() + base))
        })
    }

    #[test]
    fn call_passes_this_and_arguments() {
        let f = adder();
        assert_eq!(f.call(Value::from(1), vec![2.into(), 3.into()]).unwrap(), Value::from(6));
        assert_eq!(f.get("name").unwrap(), Value::from("add"));
        assert!(f.is_callable());
    }

    #[test]
    fn bind_fixes_this_and_leading_arguments() {
        let f = adder();
        let bound = f.bind(Value::from(10), vec![1.into()]);
        assert_eq!(bound.call(Value::from(1000), vec![2.into()]).unwrap(), Value::from(13));
        assert_eq!(bound.get("name").unwrap(), Value::from("bound add"));
    }

    #[test]
    fn call_and_apply_forward() {
        let f = adder();
        let call = f.get("call").unwrap();
        let call = call.as_object().unwrap();
        assert_eq!(call.call(Value::Undefined, vec![5.into(), 1.into()]).unwrap(), Value::from(6));

        let apply = f.get("apply").unwrap();
        let apply = apply.as_object().unwrap();
        let list = ArrayObject::from_values(vec![1.into(), 2.into()]);
        assert_eq!(apply.call(Value::Undefined, vec![Value::Null, list.into()]).unwrap(), Value::from(3));
    }

    #[test]
    fn receiver_mismatch_is_a_type_error() {
        let err = receiver::<ArrayObject>(&Value::from(1), "Array.prototype.push").unwrap_err();
        assert_eq!(err.message(), "TypeError: Array.prototype.push called on incompatible receiver 1");
    }
}
