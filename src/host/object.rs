use std::any::Any;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use serde::{Deserialize, Serialize};

use crate::errors::{ExecutionError, ObjectError};

use super::class;
use super::function::{BoundFunction, FunctionFlags};
use super::value::Value;

/// A property name. Array indices are plain decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyKey(String);

impl PropertyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as an array index, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        if self.0.len() > 1 && self.0.starts_with('0') {
            return None;
        }
        self.0.parse().ok()
    }

    /// Internal slots are written `[[name]]` and never show up in `keys()`.
    pub fn is_internal(&self) -> bool {
        self.0.starts_with("[[") && self.0.ends_with("]]")
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<usize> for PropertyKey {
    fn from(i: usize) -> Self {
        Self(i.to_string())
    }
}

impl From<&PropertyKey> for PropertyKey {
    fn from(k: &PropertyKey) -> Self {
        k.clone()
    }
}

impl PartialEq<str> for PropertyKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PropertyKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Upcasting helper so trait objects can be downcast to their concrete type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Object,
    Function,
    Class,
    Array,
    Map,
    Set,
    TypedArray,
    Promise,
    EventTarget,
    Observer,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Object => "Object",
            ObjectKind::Function => "Function",
            ObjectKind::Class => "Class",
            ObjectKind::Array => "Array",
            ObjectKind::Map => "Map",
            ObjectKind::Set => "Set",
            ObjectKind::TypedArray => "TypedArray",
            ObjectKind::Promise => "Promise",
            ObjectKind::EventTarget => "EventTarget",
            ObjectKind::Observer => "Observer",
        };
        write!(f, "{name}")
    }
}

/// Whether detection proxies may wrap an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Detection {
    #[default]
    Enabled,
    /// The object's class opted out; proxies hand out the object itself
    Excluded,
}

/// The capability interface every host object implements.
///
/// Only `kind` and `get` are required. The defaults describe an object that
/// has no properties, cannot be written, called or constructed.
pub trait HostObject: AsAny {
    fn kind(&self) -> ObjectKind;

    /// Reads `key`. `receiver` is the handle the read went through; accessors
    /// run with it as `this`.
    fn get(&self, receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError>;

    fn set(&self, _receiver: &ObjectRef, key: &PropertyKey, _value: Value) -> Result<(), ExecutionError> {
        Err(ObjectError::ReadOnly(key.to_string()).into())
    }

    fn delete(&self, _key: &PropertyKey) -> Result<bool, ExecutionError> {
        Ok(false)
    }

    fn has(&self, _key: &PropertyKey) -> bool {
        false
    }

    fn keys(&self) -> Vec<PropertyKey> {
        vec![]
    }

    fn is_callable(&self) -> bool {
        false
    }

    fn call(&self, _this: Value, _args: Vec<Value>) -> Result<Value, ExecutionError> {
        Err(ObjectError::NotCallable(self.name().unwrap_or_else(|| self.kind().to_string())).into())
    }

    /// Creates an instance. `new_target` is the class `new` was applied to,
    /// which differs from `self` when a subclass delegates to its base.
    fn construct(&self, _new_target: &ObjectRef, _args: Vec<Value>) -> Result<Value, ExecutionError> {
        Err(ObjectError::NotConstructor(self.name().unwrap_or_else(|| self.kind().to_string())).into())
    }

    fn function_flags(&self) -> FunctionFlags {
        FunctionFlags::empty()
    }

    /// The class an instance was constructed from.
    fn class(&self) -> Option<ObjectRef> {
        None
    }

    fn detection(&self) -> Detection {
        match self.class() {
            Some(class) => class::detection_of(&class),
            None => Detection::Enabled,
        }
    }

    fn name(&self) -> Option<String> {
        None
    }
}

/// Shared handle to a host object. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn HostObject>);

impl ObjectRef {
    pub fn new<T: HostObject>(object: T) -> Self {
        Self(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn HostObject>) -> Self {
        Self(object)
    }

    pub fn as_host(&self) -> &dyn HostObject {
        self.0.as_ref()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Address of the shared allocation, stable for the object's lifetime.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Arc::downgrade(&self.0))
    }

    pub fn downcast<T: HostObject>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }

    pub fn downcast_arc<T: HostObject>(&self) -> Option<Arc<T>> {
        self.0.clone().into_any_arc().downcast::<T>().ok()
    }

    pub fn is<T: HostObject>(&self) -> bool {
        self.downcast::<T>().is_some()
    }

    pub fn kind(&self) -> ObjectKind {
        self.0.kind()
    }

    pub fn name(&self) -> Option<String> {
        self.0.name()
    }

    pub fn get(&self, key: impl Into<PropertyKey>) -> Result<Value, ExecutionError> {
        self.0.get(self, &key.into())
    }

    pub fn set(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) -> Result<(), ExecutionError> {
        self.0.set(self, &key.into(), value.into())
    }

    pub fn delete(&self, key: impl Into<PropertyKey>) -> Result<bool, ExecutionError> {
        self.0.delete(&key.into())
    }

    pub fn has(&self, key: impl Into<PropertyKey>) -> bool {
        self.0.has(&key.into())
    }

    pub fn keys(&self) -> Vec<PropertyKey> {
        self.0.keys()
    }

    pub fn is_callable(&self) -> bool {
        self.0.is_callable()
    }

    pub fn call(&self, this: Value, args: Vec<Value>) -> Result<Value, ExecutionError> {
        self.0.call(this, args)
    }

    pub fn construct(&self, args: Vec<Value>) -> Result<Value, ExecutionError> {
        self.0.construct(self, args)
    }

    /// Runs this class's constructor on behalf of `new_target` (`super(...)`).
    pub fn construct_as(&self, new_target: &ObjectRef, args: Vec<Value>) -> Result<Value, ExecutionError> {
        self.0.construct(new_target, args)
    }

    /// Calls the method `name` with this object as `this`.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, ExecutionError> {
        match self.get(name)? {
            Value::Object(f) if f.is_callable() => f.call(Value::Object(self.clone()), args),
            _ => Err(ObjectError::NotCallable(format!("{}.{}", self.kind(), name)).into()),
        }
    }

    /// A new function calling this one with a fixed `this` and leading arguments.
    pub fn bind(&self, this: Value, args: Vec<Value>) -> ObjectRef {
        BoundFunction::new(self.clone(), this, args)
    }

    pub fn function_flags(&self) -> FunctionFlags {
        self.0.function_flags()
    }

    pub fn class(&self) -> Option<ObjectRef> {
        self.0.class()
    }

    pub fn detection(&self) -> Detection {
        self.0.detection()
    }

    /// True if this object was constructed from `class` or one of its subclasses.
    pub fn instance_of(&self, class: &ObjectRef) -> bool {
        let mut current = self.class();
        while let Some(c) = current {
            if c.ptr_eq(class) {
                return true;
            }
            current = class::base_of(&c);
        }
        false
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "[{} {}]", self.kind(), name),
            None => write!(f, "[object {} @{:#x}]", self.kind(), self.addr()),
        }
    }
}

#[derive(Clone)]
pub struct WeakObjectRef(Weak<dyn HostObject>);

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

/// A property slot.
#[derive(Clone, Debug)]
pub enum Property {
    Data(Value),
    Accessor {
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
    },
}

impl Property {
    pub fn is_accessor(&self) -> bool {
        matches!(self, Property::Accessor { .. })
    }
}

/// Insertion-ordered property storage.
#[derive(Default)]
pub struct PropertyMap {
    slots: RwLock<Vec<(PropertyKey, Property)>>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PropertyKey) -> Option<Property> {
        self.slots
            .read()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.clone())
    }

    /// Inserts or replaces, keeping the original position of an existing key.
    pub fn insert(&self, key: PropertyKey, property: Property) {
        let mut slots = self.slots.write().unwrap();
        match slots.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = property,
            None => slots.push((key, property)),
        }
    }

    pub fn remove(&self, key: &PropertyKey) -> bool {
        let mut slots = self.slots.write().unwrap();
        let before = slots.len();
        slots.retain(|(k, _)| k != key);
        before != slots.len()
    }

    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.slots.read().unwrap().iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> Vec<PropertyKey> {
        self.slots
            .read()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| !k.is_internal())
            .collect()
    }
}

/// Reads a property slot, running accessors against `receiver`.
pub(crate) fn read_property(property: Property, receiver: &ObjectRef) -> Result<Value, ExecutionError> {
    match property {
        Property::Data(value) => Ok(value),
        Property::Accessor { get: Some(getter), .. } => getter.call(Value::Object(receiver.clone()), vec![]),
        Property::Accessor { get: None, .. } => Ok(Value::Undefined),
    }
}

/// Own properties first, then the class chain. `None` when nothing matched.
pub(crate) fn ordinary_get(
    props: &PropertyMap,
    class: Option<&ObjectRef>,
    receiver: &ObjectRef,
    key: &PropertyKey,
) -> Result<Option<Value>, ExecutionError> {
    if let Some(property) = props.get(key) {
        return read_property(property, receiver).map(Some);
    }
    match class.and_then(|c| class::lookup(c, key)) {
        Some(property) => read_property(property, receiver).map(Some),
        None => Ok(None),
    }
}

/// Writes a property. Accessors (own or inherited) take precedence over
/// creating a new own data property.
pub(crate) fn ordinary_set(
    props: &PropertyMap,
    class: Option<&ObjectRef>,
    receiver: &ObjectRef,
    key: &PropertyKey,
    value: Value,
) -> Result<(), ExecutionError> {
    let inherited = || class.and_then(|c| class::lookup(c, key)).filter(Property::is_accessor);

    match props.get(key).or_else(inherited) {
        Some(Property::Accessor { set: Some(setter), .. }) => {
            setter.call(Value::Object(receiver.clone()), vec![value])?;
            Ok(())
        }
        Some(Property::Accessor { set: None, .. }) => Err(ObjectError::ReadOnly(key.to_string()).into()),
        _ => {
            props.insert(key.clone(), Property::Data(value));
            Ok(())
        }
    }
}

/// An ordinary object, optionally an instance of a class.
pub struct PlainObject {
    props: PropertyMap,
    class: Option<ObjectRef>,
}

impl PlainObject {
    pub fn new() -> ObjectRef {
        ObjectRef::new(Self {
            props: PropertyMap::new(),
            class: None,
        })
    }

    /// An empty instance of `class`.
    pub fn instance(class: &ObjectRef) -> ObjectRef {
        ObjectRef::new(Self {
            props: PropertyMap::new(),
            class: Some(class.clone()),
        })
    }

    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> ObjectRef
    where
        K: Into<PropertyKey>,
        V: Into<Value>,
    {
        let props = PropertyMap::new();
        for (k, v) in entries {
            props.insert(k.into(), Property::Data(v.into()));
        }
        ObjectRef::new(Self { props, class: None })
    }

    pub fn define(&self, key: impl Into<PropertyKey>, property: Property) {
        self.props.insert(key.into(), property);
    }
}

impl HostObject for PlainObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Object
    }

    fn get(&self, receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        Ok(ordinary_get(&self.props, self.class.as_ref(), receiver, key)?.unwrap_or_default())
    }

    fn set(&self, receiver: &ObjectRef, key: &PropertyKey, value: Value) -> Result<(), ExecutionError> {
        ordinary_set(&self.props, self.class.as_ref(), receiver, key, value)
    }

    fn delete(&self, key: &PropertyKey) -> Result<bool, ExecutionError> {
        self.props.remove(key);
        Ok(true)
    }

    fn has(&self, key: &PropertyKey) -> bool {
        self.props.contains(key) || self.class.as_ref().and_then(|c| class::lookup(c, key)).is_some()
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.props.keys()
    }

    fn class(&self) -> Option<ObjectRef> {
        self.class.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FunctionObject;

    #[test]
    fn index_keys() {
        assert_eq!(PropertyKey::from(3usize).as_index(), Some(3));
        assert_eq!(PropertyKey::from("03").as_index(), None);
        assert_eq!(PropertyKey::from("a").as_index(), None);
        assert!(PropertyKey::from("[[onabort]]").is_internal());
    }

    #[test]
    fn plain_object_keeps_insertion_order() {
        let obj = PlainObject::new();
        obj.set("b", 1).unwrap();
        obj.set("a", 2).unwrap();
        obj.set("b", 3).unwrap();
        assert_eq!(obj.keys(), vec![PropertyKey::from("b"), PropertyKey::from("a")]);
        assert_eq!(obj.get("b").unwrap(), Value::from(3));
        assert_eq!(obj.get("missing").unwrap(), Value::Undefined);

        assert!(obj.delete("b").unwrap());
        assert!(!obj.has("b"));
    }

    #[test]
    fn accessors_run_against_the_receiver() {
        let obj = PlainObject::from_entries([("[[x]]", 1)]);
        let target = obj.downcast::<PlainObject>().unwrap();
        target.define(
            "x",
            Property::Accessor {
                get: Some(FunctionObject::new("get x", |this, _| {
                    this.as_object().map(|o| o.get("[[x]]")).unwrap_or(Ok(Value::Undefined))
                })),
                set: None,
            },
        );

        assert_eq!(obj.get("x").unwrap(), Value::from(1));
        assert!(obj.set("x", 2).is_err());
        assert_eq!(obj.keys(), vec![PropertyKey::from("x")]);
    }

    #[test]
    fn invoke_reports_missing_methods() {
        let obj = PlainObject::new();
        let err = obj.invoke("nope", vec![]).unwrap_err();
        assert_eq!(err.message(), "TypeError: Object.nope is not a function");
    }

    #[test]
    fn weak_refs_follow_the_object() {
        let obj = PlainObject::new();
        let weak = obj.downgrade();
        assert!(weak.upgrade().unwrap().ptr_eq(&obj));
        drop(obj);
        assert!(weak.upgrade().is_none());
    }
}
