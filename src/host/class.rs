use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::ExecutionError;

use super::function::{FunctionFlags, FunctionObject};
use super::object::{
    ordinary_get, ordinary_set, Detection, HostObject, ObjectKind, ObjectRef, PlainObject, Property, PropertyKey,
    PropertyMap,
};
use super::value::Value;

/// Builds the instance for `new`. Receives the class `new` was applied to.
pub type Constructor = Arc<dyn Fn(&ObjectRef, Vec<Value>) -> Result<Value, ExecutionError> + Send + Sync>;

/// A class: a constructor plus prototype members, optionally extending a base.
///
/// Member lookup walks the `extends` chain, so a subclass only needs to carry
/// what it overrides.
pub struct ClassObject {
    name: String,
    base: Option<ObjectRef>,
    constructor: Option<Constructor>,
    prototype: PropertyMap,
    statics: PropertyMap,
    excluded: bool,
}

impl ClassObject {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            inner: ClassObject {
                name: name.into(),
                base: None,
                constructor: None,
                prototype: PropertyMap::new(),
                statics: PropertyMap::new(),
                excluded: false,
            },
        }
    }

    pub fn class_name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&ObjectRef> {
        self.base.as_ref()
    }

    /// A prototype member defined by this class itself.
    pub fn own_member(&self, key: &PropertyKey) -> Option<Property> {
        self.prototype.get(key)
    }

    /// A prototype member of this class or the nearest base defining it.
    pub fn member(&self, key: &PropertyKey) -> Option<Property> {
        self.prototype
            .get(key)
            .or_else(|| self.base.as_ref().and_then(|b| lookup(b, key)))
    }

    /// Every prototype member name along the chain, nearest first.
    pub fn member_keys(&self) -> Vec<PropertyKey> {
        let mut seen = HashSet::new();
        let mut keys = vec![];
        let mut class = Some(self);
        while let Some(c) = class {
            for key in c.prototype.keys() {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
            class = c.base.as_ref().and_then(|b| b.downcast::<ClassObject>());
        }
        keys
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded || self.base.as_ref().map(|b| detection_of(b) == Detection::Excluded).unwrap_or(false)
    }
}

impl HostObject for ClassObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Class
    }

    fn get(&self, receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        if let Some(value) = ordinary_get(&self.statics, None, receiver, key)? {
            return Ok(value);
        }
        if *key == "name" {
            return Ok(Value::from(self.name.as_str()));
        }
        // Statics are inherited as well
        match &self.base {
            Some(base) => base.as_host().get(receiver, key),
            None => Ok(Value::Undefined),
        }
    }

    fn set(&self, receiver: &ObjectRef, key: &PropertyKey, value: Value) -> Result<(), ExecutionError> {
        ordinary_set(&self.statics, None, receiver, key, value)
    }

    fn has(&self, key: &PropertyKey) -> bool {
        self.statics.contains(key) || *key == "name"
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.statics.keys()
    }

    fn construct(&self, new_target: &ObjectRef, args: Vec<Value>) -> Result<Value, ExecutionError> {
        match (&self.constructor, &self.base) {
            (Some(constructor), _) => constructor(new_target, args),
            (None, Some(base)) => base.construct_as(new_target, args),
            (None, None) => Ok(Value::Object(PlainObject::instance(new_target))),
        }
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

pub struct ClassBuilder {
    inner: ClassObject,
}

impl ClassBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut ClassObject)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn extends(self, base: &ObjectRef) -> Self {
        let base = base.clone();
        self.map(|c| c.base = Some(base))
    }

    pub fn constructor<F>(self, f: F) -> Self
    where
        F: Fn(&ObjectRef, Vec<Value>) -> Result<Value, ExecutionError> + Send + Sync + 'static,
    {
        self.map(|c| c.constructor = Some(Arc::new(f)))
    }

    pub fn method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, ExecutionError> + Send + Sync + 'static,
    {
        self.method_object(name, FunctionObject::new(name, f))
    }

    pub fn method_with_flags<F>(self, name: &str, flags: FunctionFlags, f: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, ExecutionError> + Send + Sync + 'static,
    {
        self.method_object(name, FunctionObject::with_flags(name, flags, f))
    }

    pub fn method_object(self, name: &str, function: ObjectRef) -> Self {
        self.map(|c| c.prototype.insert(name.into(), Property::Data(Value::Object(function))))
    }

    pub fn accessor(self, name: &str, get: Option<ObjectRef>, set: Option<ObjectRef>) -> Self {
        self.map(|c| c.prototype.insert(name.into(), Property::Accessor { get, set }))
    }

    pub fn static_value(self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.map(|c| c.statics.insert(name.into(), Property::Data(value)))
    }

    /// Instances of this class (and its subclasses) are never wrapped by detection proxies.
    pub fn exclude_from_detection(self) -> Self {
        self.map(|c| c.excluded = true)
    }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(Self) -> Self) -> Self {
        f(self)
    }

    pub fn build(self) -> ObjectRef {
        ObjectRef::new(self.inner)
    }
}

/// Prototype member lookup on an arbitrary class handle.
pub(crate) fn lookup(class: &ObjectRef, key: &PropertyKey) -> Option<Property> {
    class.downcast::<ClassObject>()?.member(key)
}

pub(crate) fn base_of(class: &ObjectRef) -> Option<ObjectRef> {
    class.downcast::<ClassObject>()?.base.clone()
}

pub(crate) fn detection_of(class: &ObjectRef) -> Detection {
    match class.downcast::<ClassObject>() {
        Some(c) if c.is_excluded() => Detection::Excluded,
        _ => Detection::Enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn animal() -> ObjectRef {
        ClassObject::builder("Animal")
            .constructor(|new_target, args| {
                let instance = PlainObject::instance(new_target);
                instance.set("name", args.first().cloned().unwrap_or_default())?;
                Ok(Value::Object(instance))
            })
            .method("speak", |this, _| {
                let name = this.as_object().map(|o| o.get("name")).transpose()?.unwrap_or_default();
                Ok(Value::from(format!("{name} makes a sound")))
            })
            .static_value("kingdom", "animalia")
            .build()
    }

    #[test]
    fn construct_and_invoke() {
        let class = animal();
        let rex = class.construct(vec!["Rex".into()]).unwrap();
        let rex = rex.as_object().unwrap();
        assert!(rex.instance_of(&class));
        assert_eq!(rex.invoke("speak", vec![]).unwrap(), Value::from("Rex makes a sound"));
        assert_eq!(class.get("kingdom").unwrap(), Value::from("animalia"));
    }

    #[test]
    fn subclass_inherits_constructor_members_and_statics() {
        let base = animal();
        let dog = ClassObject::builder("Dog")
            .extends(&base)
            .method("fetch", |_, _| Ok(Value::from("fetching")))
            .build();

        let rex = dog.construct(vec!["Rex".into()]).unwrap();
        let rex = rex.as_object().unwrap();
        assert!(rex.instance_of(&dog));
        assert!(rex.instance_of(&base));
        assert!(rex.class().unwrap().ptr_eq(&dog));
        assert_eq!(rex.invoke("speak", vec![]).unwrap(), Value::from("Rex makes a sound"));
        assert_eq!(rex.invoke("fetch", vec![]).unwrap(), Value::from("fetching"));
        assert_eq!(dog.get("kingdom").unwrap(), Value::from("animalia"));

        let keys = dog.downcast::<ClassObject>().unwrap().member_keys();
        assert_eq!(keys, vec![PropertyKey::from("fetch"), PropertyKey::from("speak")]);
    }

    #[test]
    fn exclusion_is_inherited() {
        let excluded = ClassObject::builder("Internal").exclude_from_detection().build();
        let sub = ClassObject::builder("Sub").extends(&excluded).build();
        let instance = sub.construct(vec![]).unwrap();
        assert_eq!(instance.as_object().unwrap().detection(), Detection::Excluded);
        assert_eq!(PlainObject::new().detection(), Detection::Enabled);
    }

    #[test]
    fn plain_functions_are_not_constructors() {
        let f = FunctionObject::new("f", |_, _| Ok(Value::Undefined));
        assert_eq!(f.construct(vec![]).unwrap_err().message(), "TypeError: f is not a constructor");
    }
}
