//! Native collections: `Array`, `Map`, `Set` and typed arrays.
//!
//! Collection methods are shared native functions flagged with
//! [`FunctionFlags::NATIVE_RECEIVER`]; the mutating ones also carry
//! [`FunctionFlags::INTERNAL_MUTATION`] because their effect is not visible as
//! a property write.

use std::collections::HashMap;
use std::sync::RwLock;

use lazy_static::lazy_static;

use crate::errors::{ExecutionError, ObjectError};

use super::function::{arg, receiver, FunctionFlags, FunctionObject};
use super::object::{HostObject, ObjectKind, ObjectRef, PropertyKey};
use super::value::Value;

type MethodTable = HashMap<&'static str, ObjectRef>;

fn method<F>(table: &mut MethodTable, name: &'static str, mutates: bool, body: F)
where
    F: Fn(Value, Vec<Value>) -> Result<Value, ExecutionError> + Send + Sync + 'static,
{
    let mut flags = FunctionFlags::NATIVE_RECEIVER;
    if mutates {
        flags |= FunctionFlags::INTERNAL_MUTATION;
    }
    table.insert(name, FunctionObject::with_flags(name, flags, body));
}

/// Resolves a relative index the way `splice` and `fill` do.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

// ****************************************
// ** Array

/// Arrays hold at most `2^32 - 1` elements; indices stop one below that.
const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

fn invalid_length() -> ExecutionError {
    ObjectError::Range("Invalid array length".into()).into()
}

#[derive(Debug)]
pub struct ArrayObject {
    items: RwLock<Vec<Value>>,
}

impl ArrayObject {
    pub fn new() -> ObjectRef {
        Self::from_values(vec![])
    }

    pub fn from_values(items: Vec<Value>) -> ObjectRef {
        ObjectRef::new(Self {
            items: RwLock::new(items),
        })
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.read().unwrap().clone()
    }
}

lazy_static! {
    static ref ARRAY_METHODS: MethodTable = {
        let mut t = MethodTable::new();
        method(&mut t, "push", true, |this, args| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.push")?;
            let mut items = array.items.write().unwrap();
            items.extend(args);
            Ok(Value::from(items.len()))
        });
        method(&mut t, "pop", true, |this, _| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.pop")?;
            let popped = array.items.write().unwrap().pop();
            Ok(popped.unwrap_or_default())
        });
        method(&mut t, "shift", true, |this, _| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.shift")?;
            let mut items = array.items.write().unwrap();
            Ok(if items.is_empty() { Value::Undefined } else { items.remove(0) })
        });
        method(&mut t, "unshift", true, |this, args| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.unshift")?;
            let mut items = array.items.write().unwrap();
            items.splice(0..0, args);
            Ok(Value::from(items.len()))
        });
        method(&mut t, "splice", true, |this, args| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.splice")?;
            let mut items = array.items.write().unwrap();
            let len = items.len();
            let start = relative_index(&arg(&args, 0), len, 0);
            let count = match args.get(1) {
                None => len - start,
                Some(v) => (v.to_number().max(0.0) as usize).min(len - start),
            };
            let inserted = args.into_iter().skip(2);
            let removed: Vec<Value> = items.splice(start..start + count, inserted).collect();
            Ok(Value::Object(ArrayObject::from_values(removed)))
        });
        method(&mut t, "reverse", true, |this, _| {
            receiver::<ArrayObject>(&this, "Array.prototype.reverse")?.items.write().unwrap().reverse();
            Ok(this)
        });
        method(&mut t, "sort", true, |this, _| {
            // Default ordering compares the string forms, undefined sorts last
            receiver::<ArrayObject>(&this, "Array.prototype.sort")?
                .items
                .write()
                .unwrap()
                .sort_by_key(|v| (v.is_undefined(), v.to_string()));
            Ok(this)
        });
        method(&mut t, "fill", true, |this, args| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.fill")?;
            let mut items = array.items.write().unwrap();
            let len = items.len();
            let start = relative_index(&arg(&args, 1), len, 0);
            let end = relative_index(&arg(&args, 2), len, len);
            let value = arg(&args, 0);
            for item in items.iter_mut().take(end).skip(start) {
                *item = value.clone();
            }
            drop(items);
            Ok(this)
        });
        method(&mut t, "indexOf", false, |this, args| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.indexOf")?;
            let needle = arg(&args, 0);
            let position = array.items.read().unwrap().iter().position(|v| *v == needle);
            Ok(position.map(Value::from).unwrap_or(Value::Number(-1.0)))
        });
        method(&mut t, "includes", false, |this, args| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.includes")?;
            let needle = arg(&args, 0);
            let found = array.items.read().unwrap().iter().any(|v| *v == needle);
            Ok(Value::Bool(found))
        });
        method(&mut t, "join", false, |this, args| {
            let array = receiver::<ArrayObject>(&this, "Array.prototype.join")?;
            let separator = args.first().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_else(|| ",".into());
            let joined = array
                .items
                .read()
                .unwrap()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(Value::from(joined))
        });
        t
    };
}

impl HostObject for ArrayObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Array
    }

    fn get(&self, _receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        if let Some(index) = key.as_index() {
            return Ok(self.items.read().unwrap().get(index).cloned().unwrap_or_default());
        }
        if *key == "length" {
            return Ok(Value::from(self.len()));
        }
        Ok(ARRAY_METHODS.get(key.as_str()).cloned().map(Value::Object).unwrap_or_default())
    }

    fn set(&self, _receiver: &ObjectRef, key: &PropertyKey, value: Value) -> Result<(), ExecutionError> {
        let mut items = self.items.write().unwrap();
        if let Some(index) = key.as_index() {
            if index >= MAX_ARRAY_LENGTH {
                return Err(invalid_length());
            }
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            items[index] = value;
            return Ok(());
        }
        if *key == "length" {
            let n = value.to_number();
            if n.is_nan() || n < 0.0 || n.fract() != 0.0 || n > MAX_ARRAY_LENGTH as f64 {
                return Err(invalid_length());
            }
            items.resize(n as usize, Value::Undefined);
            return Ok(());
        }
        Err(ObjectError::Type(format!("cannot add property {key} to an array")).into())
    }

    fn delete(&self, key: &PropertyKey) -> Result<bool, ExecutionError> {
        // Deleting an element leaves a hole
        match key.as_index() {
            Some(index) => {
                if let Some(slot) = self.items.write().unwrap().get_mut(index) {
                    *slot = Value::Undefined;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn has(&self, key: &PropertyKey) -> bool {
        match key.as_index() {
            Some(index) => index < self.len(),
            None => *key == "length" || ARRAY_METHODS.contains_key(key.as_str()),
        }
    }

    fn keys(&self) -> Vec<PropertyKey> {
        (0..self.len()).map(PropertyKey::from).collect()
    }
}

// ****************************************
// ** Map

pub struct MapObject {
    entries: RwLock<Vec<(Value, Value)>>,
}

impl MapObject {
    pub fn new() -> ObjectRef {
        ObjectRef::new(Self {
            entries: RwLock::new(vec![]),
        })
    }

    pub fn size(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

lazy_static! {
    static ref MAP_METHODS: MethodTable = {
        let mut t = MethodTable::new();
        method(&mut t, "get", false, |this, args| {
            let map = receiver::<MapObject>(&this, "Map.prototype.get")?;
            let key = arg(&args, 0);
            let entries = map.entries.read().unwrap();
            Ok(entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone()).unwrap_or_default())
        });
        method(&mut t, "has", false, |this, args| {
            let map = receiver::<MapObject>(&this, "Map.prototype.has")?;
            let key = arg(&args, 0);
            let found = map.entries.read().unwrap().iter().any(|(k, _)| *k == key);
            Ok(Value::Bool(found))
        });
        method(&mut t, "set", true, |this, args| {
            let map = receiver::<MapObject>(&this, "Map.prototype.set")?;
            let key = arg(&args, 0);
            let value = arg(&args, 1);
            let mut entries = map.entries.write().unwrap();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, slot)) => *slot = value,
                None => entries.push((key, value)),
            }
            drop(entries);
            Ok(this)
        });
        method(&mut t, "delete", true, |this, args| {
            let map = receiver::<MapObject>(&this, "Map.prototype.delete")?;
            let key = arg(&args, 0);
            let mut entries = map.entries.write().unwrap();
            let before = entries.len();
            entries.retain(|(k, _)| *k != key);
            Ok(Value::Bool(before != entries.len()))
        });
        method(&mut t, "clear", true, |this, _| {
            receiver::<MapObject>(&this, "Map.prototype.clear")?.entries.write().unwrap().clear();
            Ok(Value::Undefined)
        });
        method(&mut t, "forEach", false, |this, args| {
            let map = receiver::<MapObject>(&this, "Map.prototype.forEach")?;
            let callback = arg(&args, 0);
            let Some(callback) = callback.as_callable() else {
                return Err(ObjectError::NotCallable(callback.to_string()).into());
            };
            let snapshot = map.entries.read().unwrap().clone();
            for (k, v) in snapshot {
                callback.call(arg(&args, 1), vec![v, k, this.clone()])?;
            }
            Ok(Value::Undefined)
        });
        t
    };
}

impl HostObject for MapObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Map
    }

    fn get(&self, _receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        if *key == "size" {
            return Ok(Value::from(self.size()));
        }
        Ok(MAP_METHODS.get(key.as_str()).cloned().map(Value::Object).unwrap_or_default())
    }

    fn has(&self, key: &PropertyKey) -> bool {
        *key == "size" || MAP_METHODS.contains_key(key.as_str())
    }
}

// ****************************************
// ** Set

pub struct SetObject {
    items: RwLock<Vec<Value>>,
}

impl SetObject {
    pub fn new() -> ObjectRef {
        ObjectRef::new(Self {
            items: RwLock::new(vec![]),
        })
    }

    pub fn size(&self) -> usize {
        self.items.read().unwrap().len()
    }
}

lazy_static! {
    static ref SET_METHODS: MethodTable = {
        let mut t = MethodTable::new();
        method(&mut t, "add", true, |this, args| {
            let set = receiver::<SetObject>(&this, "Set.prototype.add")?;
            let value = arg(&args, 0);
            let mut items = set.items.write().unwrap();
            if !items.contains(&value) {
                items.push(value);
            }
            drop(items);
            Ok(this)
        });
        method(&mut t, "has", false, |this, args| {
            let set = receiver::<SetObject>(&this, "Set.prototype.has")?;
            let found = set.items.read().unwrap().contains(&arg(&args, 0));
            Ok(Value::Bool(found))
        });
        method(&mut t, "delete", true, |this, args| {
            let set = receiver::<SetObject>(&this, "Set.prototype.delete")?;
            let value = arg(&args, 0);
            let mut items = set.items.write().unwrap();
            let before = items.len();
            items.retain(|v| *v != value);
            Ok(Value::Bool(before != items.len()))
        });
        method(&mut t, "clear", true, |this, _| {
            receiver::<SetObject>(&this, "Set.prototype.clear")?.items.write().unwrap().clear();
            Ok(Value::Undefined)
        });
        t
    };
}

impl HostObject for SetObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Set
    }

    fn get(&self, _receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        if *key == "size" {
            return Ok(Value::from(self.size()));
        }
        Ok(SET_METHODS.get(key.as_str()).cloned().map(Value::Object).unwrap_or_default())
    }

    fn has(&self, key: &PropertyKey) -> bool {
        *key == "size" || SET_METHODS.contains_key(key.as_str())
    }
}

// ****************************************
// ** Typed arrays

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedArrayKind {
    Uint8,
    Int32,
    Float64,
}

impl TypedArrayKind {
    fn coerce(self, value: &Value) -> f64 {
        let n = value.to_number();
        match self {
            TypedArrayKind::Float64 => n,
            _ if !n.is_finite() => 0.0,
            TypedArrayKind::Uint8 => n.trunc().rem_euclid(256.0),
            TypedArrayKind::Int32 => (n.trunc().rem_euclid(4_294_967_296.0) as u32) as i32 as f64,
        }
    }
}

/// Fixed-length numeric array. Writes are coerced to the element type and
/// writes past the end are ignored.
pub struct TypedArrayObject {
    kind: TypedArrayKind,
    data: RwLock<Vec<f64>>,
}

impl TypedArrayObject {
    pub fn new(kind: TypedArrayKind, len: usize) -> ObjectRef {
        ObjectRef::new(Self {
            kind,
            data: RwLock::new(vec![0.0; len]),
        })
    }

    pub fn element_kind(&self) -> TypedArrayKind {
        self.kind
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data.read().unwrap().clone()
    }
}

lazy_static! {
    static ref TYPED_ARRAY_METHODS: MethodTable = {
        let mut t = MethodTable::new();
        method(&mut t, "fill", true, |this, args| {
            let array = receiver::<TypedArrayObject>(&this, "TypedArray.prototype.fill")?;
            let value = array.kind.coerce(&arg(&args, 0));
            let mut data = array.data.write().unwrap();
            let len = data.len();
            let start = relative_index(&arg(&args, 1), len, 0);
            let end = relative_index(&arg(&args, 2), len, len);
            for slot in data.iter_mut().take(end).skip(start) {
                *slot = value;
            }
            drop(data);
            Ok(this)
        });
        method(&mut t, "indexOf", false, |this, args| {
            let array = receiver::<TypedArrayObject>(&this, "TypedArray.prototype.indexOf")?;
            let needle = arg(&args, 0).to_number();
            let position = array.data.read().unwrap().iter().position(|v| *v == needle);
            Ok(position.map(Value::from).unwrap_or(Value::Number(-1.0)))
        });
        t
    };
}

impl HostObject for TypedArrayObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::TypedArray
    }

    fn get(&self, _receiver: &ObjectRef, key: &PropertyKey) -> Result<Value, ExecutionError> {
        if let Some(index) = key.as_index() {
            return Ok(self.data.read().unwrap().get(index).copied().map(Value::Number).unwrap_or_default());
        }
        if *key == "length" {
            return Ok(Value::from(self.data.read().unwrap().len()));
        }
        Ok(TYPED_ARRAY_METHODS.get(key.as_str()).cloned().map(Value::Object).unwrap_or_default())
    }

    fn set(&self, _receiver: &ObjectRef, key: &PropertyKey, value: Value) -> Result<(), ExecutionError> {
        if let Some(index) = key.as_index() {
            if let Some(slot) = self.data.write().unwrap().get_mut(index) {
                *slot = self.kind.coerce(&value);
            }
            return Ok(());
        }
        Err(ObjectError::ReadOnly(key.to_string()).into())
    }

    fn has(&self, key: &PropertyKey) -> bool {
        match key.as_index() {
            Some(index) => index < self.data.read().unwrap().len(),
            None => *key == "length" || TYPED_ARRAY_METHODS.contains_key(key.as_str()),
        }
    }

    fn keys(&self) -> Vec<PropertyKey> {
        (0..self.data.read().unwrap().len()).map(PropertyKey::from).collect()
    }
}
