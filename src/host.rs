//! A small host object model.
//!
//! The zone engine never runs script; it patches and observes *host objects*.
//! This module provides the objects a browser-like global scope is made of:
//! plain objects, native functions, classes, collections, promises, event
//! targets, observers and timers. Everything is reachable through the
//! [`HostObject`] capability interface and the shared [`ObjectRef`] handle.
//!
//! ```rust
//! use interaction_zone::host::{PlainObject, PropertyKey, Value};
//!
//! let obj = PlainObject::from_entries([("a", Value::from(1))]);
//! obj.set("b", "two").unwrap();
//! assert_eq!(obj.get("a").unwrap(), Value::from(1));
//! assert_eq!(obj.keys(), vec![PropertyKey::from("a"), PropertyKey::from("b")]);
//! ```

mod class;
mod collections;
mod event_target;
mod function;
pub mod globals;
mod object;
mod observer;
pub mod promise;
mod timers;
mod value;

pub use class::{ClassBuilder, ClassObject, Constructor};
pub use collections::{ArrayObject, MapObject, SetObject, TypedArrayKind, TypedArrayObject};
pub use event_target::{event_target_class, event_target_subclass, EventTargetObject};
pub use function::{BoundFunction, FunctionFlags, FunctionObject, NativeFn};
pub(crate) use function::function_method;
pub use object::{
    AsAny, Detection, HostObject, ObjectKind, ObjectRef, PlainObject, Property, PropertyKey, PropertyMap,
    WeakObjectRef,
};
pub use observer::{observer_class, ObserverObject};
pub use promise::{promise_class, Promise, PromiseState, Resolver};
pub use timers::Scheduler;
pub use value::Value;
