//! Host promises.
//!
//! A [`Promise`] settles once. Reactions registered before settlement run
//! synchronously in the settling flow of control; reactions registered after
//! settlement run immediately. A promise is also a [`Future`], so Rust code can
//! simply `.await` it.
//!
//! A promise that is rejected and dropped without ever having a reaction
//! attached (or being awaited) reports itself as an unhandled rejection.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use lazy_static::lazy_static;

use crate::errors::{ExecutionError, ObjectError};
use crate::reporting;

use super::class::ClassObject;
use super::function::{arg, receiver, FunctionFlags, FunctionObject};
use super::object::{ordinary_get, ordinary_set, HostObject, ObjectKind, ObjectRef, PropertyKey, PropertyMap};
use super::value::Value;

type Settlement = Result<Value, Value>;
type Reaction = Box<dyn FnOnce(&Settlement) + Send>;

enum State {
    Pending { reactions: Vec<Reaction>, wakers: Vec<Waker> },
    Settled(Settlement),
}

/// Snapshot of a promise's state.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// The shared promise object behind every [`Promise`] handle.
pub struct PromiseCell {
    state: Mutex<State>,
    handled: AtomicBool,
    class: Option<ObjectRef>,
    props: PropertyMap,
}

impl PromiseCell {
    fn settle(&self, settlement: Settlement) -> bool {
        let (reactions, wakers) = {
            let mut state = self.state.lock().unwrap();
            let State::Pending { reactions, wakers } = &mut *state else {
                return false;
            };
            let taken = (std::mem::take(reactions), std::mem::take(wakers));
            *state = State::Settled(settlement.clone());
            taken
        };

        for waker in wakers {
            waker.wake();
        }
        for reaction in reactions {
            reaction(&settlement);
        }
        true
    }

    fn add_reaction(&self, reaction: Reaction) {
        let settled = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                State::Pending { reactions, .. } => {
                    reactions.push(reaction);
                    return;
                }
                State::Settled(settlement) => settlement.clone(),
            }
        };
        reaction(&settled);
    }
}

impl Drop for PromiseCell {
    fn drop(&mut self) {
        if self.handled.load(Ordering::Acquire) {
            return;
        }
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let State::Settled(Err(reason)) = state {
            let reason = reason.clone();
            reporting::report_dropped_rejection(self as *const PromiseCell as usize, reason);
        }
    }
}

/// Handle to a host promise. Clones refer to the same promise.
#[derive(Clone)]
pub struct Promise {
    cell: Arc<PromiseCell>,
}

/// Settles the promise it was created with. Only the first settlement counts.
#[derive(Clone)]
pub struct Resolver {
    cell: Arc<PromiseCell>,
}

impl Promise {
    pub fn new() -> (Promise, Resolver) {
        Self::with_class(None)
    }

    pub(crate) fn with_class(class: Option<ObjectRef>) -> (Promise, Resolver) {
        let cell = Arc::new(PromiseCell {
            state: Mutex::new(State::Pending {
                reactions: vec![],
                wakers: vec![],
            }),
            handled: AtomicBool::new(false),
            class,
            props: PropertyMap::new(),
        });
        (Promise { cell: cell.clone() }, Resolver { cell })
    }

    pub(crate) fn from_cell(cell: Arc<PromiseCell>) -> Promise {
        Promise { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<PromiseCell> {
        &self.cell
    }

    pub fn resolved(value: Value) -> Promise {
        let (promise, resolver) = Self::new();
        resolver.resolve(value);
        promise
    }

    pub fn rejected(reason: Value) -> Promise {
        let (promise, resolver) = Self::new();
        resolver.reject(reason);
        promise
    }

    /// A promise settled by `future`, which is spawned on the tokio runtime in the current zone.
    pub fn from_future<F>(future: F) -> Promise
    where
        F: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        let (promise, resolver) = Self::new();
        crate::zone::spawn(async move {
            match future.await {
                Ok(value) => resolver.resolve(value),
                Err(reason) => resolver.reject(reason),
            }
        });
        promise
    }

    pub fn to_object(&self) -> ObjectRef {
        ObjectRef::from_arc(self.cell.clone())
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    pub fn state(&self) -> PromiseState {
        match &*self.cell.state.lock().unwrap() {
            State::Pending { .. } => PromiseState::Pending,
            State::Settled(Ok(v)) => PromiseState::Fulfilled(v.clone()),
            State::Settled(Err(r)) => PromiseState::Rejected(r.clone()),
        }
    }

    pub fn is_handled(&self) -> bool {
        self.cell.handled.load(Ordering::Acquire)
    }

    /// Marks the rejection (if any) as observed.
    pub fn mark_handled(&self) {
        self.cell.handled.store(true, Ordering::Release);
    }

    /// Registers host callbacks. Returns the derived promise.
    pub fn then(&self, on_fulfilled: Option<ObjectRef>, on_rejected: Option<ObjectRef>) -> Promise {
        self.mark_handled();
        let (derived, resolver) = Self::with_class(self.cell.class.clone());

        self.cell.add_reaction(Box::new(move |settlement| {
            let handler = match settlement {
                Ok(_) => on_fulfilled,
                Err(_) => on_rejected,
            };
            match (handler, settlement) {
                (Some(handler), Ok(v) | Err(v)) => match handler.call(Value::Undefined, vec![v.clone()]) {
                    Ok(result) => resolver.resolve(result),
                    Err(error) => resolver.reject(Value::Error(error)),
                },
                (None, Ok(v)) => resolver.resolve(v.clone()),
                (None, Err(r)) => resolver.reject(r.clone()),
            }
        }));
        derived
    }

    pub fn catch(&self, on_rejected: ObjectRef) -> Promise {
        self.then(None, Some(on_rejected))
    }

    /// Runs `on_finally` on either outcome and passes the outcome through,
    /// unless `on_finally` fails or returns a promise that rejects.
    pub fn finally(&self, on_finally: ObjectRef) -> Promise {
        self.mark_handled();
        let (derived, resolver) = Self::with_class(self.cell.class.clone());

        self.cell.add_reaction(Box::new(move |settlement| {
            let settlement = settlement.clone();
            match on_finally.call(Value::Undefined, vec![]) {
                Err(error) => resolver.reject(Value::Error(error)),
                Ok(result) => match result.as_promise() {
                    Some(inner) => inner.on_settled(move |inner_settlement| match inner_settlement {
                        Err(reason) => resolver.reject(reason),
                        Ok(_) => resolver.settle(settlement),
                    }),
                    None => resolver.settle(settlement),
                },
            }
        }));
        derived
    }

    /// Rust-side reaction. Counts as handling the promise.
    pub fn on_settled(&self, f: impl FnOnce(Result<Value, Value>) + Send + 'static) {
        self.mark_handled();
        self.observe(f);
    }

    /// Watches the settlement without counting as a handler.
    pub(crate) fn observe(&self, f: impl FnOnce(Result<Value, Value>) + Send + 'static) {
        self.cell.add_reaction(Box::new(move |settlement| f(settlement.clone())));
    }
}

impl Future for Promise {
    type Output = Result<Value, Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.mark_handled();
        let mut state = self.cell.state.lock().unwrap();
        match &mut *state {
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
            State::Settled(settlement) => Poll::Ready(settlement.clone()),
        }
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Promise").field(&self.state()).finish()
    }
}

impl Resolver {
    /// Fulfills the promise. Resolving with another promise adopts its outcome.
    pub fn resolve(&self, value: Value) {
        match value.as_promise() {
            Some(other) if Arc::ptr_eq(&other.cell, &self.cell) => {
                let error = ExecutionError::from(ObjectError::Type("chaining cycle detected for promise".into()));
                self.reject(Value::Error(error));
            }
            Some(other) => {
                let resolver = self.clone();
                other.on_settled(move |settlement| resolver.settle(settlement));
            }
            None => {
                self.cell.settle(Ok(value));
            }
        }
    }

    pub fn reject(&self, reason: Value) {
        self.cell.settle(Err(reason));
    }

    fn settle(&self, settlement: Settlement) {
        match settlement {
            Ok(value) => self.resolve(value),
            Err(reason) => self.reject(reason),
        }
    }
}

lazy_static! {
    static ref PROMISE_METHODS: Vec<(&'static str, ObjectRef)> = vec![
        (
            "then",
            FunctionObject::with_flags("then", FunctionFlags::NATIVE_RECEIVER, |this, args| {
                let promise = Promise::from_cell(receiver::<PromiseCell>(&this, "Promise.prototype.then")?);
                let on_fulfilled = arg(&args, 0).as_callable().cloned();
                let on_rejected = arg(&args, 1).as_callable().cloned();
                Ok(promise.then(on_fulfilled, on_rejected).into())
            }),
        ),
        (
            "catch",
            FunctionObject::with_flags("catch", FunctionFlags::NATIVE_RECEIVER, |this, args| {
                let promise = Promise::from_cell(receiver::<PromiseCell>(&this, "Promise.prototype.catch")?);
                Ok(promise.then(None, arg(&args, 0).as_callable().cloned()).into())
            }),
        ),
        (
            "finally",
            FunctionObject::with_flags("finally", FunctionFlags::NATIVE_RECEIVER, |this, args| {
                let promise = Promise::from_cell(receiver::<PromiseCell>(&this, "Promise.prototype.finally")?);
                match arg(&args, 0).as_callable() {
                    Some(f) => Ok(promise.finally(f.clone()).into()),
                    None => Ok(promise.then(None, None).into()),
                }
            }),
        ),
    ];
}

fn builtin_method(key: &PropertyKey) -> Option<Value> {
    PROMISE_METHODS
        .iter()
        .find(|(name, _)| *key == *name)
        .map(|(_, f)| Value::Object(f.clone()))
}

impl HostObject for PromiseCell {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Promise
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

/// The `Promise` class: `new Promise((resolve, reject) => ...)`.
pub fn promise_class() -> ObjectRef {
    ClassObject::builder("Promise")
        .constructor(|new_target, args| {
            let executor = arg(&args, 0);
            let Some(executor) = executor.as_callable() else {
                return Err(ObjectError::Type(format!("Promise resolver {executor} is not a function")).into());
            };

            let (promise, resolver) = Promise::with_class(Some(new_target.clone()));
            let resolve = {
                let resolver = resolver.clone();
                FunctionObject::new("resolve", move |_, args| {
                    resolver.resolve(arg(&args, 0));
                    Ok(Value::Undefined)
                })
            };
            let reject = {
                let resolver = resolver.clone();
                FunctionObject::new("reject", move |_, args| {
                    resolver.reject(arg(&args, 0));
                    Ok(Value::Undefined)
                })
            };

            if let Err(error) = executor.call(Value::Undefined, vec![resolve.into(), reject.into()]) {
                resolver.reject(Value::Error(error));
            }
            Ok(promise.into())
        })
        .with(|class| {
            PROMISE_METHODS
                .iter()
                .fold(class, |class, (name, f)| class.method_object(name, f.clone()))
        })
        .static_value(
            "resolve",
            FunctionObject::new("resolve", |_, args| Ok(Promise::resolved(arg(&args, 0)).into())),
        )
        .static_value(
            "reject",
            FunctionObject::new("reject", |_, args| Ok(Promise::rejected(arg(&args, 0)).into())),
        )
        .build()
}
