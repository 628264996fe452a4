//! Timer functions backed by the tokio runtime.
//!
//! Every pending timer owns a [`CancellationToken`]; clearing a timer cancels
//! the token and the sleeping task ends without running the callback.
//! Callbacks run on a runtime worker with no zone of their own, errors they
//! raise are reported as uncaught errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use tokio_util::sync::CancellationToken;

use crate::errors::{ExecutionError, ObjectError};
use crate::reporting;

use super::function::{arg, FunctionObject};
use super::object::{ObjectRef, PlainObject};
use super::value::Value;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const IDLE_DELAY: Duration = Duration::from_millis(1);
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct Scheduler {
    next_id: AtomicU64,
    timers: Mutex<HashMap<u64, CancellationToken>>,
    started: Instant,
}

lazy_static! {
    static ref SCHEDULER: Scheduler = Scheduler {
        next_id: AtomicU64::new(1),
        timers: Mutex::new(HashMap::new()),
        started: Instant::now(),
    };
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Repeat {
    Once,
    Interval,
}

impl Scheduler {
    pub fn global() -> &'static Scheduler {
        &SCHEDULER
    }

    /// Number of timers that have not fired (or were not cleared) yet.
    pub fn pending(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Milliseconds since the scheduler started, the timestamp animation frames receive.
    pub fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn schedule<A>(&'static self, callback: ObjectRef, delay: Duration, repeat: Repeat, args: A) -> Result<u64, ExecutionError>
    where
        A: Fn() -> Vec<Value> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ObjectError::Type("timers need a running tokio runtime".into()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.timers.lock().unwrap().insert(id, token.clone());

        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                if repeat == Repeat::Once {
                    self.timers.lock().unwrap().remove(&id);
                }
                run_callback(&callback, args());
                if repeat == Repeat::Once {
                    break;
                }
            }
        });

        log::trace!("timer {} scheduled in {:?}", id, delay);
        Ok(id)
    }

    fn clear(&self, id: &Value) {
        let id = id.to_number();
        if !id.is_finite() || id < 0.0 {
            return;
        }
        if let Some(token) = self.timers.lock().unwrap().remove(&(id as u64)) {
            token.cancel();
        }
    }

    fn queue_microtask(&self, callback: ObjectRef) -> Result<(), ExecutionError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ObjectError::Type("queueMicrotask needs a running tokio runtime".into()))?;
        runtime.spawn(async move { run_callback(&callback, vec![]) });
        Ok(())
    }

    /// The timer functions of a global scope, bound to this scheduler.
    pub fn functions(&'static self) -> Vec<(&'static str, ObjectRef)> {
        let set_timeout = FunctionObject::new("setTimeout", move |_, args| {
            let callback = callback_arg(&args, "setTimeout")?;
            let extra: Vec<Value> = args.iter().skip(2).cloned().collect();
            let id = self.schedule(callback, delay_arg(&args), Repeat::Once, move || extra.clone())?;
            Ok(Value::Number(id as f64))
        });
        let set_interval = FunctionObject::new("setInterval", move |_, args| {
            let callback = callback_arg(&args, "setInterval")?;
            let extra: Vec<Value> = args.iter().skip(2).cloned().collect();
            let delay = delay_arg(&args).max(MIN_INTERVAL);
            let id = self.schedule(callback, delay, Repeat::Interval, move || extra.clone())?;
            Ok(Value::Number(id as f64))
        });
        let request_animation_frame = FunctionObject::new("requestAnimationFrame", move |_, args| {
            let callback = callback_arg(&args, "requestAnimationFrame")?;
            let id = self.schedule(callback, FRAME_INTERVAL, Repeat::Once, move || vec![Value::Number(self.now())])?;
            Ok(Value::Number(id as f64))
        });
        let request_idle_callback = FunctionObject::new("requestIdleCallback", move |_, args| {
            let callback = callback_arg(&args, "requestIdleCallback")?;
            let id = self.schedule(callback, IDLE_DELAY, Repeat::Once, || {
                vec![Value::Object(PlainObject::from_entries([("didTimeout", false)]))]
            })?;
            Ok(Value::Number(id as f64))
        });
        let queue_microtask = FunctionObject::new("queueMicrotask", move |_, args| {
            self.queue_microtask(callback_arg(&args, "queueMicrotask")?)?;
            Ok(Value::Undefined)
        });

        let clear = |name: &'static str| {
            FunctionObject::new(name, move |_, args| {
                self.clear(&arg(&args, 0));
                Ok(Value::Undefined)
            })
        };

        vec![
            ("setTimeout", set_timeout),
            ("setInterval", set_interval),
            ("requestAnimationFrame", request_animation_frame),
            ("requestIdleCallback", request_idle_callback),
            ("queueMicrotask", queue_microtask),
            ("clearTimeout", clear("clearTimeout")),
            ("clearInterval", clear("clearInterval")),
            ("cancelAnimationFrame", clear("cancelAnimationFrame")),
            ("cancelIdleCallback", clear("cancelIdleCallback")),
        ]
    }
}

fn run_callback(callback: &ObjectRef, args: Vec<Value>) {
    if let Err(error) = callback.call(Value::Undefined, args) {
        reporting::report_uncaught_error(&error);
    }
}

fn callback_arg(args: &[Value], function: &str) -> Result<ObjectRef, ExecutionError> {
    match arg(args, 0) {
        Value::Object(o) if o.is_callable() => Ok(o),
        other => Err(ObjectError::Type(format!("{function}: parameter 1 ({other}) is not a function")).into()),
    }
}

/// Delays outside `1..=i32::MAX` milliseconds (NaN and infinities included) fire right away.
fn delay_arg(args: &[Value]) -> Duration {
    let ms = arg(args, 1).to_number();
    if ms.is_nan() || ms <= 0.0 || ms > i32::MAX as f64 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn function(name: &str) -> ObjectRef {
        Scheduler::global()
            .functions()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| f)
            .unwrap()
    }

    fn sender_callback(tx: mpsc::UnboundedSender<Vec<Value>>) -> ObjectRef {
        FunctionObject::new("callback", move |_, args| {
            let _ = tx.send(args);
            Ok(Value::Undefined)
        })
    }

    #[tokio::test]
    async fn timeout_fires_once_with_extra_arguments() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = function("setTimeout")
            .call(Value::Undefined, vec![sender_callback(tx).into(), 5.into(), "a".into(), "b".into()])
            .unwrap();
        assert!(id.as_number().unwrap() > 0.0);

        let args = rx.recv().await.unwrap();
        assert_eq!(args, vec![Value::from("a"), Value::from("b")]);
    }

    #[tokio::test]
    async fn cleared_timeouts_never_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = function("setTimeout")
            .call(Value::Undefined, vec![sender_callback(tx.clone()).into(), 20.into()])
            .unwrap();
        function("clearTimeout").call(Value::Undefined, vec![id]).unwrap();

        function("setTimeout")
            .call(Value::Undefined, vec![sender_callback(tx).into(), 40.into(), "second".into()])
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec![Value::from("second")]);
    }

    #[tokio::test]
    async fn infinite_and_oversized_delays_fire_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for delay in [f64::INFINITY, 1e300, i32::MAX as f64 + 1.0] {
            function("setTimeout")
                .call(Value::Undefined, vec![sender_callback(tx.clone()).into(), Value::Number(delay), delay.into()])
                .unwrap();
            assert_eq!(rx.recv().await.unwrap(), vec![Value::from(delay)]);
        }
        assert_eq!(delay_arg(&[Value::Undefined, Value::Number(f64::NEG_INFINITY)]), Duration::ZERO);
        assert_eq!(delay_arg(&[Value::Undefined, 1500.into()]), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn intervals_repeat_until_cleared() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = function("setInterval")
            .call(Value::Undefined, vec![sender_callback(tx).into(), 2.into()])
            .unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        function("clearInterval").call(Value::Undefined, vec![id]).unwrap();
    }

    #[tokio::test]
    async fn animation_frames_receive_a_timestamp() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        function("requestAnimationFrame")
            .call(Value::Undefined, vec![sender_callback(tx).into()])
            .unwrap();
        let args = rx.recv().await.unwrap();
        assert!(args[0].as_number().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn microtasks_run() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        function("queueMicrotask")
            .call(Value::Undefined, vec![sender_callback(tx).into()])
            .unwrap();
        assert!(rx.recv().await.unwrap().is_empty());
    }

    #[test]
    fn timers_need_a_runtime_and_a_callback() {
        let set_timeout = function("setTimeout");
        let no_callback = set_timeout.call(Value::Undefined, vec![1.into()]).unwrap_err();
        assert!(no_callback.message().contains("is not a function"));

        let callback = FunctionObject::new("noop", |_, _| Ok(Value::Undefined));
        let no_runtime = set_timeout.call(Value::Undefined, vec![callback.into()]).unwrap_err();
        assert!(no_runtime.message().contains("tokio runtime"));
    }
}
