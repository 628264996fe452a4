//! Global error integration.
//!
//! Errors that nobody catches end up here. The zone an error (or a rejected
//! promise) was allocated to gets the first chance to handle it through its
//! error listeners; whatever is not suppressed is reported with `log::error!`.

use std::fmt;
use std::panic::{self, PanicHookInfo};
use std::sync::Once;

use crate::allocation;
use crate::errors::ExecutionError;
use crate::host::promise::Promise;
use crate::host::Value;
use crate::zone::{self, InteractionZone};

/// What error listeners receive.
#[derive(Debug, Clone)]
pub enum ErrorEvent {
    /// A synchronous error that escaped to the top level
    Uncaught(ExecutionError),
    /// A promise was rejected and nothing observed the rejection
    UnhandledRejection { reason: Value },
}

impl ErrorEvent {
    pub fn message(&self) -> String {
        match self {
            ErrorEvent::Uncaught(error) => error.message(),
            ErrorEvent::UnhandledRejection { reason } => reason.to_string(),
        }
    }

    /// The thrown error, if this is an uncaught error or a rejection with an error reason.
    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            ErrorEvent::Uncaught(error) => Some(error),
            ErrorEvent::UnhandledRejection { reason: Value::Error(error) } => Some(error),
            ErrorEvent::UnhandledRejection { .. } => None,
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorEvent::Uncaught(error) => write!(f, "Uncaught {}", error),
            ErrorEvent::UnhandledRejection { reason } => write!(f, "Uncaught (in promise) {}", reason),
        }
    }
}

fn bubble(zone: Option<InteractionZone>, event: &ErrorEvent) -> bool {
    let handled = zone.map(|z| z.call_error_listener(event)).unwrap_or(false);
    if !handled {
        log::error!("{}", event);
    }
    handled
}

/// Reports an error that escaped every caller. Returns true when a zone suppressed it.
pub fn report_uncaught_error(error: &ExecutionError) -> bool {
    bubble(allocation::error_zone(error), &ErrorEvent::Uncaught(error.clone()))
}

/// Reports a rejection nobody observed. Returns true when a zone suppressed it.
///
/// The promise counts as handled afterwards, so dropping it does not report
/// the same rejection again.
pub fn report_unhandled_rejection(promise: &Promise, reason: &Value) -> bool {
    promise.mark_handled();
    bubble(
        allocation::promise_zone(promise),
        &ErrorEvent::UnhandledRejection { reason: reason.clone() },
    )
}

/// Called while a rejected, unobserved promise is being dropped.
pub(crate) fn report_dropped_rejection(promise_addr: usize, reason: Value) -> bool {
    bubble(
        allocation::take_promise_zone(promise_addr),
        &ErrorEvent::UnhandledRejection { reason },
    )
}

static INSTALL: Once = Once::new();

/// Installs the process-wide panic hook once. Returns true on the first call.
///
/// A panic raised inside [`InteractionZone::execute`] becomes an uncaught error
/// of the zone that was current at the panic. When a zone suppressed it, the
/// previously installed hook does not run.
///
/// The hook runs before unwinding, so it cannot tell whether the panic will be
/// caught later. A panic inside `execute` that is caught by `catch_unwind` or
/// surfaces as a tokio `JoinError` is still reported to the zone's error
/// listeners as uncaught, and a suppressing listener silences the default
/// panic message for it too.
pub fn install_global_handlers() -> bool {
    let mut installed = false;
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if zone::in_execute() && handle_panic(info) {
                return;
            }
            previous(info);
        }));
        installed = true;
    });
    installed
}

fn handle_panic(info: &PanicHookInfo<'_>) -> bool {
    let payload = info.payload();
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    };

    let error = ExecutionError::msg(message);
    let current = InteractionZone::current();
    allocation::allocate_error(&error, &current);
    current.call_error_listener(&ErrorEvent::Uncaught(error))
}
