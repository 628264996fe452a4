//! Error types shared by the zone engine and the host object model.
//!
//! Two families live here:
//!
//! - [`ExecutionError`]: the value that is "thrown" out of a zone. It is a cheap,
//!   cloneable handle around an [`anyhow::Error`] whose identity (the `Arc`
//!   allocation) is what the [allocation](crate::allocation) tables key on. Any
//!   thrown value, including plain strings, is normalized into one of these so
//!   consumers always get something with a message.
//! - [`ObjectError`]: the TypeError/RangeError style failures raised by host
//!   objects. They are converted into [`ExecutionError`] when they cross a call
//!   boundary.

use std::fmt;
use std::sync::Arc;

use crate::allocation;
use crate::zone::InteractionZone;

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("TypeError: {0} is not a function")]
    NotCallable(String),

    #[error("TypeError: {0} is not a constructor")]
    NotConstructor(String),

    #[error("TypeError: cannot assign to read only property '{0}'")]
    ReadOnly(String),

    #[error("TypeError: cannot delete property '{0}'")]
    NotDeletable(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),
}

/// A thrown value.
///
/// Cloning an `ExecutionError` keeps its identity: both clones point to the same
/// underlying error and therefore to the same allocated zone.
#[derive(Clone)]
pub struct ExecutionError {
    inner: Arc<anyhow::Error>,
}

impl ExecutionError {
    /// Wraps any error. A wrapped `ExecutionError` is unwrapped instead of being
    /// nested, so identity survives `?` through several zones.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self::from(error.into())
    }

    /// Creates an error from a bare message (the "throw 'string'" case).
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(anyhow::Error::msg(message)),
        }
    }

    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// Returns the zone this error was allocated to when it was thrown, if any.
    pub fn zone(&self) -> Option<InteractionZone> {
        allocation::error_zone(self)
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    pub fn ptr_eq(&self, other: &ExecutionError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn key(&self) -> &Arc<anyhow::Error> {
        &self.inner
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl fmt::Debug for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExecutionError").field(&self.message()).finish()
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ExecutionError>() {
            Ok(existing) => existing,
            Err(error) => Self {
                inner: Arc::new(error),
            },
        }
    }
}

impl From<ObjectError> for ExecutionError {
    fn from(error: ObjectError) -> Self {
        Self {
            inner: Arc::new(anyhow::Error::new(error)),
        }
    }
}

impl From<String> for ExecutionError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<&str> for ExecutionError {
    fn from(message: &str) -> Self {
        Self::msg(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_normalized_into_errors_with_a_message() {
        let err = ExecutionError::from("boom");
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn clones_share_identity() {
        let a = ExecutionError::msg("x");
        let b = a.clone();
        let c = ExecutionError::msg("x");
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn round_trip_through_anyhow_keeps_identity() {
        let original = ExecutionError::msg("nested");
        let erased: anyhow::Error = original.clone().into();
        let back = ExecutionError::from(erased);
        assert!(back.ptr_eq(&original));
    }

    #[test]
    fn object_errors_keep_their_type() {
        let err = ExecutionError::from(ObjectError::NotCallable("foo".into()));
        assert_eq!(err.message(), "TypeError: foo is not a function");
        assert!(matches!(
            err.downcast_ref::<ObjectError>(),
            Some(ObjectError::NotCallable(name)) if name == "foo"
        ));
    }
}
