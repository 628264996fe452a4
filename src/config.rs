//! Zone and global scope configuration.
//!
//! Two configuration objects exist:
//!
//! - [`ZoneOptions`] is passed to [`InteractionZone::create`](crate::zone::InteractionZone::create)
//!   and controls whether the new zone is *isolated* (never bubbles interactions or
//!   errors to its parent) and/or *silent* (discards interactions raised inside it).
//! - [`GlobalScopeDescriptor`] tells the [`GlobalScopePatcher`](crate::patcher::GlobalScopePatcher)
//!   which names of a global object to patch. [`Default`] enumerates the
//!   conventional browser globals, and [`GlobalScopeDescriptor::builder()`] allows
//!   customization with validation.
//!
//! # Examples
//!
//! ## Zone options
//! ```rust
//! use interaction_zone::config::ZoneOptions;
//! let opts = ZoneOptions::default().isolate(true);
//! assert!(opts.isolate);
//! assert!(!opts.silent);
//! ```
//!
//! ## Customize the descriptor with the builder
//! ```rust
//! use interaction_zone::config::GlobalScopeDescriptor;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = GlobalScopeDescriptor::builder()
//!     .promise("Promise")
//!     .event_target("EventTarget")
//!     .function("setTimeout")
//!     .class("ResizeObserver")
//!     .build()?; // returns Result<GlobalScopeDescriptor, DescriptorError>
//! assert_eq!(descriptor.functions, vec!["setTimeout".to_string()]);
//! # Ok(()) }
//! ```
//!
//! # Errors
//!
//! Builder validation returns [`DescriptorError`] for empty names or for a name
//! that is listed more than once.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Options for a newly created zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneOptions {
    /// Never bubble interactions or errors to the parent zone
    #[serde(default)]
    pub isolate: bool,
    /// Discard interactions raised while this zone is current
    #[serde(default)]
    pub silent: bool,
}

impl ZoneOptions {
    pub fn isolate(mut self, on: bool) -> Self {
        self.isolate = on;
        self
    }

    pub fn silent(mut self, on: bool) -> Self {
        self.silent = on;
        self
    }
}

/// Describes which names of a global object get patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalScopeDescriptor {
    /// Name of the promise constructor
    pub promise: Option<String>,
    /// Name of the base event target class
    pub event_target: Option<String>,
    /// Event target subclasses that are patched wholesale
    #[serde(default)]
    pub classes_with_events: Vec<String>,
    /// Classes whose constructor and methods accept callbacks (observers)
    #[serde(default)]
    pub classes: Vec<String>,
    /// Free functions whose callback arguments are bound to the calling zone
    #[serde(default)]
    pub functions: Vec<String>,
}

impl Default for GlobalScopeDescriptor {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            promise: Some("Promise".to_string()),
            event_target: Some("EventTarget".to_string()),
            classes_with_events: names(&["AbortSignal", "MessagePort", "WebSocket", "XMLHttpRequest"]),
            classes: names(&["ResizeObserver", "MutationObserver", "IntersectionObserver"]),
            functions: names(&[
                "setTimeout",
                "setInterval",
                "requestAnimationFrame",
                "requestIdleCallback",
                "queueMicrotask",
            ]),
        }
    }
}

impl GlobalScopeDescriptor {
    /// A builder starting from an empty descriptor.
    pub fn builder() -> GlobalScopeDescriptorBuilder {
        GlobalScopeDescriptorBuilder::default()
    }

    /// Parses a descriptor from JSON and validates it.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let descriptor: GlobalScopeDescriptor = serde_json::from_str(json)?;
        validate(&descriptor)?;
        Ok(descriptor)
    }

    /// Every name mentioned by this descriptor, in patch order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.promise
            .iter()
            .chain(self.event_target.iter())
            .chain(self.classes_with_events.iter())
            .chain(self.classes.iter())
            .chain(self.functions.iter())
            .map(|s| s.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct GlobalScopeDescriptorBuilder {
    inner: GlobalScopeDescriptor,
}

impl Default for GlobalScopeDescriptorBuilder {
    fn default() -> Self {
        Self {
            inner: GlobalScopeDescriptor {
                promise: None,
                event_target: None,
                classes_with_events: vec![],
                classes: vec![],
                functions: vec![],
            },
        }
    }
}

impl GlobalScopeDescriptorBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut GlobalScopeDescriptor)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn promise<S: Into<String>>(self, name: S) -> Self { self.map(|d| d.promise = Some(name.into())) }
    pub fn event_target<S: Into<String>>(self, name: S) -> Self { self.map(|d| d.event_target = Some(name.into())) }
    pub fn class_with_events<S: Into<String>>(self, name: S) -> Self { self.map(|d| d.classes_with_events.push(name.into())) }
    pub fn class<S: Into<String>>(self, name: S) -> Self { self.map(|d| d.classes.push(name.into())) }
    pub fn function<S: Into<String>>(self, name: S) -> Self { self.map(|d| d.functions.push(name.into())) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut GlobalScopeDescriptor)) -> Self { self.map(f) }

    /// Validate and build the final descriptor.
    pub fn build(self) -> Result<GlobalScopeDescriptor, DescriptorError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    EmptyName,
    Duplicate(String),
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::EmptyName =>
                write!(f, "global names in a descriptor can not be empty"),
            DescriptorError::Duplicate(name) =>
                write!(f, "global '{name}' is listed more than once"),
        }
    }
}
impl std::error::Error for DescriptorError {}

fn validate(d: &GlobalScopeDescriptor) -> Result<(), DescriptorError> {
    let mut seen = HashSet::new();
    for name in d.names() {
        if name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        if !seen.insert(name) {
            return Err(DescriptorError::Duplicate(name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_descriptor_is_valid() {
        let d = GlobalScopeDescriptor::default();
        assert!(validate(&d).is_ok());
        assert_eq!(d.promise.as_deref(), Some("Promise"));
        assert!(d.functions.iter().any(|f| f == "setTimeout"));
    }

    #[test]
    fn builder_rejects_duplicates() {
        let err = GlobalScopeDescriptor::builder()
            .function("setTimeout")
            .function("setTimeout")
            .build()
            .unwrap_err();
        assert_eq!(err, DescriptorError::Duplicate("setTimeout".into()));
    }

    #[test]
    fn builder_rejects_empty_names() {
        let err = GlobalScopeDescriptor::builder().class(" ").build().unwrap_err();
        assert_eq!(err, DescriptorError::EmptyName);
        assert_eq!(err.to_string(), "global names in a descriptor can not be empty");
    }

    #[test]
    fn descriptor_loads_from_camel_case_json() {
        let d = GlobalScopeDescriptor::from_json(
            r#"{ "promise": "Promise", "eventTarget": null, "classesWithEvents": ["MessagePort"], "functions": ["setTimeout"] }"#,
        )
        .unwrap();
        assert_eq!(d.promise.as_deref(), Some("Promise"));
        assert!(d.event_target.is_none());
        assert_eq!(d.classes_with_events, vec!["MessagePort".to_string()]);
        assert!(d.classes.is_empty());
    }

    #[test]
    fn zone_options_setters() {
        let o = ZoneOptions::default().isolate(true).silent(true);
        assert!(o.isolate && o.silent);
        assert_eq!(ZoneOptions::default(), ZoneOptions { isolate: false, silent: false });
    }
}
