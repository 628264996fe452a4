use bitflags::bitflags;

use crate::host::{ObjectRef, PropertyKey, Value};
use crate::zone::{InteractionType, TriggerMask};

/// Interaction type of every event raised by a detection proxy.
pub const PROXY_INTERACTION: InteractionType = InteractionType::new("interaction-detection-proxy");

bitflags! {
    /// Trigger bits of [`PROXY_INTERACTION`] events.
    pub struct ProxyTrigger: u32 {
        const PROPERTY_GET              = 0b0000_0001;
        const PROPERTY_SET              = 0b0000_0010;
        const PROPERTY_DELETE           = 0b0000_0100;
        const FUNCTION_CALL             = 0b0000_1000;
        /// The call mutated internal state no property write reveals
        const UNTRACKABLE_FUNCTION_CALL = 0b0001_0000;
        /// A promise returned by a call settled
        const ASYNC_FUNCTION_SETTLED    = 0b0010_0000;
    }
}

impl From<ProxyTrigger> for TriggerMask {
    fn from(trigger: ProxyTrigger) -> Self {
        trigger.bits()
    }
}

/// Payload of a [`PROXY_INTERACTION`] event.
#[derive(Debug, Clone)]
pub struct ProxyInteraction {
    /// The proxy handle the operation went through
    pub source: ObjectRef,
    /// Property read, written or deleted; `None` for calls
    pub property: Option<PropertyKey>,
    /// Value read or written, or the result of a call
    pub value: Option<Value>,
}
