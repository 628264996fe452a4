use std::fmt::{self, Display};

/// Bitmask of trigger bits within one [`InteractionType`] domain.
pub type TriggerMask = u32;

/// Every trigger bit allowed (the default restriction of a zone).
pub const ALL_TRIGGERS: TriggerMask = u32::MAX;

/// No trigger bit allowed; a zone with this restriction receives nothing.
pub const NO_TRIGGERS: TriggerMask = 0;

/// Tag identifying a domain of trigger bits.
///
/// Producers and consumers share the tag; events are routed to listeners by
/// comparing tags.
///
/// ```rust
/// use interaction_zone::zone::InteractionType;
/// const FORM: InteractionType = InteractionType::new("form");
/// assert_eq!(FORM.name(), "form");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InteractionType(&'static str);

impl InteractionType {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: InteractionType = InteractionType::new("a");
    const B: InteractionType = InteractionType::new("b");

    #[test]
    fn tags_compare_by_name() {
        assert_eq!(A, InteractionType::new("a"));
        assert_ne!(A, B);
        assert_eq!(A.to_string(), "a");
    }

    #[test]
    fn masks() {
        assert_eq!(ALL_TRIGGERS & 0b100, 0b100);
        assert_eq!(NO_TRIGGERS & 0b100, 0);
    }
}
