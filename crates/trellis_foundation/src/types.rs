//! Type declarations: per-type metadata governing event semantics.

use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::fact::FactType;

/// Whether facts of a type are plain facts or events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Role {
    /// Plain fact: lives until retracted.
    #[default]
    Fact,
    /// Event: timestamped, and may expire in stream mode.
    Event,
}

/// Metadata for one fact type.
///
/// A rule base holds at most one declaration per type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDeclaration {
    /// The declared type.
    pub fact_type: FactType,
    /// Fact or event.
    pub role: Role,
    /// Attribute carrying the event timestamp, if not the insertion time.
    pub timestamp_attribute: Option<String>,
    /// Attribute carrying the event duration.
    pub duration_attribute: Option<String>,
    /// How long an event stays in working memory (stream mode only).
    pub expires: Option<Duration>,
    /// Free-form annotations.
    pub metadata: BTreeMap<String, String>,
}

impl TypeDeclaration {
    /// Creates a declaration with the given role.
    #[must_use]
    pub fn new(fact_type: FactType, role: Role) -> Self {
        Self {
            fact_type,
            role,
            timestamp_attribute: None,
            duration_attribute: None,
            expires: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Declares `T` as a plain fact type.
    #[must_use]
    pub fn fact<T: Any>() -> Self {
        Self::new(FactType::of::<T>(), Role::Fact)
    }

    /// Declares `T` as an event type.
    #[must_use]
    pub fn event<T: Any>() -> Self {
        Self::new(FactType::of::<T>(), Role::Event)
    }

    /// Sets the expiration offset.
    #[must_use]
    pub fn with_expires(mut self, expires: Duration) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Sets the timestamp attribute.
    #[must_use]
    pub fn with_timestamp_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.timestamp_attribute = Some(attribute.into());
        self
    }

    /// Sets the duration attribute.
    #[must_use]
    pub fn with_duration_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.duration_attribute = Some(attribute.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns true if this type is an event type.
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.role == Role::Event
    }
}
