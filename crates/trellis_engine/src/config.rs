//! Rule base configuration.

use serde::{Deserialize, Serialize};

/// How event facts are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventProcessingMode {
    /// Events behave like plain facts and never expire.
    #[default]
    Cloud,
    /// Events are ordered by time and declared expirations are honored.
    Stream,
}

/// Clock driving session time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockType {
    /// Wall clock time since session creation.
    #[default]
    Realtime,
    /// Manually advanced clock, for deterministic tests and replays.
    Pseudo,
}

/// Configuration for a rule base.
///
/// Controls partitioning, event semantics, type strictness and queue limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleBaseConfiguration {
    /// Identifier reported by [`RuleBase::id`](crate::RuleBase::id).
    pub id: String,

    /// Give every object-type subgraph its own partition.
    ///
    /// When false the whole network lives in the main partition and all
    /// propagation is serialized.
    pub multithreaded_evaluation: bool,

    /// Event semantics.
    pub event_processing_mode: EventProcessingMode,

    /// Reject facts and rules whose type has no declaration.
    pub strict_type_declarations: bool,

    /// Session clock.
    pub clock: ClockType,

    /// Maximum number of pending queued actions per queue.
    pub max_queued_actions: usize,
}

impl Default for RuleBaseConfiguration {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            multithreaded_evaluation: false,
            event_processing_mode: EventProcessingMode::Cloud,
            strict_type_declarations: false,
            clock: ClockType::Realtime,
            max_queued_actions: 10_000,
        }
    }
}

impl RuleBaseConfiguration {
    /// Creates a configuration for stream processing on a pseudo clock.
    #[must_use]
    pub fn stream() -> Self {
        Self {
            event_processing_mode: EventProcessingMode::Stream,
            clock: ClockType::Pseudo,
            ..Self::default()
        }
    }

    /// Creates a configuration with one partition per object-type subgraph.
    #[must_use]
    pub fn multithreaded() -> Self {
        Self {
            multithreaded_evaluation: true,
            ..Self::default()
        }
    }

    /// Builder method to set the rule base id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder method to enable/disable multithreaded evaluation.
    #[must_use]
    pub fn with_multithreaded_evaluation(mut self, enabled: bool) -> Self {
        self.multithreaded_evaluation = enabled;
        self
    }

    /// Builder method to set the event processing mode.
    #[must_use]
    pub fn with_event_processing_mode(mut self, mode: EventProcessingMode) -> Self {
        self.event_processing_mode = mode;
        self
    }

    /// Builder method to enable/disable strict type declarations.
    #[must_use]
    pub fn with_strict_type_declarations(mut self, strict: bool) -> Self {
        self.strict_type_declarations = strict;
        self
    }

    /// Builder method to set the clock type.
    #[must_use]
    pub fn with_clock(mut self, clock: ClockType) -> Self {
        self.clock = clock;
        self
    }

    /// Builder method to set the queued action limit.
    #[must_use]
    pub fn with_max_queued_actions(mut self, limit: usize) -> Self {
        self.max_queued_actions = limit;
        self
    }

    /// Returns true if declared event expirations are honored.
    #[must_use]
    pub fn is_stream_mode(&self) -> bool {
        self.event_processing_mode == EventProcessingMode::Stream
    }
}
