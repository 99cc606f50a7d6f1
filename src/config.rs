//! Engine configuration.

use serde::{Deserialize, Serialize};

/// How a predicate condition's non-boolean result is treated when the
/// condition is evaluated by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanPolicy {
    /// Anything but `true`/`false` fails with `NON_BOOLEAN_RESULT`.
    #[default]
    Strict,

    /// The result is coerced by truthiness.
    Truthy,
}

/// JSON Schema draft used to compile structural conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaDraft {
    Draft4,
    Draft6,
    #[default]
    Draft7,
    Draft201909,
    Draft202012,
}

impl SchemaDraft {
    /// Whether positional item schemas are spelled `prefixItems` rather
    /// than an `items` array.
    pub fn uses_prefix_items(&self) -> bool {
        matches!(self, Self::Draft202012)
    }
}

/// Configuration for a [`ContractEngine`](crate::engine::ContractEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Result policy for predicate conditions evaluated by name
    #[serde(default)]
    pub boolean_policy: BooleanPolicy,

    /// Draft for schema compilation
    #[serde(default)]
    pub draft: SchemaDraft,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// How many events `recent_events` keeps
    #[serde(default = "default_max_recent_events")]
    pub max_recent_events: usize,
}

fn default_event_capacity() -> usize {
    256
}

fn default_max_recent_events() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            boolean_policy: BooleanPolicy::default(),
            draft: SchemaDraft::default(),
            event_capacity: default_event_capacity(),
            max_recent_events: default_max_recent_events(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the boolean policy
    pub fn boolean_policy(mut self, policy: BooleanPolicy) -> Self {
        self.boolean_policy = policy;
        self
    }

    /// Set the schema draft
    pub fn draft(mut self, draft: SchemaDraft) -> Self {
        self.draft = draft;
        self
    }

    /// Set the broadcast capacity (at least 1)
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set how many recent events are retained
    pub fn max_recent_events(mut self, max: usize) -> Self {
        self.max_recent_events = max;
        self
    }
}
