//! Contract lifecycle events.
//!
//! The engine broadcasts an event whenever the registry or an installed
//! guard changes state, and whenever a guarded call is rejected. Events are
//! informational: failures are still returned as [`ContractError`]s.
//!
//! [`ContractError`]: crate::errors::ContractError

use crate::registry::ConditionOrigin;
use crate::types::{Phase, UniqueId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;

/// Unique event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub UniqueId);

impl EventId {
    pub fn new() -> Self {
        Self(UniqueId::new())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt_{}", self.0)
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════════════════
    // REGISTRY EVENTS
    // ═══════════════════════════════════════════════════════
    /// A condition was added to the registry.
    ConditionDefined {
        name: String,
        origin: ConditionOrigin,
    },

    /// The registry was cleared.
    RegistryReset { dropped: usize },

    // ═══════════════════════════════════════════════════════
    // GUARD EVENTS
    // ═══════════════════════════════════════════════════════
    /// A pre/postcondition guard was installed on a function.
    GuardInstalled {
        function: String,
        condition: String,
        phase: Phase,
        /// Guards on the function after the install
        guards: usize,
    },

    /// A guarded call was rejected.
    ViolationRaised {
        function: String,
        condition: String,
        phase: Phase,
    },
}

/// Event emitted by an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEvent {
    pub id: EventId,

    #[serde(flatten)]
    pub kind: EventKind,

    pub timestamp: DateTime<Utc>,
}

impl ContractEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn condition_defined(name: impl Into<String>, origin: ConditionOrigin) -> Self {
        Self::new(EventKind::ConditionDefined {
            name: name.into(),
            origin,
        })
    }

    pub fn registry_reset(dropped: usize) -> Self {
        Self::new(EventKind::RegistryReset { dropped })
    }

    pub fn guard_installed(
        function: impl Into<String>,
        condition: impl Into<String>,
        phase: Phase,
        guards: usize,
    ) -> Self {
        Self::new(EventKind::GuardInstalled {
            function: function.into(),
            condition: condition.into(),
            phase,
            guards,
        })
    }

    pub fn violation_raised(
        function: impl Into<String>,
        condition: impl Into<String>,
        phase: Phase,
    ) -> Self {
        Self::new(EventKind::ViolationRaised {
            function: function.into(),
            condition: condition.into(),
            phase,
        })
    }

    /// Function the event concerns, if any.
    pub fn function(&self) -> Option<&str> {
        match &self.kind {
            EventKind::GuardInstalled { function, .. } | EventKind::ViolationRaised { function, .. } => {
                Some(function)
            }
            _ => None,
        }
    }
}

/// Filter over received events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events about this function.
    pub function: Option<String>,

    /// Only violations.
    pub violations_only: bool,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn violations_only(mut self) -> Self {
        self.violations_only = true;
        self
    }

    /// Check if an event matches this filter.
    pub fn matches(&self, event: &ContractEvent) -> bool {
        if self.violations_only && !matches!(event.kind, EventKind::ViolationRaised { .. }) {
            return false;
        }

        if let Some(function) = &self.function {
            if event.function() != Some(function.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Event receiver (broadcast channel).
pub type EventReceiver = broadcast::Receiver<ContractEvent>;

/// Event sender (broadcast channel).
pub type EventSender = broadcast::Sender<ContractEvent>;

/// Broadcasts events and keeps the most recent ones.
pub struct EventManager {
    sender: EventSender,
    recent: Mutex<VecDeque<ContractEvent>>,
    max_recent: usize,
}

impl EventManager {
    /// Create a new event manager.
    pub fn new(capacity: usize, max_recent: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            recent: Mutex::new(VecDeque::with_capacity(max_recent)),
            max_recent,
        }
    }

    /// Emit an event.
    pub fn emit(&self, event: ContractEvent) {
        {
            let mut recent = self.recent.lock();
            recent.push_back(event.clone());
            while recent.len() > self.max_recent {
                recent.pop_front();
            }
        }

        // Broadcast (ignore errors if no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Get recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ContractEvent> {
        let recent = self.recent.lock();
        recent.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(256, 100)
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("subscribers", &self.sender.receiver_count())
            .field("max_recent", &self.max_recent)
            .finish()
    }
}
