//! The engine: one explicitly owned registry plus everything attached to it.
//!
//! A [`ContractEngine`] starts with an empty registry. Conditions are added
//! with `define`, `define_predicate` and `multidefine`, or implicitly when an
//! inline schema is attached. Nothing is ever removed except by
//! [`reset`](ContractEngine::reset).
//!
//! ```rust,ignore
//! let engine = ContractEngine::new();
//! engine.define("two-numbers", &json!({
//!     "type": "array",
//!     "items": [{ "type": "number" }, { "type": "number" }]
//! }))?;
//!
//! engine.attach(&math, "add")?.pre("two-numbers")?;
//! math.call("add", &[Arg::from(3), Arg::from("3")])?; // PRECONDITION_VIOLATION
//! ```
//!
//! Cloning an engine is cheap and shares the registry.

use crate::config::EngineConfig;
use crate::contract::ContractHandle;
use crate::errors::ContractResult;
use crate::events::{ContractEvent, EventManager, EventReceiver};
use crate::intercept::Target;
use crate::registry::{ConditionRegistry, Definition, RegistrySnapshot};
use crate::resolver::{Condition, ConditionResolver};
use crate::schema::{JsonSchemaCompiler, SchemaCompiler};
use crate::value::{Arg, Object};
use serde_json::Value;
use std::sync::Arc;

/// Registry, compiler, config and event stream behind one handle.
#[derive(Clone)]
pub struct ContractEngine {
    config: Arc<EngineConfig>,
    registry: Arc<ConditionRegistry>,
    events: Arc<EventManager>,
}

impl ContractEngine {
    /// An engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// An engine compiling schemas with the `jsonschema` backend.
    pub fn with_config(config: EngineConfig) -> Self {
        let compiler = JsonSchemaCompiler::new(config.draft);
        Self::with_compiler(config, Arc::new(compiler))
    }

    /// An engine using a custom schema compiler.
    pub fn with_compiler(config: EngineConfig, compiler: Arc<dyn SchemaCompiler>) -> Self {
        let events = Arc::new(EventManager::new(config.event_capacity, config.max_recent_events));
        let registry = Arc::new(ConditionRegistry::new(compiler, events.clone()));
        Self {
            config: Arc::new(config),
            registry,
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConditionRegistry {
        &self.registry
    }

    pub(crate) fn events(&self) -> &EventManager {
        &self.events
    }

    // ═══════════════════════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════════════════════

    /// Register the schema `definition` under `name`.
    pub fn define(&self, name: &str, definition: &Value) -> ContractResult<&Self> {
        self.registry.define(name, definition)?;
        Ok(self)
    }

    /// Register a predicate under `name`.
    ///
    /// The predicate receives the subject and returns a JSON value. Whether
    /// a non-boolean result is an error depends on where the condition is
    /// evaluated, see [`BooleanPolicy`](crate::config::BooleanPolicy).
    pub fn define_predicate<F>(&self, name: &str, predicate: F) -> ContractResult<&Self>
    where
        F: Fn(&Arg) -> Value + Send + Sync + 'static,
    {
        self.registry.define_predicate(name, Arc::new(predicate))?;
        Ok(self)
    }

    /// Register several definitions, all or none.
    pub fn multidefine(&self, definitions: &[Definition]) -> ContractResult<&Self> {
        self.registry.multidefine(definitions)?;
        Ok(self)
    }

    /// Register `[{"name": .., "schema": {..}}, ..]`, all or none.
    pub fn multidefine_json(&self, definitions: &Value) -> ContractResult<&Self> {
        self.registry.multidefine_json(definitions)?;
        Ok(self)
    }

    // ═══════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════

    /// The current registry snapshot. Later definitions do not show up in it.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }

    /// Empty the registry.
    ///
    /// For test isolation only: guards attached earlier fail with
    /// `UNKNOWN_CONDITION` on their next call.
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// Resolve `condition` as if it were attached to `owner.function_name`,
    /// registering inline schemas on first use.
    pub fn resolve(&self, condition: &Condition, owner: &Object, function_name: &str) -> ContractResult<String> {
        ConditionResolver::new(&self.registry, self.config.draft).resolve(condition, owner.id(), function_name)
    }

    // ═══════════════════════════════════════════════════════════
    // Attachment
    // ═══════════════════════════════════════════════════════════

    /// Start a contract on the method `function_name` of `owner`.
    pub fn attach(&self, owner: impl Into<Arg>, function_name: &str) -> ContractResult<ContractHandle<'_>> {
        let target = Target::resolve(&owner.into(), function_name)?;
        Ok(ContractHandle::new(self, target))
    }

    // ═══════════════════════════════════════════════════════════
    // Events
    // ═══════════════════════════════════════════════════════════

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Most recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<ContractEvent> {
        self.events.recent(limit)
    }
}

impl Default for ContractEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContractEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}
