//! The condition registry.
//!
//! An append-only map from condition name to [`CompiledCondition`],
//! published as immutable [`RegistrySnapshot`]s. Every successful
//! definition swaps in a new snapshot; a snapshot handed out earlier keeps
//! seeing exactly what it saw when it was taken.
//!
//! The registry starts empty, only grows, and is cleared by [`reset`],
//! which exists for test isolation. Guards installed before a reset look
//! their condition up by name on every call, so they fail with
//! `UNKNOWN_CONDITION` afterwards.
//!
//! [`reset`]: ConditionRegistry::reset

use crate::config::BooleanPolicy;
use crate::errors::{ContractError, ContractResult};
use crate::events::{ContractEvent, EventManager};
use crate::schema::{CompiledSchema, SchemaCompiler, ValidationIssue, ValidationReport};
use crate::types::Timestamp;
use crate::value::{is_truthy, Arg};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A registered predicate: the subject in, any JSON value out.
pub type ConditionFn = Arc<dyn Fn(&Arg) -> Value + Send + Sync>;

/// How a condition entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOrigin {
    /// Explicit `define` / `multidefine`.
    Defined,

    /// Auto-registered inline schema.
    Inline,

    /// `define_predicate`.
    Predicate,
}

/// `{name, schema}` pair accepted by `multidefine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub schema: Value,
}

impl Definition {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// COMPILED CONDITION
// ═══════════════════════════════════════════════════════════════════

/// The executable body of a condition.
#[derive(Clone)]
pub enum ConditionKind {
    Schema(CompiledSchema),
    Predicate(ConditionFn),
}

/// An immutable, executable condition.
#[derive(Clone)]
pub struct CompiledCondition {
    name: String,
    origin: ConditionOrigin,
    kind: ConditionKind,
    defined_at: Timestamp,
}

impl CompiledCondition {
    pub fn new(name: impl Into<String>, origin: ConditionOrigin, kind: ConditionKind) -> Self {
        Self {
            name: name.into(),
            origin,
            kind,
            defined_at: Timestamp::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> ConditionOrigin {
        self.origin
    }

    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    pub fn defined_at(&self) -> Timestamp {
        self.defined_at
    }

    /// The schema definition, for schema conditions.
    pub fn definition(&self) -> Option<&Value> {
        match &self.kind {
            ConditionKind::Schema(schema) => Some(schema.definition()),
            ConditionKind::Predicate(_) => None,
        }
    }

    /// Run the condition against `subject`.
    ///
    /// Schema conditions validate the subject's JSON projection. Predicate
    /// results are read according to `policy`.
    pub fn check(&self, subject: &Arg, policy: BooleanPolicy) -> ContractResult<ValidationReport> {
        match &self.kind {
            ConditionKind::Schema(schema) => Ok(schema.validate(&subject.to_json())),
            ConditionKind::Predicate(predicate) => {
                let returned = predicate(subject);
                let holds = match (&returned, policy) {
                    (Value::Bool(b), _) => *b,
                    (_, BooleanPolicy::Truthy) => is_truthy(&returned),
                    (_, BooleanPolicy::Strict) => {
                        return Err(ContractError::non_boolean_result(&self.name, &returned))
                    }
                };
                Ok(if holds {
                    ValidationReport::passed()
                } else {
                    ValidationReport::failed(vec![ValidationIssue::new(format!(
                        "{} does not satisfy `{}`",
                        subject.to_json(),
                        self.name
                    ))])
                })
            }
        }
    }
}

impl std::fmt::Debug for CompiledCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("CompiledCondition");
        s.field("name", &self.name).field("origin", &self.origin);
        if let Some(definition) = self.definition() {
            s.field("definition", definition);
        }
        s.field("defined_at", &self.defined_at).finish()
    }
}

// ═══════════════════════════════════════════════════════════════════
// SNAPSHOT
// ═══════════════════════════════════════════════════════════════════

/// Immutable point-in-time view of the registry. Cheap to clone.
#[derive(Clone)]
pub struct RegistrySnapshot {
    conditions: Arc<BTreeMap<String, Arc<CompiledCondition>>>,
    version: u64,
    published_at: Timestamp,
}

impl RegistrySnapshot {
    fn empty(version: u64) -> Self {
        Self {
            conditions: Arc::new(BTreeMap::new()),
            version,
            published_at: Timestamp::now(),
        }
    }

    /// Incremented on every publish, including resets.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn published_at(&self) -> Timestamp {
        self.published_at
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CompiledCondition>> {
        self.conditions.get(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<CompiledCondition>)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A detached copy with `condition` added or replaced.
    ///
    /// The registry and every other snapshot are unaffected.
    pub fn with_condition(&self, condition: CompiledCondition) -> Self {
        let mut conditions = (*self.conditions).clone();
        conditions.insert(condition.name.clone(), Arc::new(condition));
        Self {
            conditions: Arc::new(conditions),
            version: self.version,
            published_at: self.published_at,
        }
    }

    /// Whether both snapshots share the same underlying map.
    pub fn ptr_eq(&self, other: &RegistrySnapshot) -> bool {
        Arc::ptr_eq(&self.conditions, &other.conditions)
    }
}

impl PartialEq for RegistrySnapshot {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.conditions.len() == other.conditions.len()
            && self
                .conditions
                .iter()
                .zip(other.conditions.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && Arc::ptr_eq(va, vb))
    }
}

impl std::fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySnapshot")
            .field("version", &self.version)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════

/// Versioned registry of compiled conditions.
pub struct ConditionRegistry {
    current: RwLock<RegistrySnapshot>,
    compiler: Arc<dyn SchemaCompiler>,
    events: Arc<EventManager>,
}

impl ConditionRegistry {
    /// Create an empty registry.
    pub fn new(compiler: Arc<dyn SchemaCompiler>, events: Arc<EventManager>) -> Self {
        Self {
            current: RwLock::new(RegistrySnapshot::empty(0)),
            compiler,
            events,
        }
    }

    pub fn compiler(&self) -> &Arc<dyn SchemaCompiler> {
        &self.compiler
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.current.read().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.current.read().contains(name.trim())
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Look up a condition by name.
    ///
    /// Absent, blank and unregistered names all fail with
    /// `UNKNOWN_CONDITION`.
    pub fn lookup(&self, name: Option<&str>) -> ContractResult<Arc<CompiledCondition>> {
        let trimmed = name.map(str::trim).filter(|n| !n.is_empty());
        let Some(key) = trimmed else {
            return Err(ContractError::unknown_condition(name));
        };
        self.current
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ContractError::unknown_condition(Some(key)))
    }

    /// Compile `definition` and register it under `name`.
    pub fn define(&self, name: &str, definition: &Value) -> ContractResult<Arc<CompiledCondition>> {
        let name = checked_name(name)?;
        let schema = self.compile(name, definition)?;
        let condition = CompiledCondition::new(name, ConditionOrigin::Defined, ConditionKind::Schema(schema));
        self.publish_one(condition)
    }

    /// Register a predicate condition under `name`.
    pub fn define_predicate(&self, name: &str, predicate: ConditionFn) -> ContractResult<Arc<CompiledCondition>> {
        let name = checked_name(name)?;
        let condition = CompiledCondition::new(name, ConditionOrigin::Predicate, ConditionKind::Predicate(predicate));
        self.publish_one(condition)
    }

    /// Register an inline schema, reusing the entry if `name` is taken.
    ///
    /// Inline names are content-addressed, so an existing entry under the
    /// same name holds the same definition.
    pub fn define_inline(&self, name: &str, definition: &Value) -> ContractResult<Arc<CompiledCondition>> {
        let name = checked_name(name)?;
        if let Some(existing) = self.current.read().get(name) {
            return Ok(existing.clone());
        }
        let schema = self.compile(name, definition)?;

        let condition = {
            let mut current = self.current.write();
            // Another definer may have won the race since the read above.
            if let Some(existing) = current.get(name) {
                return Ok(existing.clone());
            }
            let condition = Arc::new(CompiledCondition::new(
                name,
                ConditionOrigin::Inline,
                ConditionKind::Schema(schema),
            ));
            let mut conditions = (*current.conditions).clone();
            conditions.insert(name.to_string(), condition.clone());
            *current = RegistrySnapshot {
                conditions: Arc::new(conditions),
                version: current.version + 1,
                published_at: Timestamp::now(),
            };
            condition
        };

        debug!(condition = name, "inline condition registered");
        self.events
            .emit(ContractEvent::condition_defined(name, ConditionOrigin::Inline));
        Ok(condition)
    }

    /// Register several schema definitions at once.
    ///
    /// Every entry is checked before anything is published, so one bad
    /// entry leaves the registry unchanged.
    pub fn multidefine(&self, definitions: &[Definition]) -> ContractResult<usize> {
        let mut batch = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let name = checked_name(&definition.name)?;
            if batch.iter().any(|c: &Arc<CompiledCondition>| c.name == name) {
                return Err(ContractError::duplicate_name(name));
            }
            let schema = self.compile(name, &definition.schema)?;
            batch.push(Arc::new(CompiledCondition::new(
                name,
                ConditionOrigin::Defined,
                ConditionKind::Schema(schema),
            )));
        }
        self.publish(batch)
    }

    /// [`multidefine`](Self::multidefine) over untyped input.
    pub fn multidefine_json(&self, definitions: &Value) -> ContractResult<usize> {
        let Value::Array(entries) = definitions else {
            return Err(ContractError::invalid_definition_list(format!(
                "expected an array, got {}",
                crate::schema::json_kind(definitions)
            )));
        };
        let parsed = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let name = entry.get("name").and_then(Value::as_str);
                let schema = entry.get("schema").filter(|s| s.is_object());
                match (name, schema) {
                    (Some(name), Some(schema)) => Ok(Definition::new(name, schema.clone())),
                    _ => Err(ContractError::invalid_definition_list(format!(
                        "entry {} needs a string `name` and an object `schema`",
                        i
                    ))),
                }
            })
            .collect::<ContractResult<Vec<_>>>()?;
        self.multidefine(&parsed)
    }

    /// Replace the registry with an empty one. Returns how many conditions
    /// were dropped.
    ///
    /// Meant for test isolation. Guards attached earlier keep referring to
    /// their condition by name and fail once it is gone.
    pub fn reset(&self) -> usize {
        let dropped = {
            let mut current = self.current.write();
            let dropped = current.len();
            *current = RegistrySnapshot::empty(current.version + 1);
            dropped
        };

        if dropped > 0 {
            warn!(dropped, "condition registry reset; attached guards are orphaned");
        } else {
            debug!("condition registry reset");
        }
        self.events.emit(ContractEvent::registry_reset(dropped));
        dropped
    }

    fn compile(&self, name: &str, definition: &Value) -> ContractResult<CompiledSchema> {
        self.compiler
            .compile(definition)
            .map_err(|reason| ContractError::invalid_schema(name, reason))
    }

    fn publish_one(&self, condition: CompiledCondition) -> ContractResult<Arc<CompiledCondition>> {
        let condition = Arc::new(condition);
        self.publish(vec![condition.clone()])?;
        Ok(condition)
    }

    /// Publish `batch` as one new snapshot, failing on any taken name.
    fn publish(&self, batch: Vec<Arc<CompiledCondition>>) -> ContractResult<usize> {
        {
            let mut current = self.current.write();
            if let Some(taken) = batch.iter().find(|c| current.contains(&c.name)) {
                return Err(ContractError::duplicate_name(&taken.name));
            }
            let mut conditions = (*current.conditions).clone();
            for condition in &batch {
                conditions.insert(condition.name.clone(), condition.clone());
            }
            *current = RegistrySnapshot {
                conditions: Arc::new(conditions),
                version: current.version + 1,
                published_at: Timestamp::now(),
            };
        }

        for condition in &batch {
            debug!(condition = condition.name(), origin = ?condition.origin(), "condition defined");
            self.events
                .emit(ContractEvent::condition_defined(condition.name(), condition.origin()));
        }
        Ok(batch.len())
    }
}

impl std::fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionRegistry")
            .field("current", &*self.current.read())
            .finish()
    }
}

fn checked_name(name: &str) -> ContractResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ContractError::invalid_name(name));
    }
    Ok(trimmed)
}
