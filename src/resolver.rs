//! Turning a [`Condition`] into a registered condition name.
//!
//! Named conditions must already exist. Inline schemas are registered on
//! first use under a content-addressed name, so attaching the same inline
//! schema to the same function twice reuses one registry entry:
//!
//! ```text
//! inline:<function>:<blake3(owner id ‖ canonical schema ‖ function)[..16]>
//! ```

use crate::config::SchemaDraft;
use crate::errors::{ContractError, ContractResult};
use crate::evaluator::Predicate;
use crate::registry::ConditionRegistry;
use crate::schema::json_kind;
use crate::types::ObjectId;
use serde_json::{json, Value};
use tracing::debug;

/// Prefix of auto-registered inline condition names.
pub const INLINE_PREFIX: &str = "inline";

/// What a contract clause checks.
#[derive(Clone)]
pub enum Condition {
    /// A condition registered under this name.
    Named(String),

    /// Per-position item schemas; the subject must be a list of exactly
    /// that many leading items.
    InlineTuple(Vec<Value>),

    /// A schema used in place.
    InlineSchema(Value),

    /// A closure run in place. Never registered.
    Predicate(Predicate),
}

impl Condition {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::InlineTuple(items)
    }

    pub fn schema(definition: Value) -> Self {
        Self::InlineSchema(definition)
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&crate::engine::ContractEngine, &[crate::value::Arg]) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(std::sync::Arc::new(f))
    }

    /// Classify an untyped condition: string, list of item schemas, or
    /// schema object.
    pub fn from_json(value: Value) -> ContractResult<Self> {
        Self::try_from(value)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Named(_) => "name",
            Self::InlineTuple(_) => "tuple",
            Self::InlineSchema(_) => "schema",
            Self::Predicate(_) => "predicate",
        }
    }
}

impl TryFrom<Value> for Condition {
    type Error = ContractError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(name) => Ok(Self::Named(name)),
            Value::Array(items) => Ok(Self::InlineTuple(items)),
            Value::Object(_) => Ok(Self::InlineSchema(value)),
            other => Err(ContractError::invalid_condition_type(json_kind(&other))),
        }
    }
}

impl From<&str> for Condition {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for Condition {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        Self::Predicate(predicate)
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::InlineTuple(items) => f.debug_tuple("InlineTuple").field(items).finish(),
            Self::InlineSchema(def) => f.debug_tuple("InlineSchema").field(def).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Resolves conditions against one registry.
#[derive(Debug, Clone, Copy)]
pub struct ConditionResolver<'r> {
    registry: &'r ConditionRegistry,
    draft: SchemaDraft,
}

impl<'r> ConditionResolver<'r> {
    pub fn new(registry: &'r ConditionRegistry, draft: SchemaDraft) -> Self {
        Self { registry, draft }
    }

    /// Resolve `condition` in the context of `owner.function_name`, to the
    /// name it is registered under.
    pub fn resolve(&self, condition: &Condition, owner: ObjectId, function_name: &str) -> ContractResult<String> {
        match condition {
            Condition::Named(name) => Ok(self.registry.lookup(Some(name))?.name().to_string()),
            Condition::InlineTuple(items) => self.inline(&tuple_schema(items, self.draft), owner, function_name),
            Condition::InlineSchema(definition) => self.inline(definition, owner, function_name),
            Condition::Predicate(_) => Err(ContractError::invalid_condition_type(condition.kind())),
        }
    }

    fn inline(&self, definition: &Value, owner: ObjectId, function_name: &str) -> ContractResult<String> {
        let name = inline_name(owner, definition, function_name);
        let existed = self.registry.contains(&name);
        let condition = self.registry.define_inline(&name, definition)?;
        if existed {
            debug!(condition = %name, function = function_name, "inline condition reused");
        }
        Ok(condition.name().to_string())
    }
}

/// Wrap per-position item schemas into a list schema.
pub fn tuple_schema(items: &[Value], draft: SchemaDraft) -> Value {
    let keyword = if draft.uses_prefix_items() { "prefixItems" } else { "items" };
    let mut schema = json!({ "type": "array", "minItems": items.len() });
    if let Value::Object(map) = &mut schema {
        map.insert(keyword.to_string(), Value::Array(items.to_vec()));
    }
    schema
}

/// Content-addressed name of an inline condition.
pub fn inline_name(owner: ObjectId, definition: &Value, function_name: &str) -> String {
    let mut canonical = String::new();
    write_canonical(definition, &mut canonical);

    let mut hasher = blake3::Hasher::new();
    hasher.update(owner.to_string().as_bytes());
    hasher.update(&[0]);
    hasher.update(canonical.as_bytes());
    hasher.update(&[0]);
    hasher.update(function_name.as_bytes());
    let digest = hasher.finalize();

    format!(
        "{}:{}:{}",
        INLINE_PREFIX,
        function_name,
        hex::encode(&digest.as_bytes()[..16])
    )
}

/// JSON with object keys in sorted order, independent of map ordering.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
