//! Values that flow through instrumented calls.
//!
//! An [`Object`] is a shared member table, the unit a contract is attached
//! to. Its members are [`Arg`] values: plain JSON data, arrays, callables,
//! nested objects, or nominally typed [`Instance`]s.
//!
//! Schema conditions validate JSON, so every `Arg` has a JSON projection
//! ([`Arg::to_json`]). Callables project to `{"$function": <name>}` and
//! instances carry `"$instanceOf": <type>` next to their fields; the schema
//! extension keywords `function` and `instanceOf` match on those markers.

use crate::errors::{ContractError, ContractResult};
use crate::intercept::GuardedFunction;
use crate::types::ObjectId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Marker key carried by the projection of a callable.
pub const FUNCTION_MARKER: &str = "$function";

/// Marker key carried by the projection of an [`Instance`].
pub const INSTANCE_MARKER: &str = "$instanceOf";

/// Objects nested deeper than this project to `null`.
const MAX_PROJECTION_DEPTH: usize = 64;

/// Values projected per call before the rest project to `null`.
const MAX_PROJECTION_NODES: usize = 100_000;

/// Largest `length` an array-like object may declare.
pub const MAX_ARRAY_LIKE_LEN: usize = 1 << 16;

/// Body of a callable.
pub type NativeFn = Arc<dyn Fn(&[Arg]) -> ContractResult<Arg> + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════
// ARG
// ═══════════════════════════════════════════════════════════════════

/// A dynamically typed argument, return value, or object member.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Plain JSON data.
    Data(Value),

    /// Ordered list of values (argument lists are passed as one of these).
    Array(Vec<Arg>),

    /// A callable.
    Function(Function),

    /// A shared member table.
    Object(Object),

    /// A value of a named nominal type.
    Instance(Instance),
}

impl Arg {
    pub fn null() -> Self {
        Self::Data(Value::Null)
    }

    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(Value::Null) => "null",
            Self::Data(Value::Bool(_)) => "boolean",
            Self::Data(Value::Number(_)) => "number",
            Self::Data(Value::String(_)) => "string",
            Self::Data(Value::Array(_)) | Self::Array(_) => "array",
            Self::Data(Value::Object(_)) => "data object",
            Self::Function(_) => "function",
            Self::Object(_) => "object",
            Self::Instance(_) => "instance",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Data(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Data(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Data(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Data(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Data(Value::Array(_)))
    }

    /// Truthiness: `null`, `false`, `0`, `NaN` and `""` are falsy; every
    /// structured value is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Data(v) => is_truthy(v),
            _ => true,
        }
    }

    /// Items of an array or array-like object.
    ///
    /// An object is array-like when its `length` member is an integer in
    /// `0..=MAX_ARRAY_LIKE_LEN`; its items are the members `"0"` ..
    /// `"length - 1"`, with missing indices read as `null`. Strings are not
    /// array-like.
    pub fn array_items(&self) -> Option<Vec<Arg>> {
        match self {
            Self::Array(items) => Some(items.clone()),
            Self::Data(Value::Array(items)) => Some(items.iter().cloned().map(Arg::Data).collect()),
            Self::Object(object) => {
                let length = object.get("length")?.as_f64()?;
                if !(0.0..=MAX_ARRAY_LIKE_LEN as f64).contains(&length) || length.fract() != 0.0 {
                    return None;
                }
                Some(
                    (0..length as usize)
                        .map(|i| object.get(&i.to_string()).unwrap_or_else(Arg::null))
                        .collect(),
                )
            }
            _ => None,
        }
    }

    /// JSON projection used for schema validation.
    ///
    /// An object reached again through itself projects to `null`, as does
    /// everything past the depth and size limits.
    pub fn to_json(&self) -> Value {
        Projection::default().project(self)
    }
}

/// State of one [`Arg::to_json`] walk.
#[derive(Default)]
struct Projection {
    /// Objects currently being projected, outermost first.
    path: Vec<ObjectId>,
    visited: usize,
}

impl Projection {
    fn project(&mut self, arg: &Arg) -> Value {
        self.visited += 1;
        if self.path.len() > MAX_PROJECTION_DEPTH || self.visited > MAX_PROJECTION_NODES {
            return Value::Null;
        }
        match arg {
            Arg::Data(v) => v.clone(),
            Arg::Array(items) => Value::Array(items.iter().map(|a| self.project(a)).collect()),
            Arg::Function(f) => {
                let mut map = Map::new();
                map.insert(FUNCTION_MARKER.to_string(), Value::String(f.name().to_string()));
                Value::Object(map)
            }
            Arg::Object(o) => {
                let id = o.id();
                if self.path.contains(&id) {
                    return Value::Null;
                }
                // Copied out so self-referencing objects never re-lock the table.
                let members = o.inner.members.read().clone();
                self.path.push(id);
                let projected = members
                    .iter()
                    .map(|(k, v)| (k.clone(), self.project(v)))
                    .collect();
                self.path.pop();
                Value::Object(projected)
            }
            Arg::Instance(i) => {
                let mut map = i.fields.clone();
                map.insert(INSTANCE_MARKER.to_string(), Value::String(i.type_name.clone()));
                Value::Object(map)
            }
        }
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Data(a), Self::Data(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Instance(a), Self::Instance(b)) => a == b,
            _ => false,
        }
    }
}

/// Truthiness of a JSON value, see [`Arg::is_truthy`].
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Data(value)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Self::Data(Value::from(n))
    }
}

impl From<i32> for Arg {
    fn from(n: i32) -> Self {
        Self::Data(Value::from(n))
    }
}

impl From<f64> for Arg {
    fn from(n: f64) -> Self {
        Self::Data(Value::from(n))
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Self::Data(Value::Bool(b))
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Self::Data(Value::String(s.to_string()))
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Self::Data(Value::String(s))
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(items: Vec<Arg>) -> Self {
        Self::Array(items)
    }
}

impl From<Function> for Arg {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl From<Object> for Arg {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

impl From<&Object> for Arg {
    fn from(o: &Object) -> Self {
        Self::Object(o.clone())
    }
}

impl From<Instance> for Arg {
    fn from(i: Instance) -> Self {
        Self::Instance(i)
    }
}

// ═══════════════════════════════════════════════════════════════════
// FUNCTION
// ═══════════════════════════════════════════════════════════════════

#[derive(Clone)]
enum Body {
    Native(NativeFn),
    Guarded(Arc<GuardedFunction>),
}

/// A named callable. Cloning shares the body.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    body: Body,
}

impl Function {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[Arg]) -> ContractResult<Arg> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            body: Body::Native(Arc::new(body)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the callable, running any installed guards.
    pub fn call(&self, args: &[Arg]) -> ContractResult<Arg> {
        match &self.body {
            Body::Native(f) => f(args),
            Body::Guarded(g) => g.call(args),
        }
    }

    /// Number of guards wrapped around the body (0 when unwrapped).
    pub fn guard_count(&self) -> usize {
        match &self.body {
            Body::Native(_) => 0,
            Body::Guarded(g) => g.len(),
        }
    }

    pub fn is_guarded(&self) -> bool {
        matches!(self.body, Body::Guarded(_))
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (&self.body, &other.body) {
            (Body::Native(a), Body::Native(b)) => Arc::ptr_eq(a, b),
            (Body::Guarded(a), Body::Guarded(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Wrap the body on first use; later calls return the existing wrapper.
    pub(crate) fn ensure_guarded(&mut self) -> Arc<GuardedFunction> {
        match &self.body {
            Body::Guarded(g) => g.clone(),
            Body::Native(original) => {
                let guarded = Arc::new(GuardedFunction::new(original.clone()));
                self.body = Body::Guarded(guarded.clone());
                guarded
            }
        }
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("guards", &self.guard_count())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════
// OBJECT
// ═══════════════════════════════════════════════════════════════════

struct ObjectInner {
    id: ObjectId,
    members: RwLock<BTreeMap<String, Arg>>,
}

/// A shared, identity-bearing member table.
///
/// Clones refer to the same table, so a contract attached through one clone
/// guards calls made through every other.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

impl Object {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: ObjectId::new(),
                members: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Add a method (builder style).
    pub fn with_method<F>(self, name: &str, body: F) -> Self
    where
        F: Fn(&[Arg]) -> ContractResult<Arg> + Send + Sync + 'static,
    {
        self.set(name, Function::new(name, body));
        self
    }

    /// Add a data member (builder style).
    pub fn with_member(self, name: &str, value: impl Into<Arg>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&self, name: &str, value: impl Into<Arg>) {
        self.inner.members.write().insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<Arg> {
        self.inner.members.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.members.read().contains_key(name)
    }

    pub fn member_names(&self) -> Vec<String> {
        self.inner.members.read().keys().cloned().collect()
    }

    /// Call the method `name`. Dispatch goes through whatever callable the
    /// member holds now, guarded or not.
    pub fn call(&self, name: &str, args: &[Arg]) -> ContractResult<Arg> {
        // The member is cloned out so the table is unlocked while the body runs.
        match self.get(name) {
            Some(Arg::Function(f)) => f.call(args),
            Some(_) => Err(ContractError::not_a_function(name)),
            None => Err(ContractError::invalid_function_name(name)),
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` on the member under the write lock. `None` if absent.
    pub(crate) fn update_member<R>(&self, name: &str, f: impl FnOnce(&mut Arg) -> R) -> Option<R> {
        let mut members = self.inner.members.write();
        members.get_mut(name).map(f)
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.inner.id)
            .field("members", &self.member_names())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════
// INSTANCE
// ═══════════════════════════════════════════════════════════════════

/// A record of a named nominal type, checked by the `instanceOf` keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    type_name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Instance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}
