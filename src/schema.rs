//! Structural schema compilation.
//!
//! The registry treats the compiler as an opaque service behind
//! [`SchemaCompiler`]: a definition either compiles into a
//! [`CompiledSchema`] or is rejected with a reason. The default
//! [`JsonSchemaCompiler`] is backed by the `jsonschema` crate.
//!
//! Two extension keywords are lowered into plain JSON Schema before
//! compilation:
//!
//! - `"function": true` accepts callables (projected as `{"$function": ..}`);
//!   `false` rejects them.
//! - `"instanceOf": "Point"` (or a list of type names) accepts only
//!   instances of that nominal type.

use crate::config::SchemaDraft;
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const FUNCTION_KEYWORD: &str = "function";
pub const INSTANCE_OF_KEYWORD: &str = "instanceOf";

/// Keywords whose value is a single subschema.
const SCHEMA_KEYWORDS: &[&str] = &[
    "additionalItems",
    "additionalProperties",
    "contains",
    "not",
    "if",
    "then",
    "else",
    "propertyNames",
    "unevaluatedItems",
    "unevaluatedProperties",
];

/// Keywords whose value is a subschema or a list of subschemas.
const SCHEMA_LIST_KEYWORDS: &[&str] = &["items", "allOf", "anyOf", "oneOf", "prefixItems"];

/// Keywords whose value maps names to subschemas.
const SCHEMA_MAP_KEYWORDS: &[&str] = &[
    "properties",
    "patternProperties",
    "definitions",
    "$defs",
    "dependencies",
    "dependentSchemas",
];

// ═══════════════════════════════════════════════════════════════════
// REPORTS
// ═══════════════════════════════════════════════════════════════════

/// One failed structural check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer into the validated value (`""` for the root)
    pub instance_path: String,

    /// JSON pointer into the schema
    pub schema_path: String,

    /// Human-readable message
    pub message: String,
}

impl ValidationIssue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            instance_path: String::new(),
            schema_path: String::new(),
            message: message.into(),
        }
    }

    /// 1-based index of the list item this issue points into.
    ///
    /// Absent, root, or non-numeric paths yield 1.
    pub fn argument_index(&self) -> usize {
        self.instance_path
            .split('/')
            .nth(1)
            .and_then(|segment| segment.parse::<usize>().ok())
            .map(|i| i + 1)
            .unwrap_or(1)
    }
}

/// Outcome of validating one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,

    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn passed() -> Self {
        Self {
            valid: true,
            issues: vec![],
        }
    }

    pub fn failed(issues: Vec<ValidationIssue>) -> Self {
        Self {
            valid: false,
            issues,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// COMPILER SEAM
// ═══════════════════════════════════════════════════════════════════

/// A compiled structural validator.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, instance: &Value) -> ValidationReport;
}

/// Compiles schema definitions into validators.
pub trait SchemaCompiler: Send + Sync {
    /// Compile `definition`, or explain why it is not a valid schema.
    fn compile(&self, definition: &Value) -> Result<CompiledSchema, String>;

    /// Check that `definition` is well-formed without keeping the result.
    fn check(&self, definition: &Value) -> Result<(), String> {
        self.compile(definition).map(|_| ())
    }
}

/// A definition together with its compiled validator.
#[derive(Clone)]
pub struct CompiledSchema {
    definition: Value,
    validator: Arc<dyn SchemaValidator>,
}

impl CompiledSchema {
    pub fn new(definition: Value, validator: Arc<dyn SchemaValidator>) -> Self {
        Self {
            definition,
            validator,
        }
    }

    /// The definition as supplied, before extension lowering.
    pub fn definition(&self) -> &Value {
        &self.definition
    }

    pub fn validate(&self, instance: &Value) -> ValidationReport {
        self.validator.validate(instance)
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validate(instance).valid
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("definition", &self.definition)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════
// JSON SCHEMA BACKEND
// ═══════════════════════════════════════════════════════════════════

/// [`SchemaCompiler`] backed by the `jsonschema` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaCompiler {
    draft: SchemaDraft,
}

impl JsonSchemaCompiler {
    pub fn new(draft: SchemaDraft) -> Self {
        Self { draft }
    }

    pub fn draft(&self) -> SchemaDraft {
        self.draft
    }
}

impl SchemaCompiler for JsonSchemaCompiler {
    fn compile(&self, definition: &Value) -> Result<CompiledSchema, String> {
        match definition {
            Value::Object(map) if map.is_empty() => {
                return Err("the schema declares no keywords".to_string());
            }
            Value::Object(_) => {}
            other => return Err(format!("expected a schema object, got {}", json_kind(other))),
        }

        let lowered = lower_extensions(definition)?;
        let validator = jsonschema::options()
            .with_draft(draft_of(self.draft))
            .build(&lowered)
            .map_err(|e| e.to_string())?;

        Ok(CompiledSchema::new(
            definition.clone(),
            Arc::new(JsonSchemaValidator { inner: validator }),
        ))
    }
}

struct JsonSchemaValidator {
    inner: jsonschema::Validator,
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, instance: &Value) -> ValidationReport {
        let issues: Vec<ValidationIssue> = self
            .inner
            .iter_errors(instance)
            .map(|e| ValidationIssue {
                instance_path: e.instance_path.to_string(),
                schema_path: e.schema_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        if issues.is_empty() {
            ValidationReport::passed()
        } else {
            ValidationReport::failed(issues)
        }
    }
}

fn draft_of(draft: SchemaDraft) -> Draft {
    match draft {
        SchemaDraft::Draft4 => Draft::Draft4,
        SchemaDraft::Draft6 => Draft::Draft6,
        SchemaDraft::Draft7 => Draft::Draft7,
        SchemaDraft::Draft201909 => Draft::Draft201909,
        SchemaDraft::Draft202012 => Draft::Draft202012,
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ═══════════════════════════════════════════════════════════════════
// EXTENSION KEYWORDS
// ═══════════════════════════════════════════════════════════════════

/// Rewrite `function` / `instanceOf` into standard keywords.
///
/// Each occurrence is removed from its schema node and an equivalent clause
/// is appended to that node's `allOf`. Only subschema positions are walked,
/// so a property *named* `function` is left alone.
pub fn lower_extensions(schema: &Value) -> Result<Value, String> {
    lower(schema, "#")
}

fn lower(node: &Value, path: &str) -> Result<Value, String> {
    let Value::Object(map) = node else {
        return Ok(node.clone());
    };

    let mut out = Map::new();
    let mut clauses = Vec::new();

    for (key, value) in map {
        let here = format!("{}/{}", path, key);
        let lowered = match key.as_str() {
            FUNCTION_KEYWORD => {
                clauses.push(function_clause(value, &here)?);
                continue;
            }
            INSTANCE_OF_KEYWORD => {
                clauses.push(instance_clause(value, &here)?);
                continue;
            }
            k if SCHEMA_KEYWORDS.contains(&k) => lower(value, &here)?,
            k if SCHEMA_LIST_KEYWORDS.contains(&k) => match value {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| lower(item, &format!("{}/{}", here, i)))
                        .collect::<Result<_, _>>()?,
                ),
                other => lower(other, &here)?,
            },
            k if SCHEMA_MAP_KEYWORDS.contains(&k) => match value {
                Value::Object(entries) => Value::Object(
                    entries
                        .iter()
                        .map(|(name, sub)| Ok((name.clone(), lower(sub, &format!("{}/{}", here, name))?)))
                        .collect::<Result<_, String>>()?,
                ),
                other => other.clone(),
            },
            _ => value.clone(),
        };
        out.insert(key.clone(), lowered);
    }

    if !clauses.is_empty() {
        match out.get_mut("allOf") {
            Some(Value::Array(all)) => all.extend(clauses),
            Some(_) => return Err(format!("`allOf` at {} must be an array", path)),
            None => {
                out.insert("allOf".to_string(), Value::Array(clauses));
            }
        }
    }

    Ok(Value::Object(out))
}

fn function_clause(value: &Value, path: &str) -> Result<Value, String> {
    let callable = json!({ "type": "object", "required": ["$function"] });
    match value {
        Value::Bool(true) => Ok(callable),
        Value::Bool(false) => Ok(json!({ "not": callable })),
        other => Err(format!(
            "`{}` at {} must be a boolean, got {}",
            FUNCTION_KEYWORD,
            path,
            json_kind(other)
        )),
    }
}

fn instance_clause(value: &Value, path: &str) -> Result<Value, String> {
    let names: Vec<Value> = match value {
        Value::String(name) if !name.is_empty() => vec![Value::String(name.clone())],
        Value::Array(items) if !items.is_empty() && items.iter().all(|i| i.is_string()) => items.clone(),
        _ => {
            return Err(format!(
                "`{}` at {} must be a type name or a non-empty list of type names",
                INSTANCE_OF_KEYWORD, path
            ))
        }
    };
    Ok(json!({
        "type": "object",
        "required": ["$instanceOf"],
        "properties": { "$instanceOf": { "enum": names } }
    }))
}
