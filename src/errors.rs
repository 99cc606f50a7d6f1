//! Error types for registration, resolution, attachment and enforcement.
//!
//! Every failure is a [`ContractError`] with a machine-readable
//! [`ErrorCode`]. Two families:
//!
//! 1. **Setup errors**: bad names, bad schemas, duplicates, unknown
//!    conditions, bad targets. Raised by `define`, `attach` and
//!    `precondition`; the registry and installed guards are left untouched.
//!
//! 2. **Violations**: a guarded call whose arguments or return value failed
//!    a condition. These carry a [`Violation`] with per-argument diagnostics.

use crate::types::{Metadata, Phase};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════

/// Error codes raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ═══════════════════════════════════════════════════════
    // REGISTRATION
    // ═══════════════════════════════════════════════════════
    /// Condition name is empty or blank
    InvalidName,

    /// Definition rejected by the schema compiler
    InvalidSchema,

    /// Name already present in the current snapshot
    DuplicateName,

    /// Batch definition input is not a list of `{name, schema}` objects
    InvalidDefinitionList,

    // ═══════════════════════════════════════════════════════
    // RESOLUTION
    // ═══════════════════════════════════════════════════════
    /// Name not present in the registry
    UnknownCondition,

    /// Condition is neither a name, an inline schema nor an inline tuple
    InvalidConditionType,

    // ═══════════════════════════════════════════════════════
    // ATTACHMENT
    // ═══════════════════════════════════════════════════════
    /// Owner is not an object
    InvalidOwner,

    /// Function name is blank or not a member of the owner
    InvalidFunctionName,

    /// Member exists but is not callable
    NotAFunction,

    // ═══════════════════════════════════════════════════════
    // EVALUATION
    // ═══════════════════════════════════════════════════════
    /// Argument list is not array-like
    InvalidArgs,

    /// Validator is not a name, a name list or a function
    InvalidValidator,

    /// Predicate condition returned something other than a boolean
    NonBooleanResult,

    /// `assert` on a subject that does not fulfill the condition
    AssertionFailed,

    // ═══════════════════════════════════════════════════════
    // ENFORCEMENT
    // ═══════════════════════════════════════════════════════
    /// Arguments failed a precondition; the body did not run
    PreconditionViolation,

    /// Return value failed a postcondition; the body already ran
    PostconditionViolation,
}

impl ErrorCode {
    /// Whether this code is raised by a guarded call rather than by setup.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            Self::PreconditionViolation | Self::PostconditionViolation
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidName => "INVALID_NAME",
            Self::InvalidSchema => "INVALID_SCHEMA",
            Self::DuplicateName => "DUPLICATE_NAME",
            Self::InvalidDefinitionList => "INVALID_DEFINITION_LIST",
            Self::UnknownCondition => "UNKNOWN_CONDITION",
            Self::InvalidConditionType => "INVALID_CONDITION_TYPE",
            Self::InvalidOwner => "INVALID_OWNER",
            Self::InvalidFunctionName => "INVALID_FUNCTION_NAME",
            Self::NotAFunction => "NOT_A_FUNCTION",
            Self::InvalidArgs => "INVALID_ARGS",
            Self::InvalidValidator => "INVALID_VALIDATOR",
            Self::NonBooleanResult => "NON_BOOLEAN_RESULT",
            Self::AssertionFailed => "ASSERTION_FAILED",
            Self::PreconditionViolation => "PRECONDITION_VIOLATION",
            Self::PostconditionViolation => "POSTCONDITION_VIOLATION",
        };
        write!(f, "{}", s)
    }
}

// ═══════════════════════════════════════════════════════════════════
// VIOLATION DETAIL
// ═══════════════════════════════════════════════════════════════════

/// One failing structural check, attributed to an argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDiagnostic {
    /// 1-based argument index
    pub argument: usize,

    /// Human-readable message from the validator
    pub message: String,

    /// JSON pointer into the validated value
    #[serde(default)]
    pub instance_path: String,

    /// JSON pointer into the schema
    #[serde(default)]
    pub schema_path: String,
}

impl ArgumentDiagnostic {
    pub fn new(argument: usize, message: impl Into<String>) -> Self {
        Self {
            argument,
            message: message.into(),
            instance_path: String::new(),
            schema_path: String::new(),
        }
    }
}

impl std::fmt::Display for ArgumentDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "argument {}: {}", self.argument, self.message)
    }
}

/// Payload of a pre/postcondition violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Guarded function
    pub function: String,

    /// Condition that failed
    pub condition: String,

    /// Which side of the call failed
    pub phase: Phase,

    /// Per-argument detail, in validator order
    pub diagnostics: Vec<ArgumentDiagnostic>,
}

impl Violation {
    /// 1-based indices of the failing arguments, deduplicated, in order.
    pub fn failing_arguments(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = Vec::new();
        for d in &self.diagnostics {
            if !indices.contains(&d.argument) {
                indices.push(d.argument);
            }
        }
        indices
    }
}

// ═══════════════════════════════════════════════════════════════════
// CONTRACT ERROR
// ═══════════════════════════════════════════════════════════════════

/// The single error type of the crate.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct ContractError {
    /// Error code (machine-readable)
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,

    /// Additional context (for debugging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Metadata>,

    /// Present for pre/postcondition violations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<Violation>,
}

impl ContractError {
    /// Create a new error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            violation: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let context = self.context.get_or_insert_with(Metadata::new);
        if let Ok(v) = serde_json::to_value(value) {
            context.insert(key.into(), v);
        }
        self
    }

    /// Whether this error was raised by a guarded call.
    pub fn is_violation(&self) -> bool {
        self.code.is_violation()
    }

    // ═══════════════════════════════════════════════════════════
    // Constructors
    // ═══════════════════════════════════════════════════════════

    pub fn invalid_name(name: &str) -> Self {
        Self::new(
            ErrorCode::InvalidName,
            "The condition name must be a non-empty string",
        )
        .with_context("name", name)
    }

    pub fn invalid_schema(name: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            ErrorCode::InvalidSchema,
            format!("Definition of `{}` is not a valid schema: {}", name, reason),
        )
        .with_context("name", name)
        .with_context("reason", reason)
    }

    pub fn duplicate_name(name: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateName,
            format!("Condition `{}` is already registered", name),
        )
        .with_context("name", name)
    }

    pub fn invalid_definition_list(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidDefinitionList,
            format!(
                "Definitions must be an array of objects with `name` and `schema`: {}",
                reason.into()
            ),
        )
    }

    pub fn unknown_condition(name: Option<&str>) -> Self {
        let shown = name.unwrap_or("<none>");
        Self::new(
            ErrorCode::UnknownCondition,
            format!("Condition `{}` is not registered", shown),
        )
        .with_context("name", name)
    }

    pub fn invalid_condition_type(kind: &str) -> Self {
        Self::new(
            ErrorCode::InvalidConditionType,
            format!(
                "A condition must be a name, a schema object or a list of item schemas, got {}",
                kind
            ),
        )
    }

    pub fn invalid_owner(kind: &str) -> Self {
        Self::new(
            ErrorCode::InvalidOwner,
            format!("The target must be an object, got {}", kind),
        )
    }

    pub fn invalid_function_name(function: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFunctionName,
            format!("`{}` is not a member of the target object", function),
        )
        .with_context("function", function)
    }

    pub fn not_a_function(function: &str) -> Self {
        Self::new(
            ErrorCode::NotAFunction,
            format!("Member `{}` of the target object is not a function", function),
        )
        .with_context("function", function)
    }

    pub fn invalid_args(kind: &str) -> Self {
        Self::new(
            ErrorCode::InvalidArgs,
            format!("The arguments must be array-like, got {}", kind),
        )
    }

    pub fn invalid_validator(kind: &str) -> Self {
        Self::new(
            ErrorCode::InvalidValidator,
            format!(
                "A validator must be a name, an array of names or a function, got {}",
                kind
            ),
        )
    }

    pub fn non_boolean_result(name: &str, returned: &serde_json::Value) -> Self {
        Self::new(
            ErrorCode::NonBooleanResult,
            format!("Condition `{}` did not return a boolean", name),
        )
        .with_context("name", name)
        .with_context("returned", returned)
    }

    pub fn assertion_failed(name: &str, subject: &serde_json::Value) -> Self {
        Self::new(
            ErrorCode::AssertionFailed,
            format!("Condition `{}` failed by {}", name, subject),
        )
        .with_context("name", name)
    }

    /// A failed guard. The message lists every diagnostic.
    pub fn violation(violation: Violation) -> Self {
        let code = match violation.phase {
            Phase::Precondition => ErrorCode::PreconditionViolation,
            Phase::Postcondition => ErrorCode::PostconditionViolation,
        };
        let details: Vec<String> = violation.diagnostics.iter().map(|d| d.to_string()).collect();
        let message = format!(
            "`{}` failed {} `{}`: {}",
            violation.function,
            violation.phase,
            violation.condition,
            details.join("; ")
        );
        Self {
            code,
            message,
            context: None,
            violation: Some(violation),
        }
    }
}

/// Result type alias for engine operations
pub type ContractResult<T> = Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ContractError::unknown_condition(Some("noContract"));
        assert_eq!(err.code, ErrorCode::UnknownCondition);
        assert!(err.message.contains("noContract"));
        assert!(!err.is_violation());
    }

    #[test]
    fn test_error_with_context() {
        let err = ContractError::duplicate_name("two-numbers");
        let ctx = err.context.unwrap();
        assert_eq!(ctx.get("name").unwrap(), "two-numbers");
    }

    #[test]
    fn test_violation_message_lists_diagnostics() {
        let err = ContractError::violation(Violation {
            function: "add".into(),
            condition: "two-numbers".into(),
            phase: Phase::Precondition,
            diagnostics: vec![ArgumentDiagnostic::new(2, "\"3\" is not of type \"number\"")],
        });
        assert_eq!(err.code, ErrorCode::PreconditionViolation);
        assert!(err.is_violation());
        assert!(err.message.contains("`add` failed precondition `two-numbers`"));
        assert!(err.message.contains("argument 2"));
    }

    #[test]
    fn test_failing_arguments_deduplicated() {
        let violation = Violation {
            function: "f".into(),
            condition: "c".into(),
            phase: Phase::Precondition,
            diagnostics: vec![
                ArgumentDiagnostic::new(2, "a"),
                ArgumentDiagnostic::new(1, "b"),
                ArgumentDiagnostic::new(2, "c"),
            ],
        };
        assert_eq!(violation.failing_arguments(), vec![2, 1]);
    }

    #[test]
    fn test_error_serialization() {
        let err = ContractError::not_a_function("name");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("NOT_A_FUNCTION"));

        let recovered: ContractError = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered.code, ErrorCode::NotAFunction);
    }
}
