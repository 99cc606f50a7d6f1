//! Evaluating conditions against argument lists.
//!
//! A [`Validator`] is one of:
//!
//! - a condition name, run against the whole argument list as one value;
//! - a predicate closure, called with the engine and the arguments;
//! - a combinator expression: a list of elements, each a comma-separated
//!   list of names aligned with the arguments by position.
//!
//! Combinators read as OR across elements and AND within one:
//!
//! ```text
//! ["a,b", "c,d"] over [x, y]  ==  (a(x) && b(y)) || (c(x) && d(y))
//! ```
//!
//! A blank segment keeps its position and is always satisfied, as is a
//! name with no argument at its position. Extra arguments are ignored.
//! An empty expression is vacuously true.

use crate::config::BooleanPolicy;
use crate::engine::ContractEngine;
use crate::errors::{ContractError, ContractResult};
use crate::value::{Arg, Function};
use serde_json::Value;
use std::sync::Arc;

/// A closure condition, run with the engine it is evaluated by.
pub type Predicate = Arc<dyn Fn(&ContractEngine, &[Arg]) -> bool + Send + Sync>;

/// What to evaluate.
#[derive(Clone)]
pub enum Validator {
    Name(String),
    Predicate(Predicate),
    Combinator(Vec<String>),
}

impl Validator {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&ContractEngine, &[Arg]) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn combinator<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Combinator(elements.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Validator {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Combinator(elements) => f.debug_tuple("Combinator").field(elements).finish(),
        }
    }
}

/// Split one combinator element into positional names.
///
/// Segments are trimmed; blank ones stay as `None` so later names keep
/// their positions.
pub fn parse_element(element: &str) -> Vec<Option<&str>> {
    element
        .split(',')
        .map(|segment| {
            let segment = segment.trim();
            (!segment.is_empty()).then_some(segment)
        })
        .collect()
}

/// A validator given as an untyped value.
enum DynamicValidator {
    Typed(Validator),
    Callable(Function),
}

impl DynamicValidator {
    fn from_arg(validator: &Arg) -> ContractResult<Self> {
        match validator {
            Arg::Data(Value::String(name)) => Ok(Self::Typed(Validator::Name(name.clone()))),
            Arg::Function(f) => Ok(Self::Callable(f.clone())),
            Arg::Array(_) | Arg::Data(Value::Array(_)) => {
                let names: Option<Vec<String>> = validator
                    .array_items()
                    .unwrap_or_default()
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                names
                    .map(|names| Self::Typed(Validator::Combinator(names)))
                    .ok_or_else(|| ContractError::invalid_validator("array with non-string items"))
            }
            other => Err(ContractError::invalid_validator(other.kind())),
        }
    }
}

impl ContractEngine {
    /// Evaluate `validator` against `args`.
    pub fn evaluate(&self, validator: &Validator, args: &[Arg]) -> ContractResult<bool> {
        match validator {
            Validator::Name(name) => {
                let condition = self.registry().lookup(Some(name))?;
                let report = condition.check(&Arg::Array(args.to_vec()), self.config().boolean_policy)?;
                Ok(report.valid)
            }
            Validator::Predicate(predicate) => Ok(predicate(self, args)),
            Validator::Combinator(elements) => self.evaluate_combinator(elements, args),
        }
    }

    /// [`evaluate`](Self::evaluate) over untyped input.
    ///
    /// `validator` must be a string, a list of strings or a function;
    /// `args` must be a list or an array-like object.
    ///
    /// A function validator is called with the items alone; use
    /// [`Validator::Predicate`] when it needs the engine. A boolean result
    /// is returned as is, anything else is read through the configured
    /// [`BooleanPolicy`].
    pub fn evaluate_dynamic(&self, validator: &Arg, args: &Arg) -> ContractResult<bool> {
        let validator = DynamicValidator::from_arg(validator)?;
        let items = args
            .array_items()
            .ok_or_else(|| ContractError::invalid_args(args.kind()))?;

        match validator {
            DynamicValidator::Typed(v) => self.evaluate(&v, &items),
            DynamicValidator::Callable(f) => match f.call(&items)? {
                Arg::Data(Value::Bool(holds)) => Ok(holds),
                other => match self.config().boolean_policy {
                    BooleanPolicy::Truthy => Ok(other.is_truthy()),
                    BooleanPolicy::Strict => {
                        Err(ContractError::non_boolean_result(f.name(), &other.to_json()))
                    }
                },
            },
        }
    }

    /// Whether `subject` satisfies the condition registered as `name`.
    pub fn fulfills<'n>(&self, name: impl Into<Option<&'n str>>, subject: &Arg) -> ContractResult<bool> {
        let condition = self.registry().lookup(name.into())?;
        Ok(condition.check(subject, self.config().boolean_policy)?.valid)
    }

    /// Fail with `ASSERTION_FAILED` unless `subject` satisfies `name`.
    pub fn assert<'n>(&self, name: impl Into<Option<&'n str>>, subject: &Arg) -> ContractResult<&Self> {
        let name = name.into();
        if self.fulfills(name, subject)? {
            Ok(self)
        } else {
            Err(ContractError::assertion_failed(
                name.unwrap_or_default().trim(),
                &subject.to_json(),
            ))
        }
    }

    fn evaluate_combinator(&self, elements: &[String], args: &[Arg]) -> ContractResult<bool> {
        if elements.is_empty() {
            return Ok(true);
        }
        for element in elements {
            if self.element_holds(element, args)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn element_holds(&self, element: &str, args: &[Arg]) -> ContractResult<bool> {
        for (position, segment) in parse_element(element).into_iter().enumerate() {
            let (Some(name), Some(arg)) = (segment, args.get(position)) else {
                continue;
            };
            let condition = self.registry().lookup(Some(name))?;
            if !condition.check(arg, BooleanPolicy::Truthy)?.valid {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
