//! Attaching pre- and postconditions to a method.
//!
//! [`ContractEngine::attach`] returns a [`ContractHandle`] bound to one
//! method. Each `precondition` / `postcondition` call resolves its
//! condition and installs one more guard on that method; the handle is
//! returned again so clauses chain:
//!
//! ```rust,ignore
//! engine
//!     .attach(&math, "exec")?
//!     .pre([{"type": "number"}, {"type": "number"}, {"function": true}])?
//!     .post("number")?;
//! ```
//!
//! A guard holds the condition *name*, not the compiled condition, and
//! looks it up on every call.

use crate::engine::ContractEngine;
use crate::errors::{ArgumentDiagnostic, ContractError, ContractResult, Violation};
use crate::evaluator::Predicate;
use crate::events::ContractEvent;
use crate::intercept::{install_after, install_before, Target};
use crate::resolver::Condition;
use crate::schema::ValidationReport;
use crate::types::Phase;
use crate::value::Arg;
use std::sync::Arc;
use tracing::debug;

/// Condition name reported for predicate clauses.
pub const PREDICATE_LABEL: &str = "<predicate>";

/// Chainable contract builder for one method.
pub struct ContractHandle<'e> {
    engine: &'e ContractEngine,
    target: Target,
}

/// What an installed guard runs.
#[derive(Clone)]
enum GuardCheck {
    Named(String),
    Predicate(Predicate),
}

impl GuardCheck {
    fn label(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Predicate(_) => PREDICATE_LABEL,
        }
    }
}

impl<'e> ContractHandle<'e> {
    pub(crate) fn new(engine: &'e ContractEngine, target: Target) -> Self {
        Self { engine, target }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn function_name(&self) -> &str {
        self.target.function_name()
    }

    /// Check the argument list before every call.
    pub fn precondition(&self, condition: impl Into<Condition>) -> ContractResult<&Self> {
        self.install(Phase::Precondition, condition.into())
    }

    /// Alias of [`precondition`](Self::precondition).
    pub fn pre(&self, condition: impl Into<Condition>) -> ContractResult<&Self> {
        self.precondition(condition)
    }

    /// Check the return value after every call.
    pub fn postcondition(&self, condition: impl Into<Condition>) -> ContractResult<&Self> {
        self.install(Phase::Postcondition, condition.into())
    }

    /// Alias of [`postcondition`](Self::postcondition).
    pub fn post(&self, condition: impl Into<Condition>) -> ContractResult<&Self> {
        self.postcondition(condition)
    }

    fn install(&self, phase: Phase, condition: Condition) -> ContractResult<&Self> {
        let function = self.target.function_name().to_string();
        let check = match condition {
            Condition::Predicate(predicate) => GuardCheck::Predicate(predicate),
            other => GuardCheck::Named(self.engine.resolve(&other, self.target.owner(), &function)?),
        };
        let label = check.label().to_string();

        let engine = self.engine.clone();
        let name = function.clone();
        let guards = match phase {
            Phase::Precondition => install_before(
                &self.target,
                Arc::new(move |args: &[Arg]| enforce(&engine, &check, &name, Phase::Precondition, args)),
            )?,
            Phase::Postcondition => install_after(
                &self.target,
                Arc::new(move |_args: &[Arg], result: &Arg| {
                    enforce(&engine, &check, &name, Phase::Postcondition, std::slice::from_ref(result))
                }),
            )?,
        };

        debug!(function = %function, condition = %label, %phase, guards, "guard installed");
        self.engine
            .events()
            .emit(ContractEvent::guard_installed(function, label, phase, guards));
        Ok(self)
    }
}

impl std::fmt::Debug for ContractHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("target", &self.target)
            .finish()
    }
}

/// Run one guard. `operands` is the argument list before the call and the
/// single return value after it.
fn enforce(
    engine: &ContractEngine,
    check: &GuardCheck,
    function: &str,
    phase: Phase,
    operands: &[Arg],
) -> ContractResult<()> {
    let report = match check {
        GuardCheck::Named(name) => {
            let condition = engine.registry().lookup(Some(name))?;
            let subject = match phase {
                Phase::Precondition => Arg::Array(operands.to_vec()),
                Phase::Postcondition => operands.first().cloned().unwrap_or_else(Arg::null),
            };
            condition.check(&subject, engine.config().boolean_policy)?
        }
        GuardCheck::Predicate(predicate) => {
            if predicate(engine, operands) {
                ValidationReport::passed()
            } else {
                ValidationReport::failed(vec![])
            }
        }
    };
    if report.valid {
        return Ok(());
    }

    let mut diagnostics: Vec<ArgumentDiagnostic> = report
        .issues
        .into_iter()
        .map(|issue| ArgumentDiagnostic {
            argument: match phase {
                Phase::Precondition => issue.argument_index(),
                Phase::Postcondition => 1,
            },
            message: issue.message,
            instance_path: issue.instance_path,
            schema_path: issue.schema_path,
        })
        .collect();
    if diagnostics.is_empty() {
        diagnostics.push(ArgumentDiagnostic::new(1, "condition failed"));
    }

    let condition = check.label();
    debug!(function, condition, %phase, failures = diagnostics.len(), "contract violated");
    engine
        .events()
        .emit(ContractEvent::violation_raised(function, condition, phase));

    Err(ContractError::violation(Violation {
        function: function.to_string(),
        condition: condition.to_string(),
        phase,
        diagnostics,
    }))
}
