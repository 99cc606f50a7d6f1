//! Guard installation around object methods.
//!
//! The first guard installed on a method replaces the member's body with a
//! [`GuardedFunction`] that owns the original body plus an ordered guard
//! list. Every later install appends to that list. Wrapping is permanent.
//!
//! ```text
//! Unwrapped ──install──▶ Wrapped([g1]) ──install──▶ Wrapped([g1, g2]) ...
//! ```
//!
//! On a call, before-guards run in install order and the first failure
//! stops the call before the body runs. After-guards run in install order
//! once the body returned; a failure replaces the result with the error.

use crate::errors::{ContractError, ContractResult};
use crate::value::{Arg, NativeFn, Object};
use parking_lot::RwLock;
use std::sync::Arc;

/// Guard run against the argument list before the body.
pub type BeforeHook = Arc<dyn Fn(&[Arg]) -> ContractResult<()> + Send + Sync>;

/// Guard run against the argument list and the result after the body.
pub type AfterHook = Arc<dyn Fn(&[Arg], &Arg) -> ContractResult<()> + Send + Sync>;

/// One installed guard.
#[derive(Clone)]
pub enum Guard {
    Before(BeforeHook),
    After(AfterHook),
}

/// A method body wrapped with guards.
pub struct GuardedFunction {
    original: NativeFn,
    guards: RwLock<Vec<Guard>>,
}

impl GuardedFunction {
    pub(crate) fn new(original: NativeFn) -> Self {
        Self {
            original,
            guards: RwLock::new(Vec::new()),
        }
    }

    /// Number of installed guards.
    pub fn len(&self) -> usize {
        self.guards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.read().is_empty()
    }

    fn push(&self, guard: Guard) -> usize {
        let mut guards = self.guards.write();
        guards.push(guard);
        guards.len()
    }

    pub(crate) fn call(&self, args: &[Arg]) -> ContractResult<Arg> {
        // Copied so a guard may install further guards without deadlocking.
        let guards = self.guards.read().clone();

        for guard in &guards {
            if let Guard::Before(hook) = guard {
                hook(args)?;
            }
        }

        let result = (self.original)(args)?;

        for guard in &guards {
            if let Guard::After(hook) = guard {
                hook(args, &result)?;
            }
        }

        Ok(result)
    }
}

/// A method on an owner object: the unit a contract is attached to.
#[derive(Debug, Clone)]
pub struct Target {
    owner: Object,
    function_name: String,
}

impl Target {
    /// Validate that `owner` is an object whose member `function_name` is
    /// callable right now.
    pub fn resolve(owner: &Arg, function_name: &str) -> ContractResult<Self> {
        let Arg::Object(object) = owner else {
            return Err(ContractError::invalid_owner(owner.kind()));
        };
        if function_name.trim().is_empty() {
            return Err(ContractError::invalid_function_name(function_name));
        }
        match object.get(function_name) {
            None => Err(ContractError::invalid_function_name(function_name)),
            Some(Arg::Function(_)) => Ok(Self {
                owner: object.clone(),
                function_name: function_name.to_string(),
            }),
            Some(_) => Err(ContractError::not_a_function(function_name)),
        }
    }

    pub fn owner(&self) -> &Object {
        &self.owner
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }
}

/// Install a guard that runs before the target's body.
///
/// Returns the number of guards on the target after the install.
pub fn install_before(target: &Target, hook: BeforeHook) -> ContractResult<usize> {
    install(target, Guard::Before(hook))
}

/// Install a guard that runs after the target's body.
///
/// Returns the number of guards on the target after the install.
pub fn install_after(target: &Target, hook: AfterHook) -> ContractResult<usize> {
    install(target, Guard::After(hook))
}

fn install(target: &Target, guard: Guard) -> ContractResult<usize> {
    let name = target.function_name();
    target
        .owner()
        .update_member(name, |member| match member {
            Arg::Function(f) => Ok(f.ensure_guarded().push(guard)),
            _ => Err(ContractError::not_a_function(name)),
        })
        .unwrap_or_else(|| Err(ContractError::invalid_function_name(name)))
}
