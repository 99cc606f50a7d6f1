//! # Agentic Guards v0.1.0
//!
//! Runtime design-by-contract for functions.
//!
//! Conditions are registered once under a name, then attached to methods as
//! pre- or postconditions. Every call through a guarded method is checked:
//! arguments before the body runs, the return value after.
//!
//! - **Registry**: versioned, append-only map of compiled conditions,
//!   published as immutable snapshots
//! - **Schemas**: JSON Schema plus the `function` and `instanceOf`
//!   extension keywords, compiled by the `jsonschema` crate
//! - **Resolver**: named conditions, inline schemas and inline tuples;
//!   inline schemas are registered under content-addressed names
//! - **Interceptor**: guard lists wrapped around method bodies
//! - **Evaluator**: names, predicates and AND/OR combinator expressions
//! - **Events**: broadcast of definitions, installs and violations
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! agentic-guards = "0.1"
//! ```
//!
//! ```rust,ignore
//! use agentic_guards::prelude::*;
//! use serde_json::json;
//!
//! let engine = ContractEngine::new();
//! engine.define("two-numbers", &json!({
//!     "type": "array",
//!     "items": [{ "type": "number" }, { "type": "number" }]
//! }))?;
//!
//! let math = Object::new().with_method("add", |args: &[Arg]| {
//!     let sum: f64 = args.iter().filter_map(Arg::as_f64).sum();
//!     Ok(Arg::from(sum))
//! });
//!
//! engine.attach(&math, "add")?.pre("two-numbers")?;
//!
//! assert_eq!(math.call("add", &[Arg::from(3), Arg::from(3)])?.as_f64(), Some(6.0));
//! let err = math.call("add", &[Arg::from(3), Arg::from("3")]).unwrap_err();
//! assert_eq!(err.code, ErrorCode::PreconditionViolation);
//! ```
//!
//! ## Guarantees
//!
//! - A snapshot never changes after it is handed out
//! - A failing precondition stops the body from running
//! - A failing postcondition replaces the result with the error

pub mod config;
pub mod contract;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod events;
pub mod intercept;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod types;
pub mod value;

// Re-export everything in prelude for convenience
pub mod prelude {
    pub use crate::config::*;
    pub use crate::contract::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::evaluator::*;
    pub use crate::events::*;
    pub use crate::intercept::*;
    pub use crate::registry::*;
    pub use crate::resolver::*;
    pub use crate::schema::*;
    pub use crate::types::*;
    pub use crate::value::*;
}

// Also re-export at crate root
pub use prelude::*;
