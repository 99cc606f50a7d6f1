//! End-to-end contracts on a small math library.
//!
//! The library object carries three methods:
//! - `add(a, b)`:            a + b
//! - `bad_add(a, b)`:        always returns the string "a + b"
//! - `exec(a, b, op)`:       op(a, b)
//!
//! Each test builds its own engine and library, so no state leaks between
//! tests.

use agentic_guards::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ═══════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════

const ONE_NUMBER: &str = "one-number";
const TWO_NUMBERS: &str = "two-numbers";

fn one_number() -> Value {
    json!({ "type": "number" })
}

fn two_numbers() -> Value {
    json!({ "type": "array", "items": [{ "type": "number" }, { "type": "number" }] })
}

fn number(args: &[Arg], i: usize) -> f64 {
    args.get(i).and_then(Arg::as_f64).unwrap_or(f64::NAN)
}

/// The library plus a counter of how often `add`'s body ran.
fn math_library() -> (Object, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let lib = Object::new()
        .with_method("add", move |args: &[Arg]| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arg::from(number(args, 0) + number(args, 1)))
        })
        .with_method("bad_add", |_args: &[Arg]| Ok(Arg::from("a + b")))
        .with_method("exec", |args: &[Arg]| {
            let op = args
                .get(2)
                .and_then(Arg::as_function)
                .ok_or_else(|| ContractError::not_a_function("op"))?;
            op.call(&args[..2])
        });
    (lib, calls)
}

fn engine() -> ContractEngine {
    let engine = ContractEngine::new();
    engine
        .define(ONE_NUMBER, &one_number())
        .unwrap()
        .define(TWO_NUMBERS, &two_numbers())
        .unwrap();
    engine
}

fn call(lib: &Object, name: &str, args: &[Arg]) -> ContractResult<Arg> {
    lib.call(name, args)
}

// ═══════════════════════════════════════════════════════════════════
// PRECONDITIONS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_precondition_allows_valid_arguments() {
    let engine = engine();
    let (lib, _) = math_library();
    engine.attach(&lib, "add").unwrap().precondition(TWO_NUMBERS).unwrap();

    let result = call(&lib, "add", &[Arg::from(3), Arg::from(3)]).unwrap();
    assert_eq!(result.as_f64(), Some(6.0));
}

#[test]
fn test_precondition_names_failing_argument() {
    let engine = engine();
    let (lib, _) = math_library();
    engine.attach(&lib, "add").unwrap().precondition(TWO_NUMBERS).unwrap();

    let err = call(&lib, "add", &[Arg::from(3), Arg::from("3")]).unwrap_err();
    assert_eq!(err.code, ErrorCode::PreconditionViolation);

    let violation = err.violation.unwrap();
    assert_eq!(violation.function, "add");
    assert_eq!(violation.condition, TWO_NUMBERS);
    assert_eq!(violation.phase, Phase::Precondition);
    assert_eq!(violation.failing_arguments(), vec![2]);
}

#[test]
fn test_precondition_blocks_body() {
    let engine = engine();
    let (lib, calls) = math_library();
    engine.attach(&lib, "add").unwrap().pre(TWO_NUMBERS).unwrap();

    assert!(call(&lib, "add", &[Arg::from("3"), Arg::from(3)]).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    call(&lib, "add", &[Arg::from(1), Arg::from(2)]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_precondition_reports_every_failing_argument() {
    let engine = engine();
    let (lib, _) = math_library();
    engine.attach(&lib, "add").unwrap().pre(TWO_NUMBERS).unwrap();

    let err = call(&lib, "add", &[Arg::from("x"), Arg::from("y")]).unwrap_err();
    let mut failing = err.violation.unwrap().failing_arguments();
    failing.sort_unstable();
    assert_eq!(failing, vec![1, 2]);
}

#[test]
fn test_unregistered_condition_is_rejected_at_attach() {
    let engine = engine();
    let (lib, _) = math_library();
    let handle = engine.attach(&lib, "add").unwrap();

    for name in ["", "   ", "noContract"] {
        assert_eq!(
            handle.precondition(name).unwrap_err().code,
            ErrorCode::UnknownCondition
        );
        assert_eq!(
            handle.postcondition(name).unwrap_err().code,
            ErrorCode::UnknownCondition
        );
    }
    assert_eq!(
        Condition::from_json(json!(null)).unwrap_err().code,
        ErrorCode::InvalidConditionType
    );
}

// ═══════════════════════════════════════════════════════════════════
// POSTCONDITIONS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_postcondition_returns_valid_output() {
    let engine = engine();
    let (lib, _) = math_library();
    engine.attach(&lib, "add").unwrap().postcondition(ONE_NUMBER).unwrap();

    let result = call(&lib, "add", &[Arg::from(2), Arg::from(5)]).unwrap();
    assert_eq!(result.as_f64(), Some(7.0));
}

#[test]
fn test_postcondition_taints_invalid_output() {
    let engine = engine();
    let (lib, _) = math_library();
    engine.attach(&lib, "bad_add").unwrap().post(ONE_NUMBER).unwrap();

    let err = call(&lib, "bad_add", &[Arg::from(2), Arg::from(5)]).unwrap_err();
    assert_eq!(err.code, ErrorCode::PostconditionViolation);
    let violation = err.violation.unwrap();
    assert_eq!(violation.function, "bad_add");
    assert_eq!(violation.failing_arguments(), vec![1]);
}

#[test]
fn test_postcondition_runs_body_first() {
    let engine = engine();
    let (lib, calls) = math_library();
    engine
        .attach(&lib, "add")
        .unwrap()
        .post(Condition::schema(json!({ "type": "number", "maximum": 10 })))
        .unwrap();

    assert!(call(&lib, "add", &[Arg::from(8), Arg::from(8)]).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_pre_and_post_chain_on_one_handle() {
    let engine = engine();
    let (lib, calls) = math_library();
    let handle = engine.attach(&lib, "add").unwrap();
    let chained = handle.pre(TWO_NUMBERS).unwrap().post(ONE_NUMBER).unwrap();
    assert!(std::ptr::eq(chained, &handle));

    assert_eq!(call(&lib, "add", &[Arg::from(1), Arg::from(1)]).unwrap().as_f64(), Some(2.0));
    assert!(call(&lib, "add", &[Arg::from(1), Arg::null()]).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let add = lib.get("add").unwrap();
    assert_eq!(add.as_function().unwrap().guard_count(), 2);
}

#[test]
fn test_guards_accumulate_across_handles() {
    let engine = engine();
    let (lib, _) = math_library();
    engine.attach(&lib, "add").unwrap().pre(TWO_NUMBERS).unwrap();
    engine
        .attach(&lib, "add")
        .unwrap()
        .pre(Condition::tuple(vec![json!({ "minimum": 0 }), json!({ "minimum": 0 })]))
        .unwrap();

    assert!(call(&lib, "add", &[Arg::from(1), Arg::from(2)]).is_ok());
    let err = call(&lib, "add", &[Arg::from(1), Arg::from(-2)]).unwrap_err();
    let violation = err.violation.unwrap();
    assert!(violation.condition.starts_with("inline:add:"));
    assert_eq!(violation.failing_arguments(), vec![2]);
}

// ═══════════════════════════════════════════════════════════════════
// EXTENSION KEYWORDS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_function_keyword_in_precondition() {
    let engine = ContractEngine::new();
    let (lib, _) = math_library();
    engine
        .define("add", &two_numbers())
        .unwrap()
        .define(
            "exec",
            &json!({
                "type": "array",
                "items": [{ "type": "number" }, { "type": "number" }, { "function": true }]
            }),
        )
        .unwrap();
    engine.attach(&lib, "add").unwrap().precondition("add").unwrap();
    engine.attach(&lib, "exec").unwrap().precondition("exec").unwrap();

    let add = lib.get("add").unwrap();
    let result = call(&lib, "exec", &[Arg::from(2), Arg::from(3), add]).unwrap();
    assert_eq!(result.as_f64(), Some(5.0));

    let err = call(&lib, "exec", &[Arg::from(2), Arg::from(3), Arg::from(4)]).unwrap_err();
    assert_eq!(err.violation.unwrap().failing_arguments(), vec![3]);
}

#[test]
fn test_instance_of_keyword() {
    let engine = ContractEngine::new();
    engine
        .define("point", &json!({ "instanceOf": "Point", "required": ["x", "y"] }))
        .unwrap();

    let origin = Instance::new("Point").with_field("x", 0).with_field("y", 0);
    let vector = Instance::new("Vector").with_field("x", 0).with_field("y", 0);
    assert!(engine.fulfills("point", &Arg::from(origin)).unwrap());
    assert!(!engine.fulfills("point", &Arg::from(vector)).unwrap());
    assert!(!engine.fulfills("point", &Arg::from(json!({ "x": 0, "y": 0 }))).unwrap());
}

#[test]
fn test_self_referencing_argument_is_checked() {
    let engine = ContractEngine::new();
    let lib = Object::new().with_method("visit", |args: &[Arg]| Ok(Arg::from(args.len() as i64)));
    engine
        .attach(&lib, "visit")
        .unwrap()
        .pre(Condition::tuple(vec![json!({ "type": "object", "required": ["left", "right"] })]))
        .unwrap();

    let node = Object::new().with_member("value", 1);
    node.set("left", node.clone());
    node.set("right", node.clone());
    assert_eq!(call(&lib, "visit", &[Arg::from(&node)]).unwrap().as_i64(), Some(1));

    engine
        .attach(&lib, "visit")
        .unwrap()
        .pre(Condition::tuple(vec![json!({ "properties": { "left": { "type": "object" } } })]))
        .unwrap();
    let err = call(&lib, "visit", &[Arg::from(&node)]).unwrap_err();
    assert_eq!(err.violation.unwrap().failing_arguments(), vec![1]);
}

// ═══════════════════════════════════════════════════════════════════
// INLINE CONDITIONS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_inline_schema_registered_once() {
    let engine = ContractEngine::new();
    let (lib, _) = math_library();
    let handle = engine.attach(&lib, "add").unwrap();

    handle.pre(Condition::schema(two_numbers())).unwrap();
    let after_first = engine.snapshot().len();
    handle.pre(Condition::schema(two_numbers())).unwrap();

    assert_eq!(after_first, 1);
    assert_eq!(engine.snapshot().len(), 1);
    assert_eq!(lib.get("add").unwrap().as_function().unwrap().guard_count(), 2);
}

#[test]
fn test_inline_schema_scoped_to_owner_and_function() {
    let engine = ContractEngine::new();
    let (a, _) = math_library();
    let (b, _) = math_library();

    engine.attach(&a, "add").unwrap().pre(Condition::schema(two_numbers())).unwrap();
    engine.attach(&b, "add").unwrap().pre(Condition::schema(two_numbers())).unwrap();
    engine.attach(&a, "bad_add").unwrap().pre(Condition::schema(two_numbers())).unwrap();

    assert_eq!(engine.snapshot().len(), 3);
}

#[test]
fn test_invalid_inline_schema_is_rejected() {
    let engine = ContractEngine::new();
    let (lib, _) = math_library();
    let err = engine
        .attach(&lib, "add")
        .unwrap()
        .pre(Condition::schema(json!({ "type": "bar" })))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidSchema);
    assert!(engine.snapshot().is_empty());
}

// ═══════════════════════════════════════════════════════════════════
// REGISTRY LIFECYCLE
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_duplicate_define_keeps_original() {
    let engine = engine();
    let err = engine.define(ONE_NUMBER, &json!({ "type": "string" })).unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateName);

    assert!(engine.fulfills(ONE_NUMBER, &Arg::from(1)).unwrap());
    assert!(!engine.fulfills(ONE_NUMBER, &Arg::from("1")).unwrap());
}

#[test]
fn test_reset_orphans_attached_guards() {
    let engine = engine();
    let (lib, calls) = math_library();
    engine.attach(&lib, "add").unwrap().pre(TWO_NUMBERS).unwrap();

    engine.reset();
    let err = call(&lib, "add", &[Arg::from(1), Arg::from(2)]).unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownCondition);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_copied_method_escapes_later_guards() {
    let engine = engine();
    let (lib, calls) = math_library();
    let before = lib.get("add").unwrap();
    engine.attach(&lib, "add").unwrap().pre(TWO_NUMBERS).unwrap();

    let unguarded = before.as_function().unwrap();
    assert!(!unguarded.is_guarded());
    assert!(unguarded.call(&[Arg::from("x"), Arg::from(1)]).is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(call(&lib, "add", &[Arg::from("x"), Arg::from(1)]).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
