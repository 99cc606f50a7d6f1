//! Registry snapshots, batch definitions, predicate conditions, the
//! combinator language and the event stream, exercised through the public
//! engine API.

use agentic_guards::prelude::*;
use serde_json::json;

// ═══════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════

fn is_array(subject: &Arg) -> serde_json::Value {
    json!(subject.is_array())
}

fn engine() -> ContractEngine {
    let engine = ContractEngine::new();
    engine.define_predicate("is-array", is_array).unwrap();
    engine
}

// ═══════════════════════════════════════════════════════════════════
// SNAPSHOTS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_snapshot_reflects_registry() {
    let engine = engine();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["is-array"]);
    assert_eq!(
        snapshot.get("is-array").unwrap().origin(),
        ConditionOrigin::Predicate
    );
}

#[test]
fn test_snapshot_does_not_follow_registry() {
    let engine = engine();
    let before = engine.snapshot();
    engine.define("num", &json!({ "type": "number" })).unwrap();

    assert!(!before.contains("num"));
    assert!(engine.snapshot().contains("num"));
    assert_ne!(before, engine.snapshot());
}

#[test]
fn test_detached_snapshot_does_not_leak_into_registry() {
    let engine = engine();
    let snapshot = engine.snapshot();
    let schema = JsonSchemaCompiler::default()
        .compile(&json!({ "type": "string" }))
        .unwrap();
    let edited = snapshot.with_condition(CompiledCondition::new(
        "str",
        ConditionOrigin::Defined,
        ConditionKind::Schema(schema),
    ));

    assert!(edited.contains("str"));
    assert!(!engine.snapshot().contains("str"));
    assert_eq!(
        engine.fulfills("str", &Arg::from("x")).unwrap_err().code,
        ErrorCode::UnknownCondition
    );
}

// ═══════════════════════════════════════════════════════════════════
// DEFINITIONS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_define_returns_engine_for_chaining() {
    let engine = ContractEngine::new();
    let chained = engine
        .define("x", &json!({ "type": "number" }))
        .unwrap()
        .define_predicate("y", is_array)
        .unwrap();
    assert!(std::ptr::eq(chained, &engine));
}

#[test]
fn test_define_validates_name_and_schema() {
    let engine = ContractEngine::new();
    assert_eq!(
        engine.define(" \t", &json!({ "type": "number" })).unwrap_err().code,
        ErrorCode::InvalidName
    );
    assert_eq!(
        engine.define_predicate("", is_array).unwrap_err().code,
        ErrorCode::InvalidName
    );
    for bad in [json!({}), json!({ "type": "bar", "jump": 99 }), json!("number"), json!(null)] {
        assert_eq!(
            engine.define("bad", &bad).unwrap_err().code,
            ErrorCode::InvalidSchema
        );
    }
    assert!(engine.snapshot().is_empty());
}

#[test]
fn test_multidefine_json() {
    let engine = ContractEngine::new();
    for bad in [
        json!(7),
        json!("abc"),
        json!(null),
        json!([123, "abc"]),
        json!({ "name": "good object", "schema": { "type": "number" } }),
        json!([{ "label": "bad object", "type": "in an array" }]),
    ] {
        assert_eq!(
            engine.multidefine_json(&bad).unwrap_err().code,
            ErrorCode::InvalidDefinitionList
        );
    }

    engine
        .multidefine_json(&json!([
            { "name": "num", "schema": { "type": "number" } },
            { "name": "str", "schema": { "type": "string" } }
        ]))
        .unwrap();
    assert_eq!(engine.snapshot().len(), 2);
}

#[test]
fn test_multidefine_with_bad_entry_changes_nothing() {
    let engine = engine();
    let version = engine.snapshot().version();
    let err = engine
        .multidefine(&[
            Definition::new("num", json!({ "type": "number" })),
            Definition::new("is-array", json!({ "type": "array" })),
        ])
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateName);
    assert_eq!(engine.snapshot().version(), version);
    assert!(!engine.snapshot().contains("num"));
}

// ═══════════════════════════════════════════════════════════════════
// FULFILLS / ASSERT
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_fulfills() {
    let engine = engine();
    for subject in [json!([1, 2, 3]), json!(["Array", null, ""]), json!([])] {
        assert!(engine.fulfills("is-array", &Arg::from(subject)).unwrap());
    }
    for subject in [json!("Array"), json!(null), json!("")] {
        assert!(!engine.fulfills("is-array", &Arg::from(subject)).unwrap());
    }
    assert!(engine.fulfills("  is-array\t", &Arg::from(json!([1]))).unwrap());

    for name in [None, Some(""), Some("noContract")] {
        assert_eq!(
            engine.fulfills(name, &Arg::from(json!({}))).unwrap_err().code,
            ErrorCode::UnknownCondition
        );
    }
}

#[test]
fn test_non_boolean_predicate() {
    let engine = engine();
    engine.define_predicate("big-bad", |_| json!(2)).unwrap();
    assert_eq!(
        engine.fulfills("big-bad", &Arg::from(json!([1, 1, 2]))).unwrap_err().code,
        ErrorCode::NonBooleanResult
    );

    let lenient = ContractEngine::with_config(EngineConfig::new().boolean_policy(BooleanPolicy::Truthy));
    lenient.define_predicate("big-bad", |_| json!(2)).unwrap();
    assert!(lenient.fulfills("big-bad", &Arg::null()).unwrap());
}

#[test]
fn test_assert() {
    let engine = engine();
    let fib = Arg::from(json!([1, 1, 2, 3, 5, 8, 13, 21, 34]));
    assert!(engine.assert("is-array", &fib).is_ok());

    let err = engine.assert("is-array", &Arg::from("nope")).unwrap_err();
    assert_eq!(err.code, ErrorCode::AssertionFailed);
}

// ═══════════════════════════════════════════════════════════════════
// COMBINATORS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_combinator_over_positional_args() {
    let engine = engine();
    engine
        .define("num", &json!({ "type": "number" }))
        .unwrap()
        .define("str", &json!({ "type": "string" }))
        .unwrap();

    let args = Arg::from(json!([[1], 2, "three"]));
    let check = |validator: serde_json::Value| engine.evaluate_dynamic(&Arg::from(validator), &args).unwrap();

    assert!(check(json!(["is-array,num,str"])));
    assert!(!check(json!(["num,num,str"])));
    assert!(check(json!(["num,num,str", "is-array,,str"])));
    assert!(check(json!([])));
    assert!(check(json!([""])));
    assert!(check(json!(["is-array,num,str,num"])));
}

// ═══════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_violation_recorded_in_recent_events() {
    let engine = engine();
    let lib = Object::new().with_method("len", |args: &[Arg]| Ok(Arg::from(args.len() as i64)));
    engine.attach(&lib, "len").unwrap().pre("is-array").unwrap();

    // The argument list itself is always an array.
    assert!(lib.call("len", &[Arg::from(1)]).is_ok());

    engine
        .attach(&lib, "len")
        .unwrap()
        .post(Condition::schema(json!({ "type": "integer", "maximum": 1 })))
        .unwrap();
    assert!(lib.call("len", &[Arg::from(1), Arg::from(2)]).is_err());

    let filter = EventFilter::new().for_function("len").violations_only();
    let violations: Vec<_> = engine
        .recent_events(10)
        .into_iter()
        .filter(|e| filter.matches(e))
        .collect();
    assert_eq!(violations.len(), 1);
    assert!(matches!(
        &violations[0].kind,
        EventKind::ViolationRaised { phase: Phase::Postcondition, .. }
    ));
}

#[tokio::test]
async fn test_subscriber_sees_guard_lifecycle() {
    let engine = engine();
    let mut rx = engine.subscribe();
    let lib = Object::new().with_method("id", |args: &[Arg]| {
        Ok(args.first().cloned().unwrap_or_else(Arg::null))
    });

    engine
        .attach(&lib, "id")
        .unwrap()
        .pre(Condition::tuple(vec![json!({ "type": "string" })]))
        .unwrap();
    assert!(lib.call("id", &[Arg::from(1)]).is_err());

    let defined = rx.recv().await.unwrap();
    assert!(matches!(
        defined.kind,
        EventKind::ConditionDefined { origin: ConditionOrigin::Inline, .. }
    ));

    let installed = rx.recv().await.unwrap();
    assert!(matches!(
        installed.kind,
        EventKind::GuardInstalled { phase: Phase::Precondition, guards: 1, .. }
    ));

    let violated = rx.recv().await.unwrap();
    assert_eq!(violated.function(), Some("id"));
}
