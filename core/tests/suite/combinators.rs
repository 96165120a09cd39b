//! all / race / any / all_settled

use pretty_assertions::assert_eq;
use serde_json::json;

use pledge_core::{DeferredValue, ErrorKind, Settlement, Value};

use crate::common::{Harness, object_rejecting_with, object_resolving_with};

#[test]
fn all_rejects_on_first_failure() {
    let h = Harness::new();
    let combined = DeferredValue::all([DeferredValue::resolve(1), DeferredValue::reject("fail")]);
    assert_eq!(h.rejected(&combined), Value::from("fail"));
}

#[test]
fn all_mixes_values_deferreds_and_thenables() {
    let h = Harness::new();
    let combined = DeferredValue::all([
        Value::from(1),
        DeferredValue::resolve(2).into(),
        object_resolving_with(3),
    ]);
    assert_eq!(
        serde_json::to_value(h.fulfilled(&combined)).unwrap(),
        json!([1, 2, 3])
    );
}

#[test]
fn all_output_order_ignores_completion_order() {
    let h = Harness::new();
    let (a, resolve_a, _) = DeferredValue::with_resolvers();
    let (b, resolve_b, _) = DeferredValue::with_resolvers();
    let combined = DeferredValue::all([a, b]);
    resolve_b.call("b");
    h.queue.run_until_idle();
    resolve_a.call("a");
    assert_eq!(
        h.fulfilled(&combined),
        Value::from(vec![Value::from("a"), Value::from("b")])
    );
}

#[test]
fn race_first_settled_wins() {
    let h = Harness::new();
    let winner = DeferredValue::race([DeferredValue::resolve(1), DeferredValue::resolve(2)]);
    assert_eq!(h.fulfilled(&winner), Value::Int(1));
}

#[test]
fn race_can_be_won_by_a_rejection() {
    let h = Harness::new();
    let (pending, _, _) = DeferredValue::with_resolvers();
    let winner = DeferredValue::race([pending, DeferredValue::reject("fast failure")]);
    assert_eq!(h.rejected(&winner), Value::from("fast failure"));
}

#[test]
fn any_returns_first_success() {
    let h = Harness::new();
    let first = DeferredValue::any([
        DeferredValue::reject("x"),
        DeferredValue::resolve(20),
        DeferredValue::resolve(30),
    ]);
    assert_eq!(h.fulfilled(&first), Value::Int(20));
}

#[test]
fn any_aggregate_error_lists_every_reason() {
    let h = Harness::new();
    let combined = DeferredValue::any([
        DeferredValue::reject("a").into(),
        object_rejecting_with("b"),
        DeferredValue::reject("c").into(),
    ]);
    let reason = h.rejected(&combined);
    let error = reason.as_error().unwrap();
    assert_eq!(error.kind(), ErrorKind::AggregateError);
    assert_eq!(
        error.errors(),
        &[Value::from("a"), Value::from("b"), Value::from("c")]
    );
    assert_eq!(
        serde_json::to_value(&reason).unwrap(),
        json!({
            "kind": "AggregateError",
            "message": "all inputs were rejected",
            "errors": ["a", "b", "c"]
        })
    );
}

#[test]
fn all_settled_reports_statuses() {
    let h = Harness::new();
    let settled =
        DeferredValue::all_settled([DeferredValue::resolve(1), DeferredValue::reject("y")]);
    let value = h.fulfilled(&settled);
    assert_eq!(
        serde_json::to_value(&value).unwrap(),
        json!([
            {"status": "fulfilled", "value": 1},
            {"status": "rejected", "reason": "y"}
        ])
    );
    assert_eq!(
        Settlement::list_from_value(&value).unwrap(),
        vec![
            Settlement::Fulfilled {
                value: Value::Int(1)
            },
            Settlement::Rejected {
                reason: Value::from("y")
            },
        ]
    );
}

#[test]
fn all_settled_waits_for_stragglers() {
    let h = Harness::new();
    let (slow, _, reject_slow) = DeferredValue::with_resolvers();
    let settled = DeferredValue::all_settled([slow, DeferredValue::resolve("quick")]);
    assert_eq!(h.settle(&settled), None);
    reject_slow.call("late");
    let records = Settlement::list_from_value(&h.fulfilled(&settled)).unwrap();
    assert_eq!(
        records,
        vec![
            Settlement::Rejected {
                reason: Value::from("late")
            },
            Settlement::Fulfilled {
                value: Value::from("quick")
            },
        ]
    );
}

#[test]
fn empty_input_fulfils_with_empty_list_for_every_combinator() {
    let h = Harness::new();
    let empty = Value::from(Vec::<Value>::new());
    let no_items = Vec::<DeferredValue>::new;
    for combined in [
        DeferredValue::all(no_items()),
        DeferredValue::race(no_items()),
        DeferredValue::any(no_items()),
        DeferredValue::all_settled(no_items()),
    ] {
        assert_eq!(h.fulfilled(&combined), empty);
    }
}
