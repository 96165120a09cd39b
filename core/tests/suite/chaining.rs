//! then / catch / finally chains

use std::cell::RefCell;
use std::rc::Rc;

use pledge_core::{DeferredValue, Function, Value, handler};

use crate::common::{Harness, int};

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

#[test]
fn catch_runs_once_for_one_rejection() {
    let h = Harness::new();
    let calls = log();
    let sink = Rc::clone(&calls);
    let child = DeferredValue::reject("e")
        .catch(move |reason| {
            push(&sink, format!("caught {reason}"));
            Ok(Value::from("ok"))
        })
        .on_fulfilled(Ok);
    assert_eq!(h.fulfilled(&child), Value::from("ok"));
    assert_eq!(*calls.borrow(), vec!["caught e"]);
}

#[test]
fn finally_after_several_thens() {
    let h = Harness::new();
    let calls = log();
    let sink = Rc::clone(&calls);
    let child = DeferredValue::resolve(1)
        .on_fulfilled(|x| Ok(Value::from(int(&x) + 1)))
        .on_fulfilled(|x| Ok(Value::from(int(&x) * 3)))
        .finally(move || {
            push(&sink, "finally");
            Ok(Value::Undefined)
        });
    assert_eq!(h.fulfilled(&child), Value::Int(6));
    assert_eq!(*calls.borrow(), vec!["finally"]);
}

#[test]
fn finally_after_catch_keeps_recovered_value() {
    let h = Harness::new();
    let child = DeferredValue::reject("e")
        .catch(|_| Ok(Value::from("recovered")))
        .finally(|| Ok(Value::from("ignored")));
    assert_eq!(h.fulfilled(&child), Value::from("recovered"));
}

#[test]
fn later_catch_only_sees_new_errors() {
    let h = Harness::new();
    let child = DeferredValue::reject("first")
        .catch(|reason| Err(Value::from(format!("{reason} then second"))))
        .catch(|reason| Ok(Value::from(format!("handled: {reason}"))));
    assert_eq!(h.fulfilled(&child), Value::from("handled: first then second"));
}

#[test]
fn nested_chain_inside_handler_is_flattened() {
    let h = Harness::new();
    let child = DeferredValue::resolve(2).on_fulfilled(|x| {
        let inner = DeferredValue::resolve(x).on_fulfilled(|y| Ok(Value::from(int(&y) * 10)));
        Ok(inner.into())
    });
    assert_eq!(h.fulfilled(&child), Value::Int(20));
}

#[test]
fn error_thrown_in_then_reaches_catch() {
    let h = Harness::new();
    let calls = log();
    let sink = Rc::clone(&calls);
    let child = DeferredValue::resolve(1)
        .on_fulfilled(|_| Err(Value::from("broken")))
        .on_fulfilled(move |value| {
            push(&sink, "skipped handler ran");
            Ok(value)
        })
        .catch(|reason| Ok(Value::from(format!("caught {reason}"))));
    assert_eq!(h.fulfilled(&child), Value::from("caught broken"));
    assert!(calls.borrow().is_empty());
}

#[test]
fn multiple_finally_calls_run_in_chain_order() {
    let h = Harness::new();
    let calls = log();
    let (first, second) = (Rc::clone(&calls), Rc::clone(&calls));
    let child = DeferredValue::resolve("v")
        .finally(move || {
            push(&first, "one");
            Ok(Value::Undefined)
        })
        .finally(move || {
            push(&second, "two");
            Ok(Value::Undefined)
        });
    assert_eq!(h.fulfilled(&child), Value::from("v"));
    assert_eq!(*calls.borrow(), vec!["one", "two"]);
}

#[test]
fn finally_then_finally_ordering() {
    let h = Harness::new();
    let calls = log();
    let (a, b, c) = (Rc::clone(&calls), Rc::clone(&calls), Rc::clone(&calls));
    let child = DeferredValue::resolve(5)
        .finally(move || {
            push(&a, "finally 1");
            Ok(Value::Undefined)
        })
        .on_fulfilled(move |value| {
            push(&b, format!("then {value}"));
            Ok(Value::from(int(&value) + 1))
        })
        .finally(move || {
            push(&c, "finally 2");
            Ok(Value::Undefined)
        });
    assert_eq!(h.fulfilled(&child), Value::Int(6));
    assert_eq!(*calls.borrow(), vec!["finally 1", "then 5", "finally 2"]);
}

#[test]
fn finally_on_rejection_feeds_catch() {
    let h = Harness::new();
    let calls = log();
    let sink = Rc::clone(&calls);
    let child = DeferredValue::reject("err")
        .finally(move || {
            push(&sink, "cleanup");
            Ok(Value::Undefined)
        })
        .catch(|reason| Ok(Value::from(format!("caught {reason}"))));
    assert_eq!(h.fulfilled(&child), Value::from("caught err"));
    assert_eq!(*calls.borrow(), vec!["cleanup"]);
}

#[test]
fn mixed_plain_and_deferred_returns() {
    let h = Harness::new();
    let child = DeferredValue::resolve(1)
        .on_fulfilled(|x| Ok(Value::from(int(&x) + 1)))
        .on_fulfilled(|x| Ok(DeferredValue::resolve(int(&x) * 2).into()))
        .on_fulfilled(|x| Ok(Value::from(format!("result {x}"))));
    assert_eq!(h.fulfilled(&child), Value::from("result 4"));
}

#[test]
fn explicit_rejection_handler_in_then() {
    let h = Harness::new();
    let child = DeferredValue::reject("no").then(
        handler(|_| Ok(Value::from("wrong branch"))),
        handler(|reason| Ok(Value::from(format!("right branch: {reason}")))),
    );
    assert_eq!(h.fulfilled(&child), Value::from("right branch: no"));
}

#[test]
fn dynamic_finally_callback_error_overrides() {
    let h = Harness::new();
    let callback = Value::from(Function::new(|_, args| {
        assert!(args.is_empty());
        Err(Value::from("finally threw"))
    }));
    let child = DeferredValue::resolve(1).finally_callable(&callback);
    assert_eq!(h.rejected(&child), Value::from("finally threw"));
}

#[test]
fn interleaving_of_independent_chains() {
    let h = Harness::new();
    let calls = log();
    for name in ["a", "b"] {
        let (first, second) = (Rc::clone(&calls), Rc::clone(&calls));
        let _ = DeferredValue::resolve(())
            .on_fulfilled(move |value| {
                push(&first, format!("{name}1"));
                Ok(value)
            })
            .on_fulfilled(move |value| {
                push(&second, format!("{name}2"));
                Ok(value)
            });
    }
    h.queue.run_until_idle();
    assert_eq!(*calls.borrow(), vec!["a1", "b1", "a2", "b2"]);
}
