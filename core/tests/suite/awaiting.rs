//! Awaiting deferred values from tokio

use std::time::Duration;

use pledge_core::{DeferredValue, Value};
use tokio::task::LocalSet;

use crate::common::{Harness, int};

#[tokio::test]
async fn await_chain_result() {
    let _h = Harness::new();
    let result = DeferredValue::resolve(5)
        .on_fulfilled(|x| Ok(Value::from(int(&x) * 2)))
        .on_fulfilled(|x| Ok(Value::from(int(&x) + 1)))
        .await;
    assert_eq!(result, Ok(Value::Int(11)));
}

#[tokio::test]
async fn await_combinator() {
    let _h = Harness::new();
    let settled =
        DeferredValue::any([DeferredValue::reject("x"), DeferredValue::resolve(20)]).await;
    assert_eq!(settled, Ok(Value::Int(20)));
}

#[tokio::test]
async fn await_rejection_counts_as_handling_it() {
    let _h = Harness::new();
    let _ = pledge_core::take_unhandled_rejections();
    assert_eq!(DeferredValue::reject("seen").await, Err(Value::from("seen")));
    pledge_core::run_microtasks();
    assert!(pledge_core::take_unhandled_rejections().is_empty());
}

#[tokio::test]
async fn await_value_settled_by_timer_task() {
    let _h = Harness::new();
    let (deferred, resolve, _) = DeferredValue::with_resolvers();
    let chained = deferred.on_fulfilled(|x| Ok(Value::from(format!("{x}!"))));

    let local = LocalSet::new();
    let outcome = local
        .run_until(async move {
            tokio::task::spawn_local(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                resolve.call("done");
            });
            chained.await
        })
        .await;
    assert_eq!(outcome, Ok(Value::from("done!")));
}
