//! Shared test utilities and fixtures
//!
//! A `Harness` owns a fresh microtask queue entered as the current scheduler,
//! plus helpers for building foreign thenables out of plain objects.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Once;

use pledge_config::PledgeConfig;
use pledge_core::{
    Completion, DeferredValue, EnterGuard, Function, MicrotaskQueue, Object, Thenable, Value,
};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test writer. Filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct Harness {
    pub queue: MicrotaskQueue,
    _guard: EnterGuard,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&PledgeConfig::default())
    }

    pub fn with_config(config: &PledgeConfig) -> Self {
        init_tracing();
        let queue = MicrotaskQueue::from_config(config);
        let guard = queue.enter();
        Self {
            queue,
            _guard: guard,
        }
    }

    /// Drain the queue and return the outcome, if any.
    pub fn settle(&self, deferred: &DeferredValue) -> Option<Completion> {
        self.queue.run_until_idle();
        deferred.outcome()
    }

    pub fn fulfilled(&self, deferred: &DeferredValue) -> Value {
        match self.settle(deferred) {
            Some(Ok(value)) => value,
            other => panic!("expected {} to fulfil, got {other:?}", deferred.id()),
        }
    }

    pub fn rejected(&self, deferred: &DeferredValue) -> Value {
        match self.settle(deferred) {
            Some(Err(reason)) => reason,
            other => panic!("expected {} to reject, got {other:?}", deferred.id()),
        }
    }
}

/// Call argument `index` of a `then` invocation as a settle function.
pub fn call_arg(args: &[Value], index: usize, value: Value) -> Completion {
    match args.get(index) {
        Some(Value::Function(function)) => function.call(&Value::Undefined, &[value]),
        other => panic!("argument {index} is not a function: {other:?}"),
    }
}

/// `{ then(resolve) { resolve(value) } }`
pub fn object_resolving_with(value: impl Into<Value>) -> Value {
    let value = value.into();
    Object::new()
        .with(
            "then",
            Function::new(move |_, args| call_arg(args, 0, value.clone())),
        )
        .into()
}

/// `{ then(_, reject) { reject(reason) } }`
pub fn object_rejecting_with(reason: impl Into<Value>) -> Value {
    let reason = reason.into();
    Object::new()
        .with(
            "then",
            Function::new(move |_, args| call_arg(args, 1, reason.clone())),
        )
        .into()
}

/// `{ then() { throw error } }`
pub fn object_throwing(error: impl Into<Value>) -> Value {
    let error = error.into();
    Object::new()
        .with("then", Function::new(move |_, _| Err(error.clone())))
        .into()
}

/// A typed foreign thenable that fulfils synchronously when subscribed.
pub struct Ready(pub Value);

impl Thenable for Ready {
    fn then(&self, on_fulfilled: Function, _on_rejected: Function) -> Completion {
        on_fulfilled.call(&Value::Undefined, &[self.0.clone()])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn int(value: &Value) -> i64 {
    value.as_int().unwrap_or_else(|| panic!("expected an integer, got {value:?}"))
}
