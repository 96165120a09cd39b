//! Chaining: `then`, `catch` and `finally`.
//!
//! Every operator returns a new deferred value under the receiver's scheduler.
//! Handlers run from the scheduler, never inside the call that registers them.

use std::cell::Cell;
use std::rc::Rc;

use pledge_types::{Completion, Value};

use crate::scheduler::SchedulerHandle;
use crate::{DeferredValue, RejectFn, ResolveFn};

/// A reaction handler. `Err` is a thrown value and rejects the child.
pub type Handler = Box<dyn FnOnce(Value) -> Completion>;

/// Box a closure as a present handler for [`DeferredValue::then`].
pub fn handler<F>(f: F) -> Option<Handler>
where
    F: FnOnce(Value) -> Completion + 'static,
{
    Some(Box::new(f))
}

impl DeferredValue {
    /// Absent handlers pass the outcome through unchanged: fulfillment to
    /// fulfillment, rejection to rejection.
    #[must_use = "the chained value carries the handler's outcome"]
    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Self {
        Self::with_scheduler(self.scheduler().clone(), |resolve, reject| {
            let (resolve_on_reject, reject_on_reject) = (resolve.clone(), reject.clone());
            self.subscribe(
                Box::new(move |value| react(on_fulfilled, Ok(value), &resolve, &reject)),
                Box::new(move |reason| {
                    react(on_rejected, Err(reason), &resolve_on_reject, &reject_on_reject);
                }),
            );
            Ok(())
        })
    }

    #[must_use = "the chained value carries the handler's outcome"]
    pub fn on_fulfilled<F>(&self, f: F) -> Self
    where
        F: FnOnce(Value) -> Completion + 'static,
    {
        self.then(handler(f), None)
    }

    #[must_use = "the chained value carries the handler's outcome"]
    pub fn catch<F>(&self, f: F) -> Self
    where
        F: FnOnce(Value) -> Completion + 'static,
    {
        self.then(None, handler(f))
    }

    /// Run `on_finally` once this value settles, then pass the original
    /// outcome through. A thenable result is waited for first. A throw, or a
    /// result that rejects, replaces the original outcome.
    #[must_use = "the chained value carries the original outcome"]
    pub fn finally<F>(&self, on_finally: F) -> Self
    where
        F: FnOnce() -> Completion + 'static,
    {
        let slot = Rc::new(Cell::new(Some(on_finally)));
        let scheduler = self.scheduler().clone();
        let (fulfilled_slot, fulfilled_scheduler) = (Rc::clone(&slot), scheduler.clone());
        self.then(
            handler(move |value| run_finally(&fulfilled_slot, &fulfilled_scheduler, Ok(value))),
            handler(move |reason| run_finally(&slot, &scheduler, Err(reason))),
        )
    }

    /// [`then`](Self::then) with dynamic handlers. Anything but a function
    /// counts as absent.
    #[must_use = "the chained value carries the handler's outcome"]
    pub fn then_callable(&self, on_fulfilled: &Value, on_rejected: &Value) -> Self {
        self.then(callable_handler(on_fulfilled), callable_handler(on_rejected))
    }

    #[must_use = "the chained value carries the handler's outcome"]
    pub fn catch_callable(&self, on_rejected: &Value) -> Self {
        self.then(None, callable_handler(on_rejected))
    }

    /// A non-callable callback makes this a plain pass-through.
    #[must_use = "the chained value carries the original outcome"]
    pub fn finally_callable(&self, on_finally: &Value) -> Self {
        match on_finally.as_function() {
            Some(function) => {
                let function = function.clone();
                self.finally(move || function.call(&Value::Undefined, &[]))
            }
            None => self.then(None, None),
        }
    }
}

fn react(handler: Option<Handler>, outcome: Completion, resolve: &ResolveFn, reject: &RejectFn) {
    let result = match (handler, outcome) {
        (Some(handler), Ok(payload) | Err(payload)) => handler(payload),
        (None, outcome) => outcome,
    };
    match result {
        Ok(value) => resolve.call(value),
        Err(reason) => reject.call(reason),
    }
}

fn run_finally<F>(
    slot: &Cell<Option<F>>,
    scheduler: &SchedulerHandle,
    original: Completion,
) -> Completion
where
    F: FnOnce() -> Completion,
{
    let result = match slot.take() {
        Some(on_finally) => on_finally()?,
        None => Value::Undefined,
    };
    let waited = DeferredValue::resolve_in(scheduler.clone(), result);
    Ok(waited.then(handler(move |_| original), None).into())
}

fn callable_handler(value: &Value) -> Option<Handler> {
    let function = value.as_function()?.clone();
    handler(move |payload| function.call(&Value::Undefined, &[payload]))
}
