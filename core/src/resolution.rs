//! The resolution procedure: how a deferred value adopts a candidate value.
//!
//! Plain values fulfil directly. Objects are probed for a callable `then`
//! property, which is invoked with a fresh, once-guarded settle pair; whatever
//! reaches that pair runs through this procedure again. Deferred values of this
//! crate are adopted by subscribing to them directly.
//!
//! A `then` that settles its pair synchronously would recurse once per nesting
//! level. Instead, nested resolutions are queued on a per-thread backlog that
//! the outermost call works through, so the stack stays flat up to the depth
//! limit.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use pledge_types::{Completion, ErrorValue, Function, Thenable, Value};

use crate::DeferredValue;

type Pending = (DeferredValue, Value, u32);

thread_local! {
    /// `Some` while a resolution is running on this thread.
    static BACKLOG: RefCell<Option<VecDeque<Pending>>> = const { RefCell::new(None) };
}

/// Marks a resolution as running on this thread. Dropping it, even on unwind,
/// discards whatever is left on the backlog.
struct Backlog;

impl Backlog {
    fn start() -> Self {
        BACKLOG.with(|backlog| *backlog.borrow_mut() = Some(VecDeque::new()));
        Self
    }

    fn next(&self) -> Option<Pending> {
        BACKLOG.with(|backlog| backlog.borrow_mut().as_mut().and_then(VecDeque::pop_front))
    }
}

impl Drop for Backlog {
    fn drop(&mut self) {
        let leftover = BACKLOG.with(|backlog| backlog.borrow_mut().take());
        drop(leftover);
    }
}

pub(crate) fn resolve(target: &DeferredValue, value: Value, depth: u32) {
    let running = BACKLOG.with(|backlog| backlog.borrow().is_some());
    if running {
        // A fresh value resolved from inside a `then` still settles before
        // returning; only nested adoption waits for the outer loop.
        if depth == 0 {
            resolve_now(target, value, depth);
        } else {
            BACKLOG.with(|backlog| {
                if let Some(queue) = backlog.borrow_mut().as_mut() {
                    queue.push_back((target.clone(), value, depth));
                }
            });
        }
        return;
    }

    let backlog = Backlog::start();
    resolve_now(target, value, depth);
    while let Some((target, value, depth)) = backlog.next() {
        resolve_now(&target, value, depth);
    }
}

fn resolve_now(target: &DeferredValue, value: Value, depth: u32) {
    if let Value::Thenable(thenable) = &value {
        let thenable = Rc::clone(thenable);
        adopt_thenable(target, thenable, depth);
        return;
    }

    let then = match value.as_object().map(|object| object.get("then")) {
        None => {
            target.fulfill(value);
            return;
        }
        Some(Err(thrown)) => {
            tracing::debug!(deferred = %target.id(), "Reading `then` threw");
            target.reject_with(thrown);
            return;
        }
        Some(Ok(then)) => then,
    };

    let Value::Function(then) = then else {
        target.fulfill(value);
        return;
    };
    invoke_then(target, depth, |on_fulfilled, on_rejected| {
        then.call(&value, &[on_fulfilled.into(), on_rejected.into()])
    });
}

fn adopt_thenable(target: &DeferredValue, thenable: Rc<dyn Thenable>, depth: u32) {
    let Some(inner) = thenable.as_any().downcast_ref::<DeferredValue>() else {
        invoke_then(target, depth, |on_fulfilled, on_rejected| {
            thenable.then(on_fulfilled, on_rejected)
        });
        return;
    };

    if inner.ptr_eq(target) {
        tracing::debug!(deferred = %target.id(), "Rejected self-resolution");
        target.reject_with(
            ErrorValue::type_error(format!("chaining cycle detected for {}", target.id())).into(),
        );
        return;
    }
    if exceeds_depth(target, depth) {
        return;
    }

    tracing::trace!(deferred = %target.id(), inner = %inner.id(), "Adopting deferred value");
    let (resolve, reject) = target.resolving_functions(depth + 1);
    inner.subscribe(
        Box::new(move |value| resolve.call(value)),
        Box::new(move |reason| reject.call(reason)),
    );
}

fn invoke_then<F>(target: &DeferredValue, depth: u32, call: F)
where
    F: FnOnce(Function, Function) -> Completion,
{
    if exceeds_depth(target, depth) {
        return;
    }

    tracing::debug!(deferred = %target.id(), depth, "Adopting foreign thenable");
    let (resolve, reject) = target.resolving_functions(depth + 1);
    if let Err(thrown) = call(resolve.into(), reject.clone().into()) {
        // Ignored if the thenable already settled the pair before throwing.
        reject.call(thrown);
    }
}

/// Rejects `target` with a `RangeError` once nesting reaches the scheduler's limit.
fn exceeds_depth(target: &DeferredValue, depth: u32) -> bool {
    let limit = target.scheduler().max_resolution_depth();
    if depth < limit {
        return false;
    }
    tracing::warn!(
        deferred = %target.id(),
        limit,
        "Thenable resolution exceeded the nesting limit"
    );
    target.reject_with(
        ErrorValue::range_error(format!("thenable resolution nested deeper than {limit} levels"))
            .into(),
    );
    true
}
