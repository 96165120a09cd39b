//! Core deferred-value machinery for Pledge.
//!
//! A [`DeferredValue`] starts pending and settles at most once, either
//! fulfilled with a value or rejected with a reason. Settling with a thenable
//! adopts its outcome instead of nesting it. Reactions registered through
//! [`DeferredValue::then`] and friends always run later from a [`Scheduler`],
//! never inside the call that registers or triggers them.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`), so none of these types
//! are `Send`.

mod chain;
mod combinators;
mod deferred;
mod error;
mod future;
mod rejection;
mod resolution;
pub mod scheduler;

pub use chain::{Handler, handler};
pub use deferred::{DeferredId, DeferredValue, RejectFn, ResolveFn};
pub use error::PledgeError;
pub use future::Settled;
pub use rejection::{UnhandledRejection, take_unhandled_rejections};
pub use scheduler::{
    DrainReport, EnterGuard, Job, MicrotaskQueue, Scheduler, SchedulerHandle, run_microtasks,
};

pub use pledge_types::{
    Completion, ErrorKind, ErrorValue, Function, Object, Settlement, Status, Thenable, Value,
};
