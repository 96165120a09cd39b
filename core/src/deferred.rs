//! The deferred-value state machine.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use pledge_types::{Completion, Function, Status, Thenable, Value};

use crate::error::PledgeError;
use crate::scheduler::{self, SchedulerHandle};
use crate::resolution;

/// Callback queued on a pending value, run through the scheduler once it settles.
pub(crate) type Reaction = Box<dyn FnOnce(Value)>;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeferredId(u64);

impl DeferredId {
    fn next() -> Self {
        NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            Self(id)
        })
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeferredId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deferred#{}", self.0)
    }
}

/// Outcome and reaction queues are mutually exclusive: queues only exist while
/// pending, the outcome only once settled.
enum State {
    Pending {
        fulfill_reactions: Vec<Reaction>,
        reject_reactions: Vec<Reaction>,
    },
    Fulfilled(Value),
    Rejected(Value),
}

struct Shared {
    id: DeferredId,
    scheduler: SchedulerHandle,
    state: RefCell<State>,
    handled: Cell<bool>,
}

/// The eventual result of an operation that has not completed yet.
///
/// Cloning clones the handle; all clones observe the same state.
#[derive(Clone)]
pub struct DeferredValue(Rc<Shared>);

impl DeferredValue {
    /// Create a value under the current scheduler and run `executor`
    /// synchronously with its settle handles. An `Err` from the executor is a
    /// synchronous throw and becomes the rejection reason.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(ResolveFn, RejectFn) -> Result<(), Value>,
    {
        Self::with_scheduler(scheduler::current(), executor)
    }

    pub fn with_scheduler<F>(scheduler: SchedulerHandle, executor: F) -> Self
    where
        F: FnOnce(ResolveFn, RejectFn) -> Result<(), Value>,
    {
        let deferred = Self::pending(scheduler);
        let (resolve, reject) = deferred.resolving_functions(0);
        if let Err(thrown) = executor(resolve, reject.clone()) {
            tracing::trace!(deferred = %deferred.id(), "Executor threw");
            reject.call(thrown);
        }
        deferred
    }

    /// Construct from a dynamic executor value. Anything but a function fails
    /// here, synchronously, rather than producing a rejection.
    pub fn from_executor(executor: &Value) -> Result<Self, PledgeError> {
        let Value::Function(function) = executor else {
            return Err(PledgeError::ExecutorNotCallable {
                found: executor.type_name(),
            });
        };
        Ok(Self::new(|resolve, reject| {
            function
                .call(&Value::Undefined, &[resolve.into(), reject.into()])
                .map(|_| ())
        }))
    }

    /// A pending value together with its settle handles.
    #[must_use]
    pub fn with_resolvers() -> (Self, ResolveFn, RejectFn) {
        let deferred = Self::pending(scheduler::current());
        let (resolve, reject) = deferred.resolving_functions(0);
        (deferred, resolve, reject)
    }

    /// A value resolved with `value`. Thenables are adopted, not nested.
    pub fn resolve(value: impl Into<Value>) -> Self {
        Self::resolve_in(scheduler::current(), value)
    }

    pub fn reject(reason: impl Into<Value>) -> Self {
        Self::reject_in(scheduler::current(), reason)
    }

    pub fn resolve_in(scheduler: SchedulerHandle, value: impl Into<Value>) -> Self {
        Self::with_scheduler(scheduler, |resolve, _| {
            resolve.call(value);
            Ok(())
        })
    }

    pub fn reject_in(scheduler: SchedulerHandle, reason: impl Into<Value>) -> Self {
        Self::with_scheduler(scheduler, |_, reject| {
            reject.call(reason);
            Ok(())
        })
    }

    fn pending(scheduler: SchedulerHandle) -> Self {
        let id = DeferredId::next();
        tracing::trace!(deferred = %id, "Created");
        Self(Rc::new(Shared {
            id,
            scheduler,
            state: RefCell::new(State::Pending {
                fulfill_reactions: Vec::new(),
                reject_reactions: Vec::new(),
            }),
            handled: Cell::new(false),
        }))
    }

    /// A fresh resolve/reject pair sharing one "already resolved" flag.
    pub(crate) fn resolving_functions(&self, depth: u32) -> (ResolveFn, RejectFn) {
        let claimed = Rc::new(Cell::new(false));
        (
            ResolveFn {
                target: self.clone(),
                claimed: Rc::clone(&claimed),
                depth,
            },
            RejectFn {
                target: self.clone(),
                claimed,
            },
        )
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn id(&self) -> DeferredId {
        self.0.id
    }

    #[must_use]
    pub fn status(&self) -> Status {
        match &*self.0.state.borrow() {
            State::Pending { .. } => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }

    /// `Ok(value)` once fulfilled, `Err(reason)` once rejected.
    #[must_use]
    pub fn outcome(&self) -> Option<Completion> {
        match &*self.0.state.borrow() {
            State::Pending { .. } => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.0.scheduler
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Recover a deferred value from a `Value` produced by `Value::from`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .as_thenable()
            .and_then(|thenable| thenable.as_any().downcast_ref::<Self>())
            .cloned()
    }

    pub(crate) fn is_handled(&self) -> bool {
        self.0.handled.get()
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    pub(crate) fn fulfill(&self, value: Value) {
        self.settle(Status::Fulfilled, value);
    }

    pub(crate) fn reject_with(&self, reason: Value) {
        self.settle(Status::Rejected, reason);
    }

    fn settle(&self, status: Status, payload: Value) {
        let reactions = {
            let mut state = self.0.state.borrow_mut();
            let State::Pending {
                fulfill_reactions,
                reject_reactions,
            } = &mut *state
            else {
                tracing::trace!(deferred = %self.id(), %status, "Ignored settle on settled value");
                return;
            };
            let reactions = if status == Status::Fulfilled {
                std::mem::take(fulfill_reactions)
            } else {
                std::mem::take(reject_reactions)
            };
            *state = if status == Status::Fulfilled {
                State::Fulfilled(payload.clone())
            } else {
                State::Rejected(payload.clone())
            };
            reactions
        };

        tracing::trace!(
            deferred = %self.id(),
            %status,
            reactions = reactions.len(),
            "Settled"
        );

        if status == Status::Rejected && !self.is_handled() {
            self.0.scheduler.track_rejection(self, &payload);
        }

        for reaction in reactions {
            let payload = payload.clone();
            self.0.scheduler.schedule(Box::new(move || reaction(payload)));
        }
    }

    /// Register a reaction pair. Pending values queue it; settled values
    /// schedule the matching reaction right away. Neither runs it now.
    pub(crate) fn subscribe(&self, on_fulfilled: Reaction, on_rejected: Reaction) {
        let ready = {
            let mut state = self.0.state.borrow_mut();
            match &mut *state {
                State::Pending {
                    fulfill_reactions,
                    reject_reactions,
                } => {
                    fulfill_reactions.push(on_fulfilled);
                    reject_reactions.push(on_rejected);
                    None
                }
                State::Fulfilled(value) => Some((on_fulfilled, value.clone())),
                State::Rejected(reason) => {
                    if !self.0.handled.get() {
                        self.0.scheduler.rejection_handled(self.0.id);
                    }
                    Some((on_rejected, reason.clone()))
                }
            }
        };
        self.0.handled.set(true);

        if let Some((reaction, payload)) = ready {
            self.0.scheduler.schedule(Box::new(move || reaction(payload)));
        }
    }
}

impl fmt::Debug for DeferredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredValue")
            .field("id", &self.0.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Thenable for DeferredValue {
    fn then(&self, on_fulfilled: Function, on_rejected: Function) -> Completion {
        let child = self.then_callable(
            &Value::Function(on_fulfilled),
            &Value::Function(on_rejected),
        );
        Ok(Value::from(child))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<DeferredValue> for Value {
    fn from(value: DeferredValue) -> Self {
        Value::thenable(value)
    }
}

// ============================================================================
// Settle handles
// ============================================================================

/// Resolve handle. Runs the resolution procedure on its first call, provided
/// its paired [`RejectFn`] has not been called first.
#[derive(Clone)]
pub struct ResolveFn {
    target: DeferredValue,
    claimed: Rc<Cell<bool>>,
    depth: u32,
}

impl ResolveFn {
    pub fn call(&self, value: impl Into<Value>) {
        if self.claimed.replace(true) {
            tracing::trace!(deferred = %self.target.id(), "Ignored resolve after settle");
            return;
        }
        resolution::resolve(&self.target, value.into(), self.depth);
    }
}

/// Reject handle. Rejects on its first call, provided its paired
/// [`ResolveFn`] has not been called first.
#[derive(Clone)]
pub struct RejectFn {
    target: DeferredValue,
    claimed: Rc<Cell<bool>>,
}

impl RejectFn {
    pub fn call(&self, reason: impl Into<Value>) {
        if self.claimed.replace(true) {
            tracing::trace!(deferred = %self.target.id(), "Ignored reject after settle");
            return;
        }
        self.target.reject_with(reason.into());
    }
}

impl From<ResolveFn> for Function {
    fn from(resolve: ResolveFn) -> Self {
        Function::new(move |_, args| {
            resolve.call(args.first().cloned().unwrap_or_default());
            Ok(Value::Undefined)
        })
    }
}

impl From<RejectFn> for Function {
    fn from(reject: RejectFn) -> Self {
        Function::new(move |_, args| {
            reject.call(args.first().cloned().unwrap_or_default());
            Ok(Value::Undefined)
        })
    }
}

impl From<ResolveFn> for Value {
    fn from(resolve: ResolveFn) -> Self {
        Value::Function(resolve.into())
    }
}

impl From<RejectFn> for Value {
    fn from(reject: RejectFn) -> Self {
        Value::Function(reject.into())
    }
}

impl fmt::Debug for ResolveFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveFn")
            .field("target", &self.target.id())
            .field("claimed", &self.claimed.get())
            .finish()
    }
}

impl fmt::Debug for RejectFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectFn")
            .field("target", &self.target.id())
            .field("claimed", &self.claimed.get())
            .finish()
    }
}
