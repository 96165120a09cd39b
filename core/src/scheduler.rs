//! Deferred-callback scheduling.
//!
//! Reactions never run inside the call that registers or triggers them; they
//! are handed to a [`Scheduler`] which runs them later, in FIFO order. The
//! crate ships [`MicrotaskQueue`], used both as the thread's default host queue
//! and as a deterministic queue tests can step manually.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Waker;

use pledge_config::{
    ConfigError, DEFAULT_MAX_JOBS_PER_DRAIN, DEFAULT_MAX_RESOLUTION_DEPTH,
    DEFAULT_MAX_RETAINED_REJECTIONS, PledgeConfig, UnhandledRejectionMode,
};
use pledge_types::Value;

use crate::rejection::{RejectionTracker, UnhandledRejection};
use crate::{DeferredId, DeferredValue};

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce()>;

/// Shared handle to the scheduler a deferred value was created under.
pub type SchedulerHandle = Rc<dyn Scheduler>;

/// The host's deferred-callback mechanism.
///
/// Implementations must run jobs in the order they were scheduled and never
/// run a job synchronously inside `schedule`.
pub trait Scheduler {
    fn schedule(&self, job: Job);

    /// Run queued jobs, including ones scheduled while draining, until the
    /// queue is empty or the implementation's per-drain limit is reached.
    fn run_until_idle(&self) -> DrainReport;

    /// Nesting limit for thenable resolution under this scheduler.
    fn max_resolution_depth(&self) -> u32 {
        DEFAULT_MAX_RESOLUTION_DEPTH
    }

    fn unhandled_rejections(&self) -> UnhandledRejectionMode {
        UnhandledRejectionMode::default()
    }

    /// Ask to be woken the next time a job is scheduled.
    fn register_waker(&self, _waker: &Waker) {}

    /// A value created under this scheduler rejected with nothing observing it.
    fn track_rejection(&self, _deferred: &DeferredValue, _reason: &Value) {}

    /// A handler was attached to a value previously passed to `track_rejection`.
    fn rejection_handled(&self, _id: DeferredId) {}

    /// Take the rejections this scheduler reported and nobody handled since.
    fn take_unhandled_rejections(&self) -> Vec<UnhandledRejection> {
        Vec::new()
    }
}

/// Summary of one `run_until_idle` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub jobs_run: usize,
    pub turns: usize,
    /// The per-drain limit stopped the drain with jobs still queued.
    pub exhausted: bool,
}

struct QueueState {
    jobs: RefCell<VecDeque<Job>>,
    total_enqueued: Cell<u64>,
    draining: Cell<bool>,
    wakers: RefCell<Vec<Waker>>,
    max_jobs_per_drain: usize,
    max_resolution_depth: u32,
    unhandled_rejections: UnhandledRejectionMode,
    max_retained_rejections: usize,
    rejections: RejectionTracker,
}

/// Clears the draining flag even when a job panics.
struct Draining<'a>(&'a Cell<bool>);

impl Drop for Draining<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// FIFO microtask queue.
///
/// A turn runs only the jobs that were queued when the turn started; anything
/// they schedule waits for a later turn.
#[derive(Clone)]
pub struct MicrotaskQueue(Rc<QueueState>);

impl Default for MicrotaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrotaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(
            DEFAULT_MAX_JOBS_PER_DRAIN,
            DEFAULT_MAX_RESOLUTION_DEPTH,
            UnhandledRejectionMode::default(),
            DEFAULT_MAX_RETAINED_REJECTIONS,
        )
    }

    #[must_use]
    pub fn from_config(config: &PledgeConfig) -> Self {
        Self::with_limits(
            config.max_jobs_per_drain(),
            config.max_resolution_depth(),
            config.unhandled_rejections(),
            config.max_retained_rejections(),
        )
    }

    /// Build from `~/.pledge/config.toml`, falling back to defaults when the
    /// file is absent or unusable.
    #[must_use]
    pub fn load() -> Self {
        Self::from_loaded(PledgeConfig::load())
    }

    fn from_loaded(loaded: Result<Option<PledgeConfig>, ConfigError>) -> Self {
        match loaded {
            Ok(Some(config)) => Self::from_config(&config),
            Ok(None) => Self::new(),
            Err(err) => {
                tracing::warn!(
                    path = %err.path().display(),
                    "Using default scheduler settings: {err}"
                );
                Self::new()
            }
        }
    }

    fn with_limits(
        max_jobs_per_drain: usize,
        max_resolution_depth: u32,
        unhandled_rejections: UnhandledRejectionMode,
        max_retained_rejections: usize,
    ) -> Self {
        Self(Rc::new(QueueState {
            jobs: RefCell::new(VecDeque::new()),
            total_enqueued: Cell::new(0),
            draining: Cell::new(false),
            wakers: RefCell::new(Vec::new()),
            max_jobs_per_drain: max_jobs_per_drain.max(1),
            max_resolution_depth,
            unhandled_rejections,
            max_retained_rejections,
            rejections: RejectionTracker::default(),
        }))
    }

    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        Rc::new(self.clone())
    }

    /// Make this queue the thread's current scheduler until the guard drops.
    #[must_use]
    pub fn enter(&self) -> EnterGuard {
        enter(self.handle())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.jobs.borrow().is_empty()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.0.jobs.borrow().len()
    }

    #[must_use]
    pub fn total_enqueued(&self) -> u64 {
        self.0.total_enqueued.get()
    }

    /// Run one turn. Returns the number of jobs run.
    pub fn run_turn(&self) -> usize {
        let queued = self.pending_count();
        self.run_jobs(queued)
    }

    /// Run turns until the queue is empty or the per-drain limit is reached,
    /// then report unhandled rejections. A nested call from inside a job
    /// returns an empty report; the outer drain picks up the work.
    pub fn run_until_idle(&self) -> DrainReport {
        if self.0.draining.replace(true) {
            return DrainReport::default();
        }

        let mut report = DrainReport::default();
        {
            let _draining = Draining(&self.0.draining);
            while !self.is_empty() {
                let budget = self.0.max_jobs_per_drain - report.jobs_run;
                if budget == 0 {
                    report.exhausted = true;
                    break;
                }
                let queued = self.pending_count().min(budget);
                report.jobs_run += self.run_jobs(queued);
                report.turns += 1;
            }
        }

        if report.exhausted {
            tracing::warn!(
                jobs_run = report.jobs_run,
                pending = self.pending_count(),
                "Microtask drain stopped at the per-drain job limit"
            );
        } else if report.jobs_run > 0 {
            tracing::debug!(
                jobs_run = report.jobs_run,
                turns = report.turns,
                "Drained microtask queue"
            );
        }

        self.0
            .rejections
            .checkpoint(self.0.unhandled_rejections, self.0.max_retained_rejections);
        report
    }

    fn run_jobs(&self, limit: usize) -> usize {
        let mut ran = 0;
        while ran < limit {
            // The borrow must end before the job runs: jobs schedule more jobs.
            let Some(job) = self.0.jobs.borrow_mut().pop_front() else {
                break;
            };
            job();
            ran += 1;
        }
        ran
    }
}

impl Scheduler for MicrotaskQueue {
    fn schedule(&self, job: Job) {
        self.0.jobs.borrow_mut().push_back(job);
        self.0.total_enqueued.set(self.0.total_enqueued.get() + 1);
        let wakers = std::mem::take(&mut *self.0.wakers.borrow_mut());
        for waker in wakers {
            waker.wake();
        }
    }

    fn run_until_idle(&self) -> DrainReport {
        MicrotaskQueue::run_until_idle(self)
    }

    fn max_resolution_depth(&self) -> u32 {
        self.0.max_resolution_depth
    }

    fn unhandled_rejections(&self) -> UnhandledRejectionMode {
        self.0.unhandled_rejections
    }

    fn register_waker(&self, waker: &Waker) {
        let mut wakers = self.0.wakers.borrow_mut();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    fn track_rejection(&self, deferred: &DeferredValue, reason: &Value) {
        self.0.rejections.track(deferred.id(), reason.clone());
    }

    fn rejection_handled(&self, id: DeferredId) {
        self.0.rejections.mark_handled(id);
    }

    fn take_unhandled_rejections(&self) -> Vec<UnhandledRejection> {
        self.0.rejections.take()
    }
}

// ============================================================================
// Current scheduler
// ============================================================================

thread_local! {
    static CURRENT: RefCell<Option<SchedulerHandle>> = const { RefCell::new(None) };
    static HOST_QUEUE: MicrotaskQueue = MicrotaskQueue::load();
}

/// Restores the previously current scheduler on drop.
#[must_use = "the scheduler is only current while the guard is alive"]
pub struct EnterGuard {
    previous: Option<SchedulerHandle>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

pub fn enter(handle: SchedulerHandle) -> EnterGuard {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(handle));
    EnterGuard { previous }
}

/// The scheduler new deferred values are created under: the innermost entered
/// one, or the thread's host queue.
#[must_use]
pub fn current() -> SchedulerHandle {
    CURRENT
        .with(|current| current.borrow().clone())
        .unwrap_or_else(|| HOST_QUEUE.with(MicrotaskQueue::handle))
}

/// The thread's host queue, used when nothing has been entered. Configured
/// from `~/.pledge/config.toml` on first use.
#[must_use]
pub fn host_queue() -> MicrotaskQueue {
    HOST_QUEUE.with(MicrotaskQueue::clone)
}

/// Drain the current scheduler.
pub fn run_microtasks() -> DrainReport {
    current().run_until_idle()
}
