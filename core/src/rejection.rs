//! Unhandled-rejection tracking.
//!
//! A deferred value that rejects with no rejection reaction registered is
//! recorded by the scheduler it was created under. At the end of every drain
//! that scheduler checkpoints its tracker: entries that gained a handler in the
//! meantime are already gone, the rest are reported. Reporting is a host
//! courtesy; it never changes any outcome.

use std::cell::RefCell;
use std::collections::VecDeque;

use pledge_config::UnhandledRejectionMode;
use pledge_types::Value;

use crate::DeferredId;
use crate::scheduler;

/// A rejection nobody observed by the end of a drain.
#[derive(Debug, Clone, PartialEq)]
pub struct UnhandledRejection {
    id: DeferredId,
    reason: Value,
}

impl UnhandledRejection {
    #[must_use]
    pub fn id(&self) -> DeferredId {
        self.id
    }

    #[must_use]
    pub fn reason(&self) -> &Value {
        &self.reason
    }
}

/// Rejections seen by one scheduler.
#[derive(Default)]
pub(crate) struct RejectionTracker {
    candidates: RefCell<Vec<UnhandledRejection>>,
    reported: RefCell<VecDeque<UnhandledRejection>>,
}

impl RejectionTracker {
    pub(crate) fn track(&self, id: DeferredId, reason: Value) {
        self.candidates
            .borrow_mut()
            .push(UnhandledRejection { id, reason });
    }

    /// A handler was attached to an already-rejected value.
    pub(crate) fn mark_handled(&self, id: DeferredId) {
        self.candidates.borrow_mut().retain(|entry| entry.id != id);
        let mut reported = self.reported.borrow_mut();
        let before = reported.len();
        reported.retain(|entry| entry.id != id);
        if reported.len() != before {
            tracing::debug!(deferred = %id, "Previously unhandled rejection is now handled");
        }
    }

    pub(crate) fn checkpoint(&self, mode: UnhandledRejectionMode, max_retained: usize) {
        let candidates = std::mem::take(&mut *self.candidates.borrow_mut());
        if candidates.is_empty() {
            return;
        }

        if mode == UnhandledRejectionMode::Ignore {
            tracing::trace!(count = candidates.len(), "Discarded unhandled rejections");
            return;
        }

        for entry in &candidates {
            tracing::warn!(deferred = %entry.id, reason = %entry.reason, "Unhandled rejection");
        }

        let dropped: Vec<UnhandledRejection> = {
            let mut reported = self.reported.borrow_mut();
            reported.extend(candidates);
            let overflow = reported.len().saturating_sub(max_retained);
            reported.drain(..overflow).collect()
        };
        if !dropped.is_empty() {
            tracing::debug!(
                dropped = dropped.len(),
                max_retained,
                "Dropped oldest unhandled rejection records"
            );
        }
    }

    pub(crate) fn take(&self) -> Vec<UnhandledRejection> {
        std::mem::take(&mut *self.reported.borrow_mut()).into()
    }
}

/// Take every rejection the current scheduler reported and nobody handled since.
pub fn take_unhandled_rejections() -> Vec<UnhandledRejection> {
    scheduler::current().take_unhandled_rejections()
}
