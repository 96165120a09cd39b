//! `.await` support for host async code on the same thread.

use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use pledge_types::Completion;

use crate::DeferredValue;

/// Future resolving to a deferred value's outcome.
///
/// Each poll drains the value's scheduler, so reactions make progress even
/// when nothing else drives the queue. While pending, the task is woken the
/// next time a job is scheduled.
#[must_use = "futures do nothing unless polled"]
pub struct Settled {
    deferred: DeferredValue,
    slot: Rc<RefCell<Option<Completion>>>,
    subscribed: bool,
}

impl DeferredValue {
    pub fn settled(&self) -> Settled {
        Settled {
            deferred: self.clone(),
            slot: Rc::new(RefCell::new(None)),
            subscribed: false,
        }
    }
}

impl Future for Settled {
    type Output = Completion;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Completion> {
        let this = self.get_mut();
        if !this.subscribed {
            let (fulfilled, rejected) = (Rc::clone(&this.slot), Rc::clone(&this.slot));
            this.deferred.subscribe(
                Box::new(move |value| *fulfilled.borrow_mut() = Some(Ok(value))),
                Box::new(move |reason| *rejected.borrow_mut() = Some(Err(reason))),
            );
            this.subscribed = true;
        }

        let scheduler = this.deferred.scheduler().clone();
        let report = scheduler.run_until_idle();
        if let Some(outcome) = this.slot.borrow_mut().take() {
            return Poll::Ready(outcome);
        }

        scheduler.register_waker(cx.waker());
        if report.exhausted {
            cx.waker().wake_by_ref();
        }
        Poll::Pending
    }
}

impl IntoFuture for DeferredValue {
    type Output = Completion;
    type IntoFuture = Settled;

    fn into_future(self) -> Settled {
        self.settled()
    }
}
