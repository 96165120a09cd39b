//! Aggregate combinators over sequences of values and deferred values.
//!
//! Every item is normalised with [`DeferredValue::resolve`] first, so plain
//! values, foreign thenables and deferred values mix freely. Outputs keep input
//! order regardless of completion order. Empty input fulfils every combinator
//! with an empty list.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pledge_types::{ErrorValue, Settlement, Value};

use crate::DeferredValue;
use crate::chain::handler;

impl DeferredValue {
    /// Fulfils with every result in input order, or rejects with the first
    /// rejection.
    pub fn all<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        Self::new(move |resolve, reject| {
            if items.is_empty() {
                resolve.call(Vec::<Value>::new());
                return Ok(());
            }

            let results = Rc::new(RefCell::new(vec![Value::Undefined; items.len()]));
            let remaining = Rc::new(Cell::new(items.len()));
            watch(
                items,
                move |index, value| {
                    results.borrow_mut()[index] = value;
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let values = std::mem::take(&mut *results.borrow_mut());
                        resolve.call(values);
                    }
                },
                move |_, reason| reject.call(reason),
            );
            Ok(())
        })
    }

    /// Settles like whichever item settles first.
    pub fn race<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        Self::new(move |resolve, reject| {
            if items.is_empty() {
                resolve.call(Vec::<Value>::new());
                return Ok(());
            }

            watch(
                items,
                move |_, value| resolve.call(value),
                move |_, reason| reject.call(reason),
            );
            Ok(())
        })
    }

    /// Fulfils with the first fulfillment. Rejects only once every item has
    /// rejected, with an `AggregateError` listing the reasons in input order.
    pub fn any<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        Self::new(move |resolve, reject| {
            if items.is_empty() {
                resolve.call(Vec::<Value>::new());
                return Ok(());
            }

            let reasons = Rc::new(RefCell::new(vec![Value::Undefined; items.len()]));
            let remaining = Rc::new(Cell::new(items.len()));
            watch(
                items,
                move |_, value| resolve.call(value),
                move |index, reason| {
                    reasons.borrow_mut()[index] = reason;
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        let errors = std::mem::take(&mut *reasons.borrow_mut());
                        tracing::debug!(count = errors.len(), "Every input rejected");
                        reject.call(ErrorValue::aggregate("all inputs were rejected", errors));
                    }
                },
            );
            Ok(())
        })
    }

    /// Never rejects. Fulfils once every item has settled with one
    /// [`Settlement`] record per item.
    pub fn all_settled<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        Self::new(move |resolve, _| {
            if items.is_empty() {
                resolve.call(Vec::<Value>::new());
                return Ok(());
            }

            let records = Rc::new(RefCell::new(vec![Value::Undefined; items.len()]));
            let remaining = Rc::new(Cell::new(items.len()));
            let record = move |index: usize, settlement: Settlement| {
                records.borrow_mut()[index] = settlement.into_value();
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let records = std::mem::take(&mut *records.borrow_mut());
                    resolve.call(records);
                }
            };
            let record = Rc::new(record);
            let on_rejected = Rc::clone(&record);
            watch(
                items,
                move |index, value| record(index, Settlement::Fulfilled { value }),
                move |index, reason| on_rejected(index, Settlement::Rejected { reason }),
            );
            Ok(())
        })
    }
}

/// Subscribe to every item, reporting each settlement with its input index.
fn watch<F, R>(items: Vec<Value>, on_fulfilled: F, on_rejected: R)
where
    F: Fn(usize, Value) + 'static,
    R: Fn(usize, Value) + 'static,
{
    let on_fulfilled = Rc::new(on_fulfilled);
    let on_rejected = Rc::new(on_rejected);
    for (index, item) in items.into_iter().enumerate() {
        let (on_fulfilled, on_rejected) = (Rc::clone(&on_fulfilled), Rc::clone(&on_rejected));
        let _ = DeferredValue::resolve(item).then(
            handler(move |value| {
                on_fulfilled(index, value);
                Ok(Value::Undefined)
            }),
            handler(move |reason| {
                on_rejected(index, reason);
                Ok(Value::Undefined)
            }),
        );
    }
}
