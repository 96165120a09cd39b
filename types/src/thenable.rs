use std::any::Any;

use crate::{Completion, Function};

/// The awaitable capability: anything that can report an eventual outcome by
/// calling one of two callbacks.
///
/// Implementors are treated uniformly by the resolution procedure, whether they
/// are deferred values from this workspace or foreign types. Duck-typed objects
/// with a callable `then` property are handled separately by reading the
/// property at resolution time.
pub trait Thenable: Any {
    /// Register `on_fulfilled`/`on_rejected`. Returning `Err` is a synchronous
    /// throw; the returned `Ok` value is ignored by the resolution procedure.
    fn then(&self, on_fulfilled: Function, on_rejected: Function) -> Completion;

    /// Concrete-type escape hatch, used for identity checks.
    fn as_any(&self) -> &dyn Any;
}
