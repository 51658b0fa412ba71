//! Guarded invocation of task callbacks.
//!
//! Every callback runs inside `catch_unwind` so a panicking task cannot
//! unwind through the scheduler.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use super::error::CallFailure;

/// Run a fallible callback, converting errors and panics into [`CallFailure`].
pub(crate) fn guarded<T, F>(f: F) -> Result<T, CallFailure>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(CallFailure::Failed(error)),
        Err(payload) => Err(CallFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Run an infallible callback, reporting a panic as its message.
pub(crate) fn guarded_unit<F>(f: F) -> Result<(), String>
where
    F: FnOnce(),
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
