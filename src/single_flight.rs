//! First-call-wins wrapper for completion callbacks.

use std::sync::OnceLock;

use parking_lot::Mutex;

type Callback<A, R> = Box<dyn FnOnce(A) -> R + Send>;

/// Wraps a callback so only the first [`SingleFlight::call`] runs it.
///
/// Later calls, with any arguments, return a clone of the first call's result.
/// Concurrent callers block until the first call has returned. Calling the
/// guard from inside its own callback deadlocks.
pub struct SingleFlight<A, R> {
    callback: Mutex<Option<Callback<A, R>>>,
    outcome: OnceLock<R>,
}

impl<A, R: Clone> SingleFlight<A, R> {
    pub fn new(callback: impl FnOnce(A) -> R + Send + 'static) -> Self {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
            outcome: OnceLock::new(),
        }
    }

    pub fn call(&self, args: A) -> R {
        self.outcome
            .get_or_init(|| {
                let callback = self
                    .callback
                    .lock()
                    .take()
                    .expect("single-flight callback consumed by a call that panicked");
                callback(args)
            })
            .clone()
    }

    pub fn has_fired(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Result of the first call, if it has completed.
    pub fn outcome(&self) -> Option<&R> {
        self.outcome.get()
    }
}

impl<A, R> std::fmt::Debug for SingleFlight<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("fired", &self.outcome.get().is_some())
            .finish()
    }
}
