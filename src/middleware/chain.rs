//! Continuations and per-dispatch state.
//!
//! A chain is folded from the last handler to the first. Each [`Link`]
//! owns its handler, the continuation of the following handler and a
//! fired flag, so the head link starts the whole chain and every link
//! fires at most once.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::error::{DispatchError, HandlerFailure};
use super::handler::{Arguments, Handler, Invocation};
use crate::observability::Metrics;

trait Step: Send + Sync {
    fn fire(&self, failure: Option<HandlerFailure>);
    fn is_fired(&self) -> bool;
}

/// Continuation handed to a handler: "proceed to the next handler".
///
/// Only the first `call`/`fail` on a continuation (or any of its clones)
/// has an effect.
#[derive(Clone)]
pub struct Next {
    step: Arc<dyn Step>,
}

impl Next {
    fn link(step: impl Step + 'static) -> Self {
        Self {
            step: Arc::new(step),
        }
    }

    /// Continue with the next handler.
    pub fn call(&self) {
        self.step.fire(None);
    }

    /// Report a failure; the rest of the chain is skipped.
    pub fn fail(&self, failure: impl Into<HandlerFailure>) {
        self.step.fire(Some(failure.into()));
    }

    /// `call` or `fail` depending on `failure`.
    pub fn fire(&self, failure: Option<HandlerFailure>) {
        self.step.fire(failure);
    }

    pub fn is_fired(&self) -> bool {
        self.step.is_fired()
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("fired", &self.is_fired())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum DispatchState {
    Running = 0,
    ErrorPropagating = 1,
    Terminated = 2,
}

impl DispatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DispatchState::Running,
            1 => DispatchState::ErrorPropagating,
            _ => DispatchState::Terminated,
        }
    }
}

#[derive(Default)]
struct Outcome {
    caller_waiting: bool,
    raised: Option<DispatchError>,
}

/// State shared by every continuation of one dispatch.
pub(crate) struct Dispatch<A> {
    id: u64,
    args: A,
    error_handler: Option<Handler<A>>,
    state: AtomicU8,
    /// Set once a failure has claimed the error path.
    routed: AtomicBool,
    /// Set when the error handler fails through its continuation.
    escalated: AtomicBool,
    outcome: Mutex<Outcome>,
    metrics: Arc<Metrics>,
}

impl<A: Arguments> Dispatch<A> {
    pub(crate) fn new(
        id: u64,
        args: A,
        error_handler: Option<Handler<A>>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            args,
            error_handler,
            state: AtomicU8::new(DispatchState::Running as u8),
            routed: AtomicBool::new(false),
            escalated: AtomicBool::new(false),
            outcome: Mutex::new(Outcome::default()),
            metrics,
        })
    }

    pub(crate) fn state(&self) -> DispatchState {
        DispatchState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: DispatchState, to: DispatchState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Run the chain from `head` while the caller of `handle` is waiting,
    /// then hand back whatever failure was raised in the meantime.
    pub(crate) fn run(&self, head: &Next) -> Option<DispatchError> {
        self.lock_outcome().caller_waiting = true;
        head.call();

        let mut outcome = self.lock_outcome();
        outcome.caller_waiting = false;
        outcome.raised.take()
    }

    fn lock_outcome(&self) -> std::sync::MutexGuard<'_, Outcome> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self) {
        if self.transition(DispatchState::Running, DispatchState::Terminated) {
            tracing::trace!(dispatch = self.id, "chain completed");
        }
    }

    /// Claim the error path for one failure.
    ///
    /// A chain that already completed can still take one failure while
    /// the caller of `handle` waits: a handler that called `next` and then
    /// returned `Err`.
    fn claim_error_path(&self) -> bool {
        if self.transition(DispatchState::Running, DispatchState::ErrorPropagating) {
            self.routed.store(true, Ordering::Release);
            return true;
        }

        if self.state() != DispatchState::Terminated || !self.lock_outcome().caller_waiting {
            return false;
        }
        if self.routed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state
            .store(DispatchState::ErrorPropagating as u8, Ordering::Release);
        true
    }

    fn route(self: &Arc<Self>, failure: HandlerFailure) {
        if !self.claim_error_path() {
            tracing::warn!(
                dispatch = self.id,
                error = %failure,
                "failure reported after dispatch settled; dropping"
            );
            return;
        }

        let Some(error_handler) = &self.error_handler else {
            self.state
                .store(DispatchState::Terminated as u8, Ordering::Release);
            self.metrics.failure_unrouted();
            self.raise(DispatchError::Unrouted(failure));
            return;
        };

        tracing::debug!(
            dispatch = self.id,
            handler = error_handler.name(),
            error = %failure,
            "routing failure to error handler"
        );

        let terminal = Next::link(Recovered {
            fired: AtomicBool::new(false),
            dispatch: Arc::clone(self),
        });

        let result = error_handler.invoke(Invocation {
            failure: Some(failure),
            args: &self.args,
            next: terminal,
        });
        self.state
            .store(DispatchState::Terminated as u8, Ordering::Release);

        match result {
            Ok(()) if !self.escalated.load(Ordering::Acquire) => self.metrics.failure_recovered(),
            Ok(()) => {}
            Err(failure) => self.raise(DispatchError::ErrorHandlerFailed(failure)),
        }
    }

    fn raise(&self, error: DispatchError) {
        let mut outcome = self.lock_outcome();
        if outcome.caller_waiting && outcome.raised.is_none() {
            outcome.raised = Some(error);
        } else {
            tracing::error!(
                dispatch = self.id,
                error = %error,
                "failure raised with no caller waiting on dispatch"
            );
        }
    }
}

/// Link for one handler, or the end of the chain when `target` is `None`.
struct Link<A> {
    fired: AtomicBool,
    target: Option<(Handler<A>, Next)>,
    dispatch: Arc<Dispatch<A>>,
}

impl<A: Arguments> Step for Link<A> {
    fn fire(&self, failure: Option<HandlerFailure>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            self.dispatch.metrics.duplicate_continuation();
            tracing::debug!(dispatch = self.dispatch.id, "continuation already fired; ignoring");
            return;
        }

        if let Some(failure) = failure {
            self.dispatch.route(failure);
            return;
        }

        let Some((handler, next)) = &self.target else {
            self.dispatch.finish();
            return;
        };

        if self.dispatch.state() != DispatchState::Running {
            return;
        }

        tracing::trace!(dispatch = self.dispatch.id, handler = handler.name(), "invoking handler");
        self.dispatch.metrics.handler_invoked();

        let result = handler.invoke(Invocation {
            failure: None,
            args: &self.dispatch.args,
            next: next.clone(),
        });

        // the slot is already fired, so routing here cannot re-enter the handler
        if let Err(failure) = result {
            self.dispatch.route(failure);
        }
    }

    fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Continuation handed to the error handler. Calling it does nothing;
/// failing it raises the failure to the caller.
struct Recovered<A> {
    fired: AtomicBool,
    dispatch: Arc<Dispatch<A>>,
}

impl<A: Arguments> Step for Recovered<A> {
    fn fire(&self, failure: Option<HandlerFailure>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(failure) = failure {
            self.dispatch.escalated.store(true, Ordering::Release);
            self.dispatch
                .raise(DispatchError::ErrorHandlerFailed(failure));
        }
    }

    fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Fold `handlers` into a chain and return its head.
pub(crate) fn build<A: Arguments>(handlers: Vec<Handler<A>>, dispatch: &Arc<Dispatch<A>>) -> Next {
    let end = Next::link(Link {
        fired: AtomicBool::new(false),
        target: None,
        dispatch: Arc::clone(dispatch),
    });

    handlers.into_iter().rev().fold(end, |next, handler| {
        Next::link(Link {
            fired: AtomicBool::new(false),
            target: Some((handler, next)),
            dispatch: Arc::clone(dispatch),
        })
    })
}
