//! Error taxonomy for the promise API.
//!
//! Misusing a promise (double resolution, double invocation, mutating a
//! frozen chain) is a caller bug and surfaces as an error on the offending
//! call. Asking for a result that is not there yet is recoverable by
//! waiting. A failed asynchronous operation is neither: it travels as data
//! inside [`crate::Outcome::Failure`] and only turns into a [`PromiseError`]
//! when a caller demands the success value anyway.

use thiserror::Error;

use crate::outcome::Cause;

/// Error returned by promise operations.
#[derive(Debug, Error)]
pub enum PromiseError {
    /// `resolve`/`reject` called on a promise that already settled.
    #[error("promise already completed")]
    AlreadyCompleted,
    /// `invoke` called a second time.
    #[error("promise can only be invoked once")]
    AlreadyInvoked,
    /// `invoke` called on a promise that never deferred its action.
    #[error("promise does not defer invocation")]
    NotInvokable,
    /// Handler registration attempted after `freeze`.
    #[error("promise is frozen; no further handlers may be registered")]
    Frozen,
    /// `then_safe`/`then_safe_expect` on an implementation without safe
    /// handler delivery.
    #[error("safe handler delivery is not supported by this promise")]
    SafeUnsupported,
    /// Result queried before completion.
    #[error("result is not available yet")]
    Incomplete,
    /// `Expected::get` on an empty wrapper.
    #[error("no value present")]
    Empty,
    /// `get` on a promise that completed with a failure; carries the
    /// stored cause.
    #[error("promise failed: {0}")]
    Rejected(Cause),
}

impl PromiseError {
    /// Classify this error for callers that branch on the category rather
    /// than the exact variant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PromiseError::AlreadyCompleted | PromiseError::AlreadyInvoked => {
                ErrorKind::IllegalState
            }
            PromiseError::NotInvokable
            | PromiseError::Frozen
            | PromiseError::SafeUnsupported => ErrorKind::Unsupported,
            PromiseError::Incomplete | PromiseError::Empty => ErrorKind::NoSuchElement,
            PromiseError::Rejected(_) => ErrorKind::Failed,
        }
    }
}

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Programming error; not recoverable by retrying the same call.
    IllegalState,
    /// Operation not offered by this promise variant.
    Unsupported,
    /// Asked for something that is not there (yet); recoverable.
    NoSuchElement,
    /// The underlying asynchronous operation failed.
    Failed,
}

/// Cause synthesized when a deadline passes before completion.
#[derive(Debug, Clone, Copy, Error)]
#[error("deadline passed before the promise completed")]
pub struct TimedOut;

/// Cause observed by completion futures when every promise handle was
/// dropped while still pending.
#[derive(Debug, Clone, Copy, Error)]
#[error("all promise handles were dropped before completion")]
pub struct ProducerDropped;
