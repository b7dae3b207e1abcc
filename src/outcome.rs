//! The result carrier: what a promise settles into.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::expected::Expected;

/// Why a promise failed. Either a descriptive message or a structured
/// error shared behind an `Arc` so the same cause can fan out to every
/// failure handler and be redelivered on replay.
#[derive(Clone)]
pub enum Cause {
    /// Free-form description supplied by the producer.
    Message(Arc<str>),
    /// Structured error supplied by the producer.
    Error(Arc<dyn Error + Send + Sync>),
}

impl Cause {
    /// Cause from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Cause::Message(Arc::from(message.into()))
    }

    /// Cause from a structured error.
    pub fn from_error(error: impl Error + Send + Sync + 'static) -> Self {
        Cause::Error(Arc::new(error))
    }

    /// Cause from a caught panic payload. Panics carry `&str` or `String`
    /// messages in practice; anything else becomes a generic description.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            Cause::msg(format!("handler panicked: {s}"))
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Cause::msg(format!("handler panicked: {s}"))
        } else {
            Cause::msg("handler panicked")
        }
    }

    /// The structured error, if this cause carries one.
    pub fn error(&self) -> Option<&(dyn Error + Send + Sync)> {
        match self {
            Cause::Message(_) => None,
            Cause::Error(error) => Some(error.as_ref()),
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Message(message) => f.write_str(message),
            Cause::Error(error) => write!(f, "{error}"),
        }
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Cause::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

impl From<&str> for Cause {
    fn from(message: &str) -> Self {
        Cause::msg(message)
    }
}

impl From<String> for Cause {
    fn from(message: String) -> Self {
        Cause::msg(message)
    }
}

/// The settled value of a promise: exactly one of a success value or a
/// failure cause. The success value sits behind an `Arc` so every handler
/// (and every replay) observes the same carrier.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The producer replied with a value.
    Success(Arc<T>),
    /// The producer rejected with a cause.
    Failure(Cause),
}

// Not derived: cloning shares the carrier, so `T: Clone` is never needed.
impl<T> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Success(value) => Outcome::Success(Arc::clone(value)),
            Outcome::Failure(cause) => Outcome::Failure(cause.clone()),
        }
    }
}

impl<T> Outcome<T> {
    /// Successful outcome wrapping `value`.
    pub fn success(value: T) -> Self {
        Outcome::Success(Arc::new(value))
    }

    /// Failed outcome with `cause`.
    pub fn failure(cause: impl Into<Cause>) -> Self {
        Outcome::Failure(cause.into())
    }

    /// `true` if this is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// `true` if this is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// The success value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value.as_ref()),
            Outcome::Failure(_) => None,
        }
    }

    /// The failure cause, if any.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(cause) => Some(cause),
        }
    }

    /// This outcome as an optional-value wrapper: present on success,
    /// empty on failure.
    pub fn expected(&self) -> Expected<Arc<T>> {
        match self {
            Outcome::Success(value) => Expected::of(Arc::clone(value)),
            Outcome::Failure(_) => Expected::empty(),
        }
    }
}
