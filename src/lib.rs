//! Single-assignment promises with handler chains, `all`/`any`
//! combinators, deferred invocation, and replay with deadline polling.
//!
//! A [`Promise`] is a container for one eventual [`Outcome`]: a success
//! value or a failure [`Cause`]. Consumers attach handlers before (or
//! after) completion; producers settle it exactly once through the
//! [`Callback`] contract. On top of the same state machine sit
//! [`ReplayPromise`] (retains its result, re-delivers on demand, converts
//! missed deadlines into failures under external polling),
//! [`BlockingPromise`] (parks the calling thread on a latch), and the
//! composite constructors in [`promises`].
//!
//! # Examples
//!
//! ```
//! use promise_kit::{promises, Callback, Thenable};
//! use std::sync::{Arc, Mutex};
//!
//! // Some callback-based service.
//! fn lookup(callback: &dyn Callback<String>) {
//!     callback.reply("Rick".to_string()).unwrap();
//! }
//!
//! let promise = promises::promise::<String>();
//! let seen = Arc::new(Mutex::new(None));
//! let sink = seen.clone();
//! promise
//!     .then(move |name: &String| *sink.lock().unwrap() = Some(name.clone()))
//!     .unwrap();
//!
//! lookup(&promise);
//!
//! assert!(promise.success().unwrap());
//! assert_eq!(seen.lock().unwrap().as_deref(), Some("Rick"));
//! ```
//!
//! The crate is a synchronization primitive, not a runtime: nothing here
//! spawns threads, blocks (outside [`BlockingPromise`]), or runs timers.
//! Schedulers integrate through [`ReplayPromise::check_timeout`] polling
//! and [`Promise::invoke`].

use std::sync::Arc;

pub mod blocking;
mod composite;
pub mod error;
pub mod expected;
pub mod outcome;
pub mod promise;
pub mod promises;
pub mod replay;

pub use blocking::BlockingPromise;
pub use error::{ErrorKind, ProducerDropped, PromiseError, TimedOut};
pub use expected::Expected;
pub use outcome::{Cause, Outcome};
pub use promise::{Completion, Promise};
pub use replay::ReplayPromise;

/// Producer side of a promise: the two-outcome callback contract handed to
/// asynchronous services. Calling either operation after the promise has
/// settled fails loudly with [`PromiseError::AlreadyCompleted`].
pub trait Callback<T>: Send + Sync {
    /// Settle with a success value.
    fn reply(&self, value: T) -> Result<(), PromiseError>;
    /// Settle with a failure cause.
    fn reject(&self, cause: Cause) -> Result<(), PromiseError>;
}

/// Consumer side of a promise: handler registration and chaining.
///
/// Safe-mode delivery is a capability: implementations that do not opt in
/// report [`Thenable::supports_safe`] `false` and the `then_safe*`
/// registrations error with [`PromiseError::SafeUnsupported`]. The
/// concrete [`Promise`] supports it.
pub trait Thenable {
    /// The success value type.
    type Value;

    /// Register a success handler.
    fn then<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&Self::Value) + Send + 'static;

    /// Register a success handler receiving the optional-value wrapper.
    fn then_expect<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(Expected<Arc<Self::Value>>) + Send + 'static;

    /// Register a failure handler. Also receives handler faults routed out
    /// of panicking success handlers.
    fn catch_error<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&Cause) + Send + 'static;

    /// Register a handler that observes the settlement either way.
    fn when_complete<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&Outcome<Self::Value>) + Send + 'static;

    /// Derive a child promise completing with `f(value)` on success;
    /// failure propagates to the child unchanged, and a panicking `f`
    /// fails the child rather than the parent.
    fn then_map<U, F>(&self, f: F) -> Result<Promise<U>, PromiseError>
    where
        U: Send + Sync + 'static,
        F: FnMut(&Self::Value) -> U + Send + 'static;

    /// Whether the `then_safe*` registrations are available.
    fn supports_safe(&self) -> bool {
        false
    }

    /// Like [`Thenable::then`], but a panicking handler is confined to its
    /// own boundary: delivery to subsequent handlers continues.
    fn then_safe<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&Self::Value) + Send + 'static,
    {
        let _ = f;
        Err(PromiseError::SafeUnsupported)
    }

    /// Safe-mode variant of [`Thenable::then_expect`].
    fn then_safe_expect<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(Expected<Arc<Self::Value>>) + Send + 'static,
    {
        let _ = f;
        Err(PromiseError::SafeUnsupported)
    }
}

/// Type-erased view of a promise used as a combinator child, so `all`/
/// `any` can span heterogeneous value types.
pub trait Joinable: Send + Sync {
    /// Attach an always-observer reporting the settlement: `Ok(())` for
    /// success, the cause for failure.
    fn on_settled(
        &self,
        observer: Box<dyn FnMut(Result<(), &Cause>) + Send>,
    ) -> Result<(), PromiseError>;

    /// Whether this child defers its triggering action.
    fn is_invokable(&self) -> bool;

    /// Fire the child's deferred action.
    fn invoke_erased(&self) -> Result<(), PromiseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal foreign implementation: exercises the trait defaults the
    /// way a promise variant without safe-mode support would behave.
    struct PlainThenable;

    impl Thenable for PlainThenable {
        type Value = String;

        fn then<F>(&self, _f: F) -> Result<&Self, PromiseError>
        where
            F: FnMut(&String) + Send + 'static,
        {
            Ok(self)
        }

        fn then_expect<F>(&self, _f: F) -> Result<&Self, PromiseError>
        where
            F: FnMut(Expected<Arc<String>>) + Send + 'static,
        {
            Ok(self)
        }

        fn catch_error<F>(&self, _f: F) -> Result<&Self, PromiseError>
        where
            F: FnMut(&Cause) + Send + 'static,
        {
            Ok(self)
        }

        fn when_complete<F>(&self, _f: F) -> Result<&Self, PromiseError>
        where
            F: FnMut(&Outcome<String>) + Send + 'static,
        {
            Ok(self)
        }

        fn then_map<U, F>(&self, _f: F) -> Result<Promise<U>, PromiseError>
        where
            U: Send + Sync + 'static,
            F: FnMut(&String) -> U + Send + 'static,
        {
            Ok(Promise::new())
        }
    }

    #[test]
    fn safe_mode_defaults_decline() {
        let plain = PlainThenable;
        assert!(!plain.supports_safe());
        assert!(matches!(
            plain.then_safe(|_| {}),
            Err(PromiseError::SafeUnsupported)
        ));
        assert!(matches!(
            plain.then_safe_expect(|_| {}),
            Err(PromiseError::SafeUnsupported)
        ));
    }

    #[test]
    fn concrete_promise_supports_safe() {
        let promise = Promise::<String>::new();
        assert!(promise.supports_safe());
        assert!(promise.then_safe(|_| {}).is_ok());
        assert!(promise.then_safe_expect(|_| {}).is_ok());
    }
}
