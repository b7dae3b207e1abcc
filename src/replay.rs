//! Replay promise: keeps its outcome around for re-delivery and converts a
//! missed deadline into a failure under external polling.
//!
//! There is no timer thread here. A poller (reactor, test loop, whatever)
//! calls [`ReplayPromise::check_timeout`] at its own cadence; the check is
//! idempotent and never raises once the promise has settled. Late-arriving
//! observers can register handlers after completion and re-receive the
//! stored result through [`ReplayPromise::replay`].

use std::ops::Deref;
use std::time::{Duration, Instant};

use crate::error::PromiseError;
use crate::promise::Promise;

/// A [`Promise`] that retains its result for re-delivery and tracks an
/// absolute deadline.
///
/// All core operations are available through deref: `then`,
/// `catch_error`, `resolve`, `get`, and the rest behave exactly as on
/// [`Promise`].
///
/// # Examples
///
/// ```
/// use promise_kit::ReplayPromise;
/// use std::time::{Duration, Instant};
///
/// let promise = ReplayPromise::<String>::after(Duration::from_millis(10));
/// // Nothing resolves it, and the deadline passes:
/// assert!(promise.check_timeout(Instant::now() + Duration::from_secs(1)));
/// assert!(promise.failure().unwrap());
/// assert!(promise.timed_out());
/// ```
pub struct ReplayPromise<T> {
    inner: Promise<T>,
}

impl<T> Clone for ReplayPromise<T> {
    fn clone(&self) -> Self {
        ReplayPromise {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Deref for ReplayPromise<T> {
    type Target = Promise<T>;

    fn deref(&self) -> &Promise<T> {
        &self.inner
    }
}

impl<T: Send + Sync + 'static> ReplayPromise<T> {
    /// A replay promise whose deadline is `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self::from_start(timeout, Instant::now())
    }

    /// A replay promise whose deadline is `timeout` from `start`.
    pub fn from_start(timeout: Duration, start: Instant) -> Self {
        ReplayPromise {
            inner: Promise::with_deadline(start + timeout),
        }
    }

    pub(crate) fn from_inner(inner: Promise<T>) -> Self {
        ReplayPromise { inner }
    }

    /// Poll the deadline.
    ///
    /// If `now` has reached the deadline and the promise is still pending,
    /// it is rejected with a timeout cause, `timed_out()` starts reporting
    /// `true`, and the registered timeout hooks fire. Returns `true` once
    /// the promise has settled (by timeout or by a producer), `false`
    /// while the deadline is still ahead. Safe to call repeatedly from any
    /// polling loop.
    pub fn check_timeout(&self, now: Instant) -> bool {
        self.inner.check_timeout_at(now)
    }

    /// Whether [`ReplayPromise::check_timeout`] is what settled this
    /// promise. The timeout cause itself is an ordinary failure; this flag
    /// is the way to tell it apart.
    pub fn timed_out(&self) -> bool {
        self.inner.timed_out()
    }

    /// Re-deliver the stored outcome to every currently registered
    /// handler, in registration order, exactly as if completion had just
    /// happened. Silent no-op while pending. Fires the
    /// [`ReplayPromise::after_result_processed`] hooks once for this
    /// delivery. A replay issued from inside a delivery cycle (for
    /// example, from one of those hooks) is a no-op: cycles do not nest.
    pub fn replay(&self) {
        self.inner.replay_now();
    }

    /// Register a hook that runs after each delivery cycle: the initial
    /// completion (producer or timeout) and every [`ReplayPromise::replay`].
    /// The hook borrows the promise, so it can drive further replay
    /// without holding its own handle.
    pub fn after_result_processed<F>(&self, hook: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&ReplayPromise<T>) + Send + 'static,
    {
        self.inner.push_after_hook(Box::new(hook))?;
        Ok(self)
    }

    /// Register a hook that fires when [`ReplayPromise::check_timeout`]
    /// rejects this promise. Never fires if a producer settles it first.
    pub fn on_timeout<F>(&self, hook: F) -> Result<&Self, PromiseError>
    where
        F: FnMut() + Send + 'static,
    {
        self.inner.push_timeout_hook(Box::new(hook))?;
        Ok(self)
    }
}

impl<T: Send + Sync + 'static> crate::Callback<T> for ReplayPromise<T> {
    fn reply(&self, value: T) -> Result<(), PromiseError> {
        self.inner.resolve(value)
    }

    fn reject(&self, cause: crate::Cause) -> Result<(), PromiseError> {
        crate::Callback::reject(&self.inner, cause)
    }
}

impl<T: Send + Sync + 'static> crate::Joinable for ReplayPromise<T> {
    fn on_settled(
        &self,
        observer: Box<dyn FnMut(Result<(), &crate::Cause>) + Send>,
    ) -> Result<(), PromiseError> {
        crate::Joinable::on_settled(&self.inner, observer)
    }

    fn is_invokable(&self) -> bool {
        self.inner.is_invokable()
    }

    fn invoke_erased(&self) -> Result<(), PromiseError> {
        self.inner.invoke().map(|_| ())
    }
}
