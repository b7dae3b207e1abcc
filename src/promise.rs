//! The promise state machine: a single-assignment outcome slot plus an
//! ordered handler chain, behind one lock.
//!
//! A [`Promise`] is a cheap cloneable handle; every clone observes and
//! drives the same cell. The Pending-to-Completed transition is decided in
//! one critical section, so exactly one of any concurrent
//! `resolve`/`reject`/timeout attempts wins and the rest get
//! [`PromiseError::AlreadyCompleted`]. Handlers run in registration order
//! on the completing thread, outside the lock, so they are free to
//! register further handlers, settle other promises, or trigger a replay.

use std::future::Future;
use std::mem;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use tracing::{debug, error, trace};

use crate::error::{ProducerDropped, PromiseError, TimedOut};
use crate::expected::Expected;
use crate::outcome::{Cause, Outcome};
use crate::replay::ReplayPromise;
use crate::{Callback, Joinable, Thenable};

enum Handler<T> {
    Value {
        f: Box<dyn FnMut(&T) + Send>,
        safe: bool,
    },
    Expect {
        f: Box<dyn FnMut(Expected<Arc<T>>) + Send>,
        safe: bool,
    },
    Catch(Box<dyn FnMut(&Cause) + Send>),
    Always(Box<dyn FnMut(&Outcome<T>) + Send>),
}

pub(crate) type Invoker<T> =
    Box<dyn FnOnce(Promise<T>) -> Result<(), PromiseError> + Send>;

struct ReplayState<T> {
    deadline: Instant,
    timed_out: bool,
    hooks: Vec<Box<dyn FnMut(&ReplayPromise<T>) + Send>>,
    timeout_hooks: Vec<Box<dyn FnMut() + Send>>,
}

struct Shared<T> {
    outcome: Option<Outcome<T>>,
    handlers: Vec<Handler<T>>,
    wakers: Vec<Waker>,
    frozen: bool,
    delivering: bool,
    invokable: bool,
    invoked: bool,
    invoker: Option<Invoker<T>>,
    handles: usize,
    abandoned: bool,
    settled_hook: Option<Box<dyn FnOnce() + Send>>,
    replay: Option<ReplayState<T>>,
}

impl<T> Shared<T> {
    fn new(replay: Option<ReplayState<T>>) -> Self {
        Shared {
            outcome: None,
            handlers: Vec::new(),
            wakers: Vec::new(),
            frozen: false,
            delivering: false,
            invokable: false,
            invoked: false,
            invoker: None,
            handles: 1,
            abandoned: false,
            settled_hook: None,
            replay,
        }
    }
}

/// Single-assignment container for an eventual success value or failure
/// cause, with attachable completion handlers.
///
/// # Examples
///
/// ```
/// use promise_kit::{Promise, Thenable};
/// use std::sync::{Arc, Mutex};
/// use std::thread;
///
/// let promise = Promise::<String>::new();
/// let seen = Arc::new(Mutex::new(None));
/// let sink = seen.clone();
/// promise
///     .then(move |name: &String| *sink.lock().unwrap() = Some(name.clone()))
///     .unwrap();
///
/// let producer = promise.clone();
/// thread::spawn(move || producer.resolve("Rick".to_string()).unwrap())
///     .join()
///     .unwrap();
///
/// assert_eq!(seen.lock().unwrap().as_deref(), Some("Rick"));
/// assert!(promise.success().unwrap());
/// ```
pub struct Promise<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        self.shared.lock().unwrap().handles += 1;
        Promise {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Promise<T> {
    /// The last handle dropping while still pending wakes any completion
    /// futures with a producer-dropped failure; nobody is left to resolve.
    fn drop(&mut self) {
        let Ok(mut shared) = self.shared.lock() else {
            return;
        };
        shared.handles -= 1;
        if shared.handles == 0 && shared.outcome.is_none() {
            shared.abandoned = true;
            for waker in shared.wakers.drain(..) {
                waker.wake();
            }
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    /// A fresh pending promise.
    pub fn new() -> Self {
        Promise {
            shared: Arc::new(Mutex::new(Shared::new(None))),
        }
    }

    pub(crate) fn with_deadline(deadline: Instant) -> Self {
        Promise {
            shared: Arc::new(Mutex::new(Shared::new(Some(ReplayState {
                deadline,
                timed_out: false,
                hooks: Vec::new(),
                timeout_hooks: Vec::new(),
            })))),
        }
    }

    /// `true` once the promise has settled, either way.
    pub fn complete(&self) -> bool {
        self.shared.lock().unwrap().outcome.is_some()
    }

    /// `true` if the promise settled successfully. Errors with
    /// [`PromiseError::Incomplete`] while pending; querying the outcome
    /// before completion is a caller bug, not a "not ready yet" signal.
    pub fn success(&self) -> Result<bool, PromiseError> {
        match &self.shared.lock().unwrap().outcome {
            None => Err(PromiseError::Incomplete),
            Some(outcome) => Ok(outcome.is_success()),
        }
    }

    /// `true` if the promise settled with a failure. Errors like
    /// [`Promise::success`] while pending.
    pub fn failure(&self) -> Result<bool, PromiseError> {
        self.success().map(|success| !success)
    }

    /// The failure cause: `None` after a success, the stored cause after a
    /// failure, [`PromiseError::Incomplete`] while pending.
    pub fn cause(&self) -> Result<Option<Cause>, PromiseError> {
        match &self.shared.lock().unwrap().outcome {
            None => Err(PromiseError::Incomplete),
            Some(outcome) => Ok(outcome.cause().cloned()),
        }
    }

    /// The success value.
    ///
    /// Errors with [`PromiseError::Incomplete`] while pending and
    /// [`PromiseError::Rejected`] (carrying the stored cause) after a
    /// failure.
    pub fn get(&self) -> Result<Arc<T>, PromiseError> {
        match &self.shared.lock().unwrap().outcome {
            None => Err(PromiseError::Incomplete),
            Some(Outcome::Success(value)) => Ok(Arc::clone(value)),
            Some(Outcome::Failure(cause)) => Err(PromiseError::Rejected(cause.clone())),
        }
    }

    /// The outcome as an optional-value wrapper: present after a success,
    /// empty after a failure. Still errors while pending.
    pub fn expect(&self) -> Result<Expected<Arc<T>>, PromiseError> {
        match &self.shared.lock().unwrap().outcome {
            None => Err(PromiseError::Incomplete),
            Some(outcome) => Ok(outcome.expected()),
        }
    }

    /// The success value, or `other` when failed or still pending. Never
    /// errors.
    pub fn or_else(&self, other: T) -> T
    where
        T: Clone,
    {
        match &self.shared.lock().unwrap().outcome {
            Some(Outcome::Success(value)) => value.as_ref().clone(),
            _ => other,
        }
    }

    /// Reject any further handler registration. One-way and idempotent;
    /// reading the settled result is unaffected.
    pub fn freeze(&self) -> &Self {
        self.shared.lock().unwrap().frozen = true;
        self
    }

    /// A future that resolves with this promise's [`Outcome`].
    ///
    /// If every [`Promise`] handle is dropped while still pending, the
    /// future resolves with a [`ProducerDropped`] failure instead of
    /// pending forever.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::executor::block_on;
    /// use promise_kit::Promise;
    /// use std::thread;
    ///
    /// let promise = Promise::<i32>::new();
    /// let completion = promise.completion();
    /// let producer = promise.clone();
    /// thread::spawn(move || producer.resolve(42).unwrap());
    /// assert_eq!(block_on(completion).value(), Some(&42));
    /// ```
    pub fn completion(&self) -> Completion<T> {
        Completion {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether this promise defers its triggering action to an explicit
    /// [`Promise::invoke`].
    pub fn is_invokable(&self) -> bool {
        self.shared.lock().unwrap().invokable
    }

    pub(crate) fn defer_invocation(&self, invoker: Invoker<T>) {
        let mut shared = self.shared.lock().unwrap();
        shared.invokable = true;
        shared.invoker = Some(invoker);
    }

    pub(crate) fn timed_out(&self) -> bool {
        self.shared
            .lock()
            .unwrap()
            .replay
            .as_ref()
            .map(|replay| replay.timed_out)
            .unwrap_or(false)
    }

    pub(crate) fn push_after_hook(
        &self,
        hook: Box<dyn FnMut(&ReplayPromise<T>) + Send>,
    ) -> Result<(), PromiseError> {
        let mut shared = self.shared.lock().unwrap();
        if shared.frozen {
            return Err(PromiseError::Frozen);
        }
        if let Some(replay) = shared.replay.as_mut() {
            replay.hooks.push(hook);
        }
        Ok(())
    }

    pub(crate) fn push_timeout_hook(
        &self,
        hook: Box<dyn FnMut() + Send>,
    ) -> Result<(), PromiseError> {
        let mut shared = self.shared.lock().unwrap();
        if shared.frozen {
            return Err(PromiseError::Frozen);
        }
        if let Some(replay) = shared.replay.as_mut() {
            replay.timeout_hooks.push(hook);
        }
        Ok(())
    }

    /// Install a one-shot notification that fires after the initial
    /// delivery cycle has run every handler. The blocking wrapper opens
    /// its latch here, so a parked getter cannot outrun the handler chain.
    pub(crate) fn notify_after_delivery(&self, hook: Box<dyn FnOnce() + Send>) {
        self.shared.lock().unwrap().settled_hook = Some(hook);
    }
}

impl<T: Send + Sync + 'static> Promise<T> {
    /// A promise whose triggering side effect waits for
    /// [`Promise::invoke`]. `resolver` receives the producer handle when
    /// the invocation fires.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_kit::Promise;
    ///
    /// let promise = Promise::invokable(|p: Promise<i32>| {
    ///     p.resolve(7).unwrap();
    /// });
    /// assert!(promise.is_invokable());
    /// assert!(!promise.complete());
    /// promise.invoke().unwrap();
    /// assert_eq!(*promise.get().unwrap(), 7);
    /// ```
    pub fn invokable<F>(resolver: F) -> Self
    where
        F: FnOnce(Promise<T>) + Send + 'static,
    {
        let promise = Self::new();
        promise.defer_invocation(Box::new(move |handle| {
            resolver(handle);
            Ok(())
        }));
        promise
    }

    /// Complete this promise with a success value.
    ///
    /// Errors with [`PromiseError::AlreadyCompleted`] if it already
    /// settled; a promise settles exactly once.
    pub fn resolve(&self, value: T) -> Result<(), PromiseError> {
        self.complete_with(Outcome::success(value), false)
    }

    /// Complete this promise with a failure cause.
    pub fn reject(&self, cause: impl Into<Cause>) -> Result<(), PromiseError> {
        self.complete_with(Outcome::Failure(cause.into()), false)
    }

    /// Fire the deferred triggering action.
    ///
    /// Errors with [`PromiseError::NotInvokable`] when nothing was
    /// deferred and [`PromiseError::AlreadyInvoked`] the second time;
    /// invocation is exactly-once by contract.
    pub fn invoke(&self) -> Result<&Self, PromiseError> {
        let invoker = {
            let mut shared = self.shared.lock().unwrap();
            if !shared.invokable {
                return Err(PromiseError::NotInvokable);
            }
            if shared.invoked {
                return Err(PromiseError::AlreadyInvoked);
            }
            shared.invoked = true;
            shared.invoker.take()
        };
        if let Some(invoker) = invoker {
            invoker(self.clone())?;
        }
        Ok(self)
    }

    /// This promise as an erased combinator child.
    pub fn joinable(&self) -> Box<dyn Joinable> {
        Box::new(self.clone())
    }

    /// Settle, treating a lost completion race as ordinary. Combinator
    /// observers use this: once the parent has settled, later child
    /// outcomes are dropped.
    pub(crate) fn settle_quietly(&self, outcome: Outcome<T>) {
        if self.complete_with(outcome, false).is_err() {
            debug!("settlement after completion ignored");
        }
    }

    pub(crate) fn complete_with(
        &self,
        outcome: Outcome<T>,
        via_timeout: bool,
    ) -> Result<(), PromiseError> {
        let mut batch = {
            let mut shared = self.shared.lock().unwrap();
            if shared.outcome.is_some() {
                return Err(PromiseError::AlreadyCompleted);
            }
            shared.outcome = Some(outcome.clone());
            if via_timeout {
                if let Some(replay) = shared.replay.as_mut() {
                    replay.timed_out = true;
                }
            }
            shared.delivering = true;
            for waker in shared.wakers.drain(..) {
                waker.wake();
            }
            mem::take(&mut shared.handlers)
        };
        let pass = catch_unwind(AssertUnwindSafe(|| self.run_handlers(&mut batch, &outcome)));
        self.restore_and_finish(batch);
        let settled_hook = self.shared.lock().unwrap().settled_hook.take();
        if let Some(hook) = settled_hook {
            hook();
        }
        if let Err(payload) = pass {
            resume_unwind(payload);
        }
        Ok(())
    }

    /// Re-deliver the stored outcome to every currently registered
    /// handler, as if completion had just happened. Silent no-op while
    /// pending, and while another delivery cycle is already running
    /// (cycles do not nest).
    pub(crate) fn replay_now(&self) {
        let (outcome, mut batch) = {
            let mut shared = self.shared.lock().unwrap();
            if shared.delivering {
                return;
            }
            let Some(outcome) = shared.outcome.clone() else {
                return;
            };
            shared.delivering = true;
            (outcome, mem::take(&mut shared.handlers))
        };
        let pass = catch_unwind(AssertUnwindSafe(|| self.run_handlers(&mut batch, &outcome)));
        self.restore_and_finish(batch);
        if let Err(payload) = pass {
            resume_unwind(payload);
        }
    }

    /// Idempotent deadline poll; the sole timeout mechanism. Returns
    /// `true` once the promise is settled (by anyone) or `now` reached the
    /// deadline, `false` while the deadline is still ahead.
    pub(crate) fn check_timeout_at(&self, now: Instant) -> bool {
        {
            let shared = self.shared.lock().unwrap();
            if shared.outcome.is_some() {
                return true;
            }
            match &shared.replay {
                Some(replay) if now >= replay.deadline => {}
                _ => return false,
            }
        }
        debug!("deadline passed; rejecting promise with timeout");
        if self
            .complete_with(Outcome::Failure(Cause::from_error(TimedOut)), true)
            .is_ok()
        {
            self.fire_timeout_hooks();
        }
        true
    }

    fn register(&self, handler: Handler<T>) -> Result<(), PromiseError> {
        let outcome = {
            let mut shared = self.shared.lock().unwrap();
            if shared.frozen {
                return Err(PromiseError::Frozen);
            }
            match &shared.outcome {
                None => {
                    shared.handlers.push(handler);
                    return Ok(());
                }
                // Late attach: deliver the known result immediately, then
                // retain the handler so a later replay sees it too.
                Some(outcome) => outcome.clone(),
            }
        };
        let mut batch = vec![handler];
        let pass = catch_unwind(AssertUnwindSafe(|| self.run_handlers(&mut batch, &outcome)));
        self.shared.lock().unwrap().handlers.append(&mut batch);
        if let Err(payload) = pass {
            resume_unwind(payload);
        }
        Ok(())
    }

    /// One delivery pass over `handlers`, in order.
    ///
    /// A panicking value handler becomes a handler fault: default-mode
    /// faults halt delivery to the remaining success/always handlers,
    /// safe-mode faults do not. Either way the first fault is routed to
    /// the registered failure handlers after the pass; with none
    /// registered, a default-mode fault resumes out of the completing call
    /// and a safe-mode fault is reported and dropped.
    fn run_handlers(&self, handlers: &mut [Handler<T>], outcome: &Outcome<T>) {
        let mut fault: Option<Cause> = None;
        let mut fatal: Option<Box<dyn std::any::Any + Send>> = None;
        let mut halted = false;

        for handler in handlers.iter_mut() {
            match handler {
                Handler::Value { f, safe } => {
                    if halted {
                        continue;
                    }
                    if let Outcome::Success(value) = outcome {
                        if let Err(payload) =
                            catch_unwind(AssertUnwindSafe(|| f(value.as_ref())))
                        {
                            if fault.is_none() {
                                fault = Some(Cause::from_panic(payload.as_ref()));
                            }
                            if !*safe {
                                halted = true;
                                fatal = Some(payload);
                            }
                        }
                    }
                }
                Handler::Expect { f, safe } => {
                    if halted {
                        continue;
                    }
                    if let Outcome::Success(value) = outcome {
                        let expected = Expected::of(Arc::clone(value));
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(expected)))
                        {
                            if fault.is_none() {
                                fault = Some(Cause::from_panic(payload.as_ref()));
                            }
                            if !*safe {
                                halted = true;
                                fatal = Some(payload);
                            }
                        }
                    }
                }
                Handler::Catch(f) => {
                    if let Outcome::Failure(cause) = outcome {
                        f(cause);
                    }
                }
                Handler::Always(f) => {
                    if halted {
                        continue;
                    }
                    f(outcome);
                }
            }
        }

        if let Some(cause) = fault {
            let mut routed = false;
            for handler in handlers.iter_mut() {
                if let Handler::Catch(f) = handler {
                    f(&cause);
                    routed = true;
                }
            }
            if !routed {
                match fatal {
                    Some(payload) => resume_unwind(payload),
                    None => {
                        error!(cause = %cause, "safe handler failed with no failure handler registered")
                    }
                }
            }
        }
    }

    /// Put the delivered batch back (ahead of anything registered during
    /// the pass, preserving registration order for replay), then run the
    /// per-delivery hooks of the replay variant. `delivering` stays up
    /// through the hook phase so a hook-triggered replay cannot nest.
    fn restore_and_finish(&self, mut delivered: Vec<Handler<T>>) {
        let has_hook_phase = {
            let mut shared = self.shared.lock().unwrap();
            let late = mem::take(&mut shared.handlers);
            delivered.extend(late);
            shared.handlers = delivered;
            if shared.replay.is_none() {
                shared.delivering = false;
            }
            shared.replay.is_some()
        };
        if has_hook_phase {
            self.fire_after_hooks();
            self.shared.lock().unwrap().delivering = false;
        }
    }

    fn fire_after_hooks(&self) {
        let mut hooks = {
            let mut shared = self.shared.lock().unwrap();
            match shared.replay.as_mut() {
                Some(replay) => mem::take(&mut replay.hooks),
                None => return,
            }
        };
        let handle = ReplayPromise::from_inner(self.clone());
        for hook in hooks.iter_mut() {
            hook(&handle);
        }
        let mut shared = self.shared.lock().unwrap();
        if let Some(replay) = shared.replay.as_mut() {
            let late = mem::take(&mut replay.hooks);
            hooks.extend(late);
            replay.hooks = hooks;
        }
    }

    fn fire_timeout_hooks(&self) {
        let hooks = {
            let mut shared = self.shared.lock().unwrap();
            match shared.replay.as_mut() {
                Some(replay) => mem::take(&mut replay.timeout_hooks),
                None => return,
            }
        };
        for mut hook in hooks {
            hook();
        }
    }
}

impl<T: Send + Sync + 'static> Thenable for Promise<T> {
    type Value = T;

    fn then<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.register(Handler::Value {
            f: Box::new(f),
            safe: false,
        })?;
        Ok(self)
    }

    fn then_expect<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(Expected<Arc<T>>) + Send + 'static,
    {
        self.register(Handler::Expect {
            f: Box::new(f),
            safe: false,
        })?;
        Ok(self)
    }

    fn catch_error<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&Cause) + Send + 'static,
    {
        self.register(Handler::Catch(Box::new(f)))?;
        Ok(self)
    }

    fn when_complete<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&Outcome<T>) + Send + 'static,
    {
        self.register(Handler::Always(Box::new(f)))?;
        Ok(self)
    }

    fn then_map<U, F>(&self, mut f: F) -> Result<Promise<U>, PromiseError>
    where
        U: Send + Sync + 'static,
        F: FnMut(&T) -> U + Send + 'static,
    {
        let child = Promise::<U>::new();
        let feed = child.clone();
        self.register(Handler::Always(Box::new(move |outcome| {
            let mapped = match outcome {
                Outcome::Success(value) => {
                    match catch_unwind(AssertUnwindSafe(|| f(value.as_ref()))) {
                        Ok(mapped) => Outcome::success(mapped),
                        // A bad transform fails the child, never the parent.
                        Err(payload) => {
                            Outcome::Failure(Cause::from_panic(payload.as_ref()))
                        }
                    }
                }
                Outcome::Failure(cause) => Outcome::Failure(cause.clone()),
            };
            if feed.complete_with(mapped, false).is_err() {
                trace!("mapped promise already completed; replayed delivery ignored");
            }
        })))?;
        Ok(child)
    }

    fn supports_safe(&self) -> bool {
        true
    }

    fn then_safe<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.register(Handler::Value {
            f: Box::new(f),
            safe: true,
        })?;
        Ok(self)
    }

    fn then_safe_expect<F>(&self, f: F) -> Result<&Self, PromiseError>
    where
        F: FnMut(Expected<Arc<T>>) + Send + 'static,
    {
        self.register(Handler::Expect {
            f: Box::new(f),
            safe: true,
        })?;
        Ok(self)
    }
}

impl<T: Send + Sync + 'static> Callback<T> for Promise<T> {
    fn reply(&self, value: T) -> Result<(), PromiseError> {
        self.resolve(value)
    }

    fn reject(&self, cause: Cause) -> Result<(), PromiseError> {
        self.complete_with(Outcome::Failure(cause), false)
    }
}

impl<T: Send + Sync + 'static> Joinable for Promise<T> {
    fn on_settled(
        &self,
        mut observer: Box<dyn FnMut(Result<(), &Cause>) + Send>,
    ) -> Result<(), PromiseError> {
        self.when_complete(move |outcome| match outcome {
            Outcome::Success(_) => observer(Ok(())),
            Outcome::Failure(cause) => observer(Err(cause)),
        })
        .map(|_| ())
    }

    fn is_invokable(&self) -> bool {
        Promise::is_invokable(self)
    }

    fn invoke_erased(&self) -> Result<(), PromiseError> {
        self.invoke().map(|_| ())
    }
}

/// Future side of a promise; see [`Promise::completion`].
pub struct Completion<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Future for Completion<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = self.shared.lock().unwrap();
        if let Some(outcome) = &shared.outcome {
            return Poll::Ready(outcome.clone());
        }
        if shared.abandoned {
            return Poll::Ready(Outcome::Failure(Cause::from_error(ProducerDropped)));
        }
        shared.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn resolves_once() {
        let promise = Promise::<i32>::new();
        promise.resolve(1).unwrap();
        assert!(matches!(
            promise.resolve(2),
            Err(PromiseError::AlreadyCompleted)
        ));
        assert!(matches!(
            promise.reject("late"),
            Err(PromiseError::AlreadyCompleted)
        ));
        assert_eq!(*promise.get().unwrap(), 1);
    }

    #[test]
    fn premature_access_errors() {
        let promise = Promise::<i32>::new();
        assert!(!promise.complete());
        assert!(matches!(promise.get(), Err(PromiseError::Incomplete)));
        assert!(matches!(promise.expect(), Err(PromiseError::Incomplete)));
        assert!(matches!(promise.cause(), Err(PromiseError::Incomplete)));
        assert!(matches!(promise.success(), Err(PromiseError::Incomplete)));
        assert!(matches!(promise.failure(), Err(PromiseError::Incomplete)));
        assert_eq!(promise.or_else(9), 9);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let promise = Promise::<i32>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = order.clone();
            promise.then(move |_| order.lock().unwrap().push(tag)).unwrap();
        }
        promise.resolve(0).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn late_attach_delivers_immediately() {
        let promise = Promise::<i32>::new();
        promise.resolve(5).unwrap();
        let seen = Arc::new(AtomicBool::new(false));
        let flag = seen.clone();
        promise
            .then(move |value| {
                assert_eq!(*value, 5);
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn freeze_rejects_registration_but_not_reads() {
        let promise = Promise::<i32>::new();
        promise.freeze();
        assert!(matches!(
            promise.then(|_| {}),
            Err(PromiseError::Frozen)
        ));
        assert!(matches!(
            promise.catch_error(|_| {}),
            Err(PromiseError::Frozen)
        ));
        assert!(matches!(
            promise.when_complete(|_| {}),
            Err(PromiseError::Frozen)
        ));
        assert!(matches!(
            promise.then_expect(|_| {}),
            Err(PromiseError::Frozen)
        ));
        assert!(matches!(
            promise.then_map(|v| *v),
            Err(PromiseError::Frozen)
        ));
        promise.resolve(3).unwrap();
        assert_eq!(*promise.get().unwrap(), 3);
        assert!(promise.expect().unwrap().is_present());
    }

    #[test]
    fn failure_routes_to_catch_only() {
        let promise = Promise::<i32>::new();
        let caught = Arc::new(AtomicBool::new(false));
        let value_seen = Arc::new(AtomicBool::new(false));
        let c = caught.clone();
        let v = value_seen.clone();
        promise.then(move |_| v.store(true, Ordering::SeqCst)).unwrap();
        promise
            .catch_error(move |cause| {
                assert_eq!(cause.to_string(), "boom");
                c.store(true, Ordering::SeqCst);
            })
            .unwrap();
        promise.reject("boom").unwrap();
        assert!(caught.load(Ordering::SeqCst));
        assert!(!value_seen.load(Ordering::SeqCst));
        assert!(promise.failure().unwrap());
        assert!(matches!(promise.get(), Err(PromiseError::Rejected(_))));
        assert!(promise.expect().unwrap().is_empty());
    }

    #[test]
    fn safe_handler_fault_reaches_catch_and_spares_the_rest() {
        let promise = Promise::<i32>::new();
        let later_ran = Arc::new(AtomicBool::new(false));
        let caught = Arc::new(AtomicBool::new(false));
        promise
            .then_safe(|_| panic!("handler blew chunks"))
            .unwrap();
        let later = later_ran.clone();
        promise.then(move |_| later.store(true, Ordering::SeqCst)).unwrap();
        let c = caught.clone();
        promise
            .catch_error(move |cause| {
                assert!(cause.to_string().contains("handler blew chunks"));
                c.store(true, Ordering::SeqCst);
            })
            .unwrap();
        promise.resolve(1).unwrap();
        assert!(later_ran.load(Ordering::SeqCst));
        assert!(caught.load(Ordering::SeqCst));
        assert!(promise.success().unwrap());
    }

    #[test]
    fn default_handler_fault_halts_later_handlers() {
        let promise = Promise::<i32>::new();
        let later_ran = Arc::new(AtomicBool::new(false));
        let caught = Arc::new(AtomicBool::new(false));
        promise.then(|_| panic!("boom")).unwrap();
        let later = later_ran.clone();
        promise.then(move |_| later.store(true, Ordering::SeqCst)).unwrap();
        let c = caught.clone();
        promise
            .catch_error(move |_| c.store(true, Ordering::SeqCst))
            .unwrap();
        promise.resolve(1).unwrap();
        assert!(!later_ran.load(Ordering::SeqCst));
        assert!(caught.load(Ordering::SeqCst));
    }

    #[test]
    fn default_handler_fault_without_catch_escapes_resolve() {
        let promise = Promise::<i32>::new();
        promise.then(|_| panic!("unhandled")).unwrap();
        let escaped = catch_unwind(AssertUnwindSafe(|| promise.resolve(1)));
        assert!(escaped.is_err());
        // The promise still settled before the handler ran.
        assert!(promise.complete());
    }

    #[test]
    fn then_map_transforms_and_propagates() {
        let promise = Promise::<i32>::new();
        let doubled = promise.then_map(|v| v * 2).unwrap();
        promise.resolve(21).unwrap();
        assert_eq!(*doubled.get().unwrap(), 42);

        let failing = Promise::<i32>::new();
        let child = failing.then_map(|v| v + 1).unwrap();
        failing.reject("upstream broke").unwrap();
        assert!(child.failure().unwrap());
        assert_eq!(
            child.cause().unwrap().unwrap().to_string(),
            "upstream broke"
        );
    }

    #[test]
    fn then_map_panic_fails_only_the_child() {
        let promise = Promise::<i32>::new();
        let child: Promise<i32> = promise.then_map(|_| panic!("bad transform")).unwrap();
        promise.resolve(1).unwrap();
        assert!(promise.success().unwrap());
        assert!(child.failure().unwrap());
        assert!(child
            .cause()
            .unwrap()
            .unwrap()
            .to_string()
            .contains("bad transform"));
    }

    #[test]
    fn when_complete_sees_both_polarities() {
        let hits = Arc::new(AtomicUsize::new(0));
        for fail in [false, true] {
            let promise = Promise::<i32>::new();
            let hits = hits.clone();
            promise
                .when_complete(move |outcome| {
                    assert_eq!(outcome.is_failure(), fail);
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            if fail {
                promise.reject("x").unwrap();
            } else {
                promise.resolve(0).unwrap();
            }
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invoke_is_exactly_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let count = fired.clone();
        let promise = Promise::invokable(move |p: Promise<i32>| {
            count.fetch_add(1, Ordering::SeqCst);
            p.resolve(1).unwrap();
        });
        promise.invoke().unwrap();
        assert!(matches!(
            promise.invoke(),
            Err(PromiseError::AlreadyInvoked)
        ));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bare_promise_is_not_invokable() {
        let promise = Promise::<i32>::new();
        assert!(!promise.is_invokable());
        assert!(matches!(promise.invoke(), Err(PromiseError::NotInvokable)));
    }

    #[test]
    fn completion_wakes_on_threaded_resolve() {
        let promise = Promise::<String>::new();
        let completion = promise.completion();
        let producer = promise.clone();
        let task = thread::spawn(move || {
            block_on(async {
                assert_eq!(completion.await.value().map(String::as_str), Some("🍓"));
            })
        });
        producer.resolve("🍓".to_string()).unwrap();
        task.join().expect("The consumer thread has panicked");
    }

    #[test]
    fn completion_reports_dropped_producer() {
        let promise = Promise::<i32>::new();
        let completion = promise.completion();
        drop(promise);
        let outcome = block_on(completion);
        assert!(outcome.is_failure());
        assert!(outcome
            .cause()
            .unwrap()
            .to_string()
            .contains("dropped before completion"));
    }

    #[test]
    fn handlers_may_register_handlers_during_delivery() {
        let promise = Promise::<i32>::new();
        let inner_ran = Arc::new(AtomicBool::new(false));
        let chain = promise.clone();
        let flag = inner_ran.clone();
        promise
            .then(move |_| {
                // Registered against a completed promise: delivered on the
                // spot, not deadlocked.
                chain
                    .then({
                        let flag = flag.clone();
                        move |_| flag.store(true, Ordering::SeqCst)
                    })
                    .unwrap();
            })
            .unwrap();
        promise.resolve(1).unwrap();
        assert!(inner_ran.load(Ordering::SeqCst));
    }
}
