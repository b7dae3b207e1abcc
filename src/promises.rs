//! Construction surface: factory entry points for every promise flavor
//! and the composite constructors.

use std::time::{Duration, Instant};

use crate::blocking::BlockingPromise;
use crate::composite::{adopt_invoker, wire_all, wire_any};
use crate::error::PromiseError;
use crate::promise::Promise;
use crate::replay::ReplayPromise;
use crate::Joinable;

/// A bare pending promise.
pub fn promise<T: Send + Sync + 'static>() -> Promise<T> {
    Promise::new()
}

/// A promise whose triggering action is deferred until
/// [`Promise::invoke`]; `resolver` receives the producer handle when the
/// invocation fires.
pub fn invokable_promise<T, F>(resolver: F) -> Promise<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(Promise<T>) + Send + 'static,
{
    Promise::invokable(resolver)
}

/// A replay promise whose deadline is `timeout` from now.
pub fn replay_promise<T: Send + Sync + 'static>(timeout: Duration) -> ReplayPromise<T> {
    ReplayPromise::after(timeout)
}

/// A replay promise whose deadline is `timeout` from `start`.
pub fn replay_promise_from<T: Send + Sync + 'static>(
    timeout: Duration,
    start: Instant,
) -> ReplayPromise<T> {
    ReplayPromise::from_start(timeout, start)
}

/// A blocking promise with no wait budget.
pub fn blocking_promise<T: Send + Sync + 'static>() -> BlockingPromise<T> {
    BlockingPromise::new()
}

/// A blocking promise whose accessors give up after `budget`.
pub fn blocking_promise_timed<T: Send + Sync + 'static>(budget: Duration) -> BlockingPromise<T> {
    BlockingPromise::bounded(budget)
}

/// A composite that completes when every child completes and fails fast on
/// the first child failure. Invokable iff every child is.
///
/// # Examples
///
/// ```
/// use promise_kit::{promises, Promise};
///
/// let p1 = Promise::<i32>::new();
/// let p2 = Promise::<String>::new();
/// let both = promises::all(vec![p1.joinable(), p2.joinable()]).unwrap();
///
/// assert!(!both.complete());
/// p1.resolve(1).unwrap();
/// assert!(!both.complete());
/// p2.resolve("two".to_string()).unwrap();
/// assert!(both.success().unwrap());
/// ```
pub fn all(children: Vec<Box<dyn Joinable>>) -> Result<Promise<()>, PromiseError> {
    let parent = Promise::new();
    wire_all(&parent, &children)?;
    adopt_invoker(&parent, children);
    Ok(parent)
}

/// A composite that mirrors the first child settlement, success or
/// failure. Invokable iff every child is.
///
/// # Examples
///
/// ```
/// use promise_kit::{promises, Promise};
///
/// let p1 = Promise::<i32>::new();
/// let p2 = Promise::<i32>::new();
/// let first = promises::any(vec![p1.joinable(), p2.joinable()]).unwrap();
///
/// p2.resolve(2).unwrap();
/// assert!(first.success().unwrap());
/// ```
pub fn any(children: Vec<Box<dyn Joinable>>) -> Result<Promise<()>, PromiseError> {
    let parent = Promise::new();
    wire_any(&parent, &children)?;
    adopt_invoker(&parent, children);
    Ok(parent)
}

/// [`all`] over a replay promise with a deadline `timeout` from now.
pub fn all_replay(
    timeout: Duration,
    children: Vec<Box<dyn Joinable>>,
) -> Result<ReplayPromise<()>, PromiseError> {
    let parent = Promise::with_deadline(Instant::now() + timeout);
    wire_all(&parent, &children)?;
    adopt_invoker(&parent, children);
    Ok(ReplayPromise::from_inner(parent))
}

/// [`any`] over a replay promise with a deadline `timeout` from now.
pub fn any_replay(
    timeout: Duration,
    children: Vec<Box<dyn Joinable>>,
) -> Result<ReplayPromise<()>, PromiseError> {
    let parent = Promise::with_deadline(Instant::now() + timeout);
    wire_any(&parent, &children)?;
    adopt_invoker(&parent, children);
    Ok(ReplayPromise::from_inner(parent))
}

/// [`all`] over a blocking promise.
pub fn all_blocking(children: Vec<Box<dyn Joinable>>) -> Result<BlockingPromise<()>, PromiseError> {
    let parent = BlockingPromise::new();
    wire_all(&parent, &children)?;
    adopt_invoker(&parent, children);
    Ok(parent)
}

/// [`any`] over a blocking promise.
pub fn any_blocking(children: Vec<Box<dyn Joinable>>) -> Result<BlockingPromise<()>, PromiseError> {
    let parent = BlockingPromise::new();
    wire_any(&parent, &children)?;
    adopt_invoker(&parent, children);
    Ok(parent)
}
