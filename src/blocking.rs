//! Blocking wrapper: the same state machine, plus a latch that parks the
//! calling thread until the promise settles.
//!
//! Nothing in the core promise blocks; this wrapper adds blocking on top
//! with a Mutex/Condvar latch that opens once the completing call has run
//! the whole handler chain. Meant for legacy integration and tests that
//! need to meet an asynchronous producer from a plain thread.

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::PromiseError;
use crate::expected::Expected;
use crate::outcome::Cause;
use crate::promise::Promise;
use crate::Callback;

struct Latch {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Latch {
    fn new() -> Self {
        Latch {
            done: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn open(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.signal.notify_all();
    }

    /// Park until opened; `true` if the latch opened within the budget.
    fn wait(&self, budget: Option<Duration>) -> bool {
        let guard = self.done.lock().unwrap();
        match budget {
            None => *self.signal.wait_while(guard, |done| !*done).unwrap(),
            Some(budget) => {
                let (guard, _) = self
                    .signal
                    .wait_timeout_while(guard, budget, |done| !*done)
                    .unwrap();
                *guard
            }
        }
    }
}

/// A [`Promise`] whose `get`/`expect` park the calling thread until a
/// producer settles it, optionally up to a wait budget.
///
/// Handler registration, status queries, and the producer side are the
/// plain [`Promise`] operations, available through deref.
///
/// # Examples
///
/// ```
/// use promise_kit::BlockingPromise;
/// use std::thread;
/// use std::time::Duration;
///
/// let promise = BlockingPromise::<i32>::new();
/// let producer = promise.clone();
/// thread::spawn(move || {
///     thread::sleep(Duration::from_millis(10));
///     producer.resolve(42).unwrap();
/// });
/// assert_eq!(*promise.get().unwrap(), 42);
/// ```
pub struct BlockingPromise<T> {
    inner: Promise<T>,
    latch: Arc<Latch>,
    budget: Option<Duration>,
}

impl<T> Clone for BlockingPromise<T> {
    fn clone(&self) -> Self {
        BlockingPromise {
            inner: self.inner.clone(),
            latch: Arc::clone(&self.latch),
            budget: self.budget,
        }
    }
}

impl<T> Deref for BlockingPromise<T> {
    type Target = Promise<T>;

    fn deref(&self) -> &Promise<T> {
        &self.inner
    }
}

impl<T: Send + Sync + 'static> Default for BlockingPromise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> BlockingPromise<T> {
    /// A blocking promise with no wait budget: `get` parks until settled.
    pub fn new() -> Self {
        Self::with_budget(None)
    }

    /// A blocking promise whose accessors give up after `budget` and
    /// report [`PromiseError::Incomplete`].
    pub fn bounded(budget: Duration) -> Self {
        Self::with_budget(Some(budget))
    }

    fn with_budget(budget: Option<Duration>) -> Self {
        let inner = Promise::new();
        let latch = Arc::new(Latch::new());
        let opener = Arc::clone(&latch);
        // Opened after the whole delivery cycle, so a parked getter never
        // observes a half-delivered handler chain.
        inner.notify_after_delivery(Box::new(move || opener.open()));
        BlockingPromise {
            inner,
            latch,
            budget,
        }
    }

    /// Park until settled, then return the success value as
    /// [`Promise::get`] would.
    pub fn get(&self) -> Result<Arc<T>, PromiseError> {
        self.await_settled()?;
        self.inner.get()
    }

    /// Park until settled, then return the optional-value wrapper as
    /// [`Promise::expect`] would.
    pub fn expect(&self) -> Result<Expected<Arc<T>>, PromiseError> {
        self.await_settled()?;
        self.inner.expect()
    }

    fn await_settled(&self) -> Result<(), PromiseError> {
        if self.latch.wait(self.budget) {
            Ok(())
        } else {
            Err(PromiseError::Incomplete)
        }
    }
}

impl<T: Send + Sync + 'static> Callback<T> for BlockingPromise<T> {
    fn reply(&self, value: T) -> Result<(), PromiseError> {
        self.inner.resolve(value)
    }

    fn reject(&self, cause: Cause) -> Result<(), PromiseError> {
        Callback::reject(&self.inner, cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Thenable;
    use std::thread;

    #[test]
    fn get_parks_until_threaded_resolve() {
        let promise = BlockingPromise::<String>::new();
        let producer = promise.clone();
        let task = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.resolve("🍓".to_string()).unwrap();
        });
        assert_eq!(promise.get().unwrap().as_str(), "🍓");
        task.join().expect("The producer thread has panicked");
    }

    #[test]
    fn bounded_wait_gives_up() {
        let promise = BlockingPromise::<i32>::bounded(Duration::from_millis(10));
        assert!(matches!(promise.get(), Err(PromiseError::Incomplete)));
        assert!(matches!(promise.expect(), Err(PromiseError::Incomplete)));
    }

    #[test]
    fn expect_is_empty_after_failure() {
        let promise = BlockingPromise::<i32>::new();
        let producer = promise.clone();
        let task = thread::spawn(move || {
            producer.reject("no dice".into()).unwrap();
        });
        task.join().expect("The producer thread has panicked");
        assert!(promise.expect().unwrap().is_empty());
        assert!(matches!(promise.get(), Err(PromiseError::Rejected(_))));
        assert!(promise.failure().unwrap());
    }

    #[test]
    fn handlers_still_chain_through_deref() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let promise = BlockingPromise::<i32>::new();
        let seen = Arc::new(AtomicBool::new(false));
        let flag = seen.clone();
        promise
            .then(move |value| {
                assert_eq!(*value, 7);
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();
        promise.resolve(7).unwrap();
        assert!(seen.load(Ordering::SeqCst));
        assert_eq!(*promise.get().unwrap(), 7);
    }
}
