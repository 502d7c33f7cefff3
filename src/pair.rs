//! The producer/consumer pair: a write-once [`Promise`] and the
//! [`Future`] it notifies.
//!
//! One `Mutex` guards the whole resolution state, so "register callback"
//! and "resolve" serialize into exactly one of two orderings: the
//! callback is armed when the resolution arrives, or the resolution is
//! buffered and replayed when the callback arrives. A resolution is
//! never dropped because no callback was present yet.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::executor::{default_executor, Executor, QualityOfService, Task};
use crate::{Outcome, PromiseError};

type SuccessFn<T> = Box<dyn FnOnce(T) + Send>;
type FailureFn<E> = Box<dyn FnOnce(E) + Send>;

/// Lifecycle of a callback slot. `Spent` means the callback was taken
/// for dispatch, or retired because the resolution went down the other
/// path; either way the slot never fires again.
#[derive(Debug)]
enum Slot<F> {
    Vacant,
    Armed(F),
    Spent,
}

impl<F> Slot<F> {
    fn is_vacant(&self) -> bool {
        matches!(self, Slot::Vacant)
    }

    /// Takes the callback out of an armed slot, leaving it spent.
    /// Vacant and spent slots are left untouched.
    fn fire(&mut self) -> Option<F> {
        match mem::replace(self, Slot::Spent) {
            Slot::Armed(f) => Some(f),
            other => {
                *self = other;
                None
            }
        }
    }
}

struct Inner<T, E> {
    resolved: bool,
    outcome: Option<Outcome<T, E>>,
    success: Slot<(QualityOfService, SuccessFn<T>)>,
    failure: Slot<FailureFn<E>>,
}

struct Shared<T, E> {
    state: Mutex<Inner<T, E>>,
    executor: Arc<dyn Executor>,
}

/// Consumer-facing handle to an eventual [`Outcome`]. Cheap to clone;
/// all clones observe the same single resolution.
pub struct Future<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Future {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> Future<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn new(executor: Arc<dyn Executor>) -> Self {
        Future {
            shared: Arc::new(Shared {
                state: Mutex::new(Inner {
                    resolved: false,
                    outcome: None,
                    success: Slot::Vacant,
                    failure: Slot::Vacant,
                }),
                executor,
            }),
        }
    }

    /// Registers the success callback and the quality level to run it at.
    /// Returns the same future, so registration chains:
    /// `fut.on_success(..)?.on_failure(..)?`.
    ///
    /// Each slot takes one registration; a second call fails with
    /// [`PromiseError::AlreadyRegistered`]. If the future already resolved
    /// with a success, the buffered value is dispatched to `callback`
    /// right away at the requested level. If it resolved with an error,
    /// `callback` is accepted and never fires.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_cell::{Promise, QualityOfService};
    /// use std::sync::mpsc;
    ///
    /// let promise = Promise::<String, ()>::new();
    /// promise.complete_with_success("ready".into()).unwrap();
    ///
    /// // Registration after resolution replays the buffered value.
    /// let (tx, rx) = mpsc::channel();
    /// let future = promise.future();
    /// future
    ///     .on_success(QualityOfService::Background, move |s| {
    ///         tx.send(s).unwrap();
    ///     })
    ///     .unwrap();
    /// assert_eq!(rx.recv().unwrap(), "ready");
    /// ```
    pub fn on_success<F>(&self, qos: QualityOfService, callback: F) -> Result<&Self, PromiseError>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let replay: Option<Task> = {
            let mut inner = self.shared.state.lock().unwrap();
            if !inner.success.is_vacant() {
                return Err(PromiseError::AlreadyRegistered);
            }
            if inner.resolved {
                inner.success = Slot::Spent;
                match inner.outcome.take() {
                    Some(Outcome::Success(value)) => Some(Box::new(move || callback(value))),
                    other => {
                        // Error outcome stays buffered for on_failure.
                        inner.outcome = other;
                        None
                    }
                }
            } else {
                inner.success = Slot::Armed((qos, Box::new(callback)));
                None
            }
        };
        if let Some(task) = replay {
            trace!("replaying buffered success at {:?}", qos);
            self.shared.executor.submit(qos, task);
        }
        Ok(self)
    }

    /// Registers the failure callback. Same single-registration and
    /// replay rules as [`on_success`](Self::on_success); dispatch runs at
    /// [`QualityOfService::Default`] since no level is requested here.
    ///
    /// A future resolved with an error before any failure callback exists
    /// buffers it; an error that never gets a callback is dropped when
    /// the last handle goes away.
    pub fn on_failure<F>(&self, callback: F) -> Result<&Self, PromiseError>
    where
        F: FnOnce(E) + Send + 'static,
    {
        let replay: Option<Task> = {
            let mut inner = self.shared.state.lock().unwrap();
            if !inner.failure.is_vacant() {
                return Err(PromiseError::AlreadyRegistered);
            }
            if inner.resolved {
                inner.failure = Slot::Spent;
                match inner.outcome.take() {
                    Some(Outcome::Error(error)) => Some(Box::new(move || callback(error))),
                    other => {
                        inner.outcome = other;
                        None
                    }
                }
            } else {
                inner.failure = Slot::Armed(Box::new(callback));
                None
            }
        };
        if let Some(task) = replay {
            trace!("replaying buffered error");
            self.shared.executor.submit(QualityOfService::Default, task);
        }
        Ok(self)
    }

    /// Whether a terminal outcome has been delivered or buffered.
    pub fn is_resolved(&self) -> bool {
        self.shared.state.lock().unwrap().resolved
    }

    /// Terminal notification. First call wins; the task for a matching
    /// armed callback is submitted after the state lock is released, and
    /// this returns without waiting for it to run.
    pub(crate) fn notify(&self, outcome: Outcome<T, E>) -> Result<(), PromiseError> {
        let dispatch: Option<(QualityOfService, Task)> = {
            let mut inner = self.shared.state.lock().unwrap();
            if inner.resolved {
                return Err(PromiseError::AlreadyResolved);
            }
            inner.resolved = true;
            debug!("future resolved with {}", outcome.label());
            match outcome {
                Outcome::Success(value) => match inner.success.fire() {
                    Some((qos, callback)) => Some((qos, Box::new(move || callback(value)))),
                    None => {
                        inner.outcome = Some(Outcome::Success(value));
                        None
                    }
                },
                Outcome::Error(error) => match inner.failure.fire() {
                    Some(callback) => {
                        Some((QualityOfService::Default, Box::new(move || callback(error))))
                    }
                    None => {
                        inner.outcome = Some(Outcome::Error(error));
                        None
                    }
                },
            }
        };
        match dispatch {
            Some((qos, task)) => self.shared.executor.submit(qos, task),
            None => debug!("no callback armed; outcome buffered"),
        }
        Ok(())
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Future");
        if let Ok(inner) = self.shared.state.try_lock() {
            s.field("resolved", &inner.resolved);
        }
        s.finish_non_exhaustive()
    }
}

/// Producer-facing write-once handle. Created together with its
/// [`Future`], which [`Promise::future`] hands to the consumer.
///
/// Clones share the same future, so completion calls may race from
/// several threads; exactly one takes effect and every loser gets
/// [`PromiseError::AlreadyResolved`].
///
/// # Examples
///
/// ```
/// use promise_cell::{Promise, QualityOfService};
/// use std::sync::mpsc;
/// use std::thread;
///
/// let promise = Promise::<String, String>::new();
/// let (tx, rx) = mpsc::channel();
/// promise
///     .future()
///     .on_success(QualityOfService::UserInitiated, move |s| {
///         tx.send(s).unwrap();
///     })
///     .unwrap();
///
/// let producer = promise.clone();
/// thread::spawn(move || {
///     producer.complete_with_success("🍓".into()).unwrap();
/// });
/// assert_eq!(rx.recv().unwrap(), "🍓");
/// ```
pub struct Promise<T, E> {
    future: Future<T, E>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            future: self.future.clone(),
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Creates a pending promise whose callbacks run on the process-wide
    /// [`default_executor`].
    pub fn new() -> Self {
        Self::with_executor(default_executor())
    }

    /// Creates a pending promise that submits callbacks to `executor`.
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Promise {
            future: Future::new(executor),
        }
    }

    /// The consumer's handle to the eventual outcome.
    pub fn future(&self) -> Future<T, E> {
        self.future.clone()
    }

    /// Resolves the future with `Outcome::Success(value)`. Fails with
    /// [`PromiseError::AlreadyResolved`] if any completion call already
    /// took effect.
    pub fn complete_with_success(&self, value: T) -> Result<(), PromiseError> {
        self.future.notify(Outcome::Success(value))
    }

    /// Resolves the future with `Outcome::Error(error)`. The error is
    /// passed to the failure callback verbatim, never wrapped.
    pub fn complete_with_fail(&self, error: E) -> Result<(), PromiseError> {
        self.future.notify(Outcome::Error(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.future.is_resolved()
    }
}

impl<T, E> Default for Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("future", &self.future)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InlineExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn inline_promise<T: Send + 'static, E: Send + 'static>() -> Promise<T, E> {
        Promise::with_executor(Arc::new(InlineExecutor))
    }

    /// Inline executor that records the quality level of every submission.
    struct RecordingExecutor {
        levels: Mutex<Vec<QualityOfService>>,
    }

    impl RecordingExecutor {
        fn new() -> Self {
            RecordingExecutor {
                levels: Mutex::new(vec![]),
            }
        }
    }

    impl Executor for RecordingExecutor {
        fn submit(&self, qos: QualityOfService, task: Task) {
            self.levels.lock().unwrap().push(qos);
            task();
        }
    }

    #[test]
    fn register_then_resolve_delivers_once() {
        let promise = inline_promise::<i32, ()>();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        promise
            .future()
            .on_success(QualityOfService::Default, move |v| {
                assert_eq!(v, 7);
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        promise.complete_with_success(7).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(promise.is_resolved());
    }

    #[test]
    fn resolve_then_register_replays_value() {
        let promise = inline_promise::<String, ()>();
        promise.complete_with_success("🍓".to_owned()).unwrap();

        let (tx, rx) = mpsc::channel();
        promise
            .future()
            .on_success(QualityOfService::Utility, move |v| tx.send(v).unwrap())
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), "🍓");
    }

    #[test]
    fn second_completion_is_rejected() {
        let promise = inline_promise::<i32, String>();
        promise.complete_with_success(1).unwrap();
        assert_eq!(
            promise.complete_with_success(2),
            Err(PromiseError::AlreadyResolved)
        );
        assert_eq!(
            promise.complete_with_fail("late".to_owned()),
            Err(PromiseError::AlreadyResolved)
        );
    }

    #[test]
    fn losing_completion_fires_no_callback() {
        let promise = inline_promise::<i32, i32>();
        let hits = Arc::new(AtomicUsize::new(0));
        let on_ok = hits.clone();
        let on_err = hits.clone();
        promise
            .future()
            .on_success(QualityOfService::Default, move |_| {
                on_ok.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
            .on_failure(move |_| {
                on_err.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        promise.complete_with_fail(-1).unwrap();
        assert_eq!(promise.complete_with_success(1), Err(PromiseError::AlreadyResolved));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_registration_is_rejected() {
        let promise = inline_promise::<i32, ()>();
        let future = promise.future();
        future
            .on_success(QualityOfService::Default, |_| {})
            .unwrap();
        let err = future
            .on_success(QualityOfService::Default, |_| {})
            .unwrap_err();
        assert_eq!(err, PromiseError::AlreadyRegistered);

        future.on_failure(|_| {}).unwrap();
        assert_eq!(
            future.on_failure(|_| {}).unwrap_err(),
            PromiseError::AlreadyRegistered
        );
    }

    #[test]
    fn late_failure_registration_replays_error() {
        #[derive(Debug, PartialEq)]
        struct IoErrorX(&'static str);

        let promise = inline_promise::<(), IoErrorX>();
        promise.complete_with_fail(IoErrorX("disk gone")).unwrap();

        let (tx, rx) = mpsc::channel();
        promise
            .future()
            .on_failure(move |e| tx.send(e).unwrap())
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), IoErrorX("disk gone"));
    }

    #[test]
    fn unhandled_error_is_dropped_quietly() {
        let promise = inline_promise::<i32, String>();
        assert_eq!(promise.complete_with_fail("nobody listening".to_owned()), Ok(()));
    }

    #[test]
    fn success_callback_never_fires_on_error_path() {
        let promise = inline_promise::<i32, String>();
        promise.complete_with_fail("boom".to_owned()).unwrap();

        // Accepted but retired; the buffered error still reaches on_failure.
        promise
            .future()
            .on_success(QualityOfService::Default, |_| panic!("wrong path"))
            .unwrap();

        let (tx, rx) = mpsc::channel();
        promise
            .future()
            .on_failure(move |e| tx.send(e).unwrap())
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), "boom");
    }

    #[test]
    fn both_paths_dispatch_through_executor() {
        let recorder = Arc::new(RecordingExecutor::new());

        let promise: Promise<i32, ()> = Promise::with_executor(recorder.clone());
        promise
            .future()
            .on_success(QualityOfService::Background, |_| {})
            .unwrap();
        promise.complete_with_success(1).unwrap();

        let failing: Promise<(), i32> = Promise::with_executor(recorder.clone());
        failing.future().on_failure(|_| {}).unwrap();
        failing.complete_with_fail(2).unwrap();

        let levels = recorder.levels.lock().unwrap();
        assert_eq!(
            *levels,
            vec![QualityOfService::Background, QualityOfService::Default]
        );
    }

    #[test]
    fn cloned_futures_share_one_slot() {
        let promise = inline_promise::<i32, ()>();
        let a = promise.future();
        let b = a.clone();
        a.on_success(QualityOfService::Default, |_| {}).unwrap();
        assert_eq!(
            b.on_success(QualityOfService::Default, |_| {}).unwrap_err(),
            PromiseError::AlreadyRegistered
        );
    }
}
