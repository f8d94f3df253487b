//! Task handles
//!
//! The asynchronous result of an operation running on the worker pool.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{FsError, Result};

type Output = Box<dyn Any + Send>;
type Finish<T> = Box<dyn FnOnce(Output) -> Result<T> + Send>;

/// Handle to a result that is produced on another thread.
///
/// There is no cancellation. Callers build timeouts from `wait_timeout`,
/// which hands the task back when the deadline passes.
#[must_use = "a task does nothing observable unless its result is awaited"]
pub struct Task<T> {
    rx: Receiver<Result<Output>>,
    finish: Finish<T>,
}

/// Sending half of a task; completing it wakes the waiter
pub(crate) struct Completer {
    tx: Sender<Result<Output>>,
}

impl Completer {
    pub(crate) fn complete<T: Send + 'static>(self, result: Result<T>) {
        // The waiter may have dropped its task; nobody is left to tell.
        let _ = self.tx.send(result.map(|value| Box::new(value) as Output));
    }
}

impl<T: Send + 'static> Task<T> {
    /// A task and the completer that resolves it
    pub(crate) fn pending() -> (Completer, Self) {
        let (tx, rx) = channel::bounded(1);
        (
            Completer { tx },
            Self {
                rx,
                finish: Box::new(downcast::<T>),
            },
        )
    }

    /// A task that is already resolved
    pub fn ready(result: Result<T>) -> Self {
        let (completer, task) = Self::pending();
        completer.complete(result);
        task
    }
}

impl<T> Task<T> {
    /// Block until the result is available
    pub fn wait(self) -> Result<T> {
        match self.rx.recv() {
            Ok(result) => result.and_then(self.finish),
            Err(_) => Err(abandoned()),
        }
    }

    /// Block for at most `timeout`; on timeout the task is handed back
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Ok(result.and_then(self.finish)),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(abandoned())),
        }
    }

    /// Take the result if it is ready, otherwise hand the task back
    pub fn try_wait(self) -> std::result::Result<Result<T>, Self> {
        match self.rx.try_recv() {
            Ok(result) => Ok(result.and_then(self.finish)),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Err(abandoned())),
        }
    }

    /// Transform the successful result once it arrives
    pub fn map<U, F>(self, f: F) -> Task<U>
    where
        F: FnOnce(T) -> U + Send + 'static,
        T: 'static,
    {
        let finish = self.finish;
        Task {
            rx: self.rx,
            finish: Box::new(move |output| finish(output).map(f)),
        }
    }

    /// Chain a fallible transformation onto the result
    pub fn and_then<U, F>(self, f: F) -> Task<U>
    where
        F: FnOnce(T) -> Result<U> + Send + 'static,
        T: 'static,
    {
        let finish = self.finish;
        Task {
            rx: self.rx,
            finish: Box::new(move |output| finish(output).and_then(f)),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("ready", &!self.rx.is_empty())
            .finish_non_exhaustive()
    }
}

fn downcast<T: 'static>(output: Output) -> Result<T> {
    output
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| FsError::Worker("task produced a value of the wrong type".to_string()))
}

fn abandoned() -> FsError {
    FsError::Worker("task was abandoned before completing".to_string())
}
