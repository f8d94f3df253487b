//! Worker Pool
//!
//! Fixed set of threads draining a shared job queue.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use crate::error::{FsError, Result};

use super::Task;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs blocking operations off the caller's thread
pub struct WorkerPool {
    /// Job queue; `None` after shutdown
    sender: Mutex<Option<Sender<Job>>>,

    /// Worker threads, joined on shutdown
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `threads` workers named `{name}-{n}`
    pub fn new(threads: usize, name: &str) -> Result<Self> {
        if threads == 0 {
            return Err(FsError::Config("worker pool needs at least one thread".to_string()));
        }

        let (sender, receiver) = channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || {
                    for job in receiver.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!("worker job panicked");
                        }
                    }
                })?;
            workers.push(handle);
        }

        tracing::debug!(threads, name, "worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Queue `op`; the returned task resolves with its result.
    ///
    /// After shutdown the task resolves immediately with `FsError::Closed`.
    pub fn spawn<T, F>(&self, op: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (completer, task) = Task::pending();

        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Task::ready(Err(FsError::Closed));
        };

        let job: Job = Box::new(move || completer.complete(op()));
        if sender.send(job).is_err() {
            return Task::ready(Err(FsError::Closed));
        }
        task
    }

    /// Stop accepting jobs, let queued jobs finish, and join the workers
    pub fn shutdown(&self) {
        // Dropping the sender ends every worker's loop once the queue drains.
        if self.sender.lock().take().is_none() {
            return;
        }

        let current = thread::current().id();
        for handle in self.workers.lock().drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!("worker thread exited with a panic");
            }
        }
        tracing::debug!("worker pool stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
