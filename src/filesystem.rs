//! Filesystem
//!
//! Asynchronous front-end over the engine: every operation is queued on the
//! worker pool and answered through a `Task`.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::compaction::CompactionOutcome;
use crate::engine::Engine;
use crate::error::Result;
use crate::proxy::FilesystemProxy;
use crate::runtime::{Task, WorkerPool};

/// An open filesystem inside a host file
pub struct FileFs {
    engine: Arc<Engine>,
    pool: WorkerPool,
}

impl FileFs {
    const WORKER_NAME: &'static str = "filefs-worker";

    /// Create a fresh filesystem at `path`.
    ///
    /// **Destructive**: any existing content of `path` is truncated away.
    pub fn create(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let threads = config.worker_threads;
        let engine = Engine::create(path, config)?;
        Self::with_engine(engine, threads)
    }

    /// Open an existing filesystem at `path`
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let threads = config.worker_threads;
        let engine = Engine::open(path, config)?;
        Self::with_engine(engine, threads)
    }

    fn with_engine(engine: Engine, threads: usize) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(engine),
            pool: WorkerPool::new(threads, Self::WORKER_NAME)?,
        })
    }

    /// The synchronous engine behind this filesystem
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn submit<T, F>(&self, op: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> Result<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        self.pool.spawn(move || op(&engine))
    }
}

impl FilesystemProxy for FileFs {
    fn write<R>(&self, name: &str, source: R, len: u64) -> Task<()>
    where
        R: Read + Send + 'static,
    {
        let name = name.to_string();
        self.submit(move |engine| engine.write(&name, source, len).map(|_| ()))
    }

    fn delete(&self, name: &str) -> Task<bool> {
        let name = name.to_string();
        self.submit(move |engine| engine.delete(&name))
    }

    fn read<W>(&self, name: &str, mut destination: W) -> Task<W>
    where
        W: Write + Send + 'static,
    {
        let name = name.to_string();
        self.submit(move |engine| {
            engine.read(&name, &mut destination)?;
            Ok(destination)
        })
    }

    fn update<R>(&self, name: &str, source: R, len: u64) -> Task<()>
    where
        R: Read + Send + 'static,
    {
        let name = name.to_string();
        self.submit(move |engine| engine.update(&name, source, len).map(|_| ()))
    }

    fn list(&self, prefix: Option<&str>) -> Task<BTreeSet<String>> {
        Task::ready(self.engine.list(prefix))
    }

    fn defrag(&self) -> Task<CompactionOutcome> {
        self.submit(|engine| engine.defrag())
    }

    /// Let queued operations finish, then sync and release the host file
    fn close(&self) -> Result<()> {
        self.pool.shutdown();
        self.engine.close()
    }
}
