//! Proxy Layer
//!
//! The operation set every filesystem front-end exposes. `FileFs` implements
//! it directly; decorators wrap another implementation and may rewrite names
//! or bytes on the way in and out (encryption, namespacing), but must keep the
//! ordering and atomicity of the wrapped implementation.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use crate::engine::compaction::CompactionOutcome;
use crate::error::Result;
use crate::runtime::Task;

/// Asynchronous filename-keyed object operations
pub trait FilesystemProxy: Send + Sync {
    /// Store `len` bytes from `source` under `name`
    fn write<R>(&self, name: &str, source: R, len: u64) -> Task<()>
    where
        R: Read + Send + 'static;

    /// Soft-delete `name`; resolves to whether a live record existed
    fn delete(&self, name: &str) -> Task<bool>;

    /// Stream the object into `destination`, handing it back when done
    fn read<W>(&self, name: &str, destination: W) -> Task<W>
    where
        W: Write + Send + 'static;

    /// Replace the object stored under `name`
    fn update<R>(&self, name: &str, source: R, len: u64) -> Task<()>
    where
        R: Read + Send + 'static;

    /// Snapshot of names starting with `prefix`; `None` lists everything
    fn list(&self, prefix: Option<&str>) -> Task<BTreeSet<String>>;

    /// Reclaim space held by deleted and superseded records
    fn defrag(&self) -> Task<CompactionOutcome>;

    /// Flush and release the underlying storage
    fn close(&self) -> Result<()>;
}

/// Decorator that forwards every call unchanged
#[derive(Debug)]
pub struct Passthrough<P> {
    inner: P,
}

impl<P: FilesystemProxy> Passthrough<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: FilesystemProxy> FilesystemProxy for Passthrough<P> {
    fn write<R>(&self, name: &str, source: R, len: u64) -> Task<()>
    where
        R: Read + Send + 'static,
    {
        self.inner.write(name, source, len)
    }

    fn delete(&self, name: &str) -> Task<bool> {
        self.inner.delete(name)
    }

    fn read<W>(&self, name: &str, destination: W) -> Task<W>
    where
        W: Write + Send + 'static,
    {
        self.inner.read(name, destination)
    }

    fn update<R>(&self, name: &str, source: R, len: u64) -> Task<()>
    where
        R: Read + Send + 'static,
    {
        self.inner.update(name, source, len)
    }

    fn list(&self, prefix: Option<&str>) -> Task<BTreeSet<String>> {
        self.inner.list(prefix)
    }

    fn defrag(&self) -> Task<CompactionOutcome> {
        self.inner.defrag()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
