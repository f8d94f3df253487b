//! Runtime Module
//!
//! Asynchronous results over blocking file I/O.
//!
//! ## Architecture
//! - Fixed worker thread pool fed by a crossbeam channel
//! - Each submitted operation gets a one-shot `Task<T>` handle
//! - Operations block only inside file reads/writes on the worker

mod pool;
mod task;

pub use pool::WorkerPool;
pub use task::Task;
