//! # bridge_worker
//!
//! The worker side of the bridge. A worker process owns a [`Kernel`] (the
//! scientific code, or a stand-in for it) and answers call frames through a
//! [`Dispatcher`] that checks every frame against the shared function table.
//!
//! - [`WorkerRunner`] serves a dispatcher over NATS.
//! - [`LoopbackTransport`] serves it in-process, for tests and embedding.
//! - [`MemoryKernel`] is a configurable kernel that keeps entities, grid
//!   cells and parameters in memory.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bridge_spec::FunctionTable;
//! use bridge_worker::{MemoryKernel, WorkerConfig, WorkerRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let table = Arc::new(FunctionTable::new());
//!     let runner = WorkerRunner::new(WorkerConfig::new("evtwin"));
//!     runner.run(table, MemoryKernel::new()).await
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod kernel;
pub mod loopback;
pub mod memory;
pub mod runner;

pub use config::WorkerConfig;
pub use dispatcher::Dispatcher;
pub use error::KernelError;
pub use kernel::{Invocation, Kernel, Outcome};
pub use loopback::{KillSwitch, LoopbackTransport};
pub use memory::{MemoryKernel, RecordedCall};
pub use runner::WorkerRunner;
