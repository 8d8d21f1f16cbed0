//! # backflow
//!
//! **Backpressure-aware data pipelines for ETL-style jobs.**
//!
//! `backflow` processes large or unbounded sequences of records (file
//! exports, database dumps, API pages) under bounded memory and controlled
//! concurrency. A slow consumer never makes a fast producer buffer without
//! bound: every edge of a pipeline is a bounded channel, and a stage that
//! cannot hand an item on simply waits.
//!
//! ---
//!
//! ## Core Model
//!
//! ```text
//! Source → Stage → Stage → … → Sink
//! ```
//!
//! Every link implements [`Pipe`]. Sources are `Pipe<(), T>`, sinks are
//! `Pipe<T, ()>`. Chains are built with [`PipeExt`] and driven by
//! [`Runtime`].
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//!
//! use backflow::prelude::*;
//! use backflow::sink::CollectSink;
//! use backflow::source::IterSource;
//! use backflow::stage::{ChunkPipe, ConcurrentMapPipe};
//!
//! #[tokio::main]
//! async fn main() -> backflow::error::Result<()> {
//!     let out = Arc::new(Mutex::new(Vec::new()));
//!
//!     let fetch = ConcurrentMapPipe::new("fetch", |id: u32| async move {
//!         Ok::<_, backflow::error::Error>(id * 2)
//!     }, 8)?
//!     .error_mode(ErrorMode::Suppress);
//!
//!     let pipe = IterSource::new(0..10_000u32)
//!         .pipe::<u32, _>(fetch)
//!         .filter(|v| v % 3 == 0)
//!         .pipe::<Vec<u32>, _>(ChunkPipe::new(500)?)
//!         .limit(4)
//!         .pipe::<(), _>(CollectSink::new(out.clone()));
//!
//!     Runtime::new().buffer(64).run(pipe).await
//! }
//! ```
//!
//! ---
//!
//! ## Stages
//!
//! - Order preserving: [`ChunkPipe`], [`FlattenPipe`], `filter`, `map`,
//!   `inspect`/`tap`, [`OffsetPipe`], [`LimitPipe`], [`ThrottlePipe`],
//!   [`ProgressPipe`].
//! - Completion order: [`ConcurrentMapPipe`], [`WarmupPipe`],
//!   [`WorkerPoolPipe`], [`CombineSource`]. Use a concurrency of 1 where
//!   input order matters.
//! - Fan-out: [`ForkPipe`], [`MultiForkPipe`]. Fan-in: [`CombineSource`].
//!
//! ---
//!
//! ## Error Handling Contract
//!
//! Concurrency-bounded stages take an [`ErrorMode`]:
//!
//! - `Immediate`: the first failing item fails the pipeline.
//! - `Suppress`: failing items are logged and dropped.
//! - `Aggregate`: the stream runs to the end, then fails with every
//!   [`ErrorRecord`].
//!
//! Invalid configuration fails at construction. Lock protocol violations and
//! crashed workers always fail the pipeline.
//!
//! ---
//!
//! ## Cancellation
//!
//! [`CancelToken`] stops a running pipeline cooperatively. A limit reached
//! downstream is not a failure: upstream sees its edge close, gets one
//! scheduler tick to stop on its own, and is then cancelled.
//!
//! ---
//!
//! ## Observability
//!
//! With the default `tracing` feature, `backflow` emits structured events
//! such as `backflow.stage`, `backflow.cancelled`,
//! `backflow.downstream.closed`, `backflow.limit.reached`,
//! `backflow.item_failed`, `backflow.worker.crashed` and
//! `backflow.progress`.
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_target(false)
//!     .with_env_filter("backflow=info")
//!     .init();
//! ```
//!
//! [`Pipe`]: pipeline::pipe::Pipe
//! [`PipeExt`]: pipeline::chain::PipeExt
//! [`Runtime`]: pipeline::runtime::Runtime
//! [`CancelToken`]: pipeline::cancel::CancelToken
//! [`ErrorMode`]: pipeline::mode::ErrorMode
//! [`ErrorRecord`]: error::ErrorRecord
//! [`ChunkPipe`]: stage::ChunkPipe
//! [`FlattenPipe`]: stage::FlattenPipe
//! [`OffsetPipe`]: stage::OffsetPipe
//! [`LimitPipe`]: stage::LimitPipe
//! [`ThrottlePipe`]: stage::ThrottlePipe
//! [`ProgressPipe`]: stage::ProgressPipe
//! [`ConcurrentMapPipe`]: stage::ConcurrentMapPipe
//! [`WarmupPipe`]: stage::WarmupPipe
//! [`WorkerPoolPipe`]: stage::WorkerPoolPipe
//! [`CombineSource`]: stage::CombineSource
//! [`ForkPipe`]: stage::ForkPipe
//! [`MultiForkPipe`]: stage::MultiForkPipe

pub mod error;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stage;

pub mod prelude {
    //! Convenient imports for most `backflow` users.

    pub use crate::pipeline::cancel::CancelToken;
    pub use crate::pipeline::chain::PipeExt;
    pub use crate::pipeline::mode::ErrorMode;
    pub use crate::pipeline::pipe::Pipe;
    pub use crate::pipeline::runtime::Runtime;
}
