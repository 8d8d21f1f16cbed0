//! Specialized stages built on the pipeline engine.

pub mod basic;
pub mod combine;
pub mod concurrent_map;
pub mod fork;
pub mod limit;
pub mod multi_fork;
pub mod progress;
pub mod throttle;
pub mod warmup;
pub mod worker_pool;

pub use basic::{ChunkPipe, FlattenPipe, OffsetPipe};
pub use combine::{CombineSource, SharedSource};
pub use concurrent_map::ConcurrentMapPipe;
pub use fork::ForkPipe;
pub use limit::LimitPipe;
pub use multi_fork::MultiForkPipe;
pub use progress::ProgressPipe;
pub use throttle::ThrottlePipe;
pub use warmup::WarmupPipe;
pub use worker_pool::{Worker, WorkerPoolPipe};
