//! Reference sinks.

pub mod collect;
pub mod for_each;

pub use collect::CollectSink;
pub use for_each::ForEachSink;
