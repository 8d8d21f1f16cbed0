//! Reference sources: adapters that play the Source role for in-memory
//! data and externally fed channels.

pub mod channel;
pub mod iter;

pub use channel::ReceiverSource;
pub use iter::IterSource;
