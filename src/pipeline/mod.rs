pub mod adapters;
pub mod cancel;
pub mod chain;
pub(crate) mod config;
pub mod lock;
pub mod mode;
pub mod pipe;
pub mod runtime;
pub mod slots;
