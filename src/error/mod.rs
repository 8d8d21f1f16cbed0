use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pipeline error: {context}")]
    Pipeline { context: &'static str },

    #[error("{0}")]
    Message(String),

    #[error("invalid configuration for stage `{stage}`: {reason}")]
    Config { stage: &'static str, reason: String },

    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("stage `{stage}` failed on item {index}: {source}")]
    Item {
        stage: &'static str,
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("stage `{stage}` finished with {} failed item(s): {}", .failures.len(), Failures(.failures))]
    Aggregated {
        stage: &'static str,
        failures: Vec<ErrorRecord>,
    },

    #[error("backpressure lock violation: {context}")]
    LockViolation { context: &'static str },

    #[error("worker {worker} crashed: {message}")]
    WorkerCrashed { worker: usize, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn pipeline(context: &'static str) -> Self {
        Self::Pipeline { context }
    }

    pub fn msg(message: impl fmt::Display) -> Self {
        Self::Message(message.to_string())
    }

    pub fn config(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            stage,
            reason: reason.into(),
        }
    }

    pub fn stage_source(stage: &'static str, source: Error) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }

    pub fn item(stage: &'static str, index: usize, source: Error) -> Self {
        Self::Item {
            stage,
            index,
            source: Box::new(source),
        }
    }

    /// Broken invariants: these always abort the pipeline, whatever the
    /// stage's error mode says.
    pub fn is_resource(&self) -> bool {
        match self {
            Self::LockViolation { .. } | Self::WorkerCrashed { .. } | Self::Join(_) => true,
            Self::Stage { source, .. } | Self::Item { source, .. } => source.is_resource(),
            _ => false,
        }
    }
}

/// One failed item, kept by stages running in [`ErrorMode::Aggregate`].
///
/// [`ErrorMode::Aggregate`]: crate::pipeline::mode::ErrorMode::Aggregate
#[derive(Debug)]
pub struct ErrorRecord {
    pub index: usize,
    pub error: Error,
}

struct Failures<'a>(&'a [ErrorRecord]);

impl fmt::Display for Failures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, record) in self.0.iter().enumerate() {
            if n > 0 {
                f.write_str("; ")?;
            }
            write!(f, "#{}: {}", record.index, record.error)?;
        }
        Ok(())
    }
}
