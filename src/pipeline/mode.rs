use std::sync::Mutex;

use crate::error::{Error, ErrorRecord, Result};

/// What a stage does when a single item fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Abort the whole pipeline with the first failure.
    #[default]
    Immediate,
    /// Drop the failing item, log it, keep going.
    Suppress,
    /// Keep going, then fail once input is exhausted with every failure.
    Aggregate,
}

/// Per-stage bookkeeping for item failures.
pub(crate) struct Failures {
    stage: &'static str,
    mode: ErrorMode,
    records: Mutex<Vec<ErrorRecord>>,
}

impl Failures {
    pub(crate) fn new(stage: &'static str, mode: ErrorMode) -> Self {
        Self {
            stage,
            mode,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Applies the error mode to one failed item. `Err` means the stage must
    /// stop now.
    pub(crate) fn record(&self, index: usize, error: Error) -> Result<()> {
        if error.is_resource() {
            return Err(error);
        }

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::WARN,
            event = "backflow.item_failed",
            stage = self.stage,
            index = index,
            mode = ?self.mode,
            error = %error,
            "backflow.item_failed"
        );

        match self.mode {
            ErrorMode::Immediate => Err(Error::item(self.stage, index, error)),
            ErrorMode::Suppress => Ok(()),
            ErrorMode::Aggregate => {
                self.records
                    .lock()
                    .expect("mutex poisoned")
                    .push(ErrorRecord { index, error });
                Ok(())
            }
        }
    }

    /// Called once input is exhausted and all work settled.
    pub(crate) fn finish(&self) -> Result<()> {
        let mut failures = std::mem::take(&mut *self.records.lock().expect("mutex poisoned"));
        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by_key(|r| r.index);

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::ERROR,
            event = "backflow.aggregated",
            stage = self.stage,
            failures = failures.len(),
            "backflow.aggregated"
        );

        Err(Error::Aggregated {
            stage: self.stage,
            failures,
        })
    }
}
