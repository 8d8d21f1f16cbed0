use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::Instant;

use crate::error::Result;
use crate::pipeline::adapters::downstream_closed;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

const STAGE: &str = "progress";

/// Pass-through that reports how many items went by.
///
/// Emits a `backflow.progress` event every `every` items and once more at
/// end-of-stream. Reporting is purely observational; with the `tracing`
/// feature off the stage is a plain forwarder.
pub struct ProgressPipe {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    label: &'static str,
    every: u64,
}

impl ProgressPipe {
    pub fn new(label: &'static str, every: u64) -> Self {
        Self {
            label,
            every: every.max(1),
        }
    }
}

#[async_trait]
impl<T> Pipe<T, T> for ProgressPipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let started = Instant::now();
        let mut count = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(item) = msg else { break; };
                    count += 1;
                    if count % self.every == 0 {
                        self.report(count, started, false);
                    }
                    if output.send(item).await.is_err() {
                        downstream_closed(STAGE);
                        break;
                    }
                }
            }
        }

        self.report(count, started, true);
        Ok(())
    }
}

impl ProgressPipe {
    #[allow(unused_variables)]
    fn report(&self, count: u64, started: Instant, done: bool) {
        #[cfg(feature = "tracing")]
        {
            let secs = started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 { count as f64 / secs } else { 0.0 };
            tracing::event!(
                tracing::Level::INFO,
                event = "backflow.progress",
                label = self.label,
                count = count,
                per_sec = format_args!("{rate:.1}"),
                done = done,
                "backflow.progress"
            );
        }
    }
}
