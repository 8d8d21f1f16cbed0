use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::adapters::cancelled;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

/// Hands each item to an async consumer, one at a time.
///
/// The next item is not pulled until the consumer's future resolves, so a
/// slow consumer backs up the whole pipeline. A consumer error fails the
/// pipeline.
pub struct ForEachSink<F> {
    stage: &'static str,
    f: F,
}

impl<F> ForEachSink<F> {
    pub fn new(stage: &'static str, f: F) -> Self {
        Self { stage, f }
    }
}

#[async_trait]
impl<T, F, Fut> Pipe<T, ()> for ForEachSink<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        _output: Sender<()>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled(self.stage, "recv");
                    break
                },
                msg = input.recv() => {
                    let Some(item) = msg else { break; };
                    (self.f)(item)
                        .await
                        .map_err(|err| Error::stage_source(self.stage, err))?;
                }
            }
        }
        Ok(())
    }
}
