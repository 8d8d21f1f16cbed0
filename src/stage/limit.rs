use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::adapters::downstream_closed;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

const STAGE: &str = "limit";

/// Graceful early termination after a fixed number of items.
///
/// On the last allowed item the stage forwards it, closes its input (the
/// abort signal every upstream producer sees as a failed send) and returns,
/// which ends the stream downstream. Upstream gets one scheduler tick from
/// the enclosing chain to wind down on its own before it is cancelled.
/// None of this is reported as an error.
pub struct LimitPipe {
    limit: Option<usize>,
}

impl LimitPipe {
    /// `None` and `Some(0)` disable limiting.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit: limit.filter(|n| *n > 0),
        }
    }
}

#[async_trait]
impl<T> Pipe<T, T> for LimitPipe
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
        let Some(limit) = self.limit else {
            return forward(input, output, cancel).await;
        };

        let mut count = 0usize;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(item) = msg else { break; };
                    count += 1;
                    if output.send(item).await.is_err() {
                        downstream_closed(STAGE);
                        break;
                    }
                    if count >= limit {
                        input.close();

                        #[cfg(feature = "tracing")]
                        tracing::event!(
                            tracing::Level::INFO,
                            event = "backflow.limit.reached",
                            stage = STAGE,
                            limit = limit,
                            "backflow.limit.reached"
                        );
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

async fn forward<T: Send>(
    mut input: Receiver<T>,
    output: Sender<T>,
    cancel: CancelToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = input.recv() => {
                let Some(item) = msg else { break; };
                if output.send(item).await.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
