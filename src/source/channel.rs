use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::adapters::downstream_closed;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

const STAGE: &str = "receiver_source";

/// Bridges an externally fed channel (a file reader, a DB export task) into
/// a pipeline. The feeding side sees backpressure as a waiting `send`.
pub struct ReceiverSource<T> {
    rx: Mutex<Option<Receiver<T>>>,
}

impl<T> ReceiverSource<T> {
    pub fn new(rx: Receiver<T>) -> Self {
        Self {
            rx: Mutex::new(Some(rx)),
        }
    }
}

#[async_trait]
impl<T> Pipe<(), T> for ReceiverSource<T>
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        let mut rx = self
            .rx
            .lock()
            .expect("mutex poisoned")
            .take()
            .ok_or(Error::pipeline("receiver source already consumed"))?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => {
                    let Some(item) = msg else { break; };
                    if output.send(item).await.is_err() {
                        downstream_closed(STAGE);
                        break;
                    }
                }
            }
        }
        // Closing tells the feeding side to stop.
        rx.close();
        Ok(())
    }
}
