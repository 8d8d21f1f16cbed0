use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::adapters::downstream_closed;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

const STAGE: &str = "iter_source";

/// Emits the items of an iterator once the start signal arrives.
///
/// The iterator is consumed by the first run; running the same source again
/// is an error.
pub struct IterSource<It> {
    items: Mutex<Option<It>>,
}

impl<It> IterSource<It> {
    pub fn new<C>(items: C) -> Self
    where
        C: IntoIterator<IntoIter = It>,
    {
        Self {
            items: Mutex::new(Some(items.into_iter())),
        }
    }
}

#[async_trait]
impl<It> Pipe<(), It::Item> for IterSource<It>
where
    It: Iterator + Send + 'static,
    It::Item: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<It::Item>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        let items = self
            .items
            .lock()
            .expect("mutex poisoned")
            .take()
            .ok_or(Error::pipeline("iterator source already consumed"))?;

        for item in items {
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = output.send(item) => {
                    if sent.is_err() {
                        downstream_closed(STAGE);
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
