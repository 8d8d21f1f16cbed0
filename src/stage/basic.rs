use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::adapters::{cancelled, downstream_closed};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

/// Groups items into `Vec`s of `size`. The last chunk may be short; an
/// empty input yields no chunk at all.
pub struct ChunkPipe {
    size: usize,
}

impl ChunkPipe {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::config("chunk", "chunk size must be at least 1"));
        }
        Ok(Self { size })
    }
}

#[async_trait]
impl<T> Pipe<T, Vec<T>> for ChunkPipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "chunk"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<Vec<T>>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mut pending = Vec::with_capacity(self.size);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled("chunk", "recv");
                    return Ok(());
                },
                msg = input.recv() => {
                    let Some(item) = msg else { break; };
                    pending.push(item);
                    if pending.len() == self.size {
                        let chunk = std::mem::replace(&mut pending, Vec::with_capacity(self.size));
                        if output.send(chunk).await.is_err() {
                            downstream_closed("chunk");
                            return Ok(());
                        }
                    }
                }
            }
        }

        if !pending.is_empty() && output.send(pending).await.is_err() {
            downstream_closed("chunk");
        }
        Ok(())
    }
}

/// Emits every element of each incoming collection, in order.
pub struct FlattenPipe;

#[async_trait]
impl<C> Pipe<C, C::Item> for FlattenPipe
where
    C: IntoIterator + Send + 'static,
    C::Item: Send + 'static,
    C::IntoIter: Send,
{
    fn stage_name(&self) -> &'static str {
        "flatten"
    }

    async fn process(
        &self,
        mut input: Receiver<C>,
        output: Sender<C::Item>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled("flatten", "recv");
                    break
                },
                msg = input.recv() => {
                    let Some(batch) = msg else { break; };
                    for item in batch {
                        if output.send(item).await.is_err() {
                            downstream_closed("flatten");
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Drops the first `n` items.
pub struct OffsetPipe {
    skip: usize,
}

impl OffsetPipe {
    pub fn new(skip: usize) -> Self {
        Self { skip }
    }
}

#[async_trait]
impl<T> Pipe<T, T> for OffsetPipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        "offset"
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mut seen = 0usize;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(item) = msg else { break; };
                    seen += 1;
                    if seen <= self.skip {
                        continue;
                    }
                    if output.send(item).await.is_err() {
                        downstream_closed("offset");
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
