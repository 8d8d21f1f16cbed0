use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;

/// One link of a pipeline.
///
/// A stage pulls items from `input` and pushes zero or more items per input
/// into `output`. Both edges are bounded channels: a send that has to wait
/// for capacity is the stage being paused, and every `recv` is capacity
/// handed back upstream.
///
/// Sources are `Pipe<(), T>` and start producing once the start signal
/// arrives (or the start channel is closed). Sinks are `Pipe<T, ()>`.
/// Returning `Ok(())` closes `output`, which is end-of-stream for the next
/// stage; dropping `input` early tells upstream to stop producing.
#[async_trait]
pub trait Pipe<I: Send + 'static, O: Send + 'static>: Send + Sync {
    fn stage_name(&self) -> &'static str {
        "pipe"
    }

    async fn process(
        &self,
        input: Receiver<I>,
        output: Sender<O>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()>;
}
