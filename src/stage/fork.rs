use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::error::Result;
use crate::pipeline::adapters::{cancelled, downstream_closed};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

const STAGE: &str = "fork";

/// Sends every item both downstream and into a second pipeline.
///
/// The forked pipeline has its own bounded edge, so it applies backpressure
/// independently of the main one. An item counts as processed only once both
/// edges accepted it. The forked pipeline's own output is drained and
/// discarded.
pub struct ForkPipe<P, X> {
    forked: P,
    _x: std::marker::PhantomData<fn() -> X>,
}

impl<P, X> ForkPipe<P, X> {
    pub fn new(forked: P) -> Self {
        Self {
            forked,
            _x: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T, X, P> Pipe<T, T> for ForkPipe<P, X>
where
    T: Clone + Send + 'static,
    X: Send + 'static,
    P: Pipe<T, X> + Send + Sync,
{
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        input: Receiver<T>,
        output: Sender<T>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let (fork_tx, fork_rx) = mpsc::channel::<T>(buffer);
        let (drain_tx, mut drain_rx) = mpsc::channel::<X>(buffer);

        // Stops feeding as soon as the forked pipeline fails.
        let feeding = cancel.child();

        let forked = async {
            let res = self.forked.process(fork_rx, drain_tx, buffer, cancel.clone()).await;
            if res.is_err() {
                feeding.cancel();
            }
            res
        };
        let drain = async { while drain_rx.recv().await.is_some() {} };
        let feed = feed(input, output, fork_tx, feeding.clone());

        let (fed, forked, ()) = tokio::join!(feed, forked, drain);
        forked?;
        fed
    }
}

async fn feed<T: Clone + Send>(
    mut input: Receiver<T>,
    output: Sender<T>,
    fork: Sender<T>,
    cancel: CancelToken,
) -> Result<()> {
    let mut fork = Some(fork);

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => {
                cancelled(STAGE, "recv");
                break;
            },
            msg = input.recv() => match msg {
                Some(item) => item,
                None => break,
            },
        };

        let (main, fork_closed) = match &fork {
            Some(side) => {
                let (main, side) = tokio::join!(output.send(item.clone()), side.send(item));
                (main, side.is_err())
            }
            None => (output.send(item).await, false),
        };
        if fork_closed {
            // The forked pipeline finished early; the main edge carries on.
            fork = None;
        }
        if main.is_err() {
            downstream_closed(STAGE);
            break;
        }
    }
    // Dropping `fork` here ends the forked pipeline's input.
    Ok(())
}
