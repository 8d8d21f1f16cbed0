use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinSet;

use crate::error::Result;
use crate::pipeline::adapters::{cancelled, downstream_closed};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config;
use crate::pipeline::pipe::Pipe;

const STAGE: &str = "multi_fork";

/// Fan-out into a sequence of segment pipelines.
///
/// Every item goes downstream and into the current segment. `split` sees
/// each item with its running index; when it returns `true` the current
/// segment (if it holds anything) is closed and a new one, built by
/// `segment(ordinal)`, starts with that item. The last segment runs until the
/// input ends.
pub struct MultiForkPipe<S, G, X> {
    split: S,
    segment: G,
    _x: PhantomData<fn() -> X>,
}

impl<S, G, X> MultiForkPipe<S, G, X> {
    pub fn new(split: S, segment: G) -> Self {
        Self {
            split,
            segment,
            _x: PhantomData,
        }
    }
}

#[async_trait]
impl<T, X, S, G, P> Pipe<T, T> for MultiForkPipe<S, G, X>
where
    T: Clone + Send + 'static,
    X: Send + 'static,
    S: Fn(&T, usize) -> bool + Send + Sync,
    G: Fn(usize) -> P + Send + Sync,
    P: Pipe<T, X> + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mut segments: JoinSet<Result<()>> = JoinSet::new();
        let mut current: Option<Sender<T>> = None;
        let mut ordinal = 0usize;
        let mut index = 0usize;

        let outcome: Result<()> = async {
            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled(STAGE, "recv");
                        break;
                    },
                    Some(joined) = segments.join_next(), if !segments.is_empty() => {
                        joined??;
                        continue;
                    },
                    msg = input.recv() => match msg {
                        Some(item) => item,
                        None => break,
                    },
                };

                if (self.split)(&item, index) && current.is_some() {
                    // Dropping the sender is the segment's end-of-stream.
                    current = None;
                }
                index += 1;

                let side = match current.clone() {
                    Some(side) => side,
                    None => {
                        let side = self.open(ordinal, &mut segments, buffer, &cancel);
                        ordinal += 1;
                        current = Some(side.clone());
                        side
                    }
                };

                // A segment that stopped early just misses the rest of its run.
                let (main, _) = tokio::join!(output.send(item.clone()), side.send(item));
                if main.is_err() {
                    downstream_closed(STAGE);
                    break;
                }
            }

            drop(current.take());
            while let Some(joined) = segments.join_next().await {
                joined??;
            }
            Ok(())
        }
        .await;

        if outcome.is_err() {
            segments.abort_all();
        }
        outcome
    }
}

impl<S, G, X> MultiForkPipe<S, G, X> {
    fn open<T, P>(
        &self,
        ordinal: usize,
        segments: &mut JoinSet<Result<()>>,
        buffer: usize,
        cancel: &CancelToken,
    ) -> Sender<T>
    where
        T: Send + 'static,
        X: Send + 'static,
        G: Fn(usize) -> P,
        P: Pipe<T, X> + Send + Sync + 'static,
    {
        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "backflow.multi_fork.segment",
            segment = ordinal,
            "backflow.multi_fork.segment"
        );

        let (tx, rx) = mpsc::channel::<T>(buffer);
        let pipe = (self.segment)(ordinal);
        let cancel = cancel.clone();

        segments.spawn(config::scoped(async move {
            let (drain_tx, mut drain_rx) = mpsc::channel::<X>(buffer);
            let drain = async { while drain_rx.recv().await.is_some() {} };
            let (res, ()) = tokio::join!(pipe.process(rx, drain_tx, buffer, cancel), drain);
            res
        }));
        tx
    }
}
