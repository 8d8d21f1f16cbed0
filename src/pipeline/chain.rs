use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::pipeline::adapters::{FilterPipe, InspectPipe, MapPipe};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config;
use crate::pipeline::pipe::Pipe;
use crate::stage::basic::{FlattenPipe, OffsetPipe};
use crate::stage::limit::LimitPipe;
use crate::stage::progress::ProgressPipe;

pub struct Chain<A, B, M> {
    a: A,
    b: B,
    _m: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(a: A, b: B) -> Self {
        Self {
            a,
            b,
            _m: PhantomData,
        }
    }
}

#[async_trait]
impl<I, M, O, A, B> Pipe<I, O> for Chain<A, B, M>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
    A: Pipe<I, M> + Send + Sync,
    B: Pipe<M, O> + Send + Sync,
{
    fn stage_name(&self) -> &'static str {
        self.b.stage_name()
    }

    async fn process(
        &self,
        input: mpsc::Receiver<I>,
        output: mpsc::Sender<O>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mid = config::buffer_for(self.b.stage_name(), buffer);
        let (tx_mid, rx_mid) = mpsc::channel::<M>(mid);

        // Upstream runs under a child token: it can be stopped on its own when
        // downstream is done, and stops with everything else on failure.
        let upstream = cancel.child();

        let left = self.a.process(input, tx_mid, buffer, upstream.clone());
        let right = self.b.process(rx_mid, output, buffer, cancel.clone());

        tokio::pin!(left);
        tokio::pin!(right);

        let mut left_done = false;
        let mut right_done = false;
        let mut finished_early = false;
        let mut first_error: Option<Error> = None;

        loop {
            tokio::select! {
                res = &mut left, if !left_done => {
                    left_done = true;
                    // Downstream keeps draining what was already accepted and
                    // then sees end-of-stream.
                    if let Err(err) = res {
                        upstream.cancel();
                        first_error.get_or_insert(err);
                    }
                }
                res = &mut right, if !right_done => {
                    right_done = true;
                    match res {
                        Err(err) => {
                            cancel.cancel();
                            first_error.get_or_insert(err);
                        }
                        Ok(()) => finished_early = !left_done,
                    }
                }
            }

            if finished_early {
                // Downstream finished early (limit reached, sink stopped).
                // Upstream gets one tick to notice the closed edge on its own
                // before it is torn down.
                finished_early = false;
                let graceful = tokio::select! {
                    biased;
                    res = &mut left => Some(res),
                    _ = tokio::task::yield_now() => None,
                };
                match graceful {
                    Some(res) => {
                        left_done = true;
                        if let Err(err) = res {
                            first_error.get_or_insert(err);
                        }
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::event!(
                            tracing::Level::DEBUG,
                            event = "backflow.cancelled",
                            stage = self.a.stage_name(),
                            where_ = "upstream_teardown",
                            "backflow.cancelled"
                        );
                        upstream.cancel();
                    }
                }
            }

            if left_done && right_done {
                break;
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub trait PipeExt<I, O>: Pipe<I, O> + Sized
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn pipe<N, P2>(self, next: P2) -> Chain<Self, P2, O>
    where
        N: Send + 'static,
        P2: Pipe<O, N> + Send + Sync,
        Self: Send + Sync,
    {
        Chain::new(self, next)
    }

    fn map<N, F>(self, f: F) -> Chain<Self, MapPipe<F>, O>
    where
        N: Send + 'static,
        F: Fn(O) -> N + Send + Sync + 'static,
        Self: Send + Sync,
    {
        Chain::new(self, MapPipe(f))
    }

    fn filter<F>(self, pred: F) -> Chain<Self, FilterPipe<F>, O>
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
        Self: Send + Sync,
    {
        Chain::new(self, FilterPipe(pred))
    }

    fn inspect<F>(self, f: F) -> Chain<Self, InspectPipe<F>, O>
    where
        F: Fn(&O) + Send + Sync + 'static,
        Self: Send + Sync,
    {
        Chain::new(self, InspectPipe(f))
    }

    /// Alias of [`PipeExt::inspect`].
    fn tap<F>(self, f: F) -> Chain<Self, InspectPipe<F>, O>
    where
        F: Fn(&O) + Send + Sync + 'static,
        Self: Send + Sync,
    {
        self.inspect(f)
    }

    fn flatten(self) -> Chain<Self, FlattenPipe, O>
    where
        O: IntoIterator,
        O::Item: Send + 'static,
        O::IntoIter: Send,
        Self: Send + Sync,
    {
        Chain::new(self, FlattenPipe)
    }

    fn offset(self, n: usize) -> Chain<Self, OffsetPipe, O>
    where
        Self: Send + Sync,
    {
        Chain::new(self, OffsetPipe::new(n))
    }

    /// Stops the pipeline gracefully after `n` items. `0` disables the limit.
    fn limit(self, n: usize) -> Chain<Self, LimitPipe, O>
    where
        Self: Send + Sync,
    {
        Chain::new(self, LimitPipe::new(Some(n)))
    }

    fn progress(self, label: &'static str, every: u64) -> Chain<Self, ProgressPipe, O>
    where
        Self: Send + Sync,
    {
        Chain::new(self, ProgressPipe::new(label, every))
    }
}

impl<I, O, P> PipeExt<I, O> for P
where
    I: Send + 'static,
    O: Send + 'static,
    P: Pipe<I, O> + Sized + Send + Sync,
{
}
