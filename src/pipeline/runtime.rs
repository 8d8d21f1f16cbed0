use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::{StageConfig, STAGE_CONFIG};
use crate::pipeline::pipe::Pipe;

/// Spawns pipelines onto the ambient tokio runtime.
///
/// `buffer` is the capacity of every edge; `buffer_stage` and
/// `concurrency_stage` override it (and a concurrency-bounded stage's
/// limit) for the stage with that name.
pub struct Runtime {
    buffer: usize,
    buffers: HashMap<&'static str, usize>,
    concurrencies: HashMap<&'static str, usize>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            buffer: 128,
            buffers: HashMap::new(),
            concurrencies: HashMap::new(),
        }
    }

    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Capacity of the edge feeding the stage named `stage`.
    pub fn buffer_stage(mut self, stage: &'static str, buffer: usize) -> Self {
        self.buffers.insert(stage, buffer.max(1));
        self
    }

    /// Concurrency limit of the concurrency-bounded stage named `stage`.
    pub fn concurrency_stage(mut self, stage: &'static str, concurrency: usize) -> Self {
        self.concurrencies.insert(stage, concurrency.max(1));
        self
    }

    fn stage_config(&self) -> StageConfig {
        StageConfig {
            buffers: Arc::new(self.buffers.clone()),
            concurrencies: Arc::new(self.concurrencies.clone()),
        }
    }

    pub fn spawn<I, O, P>(
        &self,
        pipe: P,
    ) -> (
        mpsc::Sender<I>,
        mpsc::Receiver<O>,
        CancelToken,
        JoinHandle<Result<()>>,
    )
    where
        I: Send + 'static,
        O: Send + 'static,
        P: Pipe<I, O> + Send + Sync + 'static,
    {
        let (tx_in, rx_in) = mpsc::channel::<I>(self.buffer);
        let (tx_out, rx_out) = mpsc::channel::<O>(self.buffer);

        let buffer = self.buffer;
        let cancel = CancelToken::default();
        let cancel_task = cancel.clone();
        let cfg = self.stage_config();

        #[cfg(feature = "tracing")]
        let handle = {
            use tracing::Instrument;
            let stage = pipe.stage_name();
            let span = tracing::info_span!("backflow.stage", stage = stage, buffer = buffer);
            tokio::spawn(
                STAGE_CONFIG
                    .scope(cfg, async move {
                        pipe.process(rx_in, tx_out, buffer, cancel_task).await
                    })
                    .instrument(span),
            )
        };

        #[cfg(not(feature = "tracing"))]
        let handle = tokio::spawn(STAGE_CONFIG.scope(cfg, async move {
            pipe.process(rx_in, tx_out, buffer, cancel_task).await
        }));

        (tx_in, rx_out, cancel, handle)
    }

    /// Like [`Runtime::spawn`] for pipelines ending in a sink; the unit
    /// output is drained internally.
    pub fn spawn_sink<I, P>(
        &self,
        pipe: P,
    ) -> (mpsc::Sender<I>, CancelToken, JoinHandle<Result<()>>)
    where
        I: Send + 'static,
        P: Pipe<I, ()> + Send + Sync + 'static,
    {
        let (tx, mut rx, cancel, inner) = self.spawn(pipe);
        let handle = tokio::spawn(async move {
            let drain = async { while rx.recv().await.is_some() {} };
            let (res, ()) = tokio::join!(inner, drain);
            res?
        });
        (tx, cancel, handle)
    }

    /// Runs a complete job (source through sink) to completion.
    ///
    /// Resolves `Ok` when the source ended, including when a limit stopped it
    /// early; otherwise returns the first unrecovered error.
    pub async fn run<P>(&self, pipe: P) -> Result<()>
    where
        P: Pipe<(), ()> + Send + Sync + 'static,
    {
        let (tx, _cancel, handle) = self.spawn_sink(pipe);
        // A source that already finished (or was aborted) may have dropped
        // its start channel.
        let _ = tx.send(()).await;
        drop(tx);
        handle.await.map_err(Error::from)?
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
