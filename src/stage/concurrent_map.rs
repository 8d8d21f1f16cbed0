use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::pipeline::adapters::{cancelled, downstream_closed};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config;
use crate::pipeline::mode::{ErrorMode, Failures};
use crate::pipeline::pipe::Pipe;
use crate::pipeline::slots::{SlotGuard, Slots};

/// Runs an async mapper on up to `concurrency` items at once.
///
/// Results are emitted in completion order, not input order. Use a
/// concurrency of 1 when order matters.
pub struct ConcurrentMapPipe<F> {
    stage: &'static str,
    f: Arc<F>,
    concurrency: usize,
    mode: ErrorMode,
}

impl<F> ConcurrentMapPipe<F> {
    pub fn new(stage: &'static str, f: F, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::config(stage, "concurrency must be at least 1"));
        }
        Ok(Self {
            stage,
            f: Arc::new(f),
            concurrency,
            mode: ErrorMode::default(),
        })
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }
}

#[async_trait]
impl<I, O, F, Fut> Pipe<I, O> for ConcurrentMapPipe<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    async fn process(
        &self,
        input: Receiver<I>,
        output: Sender<O>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let limit = Fixed(config::concurrency_for(self.stage, self.concurrency));
        let dispatch = Dispatch {
            stage: self.stage,
            f: Arc::clone(&self.f),
            mode: self.mode,
        };
        dispatch.run(input, output, cancel, limit).await
    }
}

/// How many invocations a dispatch loop may have in flight.
pub(crate) trait Admission: Send {
    /// The limit right now, and when it next grows if it still can.
    fn current(&mut self) -> (usize, Option<Instant>);

    /// Once true the limit is final and admission skips the slot lock; the
    /// number of running invocations is counted directly.
    fn pass_through(&self) -> bool {
        false
    }
}

pub(crate) struct Fixed(pub usize);

impl Admission for Fixed {
    fn current(&mut self) -> (usize, Option<Instant>) {
        (self.0, None)
    }
}

/// The receive/dispatch loop shared by concurrency-bounded mapping stages.
pub(crate) struct Dispatch<F> {
    pub stage: &'static str,
    pub f: Arc<F>,
    pub mode: ErrorMode,
}

impl<F> Dispatch<F> {
    pub(crate) async fn run<I, O, Fut, A>(
        self,
        mut input: Receiver<I>,
        output: Sender<O>,
        cancel: CancelToken,
        mut admission: A,
    ) -> Result<()>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        A: Admission,
    {
        let slots = Slots::new();
        let failures = Arc::new(Failures::new(self.stage, self.mode));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut index = 0usize;

        let outcome: Result<()> = async {
            'recv: loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled(self.stage, "recv");
                        break;
                    },
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => joined??,
                    msg = input.recv() => {
                        let Some(item) = msg else { break; };

                        let slot = if admission.pass_through() {
                            // Every running invocation is one task in the set.
                            let (limit, _) = admission.current();
                            while tasks.len() >= limit.max(1) {
                                tokio::select! {
                                    _ = cancel.cancelled() => {
                                        cancelled(self.stage, "admit");
                                        break 'recv;
                                    },
                                    Some(joined) = tasks.join_next() => joined??,
                                }
                            }
                            None
                        } else {
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    cancelled(self.stage, "admit");
                                    break;
                                },
                                slot = slots.acquire_until(|| admission.current()) => Some(slot?),
                            }
                        };

                        // Surface failures of finished invocations before
                        // starting another one.
                        while let Some(joined) = tasks.try_join_next() {
                            joined??;
                        }
                        if output.is_closed() {
                            downstream_closed(self.stage);
                            break;
                        }

                        tasks.spawn(invoke(
                            Arc::clone(&self.f),
                            item,
                            index,
                            slot,
                            output.clone(),
                            Arc::clone(&failures),
                        ));
                        index += 1;
                    }
                }
            }

            if cancel.is_cancelled() {
                tasks.abort_all();
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Err(err) if err.is_cancelled() => {}
                    joined => joined??,
                }
            }
            Ok(())
        }
        .await;

        if outcome.is_err() {
            tasks.abort_all();
            return outcome;
        }
        // Failures recorded before a teardown still count: they belong to
        // items that completed.
        failures.finish()
    }
}

async fn invoke<I, O, F, Fut>(
    f: Arc<F>,
    item: I,
    index: usize,
    slot: Option<SlotGuard>,
    output: Sender<O>,
    failures: Arc<Failures>,
) -> Result<()>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<O>>,
{
    // The slot stays held until downstream accepted the value, so results
    // waiting on a slow consumer count against the concurrency limit.
    let _slot = slot;
    match f(item).await {
        // A closed downstream is handled by the dispatch loop.
        Ok(value) => {
            let _ = output.send(value).await;
            Ok(())
        }
        Err(err) => failures.record(index, err),
    }
}
