use std::any::Any;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::adapters::{cancelled, downstream_closed};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::mode::{ErrorMode, Failures};
use crate::pipeline::pipe::Pipe;

/// CPU-bound per-item work that runs on a dedicated OS thread.
///
/// Each pool thread owns one worker for the lifetime of the pool, so a
/// worker can keep state (a compiled regex, a parser, a scratch buffer)
/// between items.
pub trait Worker<I, O>: Send + 'static {
    fn process(&mut self, payload: I, index: usize) -> Result<O>;
}

impl<I, O, F> Worker<I, O> for F
where
    F: FnMut(I, usize) -> Result<O> + Send + 'static,
{
    fn process(&mut self, payload: I, index: usize) -> Result<O> {
        self(payload, index)
    }
}

struct Job<I> {
    index: usize,
    payload: I,
}

struct Reply<O> {
    index: usize,
    result: Result<O>,
}

/// Offloads items to a fixed pool of worker threads.
///
/// `factory(worker_id)` builds each thread's worker when the pool starts,
/// which is where per-worker initialisation data goes. The pool is created
/// when the stage starts and torn down (queue closed, threads joined) when
/// its input ends or the stage fails. Results come back in completion
/// order. At most `size` items are in the pool at any time.
pub struct WorkerPoolPipe<B, I, O> {
    stage: &'static str,
    factory: Arc<B>,
    size: usize,
    mode: ErrorMode,
    _io: PhantomData<fn(I) -> O>,
}

impl<B, I, O> WorkerPoolPipe<B, I, O> {
    pub fn new<W>(stage: &'static str, factory: B, size: usize) -> Result<Self>
    where
        B: Fn(usize) -> Result<W>,
        W: Worker<I, O>,
    {
        if size == 0 {
            return Err(Error::config(stage, "pool size must be at least 1"));
        }
        Ok(Self {
            stage,
            factory: Arc::new(factory),
            size,
            mode: ErrorMode::default(),
            _io: PhantomData,
        })
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }
}

#[async_trait]
impl<B, W, I, O> Pipe<I, O> for WorkerPoolPipe<B, I, O>
where
    I: Send + 'static,
    O: Send + 'static,
    W: Worker<I, O>,
    B: Fn(usize) -> Result<W> + Send + Sync + 'static,
{
    fn stage_name(&self) -> &'static str {
        self.stage
    }

    async fn process(
        &self,
        mut input: Receiver<I>,
        output: Sender<O>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job<I>>(self.size);
        let (reply_tx, mut reply_rx) = mpsc::channel::<Reply<O>>(self.size);

        let mut threads = Vec::with_capacity(self.size);
        for id in 0..self.size {
            let spawned = (self.factory)(id).and_then(|worker| {
                let jobs = job_rx.clone();
                let replies = reply_tx.clone();
                thread::Builder::new()
                    .name(format!("{}-worker-{id}", self.stage))
                    .spawn(move || run_worker(id, worker, jobs, replies))
                    .map_err(Error::from)
            });
            match spawned {
                Ok(handle) => threads.push((id, handle)),
                Err(err) => {
                    drop(job_tx);
                    join_workers(threads).await?;
                    return Err(Error::stage_source(self.stage, err));
                }
            }
        }
        drop(job_rx);
        drop(reply_tx);

        let failures = Failures::new(self.stage, self.mode);
        let mut outstanding: HashSet<usize> = HashSet::with_capacity(self.size);
        let mut next_index = 0usize;
        let mut input_open = true;

        let outcome: Result<()> = async {
            while input_open || !outstanding.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled(self.stage, "recv");
                        break;
                    },
                    msg = input.recv(), if input_open && outstanding.len() < self.size => {
                        let Some(payload) = msg else {
                            input_open = false;
                            continue;
                        };
                        let index = next_index;
                        next_index += 1;
                        // Never full: at most `size` jobs are outstanding.
                        job_tx
                            .try_send(Job { index, payload })
                            .map_err(|_| Error::pipeline("worker pool stopped accepting jobs"))?;
                        outstanding.insert(index);
                    },
                    reply = reply_rx.recv(), if !outstanding.is_empty() => {
                        let Some(Reply { index, result }) = reply else {
                            return Err(Error::pipeline("every pool worker exited with items outstanding"));
                        };
                        if !outstanding.remove(&index) {
                            return Err(Error::pipeline("worker replied for an item it was never given"));
                        }
                        match result {
                            Ok(value) => {
                                if output.send(value).await.is_err() {
                                    downstream_closed(self.stage);
                                    break;
                                }
                            }
                            Err(err) => failures.record(index, err)?,
                        }
                    },
                }
            }
            Ok(())
        }
        .await;

        // Teardown: close the queue, unblock any worker parked on a reply,
        // then join every thread.
        drop(job_tx);
        drop(reply_rx);
        let joined = join_workers(threads).await;

        outcome?;
        joined?;
        // Only replies that came back were recorded, cancelled or not.
        failures.finish()
    }
}

fn run_worker<I, O, W>(
    id: usize,
    mut worker: W,
    jobs: crossbeam_channel::Receiver<Job<I>>,
    replies: Sender<Reply<O>>,
) where
    W: Worker<I, O>,
{
    for Job { index, payload } in jobs.iter() {
        let (result, crashed) =
            match panic::catch_unwind(AssertUnwindSafe(|| worker.process(payload, index))) {
                Ok(result) => (result, false),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());

                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::ERROR,
                        event = "backflow.worker.crashed",
                        worker = id,
                        index = index,
                        message = %message,
                        "backflow.worker.crashed"
                    );
                    (Err(Error::WorkerCrashed { worker: id, message }), true)
                }
            };

        if replies.blocking_send(Reply { index, result }).is_err() || crashed {
            break;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

async fn join_workers(threads: Vec<(usize, thread::JoinHandle<()>)>) -> Result<()> {
    if threads.is_empty() {
        return Ok(());
    }
    tokio::task::spawn_blocking(move || {
        let mut first_error = None;
        for (id, handle) in threads {
            if handle.join().is_err() && first_error.is_none() {
                first_error = Some(Error::WorkerCrashed {
                    worker: id,
                    message: "worker thread panicked outside of an item".to_string(),
                });
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    })
    .await?
}
