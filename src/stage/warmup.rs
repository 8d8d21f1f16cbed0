use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config;
use crate::pipeline::mode::ErrorMode;
use crate::pipeline::pipe::Pipe;
use crate::stage::concurrent_map::{Admission, Dispatch};

/// Concurrent mapping whose concurrency ramps linearly from 1 to the target
/// over `warmup`, measured from the first item.
///
/// Useful in front of a cold backend (database, API) that should not be hit
/// at full parallelism right away. Once the warmup has elapsed the limit is
/// latched at the target, the clock is no longer consulted and admission
/// stops going through the slot lock.
pub struct WarmupPipe<F> {
    stage: &'static str,
    f: Arc<F>,
    concurrency: usize,
    warmup: Duration,
    mode: ErrorMode,
}

impl<F> WarmupPipe<F> {
    pub fn new(stage: &'static str, f: F, concurrency: usize, warmup: Duration) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::config(stage, "concurrency must be at least 1"));
        }
        Ok(Self {
            stage,
            f: Arc::new(f),
            concurrency,
            warmup,
            mode: ErrorMode::default(),
        })
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Linear ramp from 1 to `target`.
pub(crate) struct Ramp {
    target: usize,
    warmup: Duration,
    started: Option<Instant>,
    done: bool,
}

impl Ramp {
    pub(crate) fn new(target: usize, warmup: Duration) -> Self {
        Self {
            target,
            warmup,
            started: None,
            done: target <= 1 || warmup.is_zero(),
        }
    }

    pub(crate) fn limit(&mut self) -> usize {
        if self.done {
            return self.target;
        }

        let started = *self.started.get_or_insert_with(Instant::now);
        let elapsed = started.elapsed();
        if elapsed >= self.warmup {
            self.done = true;

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::DEBUG,
                event = "backflow.warmup.ramped",
                concurrency = self.target,
                "backflow.warmup.ramped"
            );
            return self.target;
        }

        let steps = (self.target - 1) as u128;
        let extra = steps * elapsed.as_nanos() / self.warmup.as_nanos();
        (1 + extra as usize).min(self.target)
    }

    /// When the limit next grows, or `None` once the ramp is over.
    pub(crate) fn next_step(&self) -> Option<Instant> {
        if self.done {
            return None;
        }
        let started = self.started?;
        let steps = (self.target - 1) as u128;
        let warmup = self.warmup.as_nanos();
        let reached = steps * started.elapsed().as_nanos() / warmup;
        let at = ((reached + 1) * warmup).div_ceil(steps).min(warmup);
        Some(started + Duration::from_nanos(u64::try_from(at).unwrap_or(u64::MAX)))
    }
}

impl Admission for Ramp {
    fn current(&mut self) -> (usize, Option<Instant>) {
        let limit = self.limit();
        (limit, self.next_step())
    }

    fn pass_through(&self) -> bool {
        self.done
    }
}

#[async_trait]
impl<I, O, F, Fut> Pipe<I, O> for WarmupPipe<F>
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
        let target = config::concurrency_for(self.stage, self.concurrency);
        let ramp = Ramp::new(target, self.warmup);
        let dispatch = Dispatch {
            stage: self.stage,
            f: Arc::clone(&self.f),
            mode: self.mode,
        };
        dispatch.run(input, output, cancel, ramp).await
    }
}
