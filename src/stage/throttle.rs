use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::MissedTickBehavior;

use crate::error::{Error, Result};
use crate::pipeline::adapters::{cancelled, downstream_closed};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::lock::{BackpressureLock, LockWait};
use crate::pipeline::pipe::Pipe;

const STAGE: &str = "throttle";

/// Fixed-window admission control: at most `throughput` items per
/// `interval`.
///
/// The window is hard, not sliding. A burst straddling a window boundary can
/// let up to twice `throughput` through in a short span; over any single
/// window the bound holds. Items past the threshold wait for the next window,
/// they are never dropped.
pub struct ThrottlePipe {
    throughput: usize,
    interval: Duration,
}

impl ThrottlePipe {
    pub fn new(throughput: usize, interval: Duration) -> Result<Self> {
        if throughput == 0 {
            return Err(Error::config(STAGE, "throughput must be at least 1"));
        }
        if interval.is_zero() {
            return Err(Error::config(STAGE, "interval must be non-zero"));
        }
        Ok(Self {
            throughput,
            interval,
        })
    }
}

#[derive(Default)]
struct Window {
    admitted: Mutex<usize>,
    lock: BackpressureLock,
}

impl Window {
    /// Admits one item or arms the lock and reports that the caller must
    /// wait for the next window.
    fn try_admit(&self, throughput: usize) -> Result<Option<LockWait>> {
        let mut admitted = self.admitted.lock().expect("mutex poisoned");
        if *admitted < throughput {
            *admitted += 1;
            return Ok(None);
        }
        self.lock.acquire().map(Some)
    }

    fn reset(&self) {
        *self.admitted.lock().expect("mutex poisoned") = 0;
        self.lock.release();
    }
}

#[async_trait]
impl<T> Pipe<T, T> for ThrottlePipe
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        mut input: Receiver<T>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let window = Arc::new(Window::default());

        let timer = {
            let window = Arc::clone(&window);
            let interval = self.interval;
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + interval;
                let mut ticks = tokio::time::interval_at(start, interval);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    window.reset();

                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::TRACE,
                        event = "backflow.throttle.window",
                        "backflow.throttle.window"
                    );
                }
            })
        };
        // Tear the timer down on every exit path.
        let _timer = AbortOnDrop(timer);

        'items: loop {
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

            while let Some(wait) = window.try_admit(self.throughput)? {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled(STAGE, "window");
                        break 'items;
                    },
                    _ = wait.wait() => {}
                }
            }

            if output.send(item).await.is_err() {
                downstream_closed(STAGE);
                break;
            }
        }
        Ok(())
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
