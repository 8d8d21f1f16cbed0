use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backflow::error::Result;
use backflow::pipeline::cancel::CancelToken;
use backflow::pipeline::chain::PipeExt;
use backflow::pipeline::pipe::Pipe;
use backflow::pipeline::runtime::Runtime;
use backflow::stage::LimitPipe;
use tokio::sync::mpsc::{Receiver, Sender};

mod common;
use common::{collected, CollectSink, VecSource};

/// An endless source that notes whether it stopped on its own (closed edge)
/// or had to be cancelled.
struct Endless {
    saw_closed_edge: Arc<AtomicBool>,
    saw_cancel: Arc<AtomicBool>,
}

#[async_trait]
impl Pipe<(), u64> for Endless {
    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<u64>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }
        for i in 0u64.. {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.saw_cancel.store(true, Ordering::SeqCst);
                    break;
                },
                sent = output.send(i) => {
                    if sent.is_err() {
                        self.saw_closed_edge.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn limit_stops_an_endless_source_gracefully() -> Result<()> {
    let saw_closed_edge = Arc::new(AtomicBool::new(false));
    let saw_cancel = Arc::new(AtomicBool::new(false));
    let out = collected::<u64>();

    let pipe = Endless {
        saw_closed_edge: saw_closed_edge.clone(),
        saw_cancel: saw_cancel.clone(),
    }
    .limit(25)
    .pipe::<(), _>(CollectSink::new(out.clone()));

    tokio::time::timeout(Duration::from_secs(2), Runtime::new().buffer(4).run(pipe))
        .await
        .expect("limit should end the job")?;

    assert_eq!(*out.lock().unwrap(), (0..25).collect::<Vec<_>>());
    assert!(
        saw_closed_edge.load(Ordering::SeqCst) || saw_cancel.load(Ordering::SeqCst),
        "source must have been stopped"
    );
    Ok(())
}

#[tokio::test]
async fn limit_larger_than_input_passes_everything() -> Result<()> {
    let out = collected::<u32>();
    let pipe = VecSource::new(vec![1u32, 2, 3])
        .strict_downstream(true)
        .limit(10)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().run(pipe).await?;

    assert_eq!(*out.lock().unwrap(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn limit_zero_is_pass_through() -> Result<()> {
    let out = collected::<u32>();
    let pipe = VecSource::new((0..300u32).collect())
        .strict_downstream(true)
        .pipe::<u32, _>(LimitPipe::new(Some(0)))
        .pipe::<u32, _>(LimitPipe::new(None))
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().buffer(8).run(pipe).await?;

    assert_eq!(out.lock().unwrap().len(), 300);
    Ok(())
}

#[tokio::test]
async fn limit_behind_a_slow_stage_bounds_the_source() -> Result<()> {
    let source = VecSource::new((0..10_000u32).collect());
    let sent = source.sent();
    let out = collected::<u32>();

    let pipe = source
        .map(|v| v + 1)
        .limit(5)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().buffer(2).run(pipe).await?;

    assert_eq!(*out.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    // Whatever was in flight on the two edges, nowhere near the input size.
    assert!(sent.load(Ordering::SeqCst) <= 5 + 2 * 2 + 2);
    Ok(())
}

#[tokio::test]
async fn nested_limits_take_the_smaller() -> Result<()> {
    let out = collected::<u32>();
    let pipe = VecSource::new((0..100u32).collect())
        .limit(40)
        .filter(|v| v % 2 == 0)
        .limit(3)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().buffer(1).run(pipe).await?;

    assert_eq!(*out.lock().unwrap(), vec![0, 2, 4]);
    Ok(())
}
