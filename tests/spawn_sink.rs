use std::time::Duration;

use backflow::error::{Error, Result};
use backflow::pipeline::chain::PipeExt;
use backflow::pipeline::runtime::Runtime;
use backflow::stage::ConcurrentMapPipe;

mod common;
use common::{collected, CollectSink, VecSource};

#[tokio::test]
async fn spawn_sink_completes_without_manual_drain() -> Result<()> {
    let out = collected::<u32>();

    let pipe = VecSource::new(vec![1u32, 2, 3, 4, 5])
        .map(|x| x * 10)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    let rt = Runtime::new().buffer(16);
    let (tx, _cancel, handle) = rt.spawn_sink(pipe);

    tx.send(()).await.unwrap();
    drop(tx);

    handle.await??;

    assert_eq!(*out.lock().unwrap(), vec![10, 20, 30, 40, 50]);
    Ok(())
}

#[tokio::test]
async fn spawn_sink_with_cancellation() -> Result<()> {
    let pipe = VecSource::new((0u32..100_000).collect::<Vec<_>>())
        .pipe::<(), _>(CollectSink::new(collected::<u32>()));

    let rt = Runtime::new().buffer(8);
    let (tx, cancel, handle) = rt.spawn_sink(pipe);

    tx.send(()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    drop(tx);

    let result = tokio::time::timeout(Duration::from_millis(500), handle).await;
    assert!(result.is_ok(), "pipeline should stop promptly after cancel");
    // Cancellation is not a failure.
    result.unwrap().unwrap()?;
    Ok(())
}

#[tokio::test]
async fn spawn_sink_propagates_errors() -> Result<()> {
    let fail = ConcurrentMapPipe::new(
        "fail",
        |_: u32| async move { Err::<u32, Error>(Error::pipeline("intentional error")) },
        2,
    )?;
    let pipe = VecSource::new(vec![1u32])
        .pipe::<u32, _>(fail)
        .pipe::<(), _>(CollectSink::new(collected::<u32>()));

    let rt = Runtime::new().buffer(8);
    let (tx, _cancel, handle) = rt.spawn_sink(pipe);

    tx.send(()).await.unwrap();
    drop(tx);

    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Item { stage: "fail", index: 0, .. }));
    Ok(())
}

#[tokio::test]
async fn spawn_sink_empty_source() -> Result<()> {
    let out = collected::<u32>();
    let pipe = VecSource::new(vec![]).pipe::<(), _>(CollectSink::new(out.clone()));

    let rt = Runtime::new().buffer(8);
    let (tx, _cancel, handle) = rt.spawn_sink(pipe);

    tx.send(()).await.unwrap();
    drop(tx);

    handle.await??;

    assert!(out.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn run_resolves_after_the_whole_job() -> Result<()> {
    let out = collected::<u32>();
    let pipe = VecSource::new((0..500u32).collect())
        .filter(|v| v % 2 == 1)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().buffer(3).run(pipe).await?;

    assert_eq!(out.lock().unwrap().len(), 250);
    Ok(())
}
