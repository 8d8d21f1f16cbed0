//! Backpressure Demonstration
//!
//! Run with:
//!   cargo run --example backpressure_demo
//!
//! A fast source feeds a sink that needs 20ms per item. With a small buffer
//! the source is paused almost immediately; with a large one it runs ahead
//! until the buffer is full. Either way memory stays bounded.
//! The second half shows a warmup stage ramping its concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use backflow::error::{Error, Result};
use backflow::pipeline::chain::PipeExt;
use backflow::pipeline::runtime::Runtime;
use backflow::sink::ForEachSink;
use backflow::source::IterSource;
use backflow::stage::WarmupPipe;

async fn run_with_buffer(buffer_size: usize, item_count: u32, delay_ms: u64) -> Result<()> {
    let produced = Arc::new(AtomicUsize::new(0));
    let processed = Arc::new(AtomicUsize::new(0));
    let (p, c) = (produced.clone(), processed.clone());

    let pipeline = IterSource::new(0..item_count)
        .tap(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        })
        .pipe::<(), _>(ForEachSink::new("slow_sink", move |_v: u32| {
            let c = c.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<(), Error>(())
            }
        }));

    let start = Instant::now();
    let job = tokio::spawn(async move { Runtime::new().buffer(buffer_size).run(pipeline).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!(
        "  Buffer: {:>3} | After 200ms: produced={:>3}, processed={:>3}",
        buffer_size,
        produced.load(Ordering::SeqCst),
        processed.load(Ordering::SeqCst)
    );

    job.await.map_err(Error::Join)??;
    println!(
        "  Buffer: {:>3} | Completed in {:>4}ms | produced={}, processed={}",
        buffer_size,
        start.elapsed().as_millis(),
        produced.load(Ordering::SeqCst),
        processed.load(Ordering::SeqCst)
    );
    Ok(())
}

async fn warmup_ramp() -> Result<()> {
    let active = Arc::new(AtomicUsize::new(0));
    let a = active.clone();
    let start = Instant::now();

    let lookup = WarmupPipe::new(
        "lookup",
        move |id: u32| {
            let active = a.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                println!(
                    "  t={:>4}ms item {:>2} starts, {} in flight",
                    start.elapsed().as_millis(),
                    id,
                    now
                );
                tokio::time::sleep(Duration::from_millis(300)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<u32, Error>(id)
            }
        },
        4,
        Duration::from_secs(1),
    )?;

    let pipeline = IterSource::new(0..16u32)
        .pipe::<u32, _>(lookup)
        .pipe::<(), _>(ForEachSink::new("discard", |_v: u32| async { Ok::<(), Error>(()) }));

    Runtime::new().buffer(4).run(pipeline).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let item_count = 50;
    let delay_ms = 20;

    println!("Backpressure: {item_count} items, {delay_ms}ms per item in the sink\n");
    for buffer in [2, 10, 100] {
        run_with_buffer(buffer, item_count, delay_ms).await?;
    }

    println!("\nWarmup: concurrency ramps from 1 to 4 over one second\n");
    warmup_ramp().await?;

    Ok(())
}
