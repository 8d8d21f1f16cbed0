use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backflow::error::{Error, Result};
use backflow::pipeline::chain::PipeExt;
use backflow::pipeline::mode::ErrorMode;
use backflow::pipeline::runtime::Runtime;
use backflow::stage::WarmupPipe;

mod common;
use common::{collected, sorted, CollectSink, VecSource};

/// Records the number of overlapping calls seen at each call start.
#[derive(Clone, Default)]
struct CallLog {
    active: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<usize>>>,
}

impl CallLog {
    async fn call(self, x: u32) -> Result<u32> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(now);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(x)
    }
}

#[tokio::test(start_paused = true)]
async fn concurrency_ramps_up_to_the_target() -> Result<()> {
    let calls = CallLog::default();
    let p = calls.clone();
    let out = collected::<u32>();

    let stage = WarmupPipe::new("db", move |x| p.clone().call(x), 4, Duration::from_secs(1))?;
    let pipe = VecSource::new((0..80u32).collect())
        .pipe::<u32, _>(stage)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().buffer(8).run(pipe).await?;

    let seen = calls.seen.lock().unwrap().clone();
    assert_eq!(sorted(&out), (0..80).collect::<Vec<_>>());
    assert!(seen.iter().all(|n| *n <= 4), "{seen:?}");
    // The first call runs alone; full parallelism shows up after the ramp.
    assert_eq!(seen[0], 1);
    assert!(seen[..3].iter().all(|n| *n <= 2), "{seen:?}");
    assert_eq!(*seen.iter().max().unwrap(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_calls_do_not_hold_back_the_ramp() -> Result<()> {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (active.clone(), peak.clone());

    let stage = WarmupPipe::new(
        "db",
        move |x: u32| {
            let (active, peak) = (a.clone(), p.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<u32, Error>(x)
            }
        },
        4,
        Duration::from_secs(1),
    )?;
    let pipe = VecSource::new((0..16u32).collect())
        .pipe::<u32, _>(stage)
        .pipe::<(), _>(CollectSink::new(collected::<u32>()));
    let job = tokio::spawn(async move { Runtime::new().run(pipe).await });

    // Every call outlasts the warmup; the target is reached on the clock alone.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(active.load(Ordering::SeqCst), 4);

    job.await.expect("job panicked")?;
    assert_eq!(peak.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_warmup_starts_at_full_concurrency() -> Result<()> {
    let calls = CallLog::default();
    let p = calls.clone();

    let stage = WarmupPipe::new("api", move |x| p.clone().call(x), 3, Duration::ZERO)?;
    let pipe = VecSource::new((0..6u32).collect())
        .pipe::<u32, _>(stage)
        .pipe::<(), _>(CollectSink::new(collected::<u32>()));

    Runtime::new().run(pipe).await?;

    assert_eq!(calls.seen.lock().unwrap()[..3], [1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn warmup_honours_the_error_mode() -> Result<()> {
    let out = collected::<u32>();
    let stage = WarmupPipe::new(
        "flaky",
        |x: u32| async move {
            if x == 2 {
                Err(Error::msg("flaky"))
            } else {
                Ok(x)
            }
        },
        2,
        Duration::from_millis(10),
    )?
    .error_mode(ErrorMode::Suppress);
    let pipe = VecSource::new(vec![1u32, 2, 3])
        .pipe::<u32, _>(stage)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().run(pipe).await?;

    assert_eq!(sorted(&out), vec![1, 3]);
    Ok(())
}

#[test]
fn zero_target_is_a_config_error() {
    let res = WarmupPipe::new("db", |x: u32| async move { Ok::<u32, Error>(x) }, 0, Duration::from_secs(1));
    assert!(matches!(res, Err(Error::Config { stage: "db", .. })));
}
