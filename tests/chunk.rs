use backflow::error::{Error, Result};
use backflow::pipeline::chain::PipeExt;
use backflow::pipeline::runtime::Runtime;
use backflow::stage::ChunkPipe;

mod common;
use common::{collected, CollectSink, VecSource};

async fn chunks_of(items: Vec<u32>, size: usize) -> Result<Vec<Vec<u32>>> {
    let out = collected::<Vec<u32>>();
    let pipe = VecSource::new(items)
        .strict_downstream(true)
        .pipe::<Vec<u32>, _>(ChunkPipe::new(size)?)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().buffer(2).run(pipe).await?;
    let chunks = out.lock().unwrap().clone();
    Ok(chunks)
}

#[tokio::test]
async fn chunk_empty_input_emits_nothing() -> Result<()> {
    assert!(chunks_of(vec![], 4).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn chunk_exact_multiple() -> Result<()> {
    let chunks = chunks_of((1..=8).collect(), 4).await?;
    assert_eq!(chunks, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
    Ok(())
}

#[tokio::test]
async fn chunk_flushes_a_short_tail() -> Result<()> {
    let chunks = chunks_of(vec![1, 2, 3, 4, 5], 2).await?;
    assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
    Ok(())
}

#[tokio::test]
async fn chunk_larger_than_input() -> Result<()> {
    let chunks = chunks_of(vec![9, 8, 7], 1024).await?;
    assert_eq!(chunks, vec![vec![9, 8, 7]]);
    Ok(())
}

#[test]
fn chunk_size_zero_is_rejected() {
    let err = ChunkPipe::new(0).err().expect("size 0 must be rejected");
    assert!(matches!(err, Error::Config { stage: "chunk", .. }));
}

#[tokio::test]
async fn chunk_stops_when_downstream_stops() -> Result<()> {
    let out = collected::<Vec<u32>>();
    let pipe = VecSource::new((0..1000).collect())
        .pipe::<Vec<u32>, _>(ChunkPipe::new(10)?)
        .limit(2)
        .pipe::<(), _>(CollectSink::new(out.clone()));

    Runtime::new().buffer(1).run(pipe).await?;

    let chunks = out.lock().unwrap().clone();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1], (10..20).collect::<Vec<_>>());
    Ok(())
}
