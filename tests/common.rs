#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use backflow::error::{Error, Result};
use backflow::pipeline::cancel::CancelToken;
use backflow::pipeline::pipe::Pipe;
use tokio::sync::mpsc::{Receiver, Sender};

/// Test source that emits a fixed list of items once started.
#[derive(Clone)]
pub struct VecSource<T> {
    items: Vec<T>,
    strict_downstream: bool,
    sent: Arc<AtomicUsize>,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            strict_downstream: false,
            sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail instead of stopping when downstream closes without a cancel.
    pub fn strict_downstream(mut self, strict: bool) -> Self {
        self.strict_downstream = strict;
        self
    }

    /// Number of items downstream accepted so far.
    pub fn sent(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.sent)
    }
}

#[async_trait]
impl<T> Pipe<(), T> for VecSource<T>
where
    T: Send + Sync + Clone + 'static,
{
    fn stage_name(&self) -> &'static str {
        "vec_source"
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        for item in self.items.iter().cloned() {
            if cancel.is_cancelled() {
                break;
            }
            if output.send(item).await.is_err() {
                if self.strict_downstream && !cancel.is_cancelled() {
                    return Err(Error::pipeline("downstream receiver closed unexpectedly"));
                }
                break;
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Test source that emits `items` and then fails.
pub struct FailingSource<T> {
    items: Vec<T>,
    context: &'static str,
}

impl<T> FailingSource<T> {
    pub fn new(items: Vec<T>, context: &'static str) -> Self {
        Self { items, context }
    }
}

#[async_trait]
impl<T> Pipe<(), T> for FailingSource<T>
where
    T: Send + Sync + Clone + 'static,
{
    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }
        for item in self.items.iter().cloned() {
            if output.send(item).await.is_err() {
                return Ok(());
            }
        }
        Err(Error::Pipeline {
            context: self.context,
        })
    }
}

pub struct CollectSink<T> {
    out: Arc<Mutex<Vec<T>>>,
}

impl<T> CollectSink<T> {
    pub fn new(out: Arc<Mutex<Vec<T>>>) -> Self {
        Self { out }
    }
}

#[async_trait]
impl<T> Pipe<T, ()> for CollectSink<T>
where
    T: Send + Sync + 'static,
{
    async fn process(
        &self,
        mut input: Receiver<T>,
        _output: Sender<()>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    self.out.lock().expect("mutex poisoned").push(v);
                }
            }
        }
        Ok(())
    }
}

pub fn collected<T>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn sorted<T: Ord + Clone>(out: &Arc<Mutex<Vec<T>>>) -> Vec<T> {
    let mut items = out.lock().expect("mutex poisoned").clone();
    items.sort();
    items
}
