use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::pipeline::adapters::cancelled;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config;
use crate::pipeline::pipe::Pipe;

const STAGE: &str = "combine";

pub type SharedSource<T> = Arc<dyn Pipe<(), T>>;

/// Fan-in: a source that merges several sources.
///
/// Every input source runs on its own task and pushes into the one shared
/// downstream edge, so whichever produces first is forwarded first; there is
/// no ordering or fairness between sources. A full downstream pauses all of
/// them at once, and freed capacity lets them race again. The merged stream
/// ends once every source ended; the first failing source stops the others.
pub struct CombineSource<T: Send + 'static> {
    sources: Vec<SharedSource<T>>,
}

impl<T: Send + 'static> CombineSource<T> {
    pub fn new(sources: Vec<SharedSource<T>>) -> Self {
        Self { sources }
    }

    pub fn with<P>(mut self, source: P) -> Self
    where
        P: Pipe<(), T> + 'static,
    {
        self.sources.push(Arc::new(source));
        self
    }
}

impl<T: Send + 'static> Default for CombineSource<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl<T> Pipe<(), T> for CombineSource<T>
where
    T: Send + 'static,
{
    fn stage_name(&self) -> &'static str {
        STAGE
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<T>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        let readers = cancel.child();
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        for source in &self.sources {
            let source = Arc::clone(source);
            let (start_tx, start_rx) = mpsc::channel::<()>(1);
            // The buffered start signal is picked up whenever the source gets to it.
            let _ = start_tx.try_send(());
            drop(start_tx);

            let output = output.clone();
            let cancel = readers.clone();
            tasks.spawn(config::scoped(async move {
                source.process(start_rx, output, buffer, cancel).await
            }));
        }
        drop(output);

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let res = match joined {
                Err(err) if err.is_cancelled() => continue,
                joined => joined.map_err(Error::from).and_then(|res| res),
            };
            if let Err(err) = res {
                if first_error.is_none() {
                    cancelled(STAGE, "source_failed");
                    readers.cancel();
                    tasks.abort_all();
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
