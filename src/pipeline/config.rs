use std::collections::HashMap;
use std::sync::Arc;

/// Per-stage overrides installed by [`Runtime`](crate::pipeline::runtime::Runtime).
#[derive(Clone, Default)]
pub(crate) struct StageConfig {
    pub buffers: Arc<HashMap<&'static str, usize>>,
    pub concurrencies: Arc<HashMap<&'static str, usize>>,
}

impl StageConfig {
    pub fn buffer_for(&self, stage: &'static str, global: usize) -> usize {
        self.buffers.get(stage).copied().unwrap_or(global).max(1)
    }

    pub fn concurrency_for(&self, stage: &'static str) -> Option<usize> {
        self.concurrencies.get(stage).copied().filter(|n| *n > 0)
    }
}

tokio::task_local! {
    pub(crate) static STAGE_CONFIG: StageConfig;
}

/// Edge buffer for the channel feeding `stage`.
pub(crate) fn buffer_for(stage: &'static str, global: usize) -> usize {
    STAGE_CONFIG
        .try_with(|cfg| cfg.buffer_for(stage, global))
        .unwrap_or(global.max(1))
}

/// Runtime override of a stage's configured concurrency, if any.
pub(crate) fn concurrency_for(stage: &'static str, configured: usize) -> usize {
    STAGE_CONFIG
        .try_with(|cfg| cfg.concurrency_for(stage))
        .ok()
        .flatten()
        .unwrap_or(configured)
}

/// Carries the current overrides into a future that will run on another
/// task.
pub(crate) fn scoped<F>(fut: F) -> impl std::future::Future<Output = F::Output>
where
    F: std::future::Future,
{
    let cfg = STAGE_CONFIG.try_with(Clone::clone).unwrap_or_default();
    STAGE_CONFIG.scope(cfg, fut)
}
