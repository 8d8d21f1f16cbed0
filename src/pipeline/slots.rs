use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crate::error::Result;
use crate::pipeline::lock::BackpressureLock;

/// In-flight accounting for concurrency-bounded stages.
///
/// The stage's receive loop is the single producer: it calls
/// [`Slots::acquire`] before dispatching an item and parks on the
/// [`BackpressureLock`] while `in_flight >= limit`. Finished work drops its
/// [`SlotGuard`], which frees the slot and releases the lock.
#[derive(Default)]
pub struct Slots {
    state: Mutex<SlotState>,
    lock: BackpressureLock,
}

#[derive(Default)]
struct SlotState {
    in_flight: usize,
    peak: usize,
}

/// A held slot; dropping it gives the slot back.
pub struct SlotGuard {
    slots: Arc<Slots>,
}

impl Slots {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Waits for a free slot. `limit` is evaluated on every admission
    /// attempt, so a limit that grows over time takes effect immediately.
    pub async fn acquire<L>(self: &Arc<Self>, mut limit: L) -> Result<SlotGuard>
    where
        L: FnMut() -> usize,
    {
        self.acquire_until(move || (limit(), None)).await
    }

    /// Like [`Slots::acquire`], for a limit that grows on a schedule: `limit`
    /// also returns the instant it next grows, and a parked admission
    /// re-checks then even if no slot was freed.
    pub async fn acquire_until<L>(self: &Arc<Self>, mut limit: L) -> Result<SlotGuard>
    where
        L: FnMut() -> (usize, Option<Instant>),
    {
        loop {
            let (wait, grows_at) = {
                let mut state = self.state.lock().expect("mutex poisoned");
                let (cap, grows_at) = limit();
                if state.in_flight < cap.max(1) {
                    state.in_flight += 1;
                    state.peak = state.peak.max(state.in_flight);
                    return Ok(SlotGuard {
                        slots: Arc::clone(self),
                    });
                }
                // Armed under the state mutex so a concurrent release cannot slip
                // between the capacity check and the wait.
                (self.lock.acquire()?, grows_at)
            };
            match grows_at {
                // Dropping the wait disarms the lock for the next attempt.
                Some(at) => tokio::select! {
                    _ = wait.wait() => {},
                    _ = tokio::time::sleep_until(at) => {},
                },
                None => wait.wait().await,
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().expect("mutex poisoned").in_flight
    }

    pub fn peak(&self) -> usize {
        self.state.lock().expect("mutex poisoned").peak
    }

    fn finish(&self) {
        let mut state = self.state.lock().expect("mutex poisoned");
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.lock.release();
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.finish();
    }
}
