use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// One-shot gate between a paused producer and whoever owns the capacity
/// it is waiting for.
///
/// `acquire` arms the gate and hands the producer a [`LockWait`]; the
/// capacity owner calls `release` once to let it through. A gate is never
/// re-armed: each pause gets a fresh oneshot. Only one wait may be
/// outstanding at a time; a second `acquire` while the first waiter is still
/// alive is a protocol violation.
#[derive(Default)]
pub struct BackpressureLock {
    pending: Mutex<Option<oneshot::Sender<()>>>,
}

/// The waiting half of a [`BackpressureLock`].
#[must_use = "a LockWait does nothing unless awaited"]
pub struct LockWait(oneshot::Receiver<()>);

impl BackpressureLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Result<LockWait> {
        let mut pending = self.pending.lock().expect("mutex poisoned");
        if pending.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(Error::LockViolation {
                context: "acquire while a previous wait is still outstanding",
            });
        }
        let (tx, rx) = oneshot::channel();
        *pending = Some(tx);
        Ok(LockWait(rx))
    }

    /// Lets the outstanding waiter through. Returns `false` when nobody was
    /// waiting.
    pub fn release(&self) -> bool {
        let pending = self.pending.lock().expect("mutex poisoned").take();
        match pending {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .expect("mutex poisoned")
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl LockWait {
    /// Resolves on release. Dropping the lock also resolves the wait, so
    /// teardown never leaves a producer parked.
    pub async fn wait(self) {
        let _ = self.0.await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn release_unblocks_waiter() {
        let lock = BackpressureLock::new();
        let wait = lock.acquire().unwrap();
        assert!(lock.is_pending());
        assert!(lock.release());
        wait.wait().await;
        assert!(!lock.is_pending());
    }

    #[test]
    fn second_acquire_is_a_violation() {
        let lock = BackpressureLock::new();
        let _wait = lock.acquire().unwrap();
        let err = lock.acquire().err().expect("second acquire must fail");
        assert!(matches!(err, Error::LockViolation { .. }));
        assert!(err.is_resource());
    }

    #[test]
    fn dropped_waiter_retires_the_gate() {
        let lock = BackpressureLock::new();
        drop(lock.acquire().unwrap());
        assert!(!lock.is_pending());
        assert!(lock.acquire().is_ok());
    }

    #[test]
    fn release_without_waiter_is_noop() {
        let lock = BackpressureLock::new();
        assert!(!lock.release());
    }

    #[tokio::test]
    async fn dropping_lock_frees_waiter() {
        let lock = BackpressureLock::new();
        let wait = lock.acquire().unwrap();
        drop(lock);
        tokio::time::timeout(Duration::from_millis(100), wait.wait())
            .await
            .expect("waiter must resolve when the lock goes away");
    }

    #[tokio::test]
    async fn waiter_stays_parked_until_release() {
        let lock = BackpressureLock::new();
        let wait = lock.acquire().unwrap();
        let parked = tokio::time::timeout(Duration::from_millis(20), wait.wait()).await;
        assert!(parked.is_err());
    }
}
