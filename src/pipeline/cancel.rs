use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

/// Cooperative cancellation shared by every stage of a pipeline.
///
/// Tokens form a tree: [`CancelToken::child`] returns a token that is
/// cancelled together with its parent but can also be cancelled on its own.
/// Chains hand a child token to their upstream half so that a finished
/// downstream (for example a reached limit) can stop production without
/// touching anything below it.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel() is not lost.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    pub fn child(&self) -> CancelToken {
        let child = CancelToken::default();
        let mut children = self.inner.children.lock().expect("mutex poisoned");
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));
        drop(children);

        if self.is_cancelled() {
            child.cancel();
        }
        child
    }
}

impl Inner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock().expect("mutex poisoned"));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}
