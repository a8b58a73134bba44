//! Single-resolution result channel.
//!
//! Every voice interaction hands its caller an [`Outcome`] and keeps the matching
//! [`Resolver`]. Any number of code paths (normal completion, caller stop, engine
//! error, preemption) may race to resolve it; the first one wins and every later
//! attempt is a no-op that returns `false`.

use crate::error::{VoiceError, VoiceResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Create a connected resolver/outcome pair.
pub fn channel<T>() -> (Resolver<T>, Outcome<T>) {
    let (tx, rx) = oneshot::channel();
    let resolver = Resolver {
        inner: Arc::new(ResolverInner {
            resolved: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
        }),
    };
    (resolver, Outcome { rx })
}

struct ResolverInner<T> {
    resolved: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<VoiceResult<T>>>>,
}

/// Write side of an outcome. Cheap to clone; all clones share one resolution slot.
pub struct Resolver<T> {
    inner: Arc<ResolverInner<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Resolver<T> {
    /// Deliver the result. Returns `true` only for the call that actually resolved.
    pub fn resolve(&self, result: VoiceResult<T>) -> bool {
        if self.inner.resolved.swap(true, Ordering::AcqRel) {
            return false;
        }
        let tx = self
            .inner
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = tx {
            // The caller may have dropped its Outcome; that is not an error.
            let _ = tx.send(result);
        }
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.load(Ordering::Acquire)
    }
}

/// Read side of a voice interaction. Await it for the single result.
///
/// If every resolver is dropped without resolving, the outcome reports
/// [`VoiceError::Cancelled`].
#[must_use = "an Outcome does nothing unless awaited or inspected"]
pub struct Outcome<T> {
    rx: oneshot::Receiver<VoiceResult<T>>,
}

impl<T> Outcome<T> {
    /// Non-blocking check. `None` while the interaction is still running.
    pub fn try_take(&mut self) -> Option<VoiceResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(VoiceError::Cancelled)),
        }
    }
}

impl<T> Future for Outcome<T> {
    type Output = VoiceResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(VoiceError::Cancelled)))
    }
}

impl<T> std::fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outcome").finish_non_exhaustive()
    }
}
