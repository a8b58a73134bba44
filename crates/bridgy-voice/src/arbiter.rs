//! Exclusive ownership of the shared audio device.
//!
//! Acquiring never fails and never waits: the previous holder is preempted
//! synchronously, so by the time `acquire` returns the old job has torn down and
//! resolved its outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Weak};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Synthesis,
    Recognition,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Synthesis => write!(f, "synthesis"),
            JobKind::Recognition => write!(f, "recognition"),
        }
    }
}

/// A job that can be told to give the device up.
pub trait AudioJob: Send + Sync {
    /// Stop immediately, tear down, and resolve the job's outcome before returning.
    fn preempt(&self);
}

/// Opaque token proving a job holds the device. Not `Clone`: one per job.
#[derive(Debug, PartialEq, Eq)]
pub struct AudioOwnership {
    id: u64,
    kind: JobKind,
}

impl AudioOwnership {
    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

struct Holder {
    id: u64,
    kind: JobKind,
    job: Weak<dyn AudioJob>,
}

/// Arbiter for the single microphone/speaker.
pub struct AudioResourceArbiter {
    next_id: AtomicU64,
    holder: Mutex<Option<Holder>>,
}

impl AudioResourceArbiter {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            holder: Mutex::new(None),
        }
    }

    /// Grant ownership to `job`, preempting whoever held it.
    ///
    /// The new token becomes current before the previous job is preempted, so the
    /// previous job's teardown sees it has been superseded and leaves the device
    /// active for its successor.
    pub fn acquire(&self, kind: JobKind, job: Weak<dyn AudioJob>) -> AudioOwnership {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let previous = self.lock().replace(Holder { id, kind, job });

        if let Some(previous) = previous {
            match previous.job.upgrade() {
                Some(job) => {
                    info!("⏹️ Preempting {} job for {}", previous.kind, kind);
                    job.preempt();
                }
                None => debug!("Previous {} job already gone", previous.kind),
            }
        }

        AudioOwnership { id, kind }
    }

    /// Give the device back. Stale or already-released tokens are ignored.
    pub fn release(&self, ownership: &AudioOwnership) {
        let mut holder = self.lock();
        if holder.as_ref().is_some_and(|h| h.id == ownership.id) {
            *holder = None;
            debug!("Released {} ownership", ownership.kind);
        }
    }

    pub fn is_current(&self, ownership: &AudioOwnership) -> bool {
        self.lock().as_ref().is_some_and(|h| h.id == ownership.id)
    }

    /// Kind of the job currently holding the device, if any.
    pub fn holder(&self) -> Option<JobKind> {
        self.lock().as_ref().map(|h| h.kind)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Holder>> {
        self.holder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for AudioResourceArbiter {
    fn default() -> Self {
        Self::new()
    }
}
