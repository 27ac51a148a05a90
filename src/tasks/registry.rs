//! Worker registry tracking which worker kinds are busy or canceled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use super::{WorkerError, WorkerKind, WorkerStatus};

/// Lock state for one worker kind.
#[derive(Debug, Default)]
struct Slot {
    /// Generation of the current holder, if any.
    owner: Option<u64>,
    generation: u64,
    canceled: bool,
    started_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Activity {
    slot: Mutex<Slot>,
}

impl Activity {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the lock, returning the holder's generation.
    fn start(&self) -> Option<u64> {
        let mut slot = self.slot();
        if slot.owner.is_some() {
            return None;
        }

        let generation = slot.generation + 1;
        slot.generation = generation;
        slot.owner = Some(generation);
        slot.canceled = false;
        slot.started_at = Some(Instant::now());
        Some(generation)
    }

    /// Release the lock if `generation` still holds it. A cancel request
    /// ends with the job it was aimed at.
    fn stop(&self, generation: u64) -> bool {
        let mut slot = self.slot();
        if slot.owner != Some(generation) {
            return false;
        }

        slot.owner = None;
        slot.canceled = false;
        slot.started_at = None;
        true
    }

    fn holder(&self) -> Option<u64> {
        self.slot().owner
    }

    fn cancel(&self) -> bool {
        let mut slot = self.slot();
        if slot.owner.is_none() {
            return false;
        }
        slot.canceled = true;
        true
    }

    fn canceled(&self) -> bool {
        self.slot().canceled
    }
}

/// Process-wide set of named worker locks.
///
/// Share it as `Arc<WorkerRegistry>` between every component that starts
/// or cancels workers.
#[derive(Debug)]
pub struct WorkerRegistry {
    activities: HashMap<WorkerKind, Arc<Activity>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        let activities = WorkerKind::ALL
            .iter()
            .map(|kind| (*kind, Arc::new(Activity::default())))
            .collect();

        Self { activities }
    }

    fn activity(&self, kind: WorkerKind) -> &Arc<Activity> {
        // Populated for every kind in new().
        &self.activities[&kind]
    }

    /// Acquire the lock for `kind`.
    ///
    /// The lock is released when the returned guard is dropped, including
    /// while unwinding.
    pub fn start(&self, kind: WorkerKind) -> Result<WorkerGuard, WorkerError> {
        let activity = self.activity(kind);
        let generation = activity.start().ok_or(WorkerError::Busy(kind))?;

        tracing::debug!(worker = %kind, generation, "worker started");
        Ok(WorkerGuard {
            kind,
            generation,
            activity: Arc::clone(activity),
        })
    }

    /// Release the lock for `kind` from whoever holds it. Prefer dropping
    /// the guard; the old guard's drop is then a no-op.
    pub fn stop(&self, kind: WorkerKind) {
        let activity = self.activity(kind);
        if let Some(generation) = activity.holder() {
            if activity.stop(generation) {
                tracing::warn!(worker = %kind, generation, "worker lock released by force");
            }
        }
    }

    /// Request cooperative cancellation of a running `kind`. Ignored when
    /// nothing of that kind is running.
    pub fn cancel(&self, kind: WorkerKind) {
        if self.activity(kind).cancel() {
            tracing::info!(worker = %kind, "cancellation requested");
        } else {
            tracing::debug!(worker = %kind, "cancel ignored, worker not running");
        }
    }

    /// True if `kind` or any running kind superseding it has been canceled.
    pub fn canceled(&self, kind: WorkerKind) -> bool {
        std::iter::once(&kind)
            .chain(kind.superseded_by())
            .any(|k| self.activity(*k).canceled())
    }

    pub fn is_busy(&self, kind: WorkerKind) -> bool {
        self.activity(kind).holder().is_some()
    }

    /// Status of all busy workers.
    pub fn running(&self) -> Vec<WorkerStatus> {
        WorkerKind::ALL
            .iter()
            .filter_map(|kind| {
                let started_at = self.activity(*kind).slot().started_at?;
                Some(WorkerStatus {
                    kind: *kind,
                    canceled: self.canceled(*kind),
                    elapsed: started_at.elapsed(),
                })
            })
            .collect()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped ownership of a worker lock.
#[derive(Debug)]
pub struct WorkerGuard {
    kind: WorkerKind,
    generation: u64,
    activity: Arc<Activity>,
}

impl WorkerGuard {
    pub fn kind(&self) -> WorkerKind {
        self.kind
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if self.activity.stop(self.generation) {
            tracing::debug!(worker = %self.kind, "worker stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_twice_is_busy() {
        let registry = WorkerRegistry::new();
        let guard = registry.start(WorkerKind::Faces).unwrap();
        assert!(registry.is_busy(WorkerKind::Faces));

        let err = registry.start(WorkerKind::Faces).unwrap_err();
        assert_eq!(err, WorkerError::Busy(WorkerKind::Faces));
        assert_eq!(err.to_string(), "faces worker is already running");

        // Other kinds are independent
        let _purge = registry.start(WorkerKind::Purge).unwrap();

        drop(guard);
        assert!(!registry.is_busy(WorkerKind::Faces));
        assert!(registry.start(WorkerKind::Faces).is_ok());
    }

    #[test]
    fn test_explicit_stop_releases() {
        let registry = WorkerRegistry::new();
        let guard = registry.start(WorkerKind::Meta).unwrap();
        std::mem::forget(guard);

        assert!(registry.start(WorkerKind::Meta).is_err());
        registry.stop(WorkerKind::Meta);
        assert!(registry.start(WorkerKind::Meta).is_ok());
    }

    #[test]
    fn test_stale_guard_does_not_release_new_holder() {
        let registry = WorkerRegistry::new();
        let first = registry.start(WorkerKind::Faces).unwrap();
        registry.stop(WorkerKind::Faces);

        let _second = registry.start(WorkerKind::Faces).unwrap();
        drop(first);

        assert!(registry.is_busy(WorkerKind::Faces));
        assert!(registry.start(WorkerKind::Faces).is_err());
    }

    #[test]
    fn test_canceled_includes_superseding_kinds() {
        let registry = WorkerRegistry::new();
        assert!(!registry.canceled(WorkerKind::Faces));

        let _main = registry.start(WorkerKind::Main).unwrap();
        registry.cancel(WorkerKind::Main);
        assert!(registry.canceled(WorkerKind::Faces));
        assert!(registry.canceled(WorkerKind::Meta));
        assert!(registry.canceled(WorkerKind::Main));

        let registry = WorkerRegistry::new();
        let _meta = registry.start(WorkerKind::Meta).unwrap();
        registry.cancel(WorkerKind::Meta);
        assert!(registry.canceled(WorkerKind::Faces));
        assert!(!registry.canceled(WorkerKind::Main));
        assert!(!registry.canceled(WorkerKind::Purge));

        let registry = WorkerRegistry::new();
        let _faces = registry.start(WorkerKind::Faces).unwrap();
        registry.cancel(WorkerKind::Faces);
        assert!(registry.canceled(WorkerKind::Faces));
        assert!(!registry.canceled(WorkerKind::Meta));
    }

    #[test]
    fn test_cancel_ends_with_the_job() {
        let registry = WorkerRegistry::new();
        let main = registry.start(WorkerKind::Main).unwrap();
        registry.cancel(WorkerKind::Main);
        assert!(registry.canceled(WorkerKind::Faces));

        drop(main);
        assert!(!registry.canceled(WorkerKind::Main));
        assert!(!registry.canceled(WorkerKind::Faces));
    }

    #[test]
    fn test_cancel_of_idle_kind_is_ignored() {
        let registry = WorkerRegistry::new();
        registry.cancel(WorkerKind::Faces);
        registry.cancel(WorkerKind::Main);
        assert!(!registry.canceled(WorkerKind::Faces));

        let _guard = registry.start(WorkerKind::Faces).unwrap();
        assert!(!registry.canceled(WorkerKind::Faces));
    }

    #[test]
    fn test_running_lists_busy_workers() {
        let registry = WorkerRegistry::new();
        assert!(registry.running().is_empty());

        let guard = registry.start(WorkerKind::Faces).unwrap();
        assert_eq!(guard.kind(), WorkerKind::Faces);
        registry.cancel(WorkerKind::Faces);

        let running = registry.running();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].kind, WorkerKind::Faces);
        assert!(running[0].canceled);
    }

    #[test]
    fn test_guard_released_on_panic() {
        let registry = Arc::new(WorkerRegistry::new());
        let r = Arc::clone(&registry);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = r.start(WorkerKind::Faces).unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!registry.is_busy(WorkerKind::Faces));
    }
}
