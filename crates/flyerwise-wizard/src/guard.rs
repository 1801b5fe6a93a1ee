//! In-process "one mutating operation per session" guard.
//!
//! Acquisition never waits: a second caller gets `None` immediately and the
//! manager turns that into `SessionBusy`. Cross-process races are caught by
//! the revision check in the session store instead.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

#[derive(Debug, Default, Clone)]
pub struct BusySet {
    inner: Arc<Mutex<HashSet<Uuid>>>,
}

impl BusySet {
    /// Marks `id` busy until the returned guard is dropped, or returns
    /// `None` if it is already busy.
    #[must_use]
    pub fn try_acquire(&self, id: Uuid) -> Option<BusyGuard> {
        let mut busy = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(id) {
            return None;
        }
        Some(BusyGuard {
            set: Arc::clone(&self.inner),
            id,
        })
    }

    #[must_use]
    pub fn is_busy(&self, id: Uuid) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }
}

#[derive(Debug)]
pub struct BusyGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let set = BusySet::default();
        let id = Uuid::new_v4();

        let guard = set.try_acquire(id).unwrap();
        assert!(set.try_acquire(id).is_none());
        assert!(set.is_busy(id));

        drop(guard);
        assert!(!set.is_busy(id));
        assert!(set.try_acquire(id).is_some());
    }

    #[test]
    fn sessions_do_not_block_each_other() {
        let set = BusySet::default();
        let _a = set.try_acquire(Uuid::new_v4()).unwrap();
        assert!(set.try_acquire(Uuid::new_v4()).is_some());
    }
}
