//! Retention hook: the active-CSN list and the inert reclamation report.
//!
//! The store consumes a snapshot view of the host's active transactions:
//! an externally-owned, newest-first ordered list of CSNs. A future
//! collector will reclaim groups whose `hi` is older than the oldest
//! active CSN, and deltas below that horizon inside retained groups.
//! Today the hook only reports what such a collector would find; nothing
//! is freed.

use parking_lot::RwLock;
use serde::Serialize;

use visbit_types::Csn;

/// Externally-owned ordered collection of active CSNs, newest first.
///
/// The host's transaction manager records and retires entries; the store
/// only reads the tail (the oldest active CSN) as its retention horizon.
#[derive(Debug, Default)]
pub struct ActiveCsnList {
    inner: RwLock<Vec<Csn>>,
}

impl ActiveCsnList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly active CSN at the front.
    pub fn record(&self, csn: Csn) {
        let mut list = self.inner.write();
        debug_assert!(
            list.first().is_none_or(|&newest| csn > newest),
            "active CSNs must be recorded newest-first"
        );
        list.insert(0, csn);
    }

    /// Retire a CSN wherever it sits in the list.
    pub fn retire(&self, csn: Csn) {
        self.inner.write().retain(|&active| active != csn);
    }

    /// The oldest active CSN, if any.
    #[must_use]
    pub fn oldest(&self) -> Option<Csn> {
        self.inner.read().last().copied()
    }

    /// A point-in-time copy of the list, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Csn> {
        self.inner.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// What a future collector would reclaim, measured against the current
/// retention horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Oldest active CSN, or `None` when no transaction is active.
    pub horizon: Option<i64>,
    /// Groups whose whole CSN range is older than the horizon.
    pub reclaimable_groups: usize,
    /// Groups that must stay.
    pub retained_groups: usize,
    /// Deltas below the horizon inside retained groups.
    pub reclaimable_deltas: usize,
}
