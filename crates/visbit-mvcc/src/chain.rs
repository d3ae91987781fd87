//! Chain controller: group-head management, three-phase insert, and read
//! routing.
//!
//! The chain is a head-first list of version groups, newest group first.
//! Writers publish a version in three phases:
//!
//! 1. **Reservation**: under `cap_lock`, decide whether this insert opens
//!    a new group. Exactly one writer opens each group.
//! 2. **Publish**: the opener allocates and links a group whose reference
//!    is its own image and returns immediately; everyone else prepends a
//!    placeholder to the captured group and receives a [`DeltaTicket`].
//! 3. **Materialize**: encode and propagate outside any chain-wide lock,
//!    concurrently with other writers' phases 1-2 and with all readers.
//!
//! Readers never lock: routing walks atomic group links and compares
//! against each group's `[lo, hi]` range. A reader racing a materializer
//! may observe a briefly stale `hi` and miss a version whose commit is
//! still in flight; once the writer's phase 3 completes, subsequent reads
//! find it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use visbit_error::VisbitError;
use visbit_types::{Bitmap, Csn, BITMAP_SIZE, MAX_GROUP_SIZE};

use crate::codec::{PayloadKind, SparseThreshold};
use crate::group::{DeltaNode, VersionGroup};
use crate::observability;
use crate::retention::{ActiveCsnList, RetentionReport};

/// Outcome of phases 1-2 of an insert.
pub enum InsertOutcome {
    /// This insert opened a new group; its version is already published
    /// and visible. There is no phase 3.
    OpenedGroup,
    /// A placeholder was prepended; the caller must finish the insert with
    /// [`ChainController::insert_content`].
    Pending(DeltaTicket),
}

impl InsertOutcome {
    /// True when this insert opened a new group.
    #[must_use]
    pub fn opened_group(&self) -> bool {
        matches!(self, Self::OpenedGroup)
    }
}

/// Handle to a published-but-unmaterialized placeholder.
///
/// Consumed by [`ChainController::insert_content`]. Dropping the ticket
/// instead leaves the placeholder pinned in its group forever: reads stay
/// consistent (placeholders are invisible), but one slot of the group's
/// budget is gone.
pub struct DeltaTicket {
    group: Arc<VersionGroup>,
    node: Arc<DeltaNode>,
    materialized: bool,
}

impl DeltaTicket {
    /// CSN reserved by this ticket.
    #[must_use]
    pub fn csn(&self) -> Csn {
        self.node.csn()
    }
}

impl Drop for DeltaTicket {
    fn drop(&mut self) {
        if !self.materialized {
            warn!(
                target: "visbit.chain",
                csn = %self.node.csn(),
                group_lo = %self.group.lo(),
                "delta ticket dropped before materialization; placeholder remains pinned"
            );
        }
    }
}

/// Per-delta entry in a [`GroupSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct DeltaSummary {
    pub csn: i64,
    pub kind: PayloadKind,
    /// Stored 16-bit words (sparse position count, or the dense word count).
    pub payload_words: usize,
}

/// Diagnostic snapshot of one group, newest delta first.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub lo: i64,
    pub hi: i64,
    pub materialized: usize,
    pub deltas: Vec<DeltaSummary>,
}

/// The multi-version bitmap store.
///
/// One controller serves many concurrent readers and writers. Phases 1-2
/// of the insert path must arrive in ascending CSN order (the host's
/// commit sequencer provides this); phase 3 and all reads are free-running.
pub struct ChainController {
    /// Newest group first.
    head_group: ArcSwapOption<VersionGroup>,
    /// Serializes linking a freshly opened group.
    head_lock: Mutex<()>,
    /// Reservation count for the head group. Boots at the cap so the very
    /// first insert opens the first group.
    cap_lock: Mutex<usize>,
    /// Dense-fallback threshold used by phase 3.
    threshold: SparseThreshold,
    /// Host-owned active-CSN list backing the retention hook.
    active: Arc<ActiveCsnList>,
    /// Last reserved CSN, for the monotonicity contract check.
    last_reserved: AtomicI64,
}

impl ChainController {
    /// Create an empty store bound to the host's active-CSN list.
    #[must_use]
    pub fn new(active: Arc<ActiveCsnList>) -> Self {
        Self::with_threshold(active, SparseThreshold::default())
    }

    /// Create an empty store with a non-default dense-fallback threshold.
    #[must_use]
    pub fn with_threshold(active: Arc<ActiveCsnList>, threshold: SparseThreshold) -> Self {
        Self {
            head_group: ArcSwapOption::empty(),
            head_lock: Mutex::new(()),
            cap_lock: Mutex::new(MAX_GROUP_SIZE),
            threshold,
            active,
            last_reserved: AtomicI64::new(i64::MIN),
        }
    }

    /// Phases 1-2: reserve a slot for `csn` and publish either a new group
    /// or a placeholder.
    ///
    /// Calls must arrive in ascending CSN order, serialized by the caller.
    pub fn insert_placeholder(&self, csn: Csn, image: &Bitmap) -> InsertOutcome {
        observability::record_insert();
        let previous = self.last_reserved.swap(csn.get(), Ordering::Relaxed);
        debug_assert!(
            previous < csn.get(),
            "insert_placeholder CSNs must be strictly ascending (last {previous}, got {csn})"
        );

        // Phase 1: the reservation decides exactly one opener per group.
        let captured = {
            let mut head_count = self.cap_lock.lock();
            if *head_count == MAX_GROUP_SIZE {
                *head_count = 1;
                None
            } else {
                *head_count += 1;
                Some(
                    self.head_group
                        .load_full()
                        .expect("a head group exists whenever the reservation count is below the cap"),
                )
            }
        };

        // Phase 2.
        match captured {
            None => {
                let group = Arc::new(VersionGroup::new(csn, image));
                {
                    let _head = self.head_lock.lock();
                    group.next_group.store(self.head_group.load_full());
                    self.head_group.store(Some(group));
                }
                observability::record_group_opened();
                debug!(target: "visbit.chain", %csn, "opened version group");
                InsertOutcome::OpenedGroup
            }
            Some(group) => {
                let node = group.publish_placeholder(csn);
                InsertOutcome::Pending(DeltaTicket {
                    group,
                    node,
                    materialized: false,
                })
            }
        }
    }

    /// Phase 3: materialize the reserved delta from `image`.
    ///
    /// Runs concurrently with other writers' phases 1-2 and with all
    /// readers; writers within the same group serialize on that group's
    /// lock for the propagation walk.
    pub fn insert_content(&self, mut ticket: DeltaTicket, image: &Bitmap) {
        ticket.group.materialize(&ticket.node, image, self.threshold);
        ticket.materialized = true;
        trace!(target: "visbit.chain", csn = %ticket.node.csn(), "insert complete");
    }

    /// All three phases in one call.
    pub fn insert(&self, csn: Csn, image: &Bitmap) {
        if let InsertOutcome::Pending(ticket) = self.insert_placeholder(csn, image) {
            self.insert_content(ticket, image);
        }
    }

    /// Reconstruct the bitmap visible at `csn` into `out`.
    ///
    /// Returns `false` when the CSN is outside the live range, was never
    /// inserted, or its writer has not finished phase 3 yet.
    pub fn get(&self, csn: Csn, out: &mut Bitmap) -> bool {
        observability::record_read();
        let mut cursor = self.head_group.load_full();
        while let Some(group) = cursor {
            if csn < group.lo() {
                cursor = group.next_group.load_full();
                continue;
            }
            if csn > group.hi() {
                // Newer than anything materialized here; older groups have
                // strictly lower ranges, so the walk stops.
                observability::record_read_miss();
                return false;
            }
            let found = group.lookup(csn, out);
            if !found {
                observability::record_read_miss();
            }
            return found;
        }
        observability::record_read_miss();
        false
    }

    /// Allocating variant of [`get`](Self::get).
    #[must_use]
    pub fn snapshot(&self, csn: Csn) -> Option<Bitmap> {
        let mut out = Bitmap::zeroed();
        self.get(csn, &mut out).then_some(out)
    }

    /// Slice-facing variant of [`get`](Self::get) for embedders that own
    /// their buffers.
    ///
    /// # Errors
    ///
    /// Returns [`VisbitError::BitmapLength`] when `out` is not exactly
    /// [`BITMAP_SIZE`] bytes.
    pub fn get_into(&self, csn: Csn, out: &mut [u8]) -> Result<bool, VisbitError> {
        if out.len() != BITMAP_SIZE {
            return Err(VisbitError::BitmapLength {
                expected: BITMAP_SIZE,
                actual: out.len(),
            });
        }
        let mut image = Bitmap::zeroed();
        if !self.get(csn, &mut image) {
            return Ok(false);
        }
        out.copy_from_slice(image.as_bytes());
        Ok(true)
    }

    /// The host-owned active-CSN list this store was built with.
    #[must_use]
    pub fn active_csns(&self) -> &Arc<ActiveCsnList> {
        &self.active
    }

    /// Measure what a future collector would reclaim. Nothing is freed.
    #[must_use]
    pub fn retention_sweep(&self) -> RetentionReport {
        let horizon = self.active.oldest();
        let mut report = RetentionReport {
            horizon: horizon.map(Csn::get),
            reclaimable_groups: 0,
            retained_groups: 0,
            reclaimable_deltas: 0,
        };

        let mut cursor = self.head_group.load_full();
        while let Some(group) = cursor {
            match horizon {
                Some(horizon) if group.hi() < horizon => report.reclaimable_groups += 1,
                Some(horizon) => {
                    report.retained_groups += 1;
                    report.reclaimable_deltas += group.deltas_below(horizon);
                }
                None => report.retained_groups += 1,
            }
            cursor = group.next_group.load_full();
        }

        debug!(target: "visbit.chain", ?report, "retention sweep");
        report
    }

    /// Diagnostic snapshot of every group, newest first.
    #[must_use]
    pub fn group_summaries(&self) -> Vec<GroupSummary> {
        let mut summaries = Vec::new();
        let mut cursor = self.head_group.load_full();
        while let Some(group) = cursor {
            let mut deltas = Vec::new();
            let mut node = group.head.load_full();
            while let Some(current) = node {
                let payload = current.payload.load_full();
                deltas.push(DeltaSummary {
                    csn: current.csn().get(),
                    kind: payload.kind(),
                    payload_words: payload.storage_len(),
                });
                node = current.next.load_full();
            }
            summaries.push(GroupSummary {
                lo: group.lo().get(),
                hi: group.hi().get(),
                materialized: group.materialized_count(),
                deltas,
            });
            cursor = group.next_group.load_full();
        }
        summaries
    }

    /// Newest group first; `None` while the store is empty.
    pub(crate) fn head_group(&self) -> Option<Arc<VersionGroup>> {
        self.head_group.load_full()
    }
}
