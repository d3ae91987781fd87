//! Version groups: one reference bitmap plus a chain of delta versions.
//!
//! A group owns an immutable reference image captured at creation, a
//! head-first chain of delta nodes in strictly decreasing CSN order, and a
//! `[lo, hi]` CSN range summary. Readers traverse only atomic links and
//! never block; structural changes (placeholder prepend, materialization,
//! propagation) serialize on the group lock.
//!
//! ## Payload publication
//!
//! A delta's payload cell transitions Placeholder → Sparse/Dense exactly
//! once, as a single release store. Propagation never mutates a published
//! payload in place: it builds the unioned position list and swaps in a
//! fresh payload, so a reader holding the previous one keeps decoding a
//! consistent image.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use tracing::trace;

use visbit_types::{Bitmap, Csn};

use crate::codec::{self, DeltaPayload, SparseThreshold};
use crate::observability;
use crate::sparse::union_sorted;

/// One delta version in a group's chain.
pub struct DeltaNode {
    pub(crate) csn: Csn,
    pub(crate) payload: ArcSwap<DeltaPayload>,
    pub(crate) next: ArcSwapOption<DeltaNode>,
}

impl DeltaNode {
    fn placeholder(csn: Csn) -> Self {
        Self {
            csn,
            payload: ArcSwap::from_pointee(DeltaPayload::Placeholder),
            next: ArcSwapOption::empty(),
        }
    }

    /// CSN this delta answers for.
    #[inline]
    #[must_use]
    pub fn csn(&self) -> Csn {
        self.csn
    }
}

/// Writer-serialized group state.
pub(crate) struct GroupState {
    /// Number of materialized deltas (the opener counts from creation).
    pub(crate) count: usize,
}

/// A reference bitmap and its chain of differential versions.
pub struct VersionGroup {
    /// Full image captured at group creation. Immutable once published.
    pub(crate) reference: Bitmap,
    /// Newest delta first.
    pub(crate) head: ArcSwapOption<DeltaNode>,
    /// Serializes placeholder prepend, materialization, and propagation.
    pub(crate) lock: Mutex<GroupState>,
    /// CSN of the delta that created the group; oldest in the group.
    pub(crate) lo: Csn,
    /// Newest CSN this group answers for; grows as deltas materialize.
    pub(crate) hi: AtomicI64,
    /// Next-older group.
    pub(crate) next_group: ArcSwapOption<VersionGroup>,
}

impl VersionGroup {
    /// Create a group for opener `csn` with `image` as the reference.
    ///
    /// The opening delta is a zero-difference sparse payload: the opener's
    /// image is by construction equal to the reference.
    pub(crate) fn new(csn: Csn, image: &Bitmap) -> Self {
        let opener = Arc::new(DeltaNode {
            csn,
            payload: ArcSwap::from_pointee(DeltaPayload::Sparse(Vec::new())),
            next: ArcSwapOption::empty(),
        });
        Self {
            reference: image.clone(),
            head: ArcSwapOption::new(Some(opener)),
            lock: Mutex::new(GroupState { count: 1 }),
            lo: csn,
            hi: AtomicI64::new(csn.get()),
            next_group: ArcSwapOption::empty(),
        }
    }

    /// Oldest CSN in the group.
    #[inline]
    #[must_use]
    pub fn lo(&self) -> Csn {
        self.lo
    }

    /// Newest CSN this group currently answers for.
    #[inline]
    #[must_use]
    pub fn hi(&self) -> Csn {
        Csn::new(self.hi.load(Ordering::Acquire))
    }

    /// Number of materialized deltas.
    #[must_use]
    pub fn materialized_count(&self) -> usize {
        self.lock.lock().count
    }

    /// Walk the delta chain for an exact CSN match and reconstruct it.
    ///
    /// A matching placeholder is not-found: the version exists but is not
    /// yet visible.
    pub(crate) fn lookup(&self, csn: Csn, out: &mut Bitmap) -> bool {
        let mut cursor = self.head.load_full();
        while let Some(current) = cursor {
            if current.csn == csn {
                let payload = current.payload.load_full();
                return match payload.as_ref() {
                    DeltaPayload::Placeholder => {
                        observability::record_placeholder_read();
                        trace!(target: "visbit.group", %csn, "read hit unmaterialized placeholder");
                        false
                    }
                    DeltaPayload::Sparse(positions) => {
                        codec::decode_sparse(&self.reference, positions, out);
                        true
                    }
                    DeltaPayload::Dense(words) => {
                        codec::decode_dense(words, out);
                        true
                    }
                };
            }
            if current.csn < csn {
                // The chain is strictly descending; nothing older matches.
                return false;
            }
            cursor = current.next.load_full();
        }
        false
    }

    /// Prepend a placeholder delta for `csn`.
    ///
    /// Phase 2 of the three-phase insert. The placeholder reserves the
    /// chain position; it stays invisible to reads until materialized.
    pub(crate) fn publish_placeholder(&self, csn: Csn) -> Arc<DeltaNode> {
        let node = Arc::new(DeltaNode::placeholder(csn));
        let _state = self.lock.lock();
        let head = self.head.load_full();
        if let Some(newest) = &head {
            debug_assert!(
                csn > newest.csn,
                "placeholder {csn} must be newer than chain head {}",
                newest.csn
            );
        }
        node.next.store(head);
        self.head.store(Some(Arc::clone(&node)));
        trace!(target: "visbit.group", %csn, lo = %self.lo, "placeholder published");
        node
    }

    /// Materialize `node` from `original`.
    ///
    /// Phase 3 of the three-phase insert: encode outside the lock; then,
    /// under the lock, propagate into the adjacent materialized run,
    /// publish the payload, bump the count, and advance `hi`.
    pub(crate) fn materialize(&self, node: &Arc<DeltaNode>, original: &Bitmap, threshold: SparseThreshold) {
        let payload = codec::encode(original, &self.reference, threshold);
        match payload.kind() {
            codec::PayloadKind::Sparse => observability::record_sparse_encoding(),
            codec::PayloadKind::Dense => observability::record_dense_encoding(),
            codec::PayloadKind::Placeholder => unreachable!("encode never yields a placeholder"),
        }

        let mut state = self.lock.lock();

        // Locate the contiguous run of materialized siblings directly above
        // `node`. A placeholder resets the run: its own materializer will
        // propagate across it later, and crossing it now would double-count.
        let mut run_start: Option<Arc<DeltaNode>> = None;
        let mut run_csn: Option<Csn> = None;
        let mut reached = false;
        let mut cursor = self.head.load_full();
        while let Some(current) = cursor {
            if Arc::ptr_eq(&current, node) {
                reached = true;
                break;
            }
            if current.payload.load().is_placeholder() {
                run_start = None;
                run_csn = None;
            } else if run_start.is_none() {
                run_csn = Some(current.csn);
                run_start = Some(Arc::clone(&current));
            }
            cursor = current.next.load_full();
        }
        debug_assert!(reached, "materializing delta must be linked in its group");

        // Union the fresh sparse positions into every sparse sibling in the
        // run. Dense siblings already carry their full original and are
        // skipped.
        if let DeltaPayload::Sparse(fresh) = &payload {
            let mut cursor = run_start;
            while let Some(current) = cursor {
                if Arc::ptr_eq(&current, node) {
                    break;
                }
                let sibling = current.payload.load_full();
                if let DeltaPayload::Sparse(existing) = sibling.as_ref() {
                    let merged = union_sorted(existing, fresh);
                    current
                        .payload
                        .store(Arc::new(DeltaPayload::Sparse(merged)));
                    observability::record_propagated_union();
                }
                cursor = current.next.load_full();
            }
        }

        let kind = payload.kind();
        node.payload.store(Arc::new(payload));
        state.count += 1;

        let advance = run_csn.unwrap_or(node.csn);
        self.hi.fetch_max(advance.get(), Ordering::AcqRel);
        trace!(
            target: "visbit.group",
            csn = %node.csn,
            ?kind,
            hi = %self.hi(),
            "delta materialized"
        );
    }

    /// Number of deltas with a CSN strictly below `horizon`.
    ///
    /// Retention reporting only; counts placeholders too, since a future
    /// collector would have to unlink them as well.
    pub(crate) fn deltas_below(&self, horizon: Csn) -> usize {
        let mut below = 0;
        let mut cursor = self.head.load_full();
        while let Some(current) = cursor {
            if current.csn < horizon {
                below += 1;
            }
            cursor = current.next.load_full();
        }
        below
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_with_bits(positions: &[usize]) -> Bitmap {
        let mut bitmap = Bitmap::zeroed();
        for &position in positions {
            bitmap.set_bit(position);
        }
        bitmap
    }

    fn sparse_positions(node: &DeltaNode) -> Vec<u16> {
        match node.payload.load_full().as_ref() {
            DeltaPayload::Sparse(positions) => positions.clone(),
            other => panic!("expected sparse payload, got {other:?}"),
        }
    }

    fn read(group: &VersionGroup, csn: Csn) -> Option<Bitmap> {
        let mut out = Bitmap::zeroed();
        group.lookup(csn, &mut out).then_some(out)
    }

    #[test]
    fn test_opener_delta_is_zero_difference() {
        let image = bitmap_with_bits(&[7, 11]);
        let group = VersionGroup::new(Csn::new(5), &image);

        assert_eq!(group.lo(), Csn::new(5));
        assert_eq!(group.hi(), Csn::new(5));
        assert_eq!(group.materialized_count(), 1);

        let opener = group.head.load_full().expect("opening delta");
        assert!(sparse_positions(&opener).is_empty());
        assert_eq!(read(&group, Csn::new(5)).expect("opener visible"), image);
    }

    #[test]
    fn test_serial_materialization_never_propagates() {
        let group = VersionGroup::new(Csn::ZERO, &Bitmap::zeroed());
        let threshold = SparseThreshold::default();

        for (csn, position) in [(1, 10usize), (2, 20), (3, 30)] {
            let node = group.publish_placeholder(Csn::new(csn));
            group.materialize(&node, &bitmap_with_bits(&[position]), threshold);
        }

        // Each materialization happened at the chain head, so every payload
        // keeps exactly its own difference against the reference.
        let head = group.head.load_full().expect("head");
        assert_eq!(sparse_positions(&head), vec![30]);
        let second = head.next.load_full().expect("second");
        assert_eq!(sparse_positions(&second), vec![20]);
        let third = second.next.load_full().expect("third");
        assert_eq!(sparse_positions(&third), vec![10]);

        assert_eq!(group.hi(), Csn::new(3));
        assert_eq!(group.materialized_count(), 4);
        assert_eq!(
            read(&group, Csn::new(2)).expect("materialized"),
            bitmap_with_bits(&[20])
        );
    }

    #[test]
    fn test_out_of_order_materialization_propagates_into_newer_run() {
        // Monotone workload: each image adds one bit over its predecessor.
        let group = VersionGroup::new(Csn::ZERO, &Bitmap::zeroed());
        let threshold = SparseThreshold::default();

        let image2 = bitmap_with_bits(&[10]);
        let image3 = bitmap_with_bits(&[10, 20]);

        let node2 = group.publish_placeholder(Csn::new(2));
        let node3 = group.publish_placeholder(Csn::new(3));

        // CSN 3 lands first; its walk stops at the head immediately.
        group.materialize(&node3, &image3, threshold);
        assert_eq!(group.hi(), Csn::new(3));
        assert_eq!(sparse_positions(&node3), vec![10, 20]);

        // CSN 2 materializes below it: its positions union into the run
        // above, which already contains them (monotone images).
        group.materialize(&node2, &image2, threshold);
        assert_eq!(sparse_positions(&node2), vec![10]);
        assert_eq!(sparse_positions(&node3), vec![10, 20]);

        assert_eq!(read(&group, Csn::new(2)).expect("csn 2"), image2);
        assert_eq!(read(&group, Csn::new(3)).expect("csn 3"), image3);
        assert_eq!(read(&group, Csn::ZERO).expect("opener"), Bitmap::zeroed());
    }

    #[test]
    fn test_placeholder_is_a_propagation_barrier() {
        let group = VersionGroup::new(Csn::ZERO, &Bitmap::zeroed());
        let threshold = SparseThreshold::default();

        let image1 = bitmap_with_bits(&[10]);
        let image2 = bitmap_with_bits(&[10, 20]);
        let image3 = bitmap_with_bits(&[10, 20, 30]);
        let image4 = bitmap_with_bits(&[10, 20, 30, 40]);

        let node1 = group.publish_placeholder(Csn::new(1));
        group.materialize(&node1, &image1, threshold);

        let node2 = group.publish_placeholder(Csn::new(2));
        let node3 = group.publish_placeholder(Csn::new(3));
        let node4 = group.publish_placeholder(Csn::new(4));

        // Chain: 4 -> 3 -> 2 -> 1 -> opener. CSN 4 materializes first.
        group.materialize(&node4, &image4, threshold);
        assert_eq!(group.hi(), Csn::new(4));

        // CSN 2's walk sees 4 (materialized) then 3 (placeholder): the
        // placeholder resets the run, so nothing is touched above it and
        // `hi` advances only to the materializing CSN itself.
        group.materialize(&node2, &image2, threshold);
        assert_eq!(sparse_positions(&node4), vec![10, 20, 30, 40]);
        assert_eq!(sparse_positions(&node2), vec![10, 20]);

        // CSN 3 finally materializes; the run above it is just CSN 4.
        group.materialize(&node3, &image3, threshold);
        assert_eq!(sparse_positions(&node4), vec![10, 20, 30, 40]);

        for (csn, image) in [(1, &image1), (2, &image2), (3, &image3), (4, &image4)] {
            assert_eq!(read(&group, Csn::new(csn)).expect("materialized"), *image);
        }
    }

    #[test]
    fn test_propagation_skips_dense_siblings() {
        let group = VersionGroup::new(Csn::ZERO, &Bitmap::zeroed());
        let threshold = SparseThreshold::default();

        // CSN 2's image differs in 4000 bits: dense fallback.
        let mut image2 = Bitmap::zeroed();
        image2.as_bytes_mut()[..500].fill(0xFF);
        let mut image1 = Bitmap::zeroed();
        image1.set_bit(4005);

        let node1 = group.publish_placeholder(Csn::new(1));
        let node2 = group.publish_placeholder(Csn::new(2));

        group.materialize(&node2, &image2, threshold);
        assert!(matches!(
            node2.payload.load_full().as_ref(),
            DeltaPayload::Dense(_)
        ));

        // CSN 1 materializes below the dense sibling; the dense payload is
        // skipped and keeps decoding to its own image.
        group.materialize(&node1, &image1, threshold);
        assert_eq!(read(&group, Csn::new(1)).expect("csn 1"), image1);
        assert_eq!(read(&group, Csn::new(2)).expect("csn 2"), image2);
    }

    #[test]
    fn test_lookup_misses_placeholder_and_unknown_csn() {
        let group = VersionGroup::new(Csn::ZERO, &Bitmap::zeroed());
        let node = group.publish_placeholder(Csn::new(1));

        let mut out = Bitmap::zeroed();
        assert!(!group.lookup(Csn::new(1), &mut out), "placeholder invisible");
        assert!(!group.lookup(Csn::new(99), &mut out), "unknown csn");

        group.materialize(&node, &bitmap_with_bits(&[42]), SparseThreshold::default());
        assert!(group.lookup(Csn::new(1), &mut out));
        assert!(out.bit(42));
    }

    #[test]
    fn test_deltas_below_counts_for_retention() {
        let group = VersionGroup::new(Csn::new(10), &Bitmap::zeroed());
        let threshold = SparseThreshold::default();
        for csn in 11..=13 {
            let node = group.publish_placeholder(Csn::new(csn));
            group.materialize(&node, &bitmap_with_bits(&[csn as usize]), threshold);
        }

        assert_eq!(group.deltas_below(Csn::new(10)), 0);
        assert_eq!(group.deltas_below(Csn::new(12)), 2);
        assert_eq!(group.deltas_below(Csn::new(100)), 4);
    }
}
