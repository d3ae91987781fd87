//! End-to-end scenarios through the public API only.

use std::sync::Arc;

use visbit_mvcc::{
    store_metrics, verify_chain, ActiveCsnList, ChainController, InsertOutcome, PayloadKind,
    SparseThreshold,
};
use visbit_types::{Bitmap, Csn, BITMAP_SIZE, MAX_GROUP_SIZE, SPARSE_THRESHOLD_BITS};

fn store() -> ChainController {
    ChainController::new(Arc::new(ActiveCsnList::new()))
}

fn bitmap_with_bits(positions: &[usize]) -> Bitmap {
    let mut bitmap = Bitmap::zeroed();
    for &position in positions {
        bitmap.set_bit(position);
    }
    bitmap
}

#[test]
fn scenario_single_writer_two_sparse_versions() {
    let chain = store();
    chain.insert(Csn::ZERO, &Bitmap::zeroed());
    chain.insert(Csn::new(1), &bitmap_with_bits(&[42]));

    assert_eq!(
        chain.snapshot(Csn::ZERO).expect("opener"),
        Bitmap::zeroed()
    );
    assert_eq!(
        chain.snapshot(Csn::new(1)).expect("second version"),
        bitmap_with_bits(&[42])
    );
    assert!(chain.snapshot(Csn::new(2)).is_none());
    verify_chain(&chain).expect("chain invariants");
}

#[test]
fn scenario_dense_fallback_on_wide_diff() {
    let chain = store();
    chain.insert(Csn::ZERO, &Bitmap::zeroed());

    let mut wide = Bitmap::zeroed();
    wide.as_bytes_mut()[..500].fill(0xFF);
    assert!(wide.count_ones() >= SPARSE_THRESHOLD_BITS);
    chain.insert(Csn::new(1), &wide);

    let summaries = chain.group_summaries();
    assert_eq!(summaries[0].deltas[0].kind, PayloadKind::Dense);
    assert_eq!(chain.snapshot(Csn::new(1)).expect("dense delta"), wide);
}

#[test]
fn scenario_group_rollover_at_cap() {
    let chain = store();
    let mut image = Bitmap::zeroed();
    for csn in 0..10i64 {
        image.set_bit(csn as usize);
        chain.insert(Csn::new(csn), &image);
    }

    let summaries = chain.group_summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].lo, 9, "version 9 opens the second group");
    assert_eq!(summaries[1].lo, 0);
    assert_eq!(summaries[1].deltas.len(), MAX_GROUP_SIZE);
    verify_chain(&chain).expect("chain invariants");
}

#[test]
fn scenario_read_below_oldest_group() {
    let chain = store();
    let mut image = Bitmap::zeroed();
    for csn in 0..10i64 {
        image.set_bit(csn as usize);
        chain.insert(Csn::new(csn), &image);
    }

    let mut out = Bitmap::zeroed();
    assert!(!chain.get(Csn::new(-1), &mut out));
}

#[test]
fn scenario_reader_races_materialization() {
    let chain = store();
    chain.insert(Csn::ZERO, &Bitmap::zeroed());

    let image = bitmap_with_bits(&[100, 200]);
    let ticket = match chain.insert_placeholder(Csn::new(1), &image) {
        InsertOutcome::Pending(ticket) => ticket,
        InsertOutcome::OpenedGroup => panic!("cap not reached"),
    };

    // Mid-materialization window: the placeholder is linked, the payload
    // is not. The read must miss, not decode zeros.
    assert!(chain.snapshot(Csn::new(1)).is_none());

    chain.insert_content(ticket, &image);
    assert_eq!(chain.snapshot(Csn::new(1)).expect("committed"), image);
}

#[test]
fn scenario_metrics_move_under_load() {
    let before = store_metrics();

    let chain = store();
    chain.insert(Csn::ZERO, &Bitmap::zeroed());
    chain.insert(Csn::new(1), &bitmap_with_bits(&[3]));
    let mut out = Bitmap::zeroed();
    assert!(chain.get(Csn::new(1), &mut out));
    assert!(!chain.get(Csn::new(9), &mut out));

    let after = store_metrics();
    assert!(after.visbit_inserts_total >= before.visbit_inserts_total + 2);
    assert!(after.visbit_groups_opened_total >= before.visbit_groups_opened_total + 1);
    assert!(after.visbit_sparse_encodings_total >= before.visbit_sparse_encodings_total + 1);
    assert!(after.visbit_reads_total >= before.visbit_reads_total + 2);
    assert!(after.visbit_read_misses_total >= before.visbit_read_misses_total + 1);
}

#[test]
fn scenario_summaries_serialize_for_diagnostics() {
    let chain = store();
    chain.insert(Csn::ZERO, &bitmap_with_bits(&[1]));
    chain.insert(Csn::new(1), &bitmap_with_bits(&[1, 2]));

    let json = serde_json::to_string(&chain.group_summaries()).expect("summaries serialize");
    assert!(json.contains("\"lo\":0"));
    assert!(json.contains("\"kind\":\"Sparse\""));

    let report = chain.retention_sweep();
    let json = serde_json::to_string(&report).expect("report serializes");
    assert!(json.contains("\"horizon\":null"));
}

#[test]
fn scenario_custom_threshold_changes_the_fallback_point() {
    let active = Arc::new(ActiveCsnList::new());
    let threshold = SparseThreshold::new(4).expect("valid threshold");
    let chain = ChainController::with_threshold(active, threshold);

    chain.insert(Csn::ZERO, &Bitmap::zeroed());
    chain.insert(Csn::new(1), &bitmap_with_bits(&[1, 2, 3])); // 3 bits < 4
    chain.insert(Csn::new(2), &bitmap_with_bits(&[1, 2, 3, 4])); // 4 bits >= 4

    let summaries = chain.group_summaries();
    assert_eq!(summaries[0].deltas[0].kind, PayloadKind::Dense);
    assert_eq!(summaries[0].deltas[1].kind, PayloadKind::Sparse);

    assert_eq!(
        chain.snapshot(Csn::new(2)).expect("dense at low threshold"),
        bitmap_with_bits(&[1, 2, 3, 4])
    );
}

#[test]
fn scenario_full_buffer_round_trip() {
    let chain = store();
    let image = bitmap_with_bits(&[0, 8, 59_999]);
    chain.insert(Csn::ZERO, &image);

    let mut buffer = vec![0u8; BITMAP_SIZE];
    assert!(chain.get_into(Csn::ZERO, &mut buffer).expect("sized buffer"));
    assert_eq!(&buffer, image.as_bytes());
}
