//! Grouped differential version chains for visibility bitmaps.
//!
//! This crate implements the multi-version store behind point-in-time
//! snapshot reads of column-chunk visibility bitmaps: a head-first chain
//! of version groups, each holding one reference image plus up to
//! [`visbit_types::MAX_GROUP_SIZE`] differentially encoded successors.
//! Writers publish in three phases without ever blocking readers; readers
//! reconstruct an image by XOR-folding one delta against its group's
//! reference.
//!
//! Entry point: [`ChainController`].

pub mod chain;
pub mod codec;
pub mod group;
pub mod invariants;
pub mod observability;
pub mod retention;
pub mod sparse;

pub use chain::{
    ChainController, DeltaSummary, DeltaTicket, GroupSummary, InsertOutcome,
};
pub use codec::{
    decode, decode_dense, decode_sparse, encode, pack_words, xor, xor_diff_bits, DeltaPayload,
    PayloadKind, SparseThreshold,
};
pub use group::{DeltaNode, VersionGroup};
pub use invariants::verify_chain;
pub use observability::{reset_store_metrics, store_metrics, StoreMetricsSnapshot};
pub use retention::{ActiveCsnList, RetentionReport};
pub use sparse::union_sorted;
