//! Public API facade for the visbit store.
//!
//! Embedders normally need just this crate: construct a
//! [`ChainController`] against the host's [`ActiveCsnList`], feed it
//! committed bitmaps through the insert path, and serve snapshot reads
//! with [`ChainController::get`].

pub use visbit_error::VisbitError;
pub use visbit_mvcc::{
    store_metrics, verify_chain, ActiveCsnList, ChainController, DeltaTicket, InsertOutcome,
    PayloadKind, RetentionReport, SparseThreshold, StoreMetricsSnapshot,
};
pub use visbit_types::{Bitmap, Csn, BITMAP_SIZE, MAX_GROUP_SIZE, SPARSE_THRESHOLD_BITS};
