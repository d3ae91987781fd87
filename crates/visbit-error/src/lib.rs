//! Error types for visbit operations.
//!
//! Structured variants with raw-primitive fields so this crate sits at the
//! bottom of the workspace graph. A read miss is not an error (lookups
//! report it as `false` / `None`), so the variants here cover boundary
//! validation and structural-check failures only.

use thiserror::Error;

/// Primary error type for visbit operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisbitError {
    /// A caller-supplied byte image has the wrong length.
    #[error("bitmap length mismatch: expected {expected} bytes, got {actual}")]
    BitmapLength { expected: usize, actual: usize },

    /// A sparse-threshold configuration is out of domain.
    #[error("invalid sparse threshold: {bits} bits (must be in 1..={limit})")]
    Threshold { bits: usize, limit: usize },

    /// Groups must appear in strictly decreasing `lo` order along the chain.
    #[error("group order violation: group lo {newer_lo} followed by lo {older_lo}")]
    GroupOrder { newer_lo: i64, older_lo: i64 },

    /// Deltas within a group must appear in strictly decreasing CSN order.
    #[error(
        "delta order violation in group lo {group_lo}: csn {newer_csn} followed by {older_csn}"
    )]
    DeltaOrder {
        group_lo: i64,
        newer_csn: i64,
        older_csn: i64,
    },

    /// A group holds more deltas than the cap allows.
    #[error("group lo {group_lo} holds {count} deltas (cap {cap})")]
    GroupOverCapacity {
        group_lo: i64,
        count: usize,
        cap: usize,
    },

    /// A group's CSN range has `hi` below `lo`.
    #[error("inverted csn range: lo {lo}, hi {hi}")]
    RangeInverted { lo: i64, hi: i64 },

    /// A group's `lo` does not match the CSN of its oldest delta.
    #[error("group lo {group_lo} does not match oldest delta csn {oldest_csn}")]
    GroupAnchor { group_lo: i64, oldest_csn: i64 },

    /// A group's `hi` trails one of its materialized deltas.
    #[error("csn range hi {hi} trails materialized delta csn {delta_csn} in group lo {group_lo}")]
    RangeBehindDelta {
        group_lo: i64,
        hi: i64,
        delta_csn: i64,
    },

    /// A sparse payload is not strictly ascending.
    #[error("sparse payload for csn {csn} not strictly ascending at index {index}")]
    SparseUnsorted { csn: i64, index: usize },

    /// A sparse payload carries a position outside the bitmap.
    #[error("sparse position {position} out of range (limit {limit}) for csn {csn}")]
    PositionOutOfRange {
        csn: i64,
        position: u16,
        limit: usize,
    },

    /// A dense payload does not carry exactly the expected word count.
    #[error("dense payload for csn {csn} holds {words} words, expected {expected}")]
    DenseLength {
        csn: i64,
        words: usize,
        expected: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let err = VisbitError::BitmapLength {
            expected: 7500,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "bitmap length mismatch: expected 7500 bytes, got 12"
        );

        let err = VisbitError::GroupOrder {
            newer_lo: 9,
            older_lo: 9,
        };
        assert_eq!(
            err.to_string(),
            "group order violation: group lo 9 followed by lo 9"
        );
    }
}
