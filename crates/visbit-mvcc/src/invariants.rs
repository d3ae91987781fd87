//! Structural checks over a live chain.
//!
//! [`verify_chain`] walks every group and delta and validates the ordering,
//! capacity, range, and payload well-formedness rules the store relies on.
//! Tests run it after every scenario; embedders can run it as a diagnostic
//! (it takes each group's lock briefly to read the materialized count, so
//! it is not for hot paths).

use visbit_error::VisbitError;
use visbit_types::{Csn, BIT_CAPACITY, DENSE_WORDS, MAX_GROUP_SIZE};

use crate::chain::ChainController;
use crate::codec::DeltaPayload;
use crate::group::VersionGroup;

/// Validate every structural invariant of `chain`.
///
/// # Errors
///
/// Returns the first violation found, outermost structure first.
pub fn verify_chain(chain: &ChainController) -> Result<(), VisbitError> {
    let mut previous_lo: Option<Csn> = None;
    let mut cursor = chain.head_group();
    while let Some(group) = cursor {
        if let Some(newer_lo) = previous_lo {
            if group.lo() >= newer_lo {
                return Err(VisbitError::GroupOrder {
                    newer_lo: newer_lo.get(),
                    older_lo: group.lo().get(),
                });
            }
        }
        verify_group(&group)?;
        previous_lo = Some(group.lo());
        cursor = group.next_group.load_full();
    }
    Ok(())
}

fn verify_group(group: &VersionGroup) -> Result<(), VisbitError> {
    let lo = group.lo();
    let hi = group.hi();
    if hi < lo {
        return Err(VisbitError::RangeInverted {
            lo: lo.get(),
            hi: hi.get(),
        });
    }

    let materialized = group.materialized_count();
    if materialized > MAX_GROUP_SIZE {
        return Err(VisbitError::GroupOverCapacity {
            group_lo: lo.get(),
            count: materialized,
            cap: MAX_GROUP_SIZE,
        });
    }

    let mut nodes = 0;
    let mut previous_csn: Option<Csn> = None;
    let mut oldest_csn = lo;
    let mut cursor = group.head.load_full();
    while let Some(node) = cursor {
        nodes += 1;
        let csn = node.csn();
        if let Some(newer) = previous_csn {
            if csn >= newer {
                return Err(VisbitError::DeltaOrder {
                    group_lo: lo.get(),
                    newer_csn: newer.get(),
                    older_csn: csn.get(),
                });
            }
        }
        verify_payload(group, csn, hi, &node.payload.load_full())?;
        previous_csn = Some(csn);
        oldest_csn = csn;
        cursor = node.next.load_full();
    }

    if nodes > MAX_GROUP_SIZE {
        return Err(VisbitError::GroupOverCapacity {
            group_lo: lo.get(),
            count: nodes,
            cap: MAX_GROUP_SIZE,
        });
    }
    if oldest_csn != lo {
        return Err(VisbitError::GroupAnchor {
            group_lo: lo.get(),
            oldest_csn: oldest_csn.get(),
        });
    }
    Ok(())
}

fn verify_payload(
    group: &VersionGroup,
    csn: Csn,
    hi: Csn,
    payload: &DeltaPayload,
) -> Result<(), VisbitError> {
    match payload {
        // Placeholders carry nothing and may sit above `hi`.
        DeltaPayload::Placeholder => Ok(()),
        DeltaPayload::Sparse(positions) => {
            if csn > hi {
                return Err(VisbitError::RangeBehindDelta {
                    group_lo: group.lo().get(),
                    hi: hi.get(),
                    delta_csn: csn.get(),
                });
            }
            for (index, window) in positions.windows(2).enumerate() {
                if window[0] >= window[1] {
                    return Err(VisbitError::SparseUnsorted {
                        csn: csn.get(),
                        index: index + 1,
                    });
                }
            }
            if let Some(&position) = positions.iter().find(|&&p| (p as usize) >= BIT_CAPACITY) {
                return Err(VisbitError::PositionOutOfRange {
                    csn: csn.get(),
                    position,
                    limit: BIT_CAPACITY,
                });
            }
            Ok(())
        }
        DeltaPayload::Dense(words) => {
            if csn > hi {
                return Err(VisbitError::RangeBehindDelta {
                    group_lo: group.lo().get(),
                    hi: hi.get(),
                    delta_csn: csn.get(),
                });
            }
            if words.len() != DENSE_WORDS {
                return Err(VisbitError::DenseLength {
                    csn: csn.get(),
                    words: words.len(),
                    expected: DENSE_WORDS,
                });
            }
            Ok(())
        }
    }
}
