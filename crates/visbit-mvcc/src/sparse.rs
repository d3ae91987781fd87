//! Sorted-index union for sparse delta payloads.
//!
//! Sparse payloads are strictly ascending lists of 16-bit bit positions.
//! Propagation merges a freshly materialized delta's positions into older
//! siblings; the merge must be a set union (duplicates collapse to one
//! entry) or XOR-fold reconstruction would double-toggle shared positions.

/// Two-finger set union of two strictly ascending position lists.
///
/// Returns a fresh strictly ascending vector; equal positions collapse.
#[must_use]
pub fn union_sorted(a: &[u16], b: &[u16]) -> Vec<u16> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let mut i = 0;
    let mut j = 0;

    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                merged.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                merged.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                merged.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged
}
