//! Bitmap delta codec: XOR diffing, sparse/dense encoding, decoding.
//!
//! Every delta is stored relative to its group's reference bitmap. Small
//! differences become a sparse list of differing bit positions; once the
//! difference reaches the threshold, the payload falls back to a dense
//! packing of the full original image. Dense is a graceful fallback, not
//! an anomaly: at roughly 2 bytes per differing bit, sparse stops paying
//! for itself above `BITMAP_SIZE / 16` differing bits.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use visbit_error::VisbitError;
use visbit_types::{bit_mask, Bitmap, BIT_CAPACITY, DENSE_WORDS, SPARSE_THRESHOLD_BITS};

// ---------------------------------------------------------------------------
// SparseThreshold
// ---------------------------------------------------------------------------

/// Differing-bit count at which encoding falls back to a dense payload.
///
/// The default is the normative `BITMAP_SIZE / 16`; embedders can tune it
/// per store for experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseThreshold {
    bits: usize,
}

impl SparseThreshold {
    /// Build a threshold config.
    ///
    /// # Errors
    ///
    /// Returns [`VisbitError::Threshold`] when `bits` is not in
    /// `1..=BIT_CAPACITY`.
    pub fn new(bits: usize) -> Result<Self, VisbitError> {
        if bits == 0 || bits > BIT_CAPACITY {
            return Err(VisbitError::Threshold {
                bits,
                limit: BIT_CAPACITY,
            });
        }
        Ok(Self { bits })
    }

    /// Differing-bit count at which dense encoding wins.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> usize {
        self.bits
    }
}

impl Default for SparseThreshold {
    fn default() -> Self {
        Self {
            bits: SPARSE_THRESHOLD_BITS,
        }
    }
}

// ---------------------------------------------------------------------------
// DeltaPayload
// ---------------------------------------------------------------------------

/// Payload of one delta version.
///
/// The placeholder variant makes "not yet materialized" explicit: decoders
/// skip it and propagation treats it as a compression barrier.
#[derive(Clone, PartialEq, Eq)]
pub enum DeltaPayload {
    /// Reserved but not yet materialized. Invisible to reads.
    Placeholder,
    /// Strictly ascending bit positions that differ from the group
    /// reference. The container length is the count.
    Sparse(Vec<u16>),
    /// The full original image as [`DENSE_WORDS`] little-endian byte pairs
    /// (byte `2i` in the low half of word `i`).
    Dense(Vec<u16>),
}

impl DeltaPayload {
    /// Encoding tag without payload contents.
    #[must_use]
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Placeholder => PayloadKind::Placeholder,
            Self::Sparse(_) => PayloadKind::Sparse,
            Self::Dense(_) => PayloadKind::Dense,
        }
    }

    /// True while the payload has not been materialized.
    #[inline]
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }

    /// Number of 16-bit words the payload stores.
    #[must_use]
    pub fn storage_len(&self) -> usize {
        match self {
            Self::Placeholder => 0,
            Self::Sparse(positions) => positions.len(),
            Self::Dense(words) => words.len(),
        }
    }
}

impl fmt::Debug for DeltaPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => write!(f, "Placeholder"),
            Self::Sparse(positions) => write!(f, "Sparse({} positions)", positions.len()),
            Self::Dense(words) => write!(f, "Dense({} words)", words.len()),
        }
    }
}

/// Encoding tag of a [`DeltaPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayloadKind {
    Placeholder,
    Sparse,
    Dense,
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Count the differing bits between two images.
#[must_use]
pub fn xor_diff_bits(a: &Bitmap, b: &Bitmap) -> usize {
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .map(|(&lhs, &rhs)| (lhs ^ rhs).count_ones() as usize)
        .sum()
}

/// Bytewise XOR of two images.
#[must_use]
pub fn xor(a: &Bitmap, b: &Bitmap) -> Bitmap {
    let mut out = Bitmap::zeroed();
    for (dst, (&lhs, &rhs)) in out
        .as_bytes_mut()
        .iter_mut()
        .zip(a.as_bytes().iter().zip(b.as_bytes()))
    {
        *dst = lhs ^ rhs;
    }
    out
}

/// Encode `original` as a delta against `reference`.
///
/// Emits [`DeltaPayload::Dense`] iff the differing-bit count reaches
/// `threshold`; otherwise emits the ascending sparse position list.
#[must_use]
pub fn encode(original: &Bitmap, reference: &Bitmap, threshold: SparseThreshold) -> DeltaPayload {
    let diff_bits = xor_diff_bits(original, reference);
    if diff_bits >= threshold.bits() {
        debug!(
            target: "visbit.codec",
            diff_bits,
            threshold = threshold.bits(),
            "dense fallback"
        );
        return DeltaPayload::Dense(pack_words(original));
    }
    DeltaPayload::Sparse(diff_positions(original, reference, diff_bits))
}

/// Decode a payload against `reference` into `out`.
///
/// Returns `false` for a placeholder (nothing is written to `out` in that
/// case); `true` once `out` holds the reconstructed image.
#[must_use]
pub fn decode(reference: &Bitmap, payload: &DeltaPayload, out: &mut Bitmap) -> bool {
    match payload {
        DeltaPayload::Placeholder => false,
        DeltaPayload::Sparse(positions) => {
            decode_sparse(reference, positions, out);
            true
        }
        DeltaPayload::Dense(words) => {
            decode_dense(words, out);
            true
        }
    }
}

/// Reconstruct an image by toggling `positions` on top of `reference`.
pub fn decode_sparse(reference: &Bitmap, positions: &[u16], out: &mut Bitmap) {
    out.copy_from(reference);
    let bytes = out.as_bytes_mut();
    for &position in positions {
        let position = position as usize;
        bytes[position / 8] ^= bit_mask(position);
    }
}

/// Unpack a dense payload into `out`.
///
/// Dense payloads carry the packed original image itself, so reconstruction
/// is independent of the reference.
pub fn decode_dense(words: &[u16], out: &mut Bitmap) {
    debug_assert_eq!(words.len(), DENSE_WORDS, "dense payload word count");
    let bytes = out.as_bytes_mut();
    for (i, &word) in words.iter().enumerate() {
        let [low, high] = word.to_le_bytes();
        bytes[2 * i] = low;
        bytes[2 * i + 1] = high;
    }
}

/// Pack a full image into dense little-endian byte pairs.
#[must_use]
pub fn pack_words(image: &Bitmap) -> Vec<u16> {
    let bytes = image.as_bytes();
    (0..DENSE_WORDS)
        .map(|i| u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]))
        .collect()
}

/// Ascending positions of all bits where `original` and `reference` differ.
fn diff_positions(original: &Bitmap, reference: &Bitmap, diff_bits: usize) -> Vec<u16> {
    let mut positions = Vec::with_capacity(diff_bits);
    for (byte_index, (&lhs, &rhs)) in original
        .as_bytes()
        .iter()
        .zip(reference.as_bytes())
        .enumerate()
    {
        let diff = lhs ^ rhs;
        if diff == 0 {
            continue;
        }
        for bit_index in 0..8 {
            if diff & (1 << (7 - bit_index)) != 0 {
                positions.push((byte_index * 8 + bit_index) as u16);
            }
        }
    }
    positions
}
