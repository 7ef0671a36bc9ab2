use std::fmt;
use std::ops::{Deref, DerefMut};

use aligned_box::AlignedBox;

use crate::util::bits_eq;

/// Alignment granule for embedding storage, in bytes.
pub const ALIGNMENT: usize = 32;

/// Number of f32 lanes per alignment granule.
pub const ALIGNMENT_LANES: usize = ALIGNMENT / std::mem::size_of::<f32>();

/// Contiguous, 32-byte-aligned f32 storage.
///
/// Rows of an embedding matrix are carved out of one of these buffers, so
/// that a row stride padded to `ALIGNMENT_LANES` keeps every row on an
/// alignment boundary for the SIMD kernels in `vec_simd`.
pub struct AlignedVec {
    inner: AlignedBox<[f32]>,
}

impl AlignedVec {
    /// Allocate a zero-initialized buffer of `len` floats.
    pub fn zeros(len: usize) -> Self {
        AlignedVec {
            inner: AlignedBox::slice_from_default(ALIGNMENT, len)
                .expect("cannot allocate aligned embedding storage"),
        }
    }

    /// Construct from an existing vector, copying into aligned storage.
    pub fn from_slice(values: &[f32]) -> Self {
        let mut aligned = AlignedVec::zeros(values.len());
        aligned.copy_from_slice(values);
        aligned
    }
}

impl Deref for AlignedVec {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.inner
    }
}

impl DerefMut for AlignedVec {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.inner
    }
}

impl Clone for AlignedVec {
    fn clone(&self) -> Self {
        AlignedVec::from_slice(self)
    }
}

impl fmt::Debug for AlignedVec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AlignedVec {{ len: {} }}", self.len())
    }
}

impl PartialEq for AlignedVec {
    fn eq(&self, other: &Self) -> bool {
        bits_eq(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::{AlignedVec, ALIGNMENT};

    #[test]
    fn zeros_are_aligned_and_zero() {
        let v = AlignedVec::zeros(37);
        assert_eq!(v.len(), 37);
        assert_eq!(v.as_ptr() as usize % ALIGNMENT, 0);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn clone_round_trips() {
        let mut v = AlignedVec::zeros(9);
        v[3] = 1.5;
        v[8] = -2.25;
        let w = v.clone();
        assert_eq!(v, w);
        assert_eq!(w.as_ptr() as usize % ALIGNMENT, 0);
    }
}
