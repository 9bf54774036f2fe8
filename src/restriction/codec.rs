//! Blocking permutation and padding of per-element index arrays.
//!
//! A raw array of shape `[num_elem, width]` becomes a padded array of shape
//! `[num_block, width, block_size]`: lanes of a block are interleaved, and
//! lanes past the last element replicate the last element's row.
//!
//! ```text
//! dest[b*width*B + k*B + j] = src[min(b*B + j, num_elem - 1)*width + k]
//! ```
//!
//! Offsets and sign arrays use `width = elem_size`; curl transforms use
//! `width = 3 * elem_size`.

use itertools::iproduct;

use crate::ceed_error::CeedError;
use crate::{CeedInt, CeedInt8};

/// Number of blocks of `block_size` needed to cover `num_elem` elements.
#[inline]
pub fn num_blocks(num_elem: usize, block_size: usize) -> usize {
    num_elem.div_ceil(block_size.max(1))
}

/// Permute and pad `src` (row length `width`) into blocked layout.
pub fn permute_pad<T: Copy>(
    src: &[T],
    num_elem: usize,
    width: usize,
    block_size: usize,
    what: &'static str,
) -> Result<Vec<T>, CeedError> {
    if block_size == 0 {
        return Err(CeedError::InvalidParameter(
            "block size must be at least 1".into(),
        ));
    }
    if src.len() != num_elem * width {
        return Err(CeedError::ArrayLength {
            what,
            expected: num_elem * width,
            found: src.len(),
        });
    }
    let num_block = num_blocks(num_elem, block_size);
    let mut dest = Vec::with_capacity(num_block * width * block_size);
    for (b, k, j) in iproduct!(0..num_block, 0..width, 0..block_size) {
        let e = (b * block_size + j).min(num_elem - 1);
        dest.push(src[e * width + k]);
    }
    Ok(dest)
}

pub fn permute_pad_offsets(
    offsets: &[CeedInt],
    num_elem: usize,
    elem_size: usize,
    block_size: usize,
) -> Result<Vec<CeedInt>, CeedError> {
    permute_pad(offsets, num_elem, elem_size, block_size, "offsets")
}

pub fn permute_pad_orients(
    orients: &[bool],
    num_elem: usize,
    elem_size: usize,
    block_size: usize,
) -> Result<Vec<bool>, CeedError> {
    permute_pad(orients, num_elem, elem_size, block_size, "orientation")
}

pub fn permute_pad_curl_orients(
    curl_orients: &[CeedInt8],
    num_elem: usize,
    elem_size: usize,
    block_size: usize,
) -> Result<Vec<CeedInt8>, CeedError> {
    permute_pad(
        curl_orients,
        num_elem,
        3 * elem_size,
        block_size,
        "curl orientation",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaves_and_pads_with_last_element() {
        // 3 elements of 2 nodes, block size 2.
        let src = [0, 1, 10, 11, 20, 21];
        let out = permute_pad_offsets(&src, 3, 2, 2).unwrap();
        assert_eq!(out, vec![0, 10, 1, 11, 20, 20, 21, 21]);
    }

    #[test]
    fn block_size_one_is_identity() {
        let src = [3, 1, 4, 1, 5, 9];
        assert_eq!(permute_pad_offsets(&src, 2, 3, 1).unwrap(), src.to_vec());
    }

    #[test]
    fn curl_rows_are_three_wide() {
        let src: Vec<CeedInt8> = (0..6).collect(); // 1 element, elem_size 2
        let out = permute_pad_curl_orients(&src, 1, 2, 2).unwrap();
        assert_eq!(out, vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
    }

    #[test]
    fn empty_input_yields_no_blocks() {
        assert_eq!(num_blocks(0, 4), 0);
        assert!(permute_pad_orients(&[], 0, 3, 4).unwrap().is_empty());
    }

    #[test]
    fn wrong_length_is_reported() {
        assert_eq!(
            permute_pad_offsets(&[0, 1, 2], 2, 2, 2).unwrap_err(),
            CeedError::ArrayLength {
                what: "offsets",
                expected: 4,
                found: 3
            }
        );
    }
}
