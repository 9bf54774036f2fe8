#![allow(dead_code)]
use ceed_restrict::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn ceed() -> Ceed {
    Ceed::init("/cpu/self/ref/serial").expect("reference backend")
}

pub fn deterministic_ceed() -> Ceed {
    Ceed::with_config(CeedConfig::default().deterministic(true)).expect("reference backend")
}

/// Offsets of a 1D chain of `num_elem` elements with `elem_size` nodes,
/// neighbours sharing their end node.
pub fn chain_offsets(num_elem: usize, elem_size: usize) -> Vec<CeedInt> {
    (0..num_elem)
        .flat_map(|e| (0..elem_size).map(move |n| (e * (elem_size - 1) + n) as CeedInt))
        .collect()
}

/// Number of nodes in the chain built by [`chain_offsets`].
pub fn chain_nodes(num_elem: usize, elem_size: usize) -> usize {
    num_elem * (elem_size - 1) + 1
}

/// Points offsets in the `[range starts | point indices]` layout: element `i`
/// holds `(i + 1) % num_elem + 1` points, indices cycling from `num_elem`.
pub fn cyclic_points_offsets(num_elem: usize, num_points: usize) -> Vec<CeedInt> {
    let mut ind = vec![0 as CeedInt; num_elem + 1 + num_points];
    let mut offset = num_elem + 1;
    let mut point_index = num_elem % num_points;
    for i in 0..num_elem {
        let n = (i + 1) % num_elem + 1;
        ind[i] = offset as CeedInt;
        for j in 0..n {
            ind[offset + j] = point_index as CeedInt;
            point_index = (point_index + 1) % num_points;
        }
        offset += n;
    }
    ind[num_elem] = offset as CeedInt;
    ind
}

/// Reproducible random values in `[-1, 1)`.
pub fn random_values(len: usize, seed: u64) -> Vec<Scalar> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

pub fn assert_close(got: &[Scalar], want: &[Scalar]) {
    assert_eq!(got.len(), want.len(), "length mismatch");
    for (i, (a, b)) in got.iter().zip(want).enumerate() {
        assert!(
            (a - b).abs() <= 1e-12 * (1.0 + b.abs()),
            "entry {i}: got {a}, want {b}\n got={got:?}\nwant={want:?}"
        );
    }
}

/// Dense product `<a, b>`.
pub fn dot(a: &[Scalar], b: &[Scalar]) -> Scalar {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
