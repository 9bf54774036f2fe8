//! `/cpu/self/ref`: serial CPU reference backend.
//!
//! Implements every restriction capability on host memory.
//!
//! E-vector layout for offset-based and strided restrictions, with
//! `B = block_size`, `E = elem_size`, `C = num_comp`: entry
//! `(block b, component k, node n, lane j)` is stored at
//! `b*B*E*C + (k*E + n)*B + j`. For `B = 1` this is `[1, E, E*C]`.
//!
//! Points restrictions store each element's values component-major:
//! `e_off + k*n_e + i` for point `i` of an element with `n_e` points, where
//! `e_off` is the running total of preceding points times `C`. The L-vector
//! keeps components contiguous per point: `point*C + k`.

use std::sync::Arc;

use itertools::iproduct;
use log::{debug, trace};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::backend::{ApplyMode, Backend, Capability, IndexData, RestrictionImpl};
use crate::ceed::Ceed;
use crate::ceed_error::CeedError;
use crate::data::array::{ArrayStore, MemType};
use crate::data::vector::host_only;
use crate::restriction::{RestrictionShape, RestrictionType, TransposeMode};
use crate::{CeedInt, CeedInt8, Scalar};

/// Registry prefix of the reference backend.
pub const PREFIX: &str = "/cpu/self/ref";

/// Context-level table of the reference backend.
#[derive(Debug, Clone)]
pub struct RefBackend {
    resource: String,
}

impl RefBackend {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
        }
    }

    /// Registry entry point.
    pub fn init(resource: &str) -> Result<Box<dyn Backend>, CeedError> {
        Ok(Box::new(Self::new(resource)))
    }

    fn build(
        &self,
        ceed: &Ceed,
        shape: &RestrictionShape,
        data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        host_only(data.mem_type)?;
        let index = match (data.offsets, shape.effective_strides()) {
            (Some(offsets), _) => Indexing::Offsets(offsets),
            (None, Some(strides)) => Indexing::Strided(strides),
            (None, None) => return Err(CeedError::MissingData("offsets")),
        };
        let t_map = match &index {
            Indexing::Offsets(offsets)
                if ceed.is_deterministic()
                    && shape.block_size == 1
                    && shape.rstr_type != RestrictionType::Points =>
            {
                Some(TransposeMap::build(shape, offsets.as_slice()))
            }
            _ => None,
        };
        debug!(
            "{}: building {:?} restriction (num_elem={}, block_size={}, transpose map: {})",
            self.resource,
            shape.rstr_type,
            shape.num_elem,
            shape.block_size,
            t_map.is_some()
        );
        Ok(Box::new(RefRestriction {
            resource: self.resource.clone(),
            shape: shape.clone(),
            index: Some(index),
            orients: data.orients,
            curl_orients: data.curl_orients,
            t_map,
        }))
    }
}

impl Backend for RefBackend {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn supports(&self, cap: Capability) -> bool {
        matches!(
            cap,
            Capability::CreateStandard | Capability::CreateBlocked | Capability::CreateAtPoints
        )
    }

    fn create_restriction(
        &self,
        ceed: &Ceed,
        shape: &RestrictionShape,
        data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        self.build(ceed, shape, data)
    }

    fn create_blocked_restriction(
        &self,
        ceed: &Ceed,
        shape: &RestrictionShape,
        data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        self.build(ceed, shape, data)
    }

    fn create_at_points_restriction(
        &self,
        ceed: &Ceed,
        shape: &RestrictionShape,
        data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        self.build(ceed, shape, data)
    }
}

/// CSR map from each L-vector entry to the E-vector entries that read it,
/// in increasing E order. Used for gather-style transpose.
#[derive(Debug, Clone)]
struct TransposeMap {
    starts: Vec<usize>,
    indices: Vec<usize>,
}

impl TransposeMap {
    fn build(shape: &RestrictionShape, offsets: &[CeedInt]) -> Self {
        let (ne, es, nc) = (shape.num_elem, shape.elem_size, shape.num_comp);
        let l_index = |e: usize, k: usize, n: usize| offsets[e * es + n] as usize + k * shape.comp_stride;
        let e_index = |e: usize, k: usize, n: usize| e * es * nc + k * es + n;

        let mut starts = vec![0usize; shape.l_size + 1];
        for (e, k, n) in iproduct!(0..ne, 0..nc, 0..es) {
            starts[l_index(e, k, n) + 1] += 1;
        }
        for i in 0..shape.l_size {
            starts[i + 1] += starts[i];
        }
        let mut cursor = starts.clone();
        let mut indices = vec![0usize; ne * es * nc];
        for (e, k, n) in iproduct!(0..ne, 0..nc, 0..es) {
            let l = l_index(e, k, n);
            indices[cursor[l]] = e_index(e, k, n);
            cursor[l] += 1;
        }
        Self { starts, indices }
    }

    fn readers_of(&self, l: usize) -> &[usize] {
        &self.indices[self.starts[l]..self.starts[l + 1]]
    }
}

/// How L-vector indices are computed.
#[derive(Debug)]
enum Indexing {
    Offsets(ArrayStore<CeedInt>),
    Strided([usize; 3]),
}

/// Per-descriptor data of the reference backend.
#[derive(Debug)]
pub struct RefRestriction {
    resource: String,
    shape: RestrictionShape,
    /// `None` once destroyed.
    index: Option<Indexing>,
    orients: Option<ArrayStore<bool>>,
    curl_orients: Option<ArrayStore<CeedInt8>>,
    t_map: Option<TransposeMap>,
}

impl RefRestriction {
    fn block_len(&self) -> usize {
        self.shape.block_size * self.shape.elem_size * self.shape.num_comp
    }

    /// L-vector index of `(block, component, node, lane)`.
    fn l_index(&self, b: usize, k: usize, n: usize, j: usize) -> usize {
        let s = &self.shape;
        match &self.index {
            Some(Indexing::Offsets(offsets)) => {
                let off = offsets.as_slice()[b * s.elem_size * s.block_size + n * s.block_size + j];
                off as usize + k * s.comp_stride
            }
            Some(Indexing::Strided([s0, s1, s2])) => {
                let e = (b * s.block_size + j).min(s.num_elem.saturating_sub(1));
                n * s0 + k * s1 + e * s2
            }
            None => 0,
        }
    }

    fn sign(&self, b: usize, n: usize, j: usize, mode: ApplyMode) -> Scalar {
        let s = &self.shape;
        match (&self.orients, mode) {
            (Some(o), ApplyMode::Full)
                if o.as_slice()[b * s.elem_size * s.block_size + n * s.block_size + j] =>
            {
                -1.0
            }
            _ => 1.0,
        }
    }

    /// Curl transform entry `t` (0 = sub, 1 = diag, 2 = super) of node `n`.
    fn curl(&self, b: usize, n: usize, j: usize, t: usize, mode: ApplyMode) -> Scalar {
        let s = &self.shape;
        let Some(c) = &self.curl_orients else {
            return if t == 1 { 1.0 } else { 0.0 };
        };
        let v = c.as_slice()[b * 3 * s.elem_size * s.block_size + (3 * n + t) * s.block_size + j] as Scalar;
        match mode {
            ApplyMode::Full => v,
            ApplyMode::Unsigned => v.abs(),
            ApplyMode::Unoriented => {
                if t == 1 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn uses_curl(&self, mode: ApplyMode) -> bool {
        self.curl_orients.is_some() && mode != ApplyMode::Unoriented
    }

    /// Gather block `b` of the E-vector from `u` into `v_block`.
    fn gather_block(&self, b: usize, mode: ApplyMode, u: &[Scalar], v_block: &mut [Scalar]) {
        let s = &self.shape;
        let (es, bs) = (s.elem_size, s.block_size);
        for (k, n, j) in iproduct!(0..s.num_comp, 0..es, 0..bs) {
            let out = (k * es + n) * bs + j;
            v_block[out] = if self.uses_curl(mode) {
                let mut acc = self.curl(b, n, j, 1, mode) * u[self.l_index(b, k, n, j)];
                if n > 0 {
                    acc += self.curl(b, n, j, 0, mode) * u[self.l_index(b, k, n - 1, j)];
                }
                if n + 1 < es {
                    acc += self.curl(b, n, j, 2, mode) * u[self.l_index(b, k, n + 1, j)];
                }
                acc
            } else {
                self.sign(b, n, j, mode) * u[self.l_index(b, k, n, j)]
            };
        }
    }

    /// Contribution of E-vector entry `(k, n, j)` of block `b` to its L node.
    fn transposed_value(&self, b: usize, mode: ApplyMode, u_block: &[Scalar], k: usize, n: usize, j: usize) -> Scalar {
        let s = &self.shape;
        let (es, bs) = (s.elem_size, s.block_size);
        let at = |m: usize| u_block[(k * es + m) * bs + j];
        if self.uses_curl(mode) {
            let mut acc = self.curl(b, n, j, 1, mode) * at(n);
            if n > 0 {
                acc += self.curl(b, n - 1, j, 2, mode) * at(n - 1);
            }
            if n + 1 < es {
                acc += self.curl(b, n + 1, j, 0, mode) * at(n + 1);
            }
            acc
        } else {
            self.sign(b, n, j, mode) * at(n)
        }
    }

    /// Scatter-add block `b` of the E-vector into `v`, skipping padding lanes.
    fn scatter_block(&self, b: usize, mode: ApplyMode, u_block: &[Scalar], v: &mut [Scalar]) {
        let s = &self.shape;
        let lanes = s.active_lanes(b);
        for (k, n, j) in iproduct!(0..s.num_comp, 0..s.elem_size, 0..lanes) {
            v[self.l_index(b, k, n, j)] += self.transposed_value(b, mode, u_block, k, n, j);
        }
    }

    fn scatter_deterministic(&self, map: &TransposeMap, mode: ApplyMode, u: &[Scalar], v: &mut [Scalar]) {
        let s = &self.shape;
        let per_elem = s.elem_size * s.num_comp;
        let mut w = vec![0.0; s.num_elem * per_elem];
        for (e, k, n) in iproduct!(0..s.num_elem, 0..s.num_comp, 0..s.elem_size) {
            let u_elem = &u[e * per_elem..(e + 1) * per_elem];
            w[e * per_elem + k * s.elem_size + n] = self.transposed_value(e, mode, u_elem, k, n, 0);
        }
        let accumulate = |(l, out): (usize, &mut Scalar)| {
            for &idx in map.readers_of(l) {
                *out += w[idx];
            }
        };
        #[cfg(feature = "rayon")]
        v[..s.l_size].par_iter_mut().enumerate().for_each(accumulate);
        #[cfg(not(feature = "rayon"))]
        v[..s.l_size].iter_mut().enumerate().for_each(accumulate);
    }

    fn forward(&self, mode: ApplyMode, u: &[Scalar], v: &mut [Scalar]) {
        let len = self.block_len();
        let e_size = self.shape.num_block * len;
        #[cfg(feature = "rayon")]
        v[..e_size]
            .par_chunks_mut(len)
            .enumerate()
            .for_each(|(b, blk)| self.gather_block(b, mode, u, blk));
        #[cfg(not(feature = "rayon"))]
        v[..e_size]
            .chunks_mut(len)
            .enumerate()
            .for_each(|(b, blk)| self.gather_block(b, mode, u, blk));
    }

    fn offset_store(&self) -> Result<&ArrayStore<CeedInt>, CeedError> {
        match &self.index {
            Some(Indexing::Offsets(o)) => Ok(o),
            _ => Err(CeedError::MissingData("offsets")),
        }
    }

    fn point_offsets(&self) -> Result<&[CeedInt], CeedError> {
        self.offset_store().map(ArrayStore::as_slice)
    }

    /// Absolute index range of `elem`'s point indices in the offsets array.
    fn point_range(offsets: &[CeedInt], elem: usize) -> std::ops::Range<usize> {
        offsets[elem] as usize..offsets[elem + 1] as usize
    }

    fn apply_points_elem(
        &self,
        offsets: &[CeedInt],
        elem: usize,
        e_off: usize,
        t_mode: TransposeMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) {
        let nc = self.shape.num_comp;
        let range = Self::point_range(offsets, elem);
        let np = range.len();
        for (k, (i, &point)) in iproduct!(0..nc, offsets[range].iter().enumerate()) {
            let l = point as usize * nc + k;
            let e = e_off + k * np + i;
            match t_mode {
                TransposeMode::NoTranspose => v[e] = u[l],
                TransposeMode::Transpose => v[l] += u[e],
            }
        }
    }
}

impl RestrictionImpl for RefRestriction {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn supports(&self, cap: Capability) -> bool {
        match cap {
            Capability::ApplyAtPointsInElement => self.shape.rstr_type == RestrictionType::Points,
            Capability::ApplyBlock => self.shape.rstr_type != RestrictionType::Points,
            Capability::GetOffsets => matches!(self.index, Some(Indexing::Offsets(_))),
            Capability::GetOrientations => self.orients.is_some(),
            Capability::GetCurlOrientations => self.curl_orients.is_some(),
            _ => true,
        }
    }

    fn e_layout(&self) -> Option<[usize; 3]> {
        let s = &self.shape;
        match (s.rstr_type, s.block_size) {
            (RestrictionType::Points, _) => None,
            (_, 1) => Some([1, s.elem_size, s.elem_size * s.num_comp]),
            (_, bs) => Some([bs, s.elem_size * bs, 1]),
        }
    }

    fn apply(
        &self,
        mode: ApplyMode,
        t_mode: TransposeMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<(), CeedError> {
        trace!("{}: apply {:?} {:?}", self.resource, mode, t_mode);
        if self.shape.rstr_type == RestrictionType::Points {
            let offsets = self.point_offsets()?;
            let mut e_off = 0;
            for elem in 0..self.shape.num_elem {
                self.apply_points_elem(offsets, elem, e_off, t_mode, u, v);
                e_off += Self::point_range(offsets, elem).len() * self.shape.num_comp;
            }
            return Ok(());
        }
        match (t_mode, &self.t_map) {
            (TransposeMode::NoTranspose, _) => self.forward(mode, u, v),
            (TransposeMode::Transpose, Some(map)) => self.scatter_deterministic(map, mode, u, v),
            (TransposeMode::Transpose, None) => {
                let len = self.block_len();
                for b in 0..self.shape.num_block {
                    self.scatter_block(b, mode, &u[b * len..(b + 1) * len], v);
                }
            }
        }
        Ok(())
    }

    fn apply_block(
        &self,
        block: usize,
        mode: ApplyMode,
        t_mode: TransposeMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<(), CeedError> {
        if self.shape.rstr_type == RestrictionType::Points {
            return Err(CeedError::unsupported(
                Capability::ApplyBlock.name(),
                &self.resource,
            ));
        }
        match t_mode {
            TransposeMode::NoTranspose => self.gather_block(block, mode, u, v),
            TransposeMode::Transpose => self.scatter_block(block, mode, u, v),
        }
        Ok(())
    }

    fn apply_at_points_in_element(
        &self,
        elem: usize,
        t_mode: TransposeMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<(), CeedError> {
        if self.shape.rstr_type != RestrictionType::Points {
            return Err(CeedError::unsupported(
                Capability::ApplyAtPointsInElement.name(),
                &self.resource,
            ));
        }
        let offsets = self.point_offsets()?;
        self.apply_points_elem(offsets, elem, 0, t_mode, u, v);
        Ok(())
    }

    fn offsets(&self, mem: MemType) -> Result<Arc<[CeedInt]>, CeedError> {
        host_only(mem)?;
        self.offset_store().map(ArrayStore::shared)
    }

    fn orientations(&self, mem: MemType) -> Result<Arc<[bool]>, CeedError> {
        host_only(mem)?;
        self.orients
            .as_ref()
            .map(ArrayStore::shared)
            .ok_or(CeedError::MissingData("orientation"))
    }

    fn curl_orientations(&self, mem: MemType) -> Result<Arc<[CeedInt8]>, CeedError> {
        host_only(mem)?;
        self.curl_orients
            .as_ref()
            .map(ArrayStore::shared)
            .ok_or(CeedError::MissingData("curl orientation"))
    }

    fn destroy(&mut self) -> Result<(), CeedError> {
        debug!("{}: releasing {:?} restriction data", self.resource, self.shape.rstr_type);
        self.index = None;
        self.orients = None;
        self.curl_orients = None;
        self.t_map = None;
        Ok(())
    }
}
