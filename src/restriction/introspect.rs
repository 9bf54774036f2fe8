//! Getters and derived quantities of a restriction.

use std::fmt;

use crate::ceed::Ceed;
use crate::ceed_error::CeedError;
use crate::data::array::MemType;
use crate::data::vector::CeedVector;
use crate::debug_invariants::DebugInvariants;
use crate::restriction::{
    ElemRestriction, RestrictionShape, RestrictionType, STRIDES_BACKEND, TransposeMode,
};

/// Per-entry FLOP scale of one apply.
fn flops_scale(rstr_type: RestrictionType, t_mode: TransposeMode) -> usize {
    use RestrictionType::*;
    match (t_mode, rstr_type) {
        (TransposeMode::NoTranspose, Standard | Strided | Points) => 0,
        (TransposeMode::NoTranspose, Oriented) => 1,
        (TransposeMode::NoTranspose, CurlOriented) => 5,
        (TransposeMode::Transpose, Points) => 0,
        (TransposeMode::Transpose, Standard | Strided) => 1,
        (TransposeMode::Transpose, Oriented) => 2,
        (TransposeMode::Transpose, CurlOriented) => 6,
    }
}

impl ElemRestriction {
    pub fn ceed(&self) -> &Ceed {
        &self.core.ceed
    }

    /// Full static metadata.
    pub fn shape(&self) -> &RestrictionShape {
        &self.core.shape
    }

    pub fn restriction_type(&self) -> RestrictionType {
        self.core.shape.rstr_type
    }

    pub fn is_strided(&self) -> bool {
        self.core.shape.rstr_type == RestrictionType::Strided
    }

    pub fn is_points(&self) -> bool {
        self.core.shape.rstr_type == RestrictionType::Points
    }

    pub fn num_elements(&self) -> usize {
        self.core.shape.num_elem
    }

    pub fn elem_size(&self) -> usize {
        self.core.shape.elem_size
    }

    pub fn num_components(&self) -> usize {
        self.core.shape.num_comp
    }

    pub fn comp_stride(&self) -> usize {
        self.core.shape.comp_stride
    }

    pub fn l_size(&self) -> usize {
        self.core.shape.l_size
    }

    pub fn e_size(&self) -> usize {
        self.core.shape.e_size
    }

    pub fn num_blocks(&self) -> usize {
        self.core.shape.num_block
    }

    pub fn block_size(&self) -> usize {
        self.core.shape.block_size
    }

    fn require_points(&self, what: &str) -> Result<(), CeedError> {
        if self.is_points() {
            Ok(())
        } else {
            Err(CeedError::Incompatible(format!(
                "cannot {what} for a restriction that does not use points"
            )))
        }
    }

    /// Total number of point entries.
    pub fn num_points(&self) -> Result<usize, CeedError> {
        self.require_points("get the number of points")?;
        Ok(self.core.shape.num_points)
    }

    /// Number of points in element `elem`, read from its offset range.
    pub fn num_points_in_element(&self, elem: usize) -> Result<usize, CeedError> {
        self.require_points("get the number of points in an element")?;
        let num_elem = self.core.shape.num_elem;
        if elem >= num_elem {
            return Err(CeedError::ElementOutOfRange { elem, num_elem });
        }
        let offsets = self.offsets(MemType::Host)?;
        Ok((offsets[elem + 1] - offsets[elem]) as usize)
    }

    /// Largest number of points in any element.
    pub fn max_points_in_element(&self) -> Result<usize, CeedError> {
        self.require_points("compute max points")?;
        let offsets = self.offsets(MemType::Host)?;
        Ok(offsets[..=self.core.shape.num_elem]
            .windows(2)
            .map(|w| (w[1] - w[0]) as usize)
            .max()
            .unwrap_or(0))
    }

    /// Node/component/element strides into the L-vector, as given at creation.
    pub fn strides(&self) -> Result<[usize; 3], CeedError> {
        self.core.shape.strides.ok_or(CeedError::MissingData("stride"))
    }

    /// Whether the strides were left to the backend ([`STRIDES_BACKEND`]).
    pub fn has_backend_strides(&self) -> Result<bool, CeedError> {
        Ok(self.strides()? == STRIDES_BACKEND)
    }

    /// Node/component/element strides of the backend's E-vector layout.
    pub fn e_layout(&self) -> Result<[usize; 3], CeedError> {
        self.core.e_layout.ok_or(CeedError::MissingData("E-vector layout"))
    }

    /// FLOPs of one full apply in direction `t_mode`.
    pub fn flops_estimate(&self, t_mode: TransposeMode) -> usize {
        let s = &self.core.shape;
        let e_len = match s.rstr_type {
            RestrictionType::Points => s.num_points * s.num_comp,
            _ => s.num_block * s.block_size * s.elem_size * s.num_comp,
        };
        flops_scale(s.rstr_type, t_mode) * e_len
    }

    /// L-vector sized for this restriction.
    pub fn create_l_vector(&self) -> CeedVector {
        self.core.ceed.vector(self.core.shape.l_size)
    }

    /// E-vector sized for this restriction.
    pub fn create_e_vector(&self) -> CeedVector {
        self.core.ceed.vector(self.core.shape.e_size)
    }

    /// `(l_vector, e_vector)` pair.
    pub fn create_vectors(&self) -> (CeedVector, CeedVector) {
        (self.create_l_vector(), self.create_e_vector())
    }

    /// Number of element entries referencing each L-vector entry, computed
    /// as `R^T (R 1)` into `mult`.
    pub fn multiplicity(&self, mult: &mut CeedVector) -> Result<(), CeedError> {
        let mut e_vec = self.create_e_vector();
        mult.set_value(1.0);
        self.apply(TransposeMode::NoTranspose, mult, &mut e_vec)?;
        mult.set_value(0.0);
        self.apply(TransposeMode::Transpose, &e_vec, mult)
    }
}

impl fmt::Display for ElemRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.core.shape;
        if s.rstr_type == RestrictionType::Points {
            return write!(
                f,
                "CeedElemRestriction at points from ({}, {}) to {} elements with a maximum of {} points on an element",
                s.l_size, s.num_comp, s.num_elem, s.elem_size
            );
        }
        write!(
            f,
            "{}CeedElemRestriction from ({}, {}) to {} elements with {} nodes each and ",
            if s.block_size > 1 { "Blocked " } else { "" },
            s.l_size,
            s.num_comp,
            s.num_elem,
            s.elem_size
        )?;
        match s.strides {
            Some([a, b, c]) => write!(f, "strides [{a}, {b}, {c}]"),
            None => write!(f, "component stride {}", s.comp_stride),
        }
    }
}

impl DebugInvariants for ElemRestriction {
    fn debug_assert_invariants(&self) {
        crate::assert_invariants!("ElemRestriction", self.validate_invariants());
    }

    fn validate_invariants(&self) -> Result<(), CeedError> {
        let s = &self.core.shape;
        let expected = match s.rstr_type {
            RestrictionType::Points => s.num_points * s.num_comp,
            _ => s.num_block * s.block_size * s.elem_size * s.num_comp,
        };
        if s.e_size != expected {
            return Err(CeedError::InvalidParameter(format!(
                "e_size {} does not match computed size {expected}",
                s.e_size
            )));
        }
        if s.num_block * s.block_size < s.num_elem {
            return Err(CeedError::InvalidParameter(format!(
                "{} blocks of {} do not cover {} elements",
                s.num_block, s.block_size, s.num_elem
            )));
        }
        if s.strides.is_some() != (s.rstr_type == RestrictionType::Strided) {
            return Err(CeedError::InvalidParameter(
                "strides must be present exactly for strided restrictions".into(),
            ));
        }
        if self.ref_count() == 0 {
            return Err(CeedError::Access("live handle with zero references".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ceed() -> Ceed {
        Ceed::init("/cpu/self/ref/serial").unwrap()
    }

    #[test]
    fn flops_table() {
        use RestrictionType::*;
        let expect = [
            (Standard, 0, 1),
            (Strided, 0, 1),
            (Points, 0, 0),
            (Oriented, 1, 2),
            (CurlOriented, 5, 6),
        ];
        for (t, fwd, bwd) in expect {
            assert_eq!(flops_scale(t, TransposeMode::NoTranspose), fwd);
            assert_eq!(flops_scale(t, TransposeMode::Transpose), bwd);
        }
    }

    #[test]
    fn view_strings() {
        let c = ceed();
        let r = ElemRestriction::create(&c, 3, 2, 1, 1, 4, MemType::Host, &[0, 1, 1, 2, 2, 3]).unwrap();
        assert_eq!(
            r.to_string(),
            "CeedElemRestriction from (4, 1) to 3 elements with 2 nodes each and component stride 1"
        );
        let s = ElemRestriction::create_blocked_strided(&c, 3, 2, 2, 1, 6, STRIDES_BACKEND).unwrap();
        assert_eq!(
            s.to_string(),
            "Blocked CeedElemRestriction from (6, 1) to 3 elements with 2 nodes each and strides [0, 0, 0]"
        );
    }

    #[test]
    fn strides_queries() {
        let c = ceed();
        let r = ElemRestriction::create(&c, 1, 1, 1, 1, 1, MemType::Host, &[0]).unwrap();
        assert_eq!(r.strides().unwrap_err(), CeedError::MissingData("stride"));
        assert!(r.has_backend_strides().is_err());
        let s = ElemRestriction::create_strided(&c, 2, 3, 1, 6, STRIDES_BACKEND).unwrap();
        assert!(s.has_backend_strides().unwrap());
        assert_eq!(s.e_layout().unwrap(), [1, 3, 3]);
        s.debug_assert_invariants();
    }

    #[test]
    fn points_queries_are_incompatible_elsewhere() {
        let r = ElemRestriction::create(&ceed(), 1, 1, 1, 1, 1, MemType::Host, &[0]).unwrap();
        assert!(matches!(r.num_points(), Err(CeedError::Incompatible(_))));
        assert!(matches!(r.max_points_in_element(), Err(CeedError::Incompatible(_))));
        assert!(matches!(r.num_points_in_element(0), Err(CeedError::Incompatible(_))));
    }
}
