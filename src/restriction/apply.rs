//! Apply dispatcher.
//!
//! Vector shapes, element and block numbers are checked here before any
//! backend hook runs, so every backend reports the same errors.

use log::trace;

use crate::backend::Capability;
use crate::ceed_error::CeedError;
use crate::data::array::MemType;
use crate::data::storage::Storage;
use crate::data::vector::CeedVector;
use crate::restriction::{ElemRestriction, RestrictionType, TransposeMode};
use crate::Scalar;

/// `(output, input)` lengths of an apply with E-side length `e_len`.
fn shape_for(t_mode: TransposeMode, e_len: usize, l_len: usize) -> (usize, usize) {
    match t_mode {
        TransposeMode::NoTranspose => (e_len, l_len),
        TransposeMode::Transpose => (l_len, e_len),
    }
}

fn check_at_least(u_len: usize, ru_len: usize, m: usize, n: usize) -> Result<(), CeedError> {
    if u_len < n {
        return Err(CeedError::VectorLengthMismatch {
            role: "input",
            found: u_len,
            m,
            n,
        });
    }
    if ru_len < m {
        return Err(CeedError::VectorLengthMismatch {
            role: "output",
            found: ru_len,
            m,
            n,
        });
    }
    Ok(())
}

fn check_exact(u_len: usize, ru_len: usize, m: usize, n: usize) -> Result<(), CeedError> {
    if u_len != n {
        return Err(CeedError::VectorLengthMismatch {
            role: "input",
            found: u_len,
            m,
            n,
        });
    }
    if ru_len != m {
        return Err(CeedError::VectorLengthMismatch {
            role: "output",
            found: ru_len,
            m,
            n,
        });
    }
    Ok(())
}

impl ElemRestriction {
    /// Restrict `u` (L-vector) into `ru` (E-vector), or with
    /// [`TransposeMode::Transpose`] scatter-add the E-vector `u` into `ru`.
    ///
    /// Transpose accumulates; zero `ru` first for a plain product. A
    /// restriction with no elements is a no-op.
    pub fn apply<S1, S2>(
        &self,
        t_mode: TransposeMode,
        u: &CeedVector<S1>,
        ru: &mut CeedVector<S2>,
    ) -> Result<(), CeedError>
    where
        S1: Storage<Scalar>,
        S2: Storage<Scalar>,
    {
        let s = &self.core.shape;
        let (m, n) = shape_for(t_mode, s.e_size, s.l_size);
        check_at_least(u.len(), ru.len(), m, n)?;
        if s.num_elem == 0 {
            return Ok(());
        }
        let mode = self.core.apply_mode;
        trace!("apply {:?} restriction, {:?}, {:?}", s.rstr_type, mode, t_mode);
        self.core.with_impl(|imp| {
            let cap = mode.capability();
            if !imp.supports(cap) {
                return Err(CeedError::unsupported(cap.name(), imp.resource()));
            }
            imp.apply(
                mode,
                t_mode,
                u.read_array(MemType::Host)?,
                ru.write_array(MemType::Host)?,
            )
        })
    }

    /// Apply to the elements of one block: `block_size` elements starting at
    /// `block * block_size`. Vector lengths must match the block exactly.
    pub fn apply_block<S1, S2>(
        &self,
        block: usize,
        t_mode: TransposeMode,
        u: &CeedVector<S1>,
        ru: &mut CeedVector<S2>,
    ) -> Result<(), CeedError>
    where
        S1: Storage<Scalar>,
        S2: Storage<Scalar>,
    {
        self.core.with_impl(|imp| {
            if imp.supports(Capability::ApplyBlock) {
                Ok(())
            } else {
                Err(CeedError::unsupported(
                    Capability::ApplyBlock.name(),
                    imp.resource(),
                ))
            }
        })?;
        let s = &self.core.shape;
        let (m, n) = shape_for(t_mode, s.block_size * s.elem_size * s.num_comp, s.l_size);
        check_exact(u.len(), ru.len(), m, n)?;
        if block * s.block_size >= s.num_elem {
            return Err(CeedError::BlockOutOfRange {
                block,
                block_size: s.block_size,
                num_elem: s.num_elem,
            });
        }
        let mode = self.core.apply_mode;
        trace!("apply block {block} of {:?} restriction, {:?}", s.rstr_type, t_mode);
        self.core.with_impl(|imp| {
            imp.apply_block(
                block,
                mode,
                t_mode,
                u.read_array(MemType::Host)?,
                ru.write_array(MemType::Host)?,
            )
        })
    }

    /// Apply to the points of a single element of a points restriction.
    ///
    /// The element-side vector holds `num_points_in_element(elem) * num_comp`
    /// values, component-major.
    pub fn apply_at_points_in_element<S1, S2>(
        &self,
        elem: usize,
        t_mode: TransposeMode,
        u: &CeedVector<S1>,
        ru: &mut CeedVector<S2>,
    ) -> Result<(), CeedError>
    where
        S1: Storage<Scalar>,
        S2: Storage<Scalar>,
    {
        let s = &self.core.shape;
        if s.rstr_type != RestrictionType::Points {
            return Err(CeedError::Incompatible(
                "cannot apply at points for a restriction that does not use points".into(),
            ));
        }
        if elem >= s.num_elem {
            return Err(CeedError::ElementOutOfRange {
                elem,
                num_elem: s.num_elem,
            });
        }
        let np = self.num_points_in_element(elem)?;
        let (m, n) = shape_for(t_mode, np * s.num_comp, s.l_size);
        check_at_least(u.len(), ru.len(), m, n)?;
        trace!("apply at points in element {elem}, {:?}", t_mode);
        self.core.with_impl(|imp| {
            if !imp.supports(Capability::ApplyAtPointsInElement) {
                return Err(CeedError::unsupported(
                    Capability::ApplyAtPointsInElement.name(),
                    imp.resource(),
                ));
            }
            imp.apply_at_points_in_element(
                elem,
                t_mode,
                u.read_array(MemType::Host)?,
                ru.write_array(MemType::Host)?,
            )
        })
    }
}
