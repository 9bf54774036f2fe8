//! Element restrictions: the gather/scatter operator between a global
//! L-vector and a per-element E-vector.
//!
//! An [`ElemRestriction`] is a handle onto a shared descriptor. The descriptor
//! carries the static shape ([`RestrictionShape`]), the E-vector layout picked
//! by the backend, an explicit reference count, a reader count guarding the
//! index arrays, and either the backend's compiled index data (a *root*) or a
//! link to the descriptor it was derived from (a *view*).
//!
//! Submodules:
//! - [`codec`]: blocking permutation and padding of raw index arrays.
//! - [`create`]: the nine creation entry points.
//! - [`apply`]: the apply dispatcher.
//! - [`lifecycle`]: reference counting, reader checkouts and derived views.
//! - [`introspect`]: getters, FLOPs, multiplicity, vector creation.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::backend::{ApplyMode, RestrictionImpl};
use crate::ceed::Ceed;

pub mod apply;
pub mod codec;
pub mod create;
pub mod introspect;
pub mod lifecycle;

pub use lifecycle::{ArrayView, CurlOrientationsView, OffsetsView, OrientationsView};

/// Strides value asking the backend to choose `[1, elem_size, elem_size * num_comp]`.
pub const STRIDES_BACKEND: [usize; 3] = [0, 0, 0];

/// Indexing scheme of a restriction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestrictionType {
    /// Plain offset gather.
    Standard,
    /// Offsets plus one sign flip per node.
    Oriented,
    /// Offsets plus a tridiagonal transform per node.
    CurlOriented,
    /// Affine indexing from three strides.
    Strided,
    /// Variable number of scattered points per element.
    Points,
}

/// Direction of an apply.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransposeMode {
    /// L-vector to E-vector (gather).
    #[default]
    NoTranspose,
    /// E-vector to L-vector (scatter-add).
    Transpose,
}

/// Static metadata of a restriction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionShape {
    pub rstr_type: RestrictionType,
    pub num_elem: usize,
    /// Nodes per element; for points, the largest point count of any element.
    pub elem_size: usize,
    pub num_comp: usize,
    pub comp_stride: usize,
    pub l_size: usize,
    pub e_size: usize,
    pub block_size: usize,
    pub num_block: usize,
    /// Total number of point entries (points only).
    pub num_points: usize,
    /// Node/component/element strides (strided only).
    pub strides: Option<[usize; 3]>,
}

impl RestrictionShape {
    /// Strides actually used to index the L-vector, with
    /// [`STRIDES_BACKEND`] resolved.
    pub fn effective_strides(&self) -> Option<[usize; 3]> {
        self.strides.map(|s| {
            if s == STRIDES_BACKEND {
                [1, self.elem_size, self.elem_size * self.num_comp]
            } else {
                s
            }
        })
    }

    /// Element count including padding lanes of the last block.
    pub fn padded_num_elem(&self) -> usize {
        self.num_block * self.block_size
    }

    /// Number of real (non-padding) lanes in `block`.
    pub fn active_lanes(&self, block: usize) -> usize {
        self.num_elem
            .saturating_sub(block * self.block_size)
            .min(self.block_size)
    }

    pub fn is_blocked(&self) -> bool {
        self.block_size > 1
    }
}

/// Where a descriptor's index data lives.
#[derive(Debug)]
pub(crate) enum Backing {
    /// Owns the backend data; `None` once destroyed.
    Root(RefCell<Option<Box<dyn RestrictionImpl>>>),
    /// Derived view holding its own reference to the parent.
    View(RefCell<Option<ElemRestriction>>),
}

#[derive(Debug)]
pub(crate) struct RestrictionCore {
    pub(crate) ceed: Ceed,
    pub(crate) shape: RestrictionShape,
    pub(crate) e_layout: Option<[usize; 3]>,
    pub(crate) ref_count: Cell<usize>,
    pub(crate) num_readers: Cell<usize>,
    pub(crate) apply_mode: ApplyMode,
    pub(crate) backing: Backing,
}

/// Handle to a restriction descriptor.
///
/// Each handle accounts for one reference. Handles are released by
/// [`ElemRestriction::destroy`] or when dropped.
#[derive(Debug)]
pub struct ElemRestriction {
    pub(crate) core: Rc<RestrictionCore>,
    pub(crate) released: bool,
}

static_assertions::assert_not_impl_any!(ElemRestriction: Send, Sync);

impl ElemRestriction {
    pub(crate) fn from_impl(
        ceed: Ceed,
        shape: RestrictionShape,
        imp: Box<dyn RestrictionImpl>,
    ) -> Self {
        let e_layout = imp.e_layout();
        Self {
            core: Rc::new(RestrictionCore {
                ceed,
                shape,
                e_layout,
                ref_count: Cell::new(1),
                num_readers: Cell::new(0),
                apply_mode: ApplyMode::Full,
                backing: Backing::Root(RefCell::new(Some(imp))),
            }),
            released: false,
        }
    }

    /// Whether two handles refer to the same descriptor.
    pub fn ptr_eq(&self, other: &ElemRestriction) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}
