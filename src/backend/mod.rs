//! Backend capability tables.
//!
//! A backend is split in two levels:
//! - [`Backend`] is the context-level table: it builds restrictions.
//! - [`RestrictionImpl`] is the per-descriptor table: it holds the compiled
//!   index data and applies it.
//!
//! Every hook is optional. A missing hook answers `false` from `supports`
//! and returns [`CeedError::Unsupported`] when called; the front end decides
//! whether to fall back to a delegate context.

use std::fmt::Debug;
use std::sync::Arc;

use crate::ceed::Ceed;
use crate::ceed_error::CeedError;
use crate::data::array::{ArrayStore, MemType};
use crate::restriction::{RestrictionShape, TransposeMode};
use crate::{CeedInt, CeedInt8, Scalar};

pub mod memcheck;
pub mod reference;

/// Individually optional backend hooks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    CreateStandard,
    CreateBlocked,
    CreateAtPoints,
    Apply,
    ApplyUnsigned,
    ApplyUnoriented,
    ApplyAtPointsInElement,
    ApplyBlock,
    Destroy,
    GetOffsets,
    GetOrientations,
    GetCurlOrientations,
}

impl Capability {
    pub const ALL: [Capability; 12] = [
        Capability::CreateStandard,
        Capability::CreateBlocked,
        Capability::CreateAtPoints,
        Capability::Apply,
        Capability::ApplyUnsigned,
        Capability::ApplyUnoriented,
        Capability::ApplyAtPointsInElement,
        Capability::ApplyBlock,
        Capability::Destroy,
        Capability::GetOffsets,
        Capability::GetOrientations,
        Capability::GetCurlOrientations,
    ];

    /// Hook name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Capability::CreateStandard => "ElemRestrictionCreate",
            Capability::CreateBlocked => "ElemRestrictionCreateBlocked",
            Capability::CreateAtPoints => "ElemRestrictionCreateAtPoints",
            Capability::Apply => "ElemRestrictionApply",
            Capability::ApplyUnsigned => "ElemRestrictionApplyUnsigned",
            Capability::ApplyUnoriented => "ElemRestrictionApplyUnoriented",
            Capability::ApplyAtPointsInElement => "ElemRestrictionApplyAtPointsInElement",
            Capability::ApplyBlock => "ElemRestrictionApplyBlock",
            Capability::Destroy => "ElemRestrictionDestroy",
            Capability::GetOffsets => "ElemRestrictionGetOffsets",
            Capability::GetOrientations => "ElemRestrictionGetOrientations",
            Capability::GetCurlOrientations => "ElemRestrictionGetCurlOrientations",
        }
    }
}

/// Which orientation treatment an apply uses.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ApplyMode {
    /// Signs and curl transforms as stored.
    #[default]
    Full,
    /// Signs dropped; curl transforms use absolute values.
    Unsigned,
    /// Orientation ignored entirely: plain offset gather.
    Unoriented,
}

impl ApplyMode {
    pub fn capability(self) -> Capability {
        match self {
            ApplyMode::Full => Capability::Apply,
            ApplyMode::Unsigned => Capability::ApplyUnsigned,
            ApplyMode::Unoriented => Capability::ApplyUnoriented,
        }
    }
}

/// Index arrays handed to a backend create hook. Blocked restrictions receive
/// them already permuted and padded.
#[derive(Debug, Clone, Default)]
pub struct IndexData {
    pub mem_type: MemType,
    pub offsets: Option<ArrayStore<CeedInt>>,
    pub orients: Option<ArrayStore<bool>>,
    pub curl_orients: Option<ArrayStore<CeedInt8>>,
}

/// Context-level hooks.
pub trait Backend: Debug {
    /// Full resource string this backend was initialized with.
    fn resource(&self) -> &str;

    /// Whether this backend implements `cap` itself.
    fn supports(&self, cap: Capability) -> bool;

    /// Resource of the context to fall back on for missing capabilities.
    fn delegate_resource(&self) -> Option<&str> {
        None
    }

    /// Initial value of vectors created through the context.
    fn vector_fill(&self) -> Scalar {
        0.0
    }

    /// Build an unblocked offset-based or strided restriction.
    fn create_restriction(
        &self,
        _ceed: &Ceed,
        _shape: &RestrictionShape,
        _data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        Err(CeedError::unsupported(
            Capability::CreateStandard.name(),
            self.resource(),
        ))
    }

    /// Build a blocked restriction from permuted index data.
    fn create_blocked_restriction(
        &self,
        _ceed: &Ceed,
        _shape: &RestrictionShape,
        _data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        Err(CeedError::unsupported(
            Capability::CreateBlocked.name(),
            self.resource(),
        ))
    }

    /// Build a points restriction.
    fn create_at_points_restriction(
        &self,
        _ceed: &Ceed,
        _shape: &RestrictionShape,
        _data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        Err(CeedError::unsupported(
            Capability::CreateAtPoints.name(),
            self.resource(),
        ))
    }
}

/// Per-descriptor hooks operating on host slices.
///
/// Vector lengths, element and block numbers have been checked by the caller
/// before any of these run. Transpose applies accumulate into `v`.
pub trait RestrictionImpl: Debug {
    /// Resource of the backend that built this data.
    fn resource(&self) -> &str;

    fn supports(&self, cap: Capability) -> bool;

    /// Node/component/element strides of the E-vector layout, if fixed.
    fn e_layout(&self) -> Option<[usize; 3]>;

    fn apply(
        &self,
        mode: ApplyMode,
        t_mode: TransposeMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<(), CeedError>;

    fn apply_block(
        &self,
        _block: usize,
        _mode: ApplyMode,
        _t_mode: TransposeMode,
        _u: &[Scalar],
        _v: &mut [Scalar],
    ) -> Result<(), CeedError> {
        Err(CeedError::unsupported(
            Capability::ApplyBlock.name(),
            self.resource(),
        ))
    }

    fn apply_at_points_in_element(
        &self,
        _elem: usize,
        _t_mode: TransposeMode,
        _u: &[Scalar],
        _v: &mut [Scalar],
    ) -> Result<(), CeedError> {
        Err(CeedError::unsupported(
            Capability::ApplyAtPointsInElement.name(),
            self.resource(),
        ))
    }

    fn offsets(&self, _mem: MemType) -> Result<Arc<[CeedInt]>, CeedError> {
        Err(CeedError::unsupported(
            Capability::GetOffsets.name(),
            self.resource(),
        ))
    }

    fn orientations(&self, _mem: MemType) -> Result<Arc<[bool]>, CeedError> {
        Err(CeedError::unsupported(
            Capability::GetOrientations.name(),
            self.resource(),
        ))
    }

    fn curl_orientations(&self, _mem: MemType) -> Result<Arc<[CeedInt8]>, CeedError> {
        Err(CeedError::unsupported(
            Capability::GetCurlOrientations.name(),
            self.resource(),
        ))
    }

    /// Release backend resources. Called at most once, by the owning descriptor,
    /// and only when `supports(Capability::Destroy)`; otherwise the data is
    /// simply dropped.
    fn destroy(&mut self) -> Result<(), CeedError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn capability_names_are_distinct() {
        let names: HashSet<_> = Capability::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names.len(), Capability::ALL.len());
    }

    #[test]
    fn apply_modes_map_to_hooks() {
        assert_eq!(ApplyMode::Full.capability(), Capability::Apply);
        assert_eq!(ApplyMode::Unsigned.capability(), Capability::ApplyUnsigned);
        assert_eq!(
            ApplyMode::Unoriented.capability(),
            Capability::ApplyUnoriented
        );
    }
}
