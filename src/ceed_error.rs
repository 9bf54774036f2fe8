//! CeedError: Unified error type for ceed-restrict public APIs
//!
//! Every fallible operation in the crate returns `Result<_, CeedError>`.
//! Errors are reported immediately and never auto-corrected; callers
//! propagate them with `?`.

use thiserror::Error;

use crate::CeedInt;

/// Coarse classification of a [`CeedError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad creation parameters or index data.
    Validation,
    /// The backend (and every delegate) lacks the required capability.
    Unsupported,
    /// Lifecycle misuse, e.g. destroying while readers are attached.
    Access,
    /// A query that does not apply to this restriction variant.
    Incompatible,
    /// Vector lengths or element/block numbers incompatible with the shape.
    Dimension,
    /// Optional metadata that was never set.
    Minor,
    /// Failure inside a backend.
    Backend,
}

/// Unified error type for restriction, vector and context operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CeedError {
    /// A size or stride parameter is out of its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// An offset addresses memory outside the L-vector.
    #[error("offset {offset} for element {elem}, node {node} addresses outside the L-vector of size {l_size}")]
    OffsetOutOfRange {
        elem: usize,
        node: usize,
        offset: CeedInt,
        l_size: usize,
    },
    /// A caller-supplied array does not have the shape implied by the sizes.
    #[error("{what} array has length {found}, expected {expected}")]
    ArrayLength {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A storage range `[offset, offset + len)` does not fit in the buffer.
    #[error("range [{offset}, {offset} + {len}) is out of bounds for storage of length {total}")]
    RangeOutOfBounds {
        offset: usize,
        len: usize,
        total: usize,
    },
    /// Neither the backend nor any delegate implements `op`.
    #[error("backend `{backend}` does not implement {op}")]
    Unsupported { op: &'static str, backend: String },
    /// Lifecycle/access misuse.
    #[error("access error: {0}")]
    Access(String),
    /// Points-only query on a non-points restriction (and similar).
    #[error("incompatible restriction: {0}")]
    Incompatible(String),
    /// Vector length incompatible with the restriction's `(m, n)` shape.
    #[error("{role} vector size {found} not compatible with element restriction ({m}, {n})")]
    VectorLengthMismatch {
        role: &'static str,
        found: usize,
        m: usize,
        n: usize,
    },
    /// Element index past the end.
    #[error("cannot retrieve element {elem}, restriction has {num_elem} elements")]
    ElementOutOfRange { elem: usize, num_elem: usize },
    /// Block index whose first element does not exist.
    #[error("cannot retrieve block {block} of size {block_size}, restriction has {num_elem} elements")]
    BlockOutOfRange {
        block: usize,
        block_size: usize,
        num_elem: usize,
    },
    /// Optional metadata (strides, E-layout, orientations) that is not present.
    #[error("restriction has no {0} data")]
    MissingData(&'static str),
    /// Backend-internal failure.
    #[error("backend error: {0}")]
    Backend(String),
    /// No registered backend matches the requested resource.
    #[error("no backend registered for resource `{0}`")]
    UnknownResource(String),
}

impl CeedError {
    /// Which part of the error taxonomy this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CeedError::InvalidParameter(_)
            | CeedError::OffsetOutOfRange { .. }
            | CeedError::ArrayLength { .. }
            | CeedError::UnknownResource(_) => ErrorKind::Validation,
            CeedError::Unsupported { .. } => ErrorKind::Unsupported,
            CeedError::Access(_) => ErrorKind::Access,
            CeedError::Incompatible(_) => ErrorKind::Incompatible,
            CeedError::VectorLengthMismatch { .. }
            | CeedError::ElementOutOfRange { .. }
            | CeedError::BlockOutOfRange { .. }
            | CeedError::RangeOutOfBounds { .. } => ErrorKind::Dimension,
            CeedError::MissingData(_) => ErrorKind::Minor,
            CeedError::Backend(_) => ErrorKind::Backend,
        }
    }

    pub(crate) fn unsupported(op: &'static str, backend: &str) -> Self {
        CeedError::Unsupported {
            op,
            backend: backend.to_string(),
        }
    }
}
