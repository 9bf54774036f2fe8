#![cfg_attr(docsrs, feature(doc_cfg))]
//! # ceed-restrict
//!
//! ceed-restrict provides element restrictions for matrix-free PDE operators:
//! the gather that copies global degrees of freedom (an *L-vector*) into
//! duplicated per-element storage (an *E-vector*), and its transpose, the
//! scatter-add that accumulates element contributions back.
//!
//! ## Features
//! - Offset-indexed, sign-oriented, curl-oriented, strided and points restrictions
//! - Blocked variants with interleaved, padded index data for vectorized kernels
//! - Reference-counted descriptors with reader-guarded index array checkouts
//! - Derived unsigned/unoriented views sharing the parent's index data
//! - Pluggable backends selected by resource string, with delegate fallback
//!
//! ## Usage
//!
//! ```rust
//! use ceed_restrict::prelude::*;
//!
//! # fn main() -> Result<(), CeedError> {
//! let ceed = Ceed::init("/cpu/self/ref/serial")?;
//! let rstr = ElemRestriction::create(&ceed, 3, 2, 1, 1, 4, MemType::Host, &[0, 1, 1, 2, 2, 3])?;
//! let l = CeedVector::from_slice(&[10.0, 20.0, 30.0, 40.0]);
//! let mut e = rstr.create_e_vector();
//! rstr.apply(TransposeMode::NoTranspose, &l, &mut e)?;
//! assert_eq!(e.to_vec(), vec![10.0, 20.0, 20.0, 30.0, 30.0, 40.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading
//!
//! Contexts and restrictions use unsynchronized reference counts and are
//! neither `Send` nor `Sync`. The optional `rayon` feature parallelizes the
//! reference backend's gather over blocks, and its deterministic transpose
//! over L-vector entries.

pub mod backend;
pub mod ceed;
pub mod ceed_error;
pub mod config;
pub mod data;
pub mod debug_invariants;
pub mod restriction;

pub use debug_invariants::DebugInvariants;

/// Offset values in index arrays.
pub type CeedInt = i32;
/// Entries of curl-conforming transform arrays.
pub type CeedInt8 = i8;
/// Vector values.
pub type Scalar = f64;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::backend::{ApplyMode, Backend, Capability, RestrictionImpl};
    pub use crate::ceed::{Ceed, register_backend};
    pub use crate::ceed_error::{CeedError, ErrorKind};
    pub use crate::config::CeedConfig;
    pub use crate::data::array::{CopyMode, HostArray, MemType};
    pub use crate::data::vector::CeedVector;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::restriction::{
        ElemRestriction, RestrictionType, STRIDES_BACKEND, TransposeMode,
    };
    pub use crate::{CeedInt, CeedInt8, Scalar};
}
