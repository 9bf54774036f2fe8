//! Self-checks for descriptors.
//!
//! [`DebugInvariants::validate_invariants`] always runs its checks.
//! [`DebugInvariants::debug_assert_invariants`] panics on the first
//! violation in debug builds, or when built with `check-invariants` or
//! `strict-invariants`; otherwise it compiles to nothing.

use crate::ceed_error::CeedError;

pub trait DebugInvariants {
    /// Panic on a violated invariant (checked builds only).
    fn debug_assert_invariants(&self);
    /// The first violated invariant, if any.
    fn validate_invariants(&self) -> Result<(), CeedError>;
}

/// `assert_invariants!(label, check)`: panic with `label` if `check` is an
/// `Err`, in checked builds only.
#[macro_export]
macro_rules! assert_invariants {
    ($what:expr, $check:expr) => {{
        #[cfg(any(
            debug_assertions,
            feature = "check-invariants",
            feature = "strict-invariants"
        ))]
        {
            if let Err(err) = $check {
                panic!("{} invariant violated: {}", $what, err);
            }
        }
    }};
}
