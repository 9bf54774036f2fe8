//! Reference counting, reader checkouts and derived views.
//!
//! Counting rules:
//! - every live [`ElemRestriction`] handle holds one reference;
//! - every live [`ArrayView`] holds one reader on the root descriptor;
//! - a derived view holds one reference to its parent.
//!
//! Backend data is released exactly once, when the root's count reaches
//! zero. Explicit [`ElemRestriction::destroy`] refuses to release a root
//! that still has readers; dropping the last handle releases it anyway and
//! logs a warning (outstanding views keep their arrays alive).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, warn};

use crate::backend::{ApplyMode, Capability, RestrictionImpl};
use crate::ceed_error::CeedError;
use crate::data::array::MemType;
use crate::restriction::{Backing, ElemRestriction, RestrictionCore};
use crate::{CeedInt, CeedInt8};

impl RestrictionCore {
    /// Run `f` against the backend data owned by the root of this chain.
    pub(crate) fn with_impl<R>(
        &self,
        f: impl FnOnce(&dyn RestrictionImpl) -> Result<R, CeedError>,
    ) -> Result<R, CeedError> {
        match &self.backing {
            Backing::Root(cell) => match cell.borrow().as_deref() {
                Some(imp) => f(imp),
                None => Err(CeedError::Access("restriction data has been released".into())),
            },
            Backing::View(base) => match base.borrow().as_ref() {
                Some(base) => base.core.with_impl(f),
                None => Err(CeedError::Access("restriction view has been released".into())),
            },
        }
    }

    /// The descriptor owning the backend data.
    pub(crate) fn root(self: &Rc<Self>) -> Result<Rc<RestrictionCore>, CeedError> {
        match &self.backing {
            Backing::Root(_) => Ok(Rc::clone(self)),
            Backing::View(base) => match base.borrow().as_ref() {
                Some(base) => base.core.root(),
                None => Err(CeedError::Access("restriction view has been released".into())),
            },
        }
    }

    /// Whether dropping one reference would free backend data that still has readers.
    fn blocked_by_readers(&self) -> bool {
        if self.ref_count.get() > 1 {
            return false;
        }
        match &self.backing {
            Backing::Root(_) => self.num_readers.get() > 0,
            Backing::View(base) => base
                .borrow()
                .as_ref()
                .is_some_and(|b| b.core.blocked_by_readers()),
        }
    }

    /// Drop one reference; free backend data (or release the parent) at zero.
    fn release(&self) -> Result<(), CeedError> {
        let remaining = self.ref_count.get().saturating_sub(1);
        self.ref_count.set(remaining);
        if remaining > 0 {
            return Ok(());
        }
        match &self.backing {
            Backing::Root(cell) => {
                let taken = cell.borrow_mut().take();
                if let Some(mut imp) = taken {
                    debug!(
                        "destroying {:?} restriction on {}",
                        self.shape.rstr_type,
                        self.ceed.resource()
                    );
                    if imp.supports(Capability::Destroy) {
                        imp.destroy()?;
                    }
                }
            }
            Backing::View(base) => {
                let taken = base.borrow_mut().take();
                if let Some(base) = taken {
                    base.release()?;
                }
            }
        }
        Ok(())
    }
}

impl ElemRestriction {
    /// Take another reference to this descriptor.
    pub fn reference(&self) -> ElemRestriction {
        self.core.ref_count.set(self.core.ref_count.get() + 1);
        ElemRestriction {
            core: Rc::clone(&self.core),
            released: false,
        }
    }

    /// Point `dst` at `src`, releasing whatever `dst` held before.
    ///
    /// `None` stands for "no restriction" on either side.
    pub fn reference_copy(
        src: Option<&ElemRestriction>,
        dst: &mut Option<ElemRestriction>,
    ) -> Result<(), CeedError> {
        let new = src.map(ElemRestriction::reference);
        ElemRestriction::destroy(dst)?;
        *dst = new;
        Ok(())
    }

    /// Release the handle in `handle`, leaving `None`.
    ///
    /// If this is the last reference and index arrays are still checked out,
    /// fails with [`CeedError::Access`] and leaves the handle in place.
    pub fn destroy(handle: &mut Option<ElemRestriction>) -> Result<(), CeedError> {
        let Some(rstr) = handle.take() else {
            return Ok(());
        };
        if rstr.core.blocked_by_readers() {
            warn!(
                "refusing to destroy {:?} restriction: {} array reader(s) attached",
                rstr.core.shape.rstr_type,
                rstr.core.root().map(|r| r.num_readers.get()).unwrap_or(0)
            );
            *handle = Some(rstr);
            return Err(CeedError::Access(
                "cannot destroy restriction, a process has read access to the offset data".into(),
            ));
        }
        rstr.release()
    }

    fn release(mut self) -> Result<(), CeedError> {
        self.released = true;
        self.core.release()
    }

    /// Current reference count of the descriptor.
    pub fn ref_count(&self) -> usize {
        self.core.ref_count.get()
    }

    /// Outstanding array checkouts on the descriptor owning the index data.
    pub fn num_readers(&self) -> usize {
        self.core
            .root()
            .map(|r| r.num_readers.get())
            .unwrap_or(0)
    }

    /// Whether this descriptor is a derived view of another.
    pub fn is_derived(&self) -> bool {
        matches!(self.core.backing, Backing::View(_))
    }

    fn checkout<T>(
        &self,
        cap: Capability,
        get: impl FnOnce(&dyn RestrictionImpl) -> Result<Arc<[T]>, CeedError>,
    ) -> Result<ArrayView<T>, CeedError> {
        let data = self.core.with_impl(|imp| {
            if !imp.supports(cap) {
                return Err(CeedError::unsupported(cap.name(), imp.resource()));
            }
            get(imp)
        })?;
        let root = self.core.root()?;
        root.num_readers.set(root.num_readers.get() + 1);
        Ok(ArrayView { root, data })
    }

    /// Check out the offsets array. Restored when the view is dropped.
    pub fn offsets(&self, mem: MemType) -> Result<OffsetsView, CeedError> {
        self.checkout(Capability::GetOffsets, |imp| imp.offsets(mem))
    }

    /// Check out the per-node sign array.
    pub fn orientations(&self, mem: MemType) -> Result<OrientationsView, CeedError> {
        self.checkout(Capability::GetOrientations, |imp| imp.orientations(mem))
    }

    /// Check out the per-node tridiagonal transform array.
    pub fn curl_orientations(&self, mem: MemType) -> Result<CurlOrientationsView, CeedError> {
        self.checkout(Capability::GetCurlOrientations, |imp| {
            imp.curl_orientations(mem)
        })
    }

    fn derived_copy(&self, mode: ApplyMode) -> Result<ElemRestriction, CeedError> {
        let cap = mode.capability();
        self.core.with_impl(|imp| {
            if imp.supports(cap) {
                Ok(())
            } else {
                Err(CeedError::unsupported(cap.name(), imp.resource()))
            }
        })?;
        debug!(
            "deriving {:?} view of {:?} restriction",
            mode, self.core.shape.rstr_type
        );
        let core = RestrictionCore {
            ceed: self.core.ceed.clone(),
            shape: self.core.shape.clone(),
            e_layout: self.core.e_layout,
            ref_count: Cell::new(1),
            num_readers: Cell::new(0),
            apply_mode: mode,
            backing: Backing::View(RefCell::new(Some(self.reference()))),
        };
        Ok(ElemRestriction {
            core: Rc::new(core),
            released: false,
        })
    }

    /// View sharing this descriptor's index data whose apply ignores signs
    /// (and uses absolute values of curl transforms).
    pub fn create_unsigned_copy(&self) -> Result<ElemRestriction, CeedError> {
        self.derived_copy(ApplyMode::Unsigned)
    }

    /// View sharing this descriptor's index data whose apply ignores any
    /// orientation.
    pub fn create_unoriented_copy(&self) -> Result<ElemRestriction, CeedError> {
        self.derived_copy(ApplyMode::Unoriented)
    }
}

impl Drop for ElemRestriction {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.core.blocked_by_readers() {
            warn!(
                "dropping last handle of {:?} restriction with array readers attached",
                self.core.shape.rstr_type
            );
        }
        if let Err(e) = self.core.release() {
            warn!("error releasing restriction: {e}");
        }
    }
}

/// Read-only checkout of one of a restriction's index arrays.
///
/// Counts as a reader of the descriptor that owns the data until dropped.
pub struct ArrayView<T> {
    root: Rc<RestrictionCore>,
    data: Arc<[T]>,
}

pub type OffsetsView = ArrayView<CeedInt>;
pub type OrientationsView = ArrayView<bool>;
pub type CurlOrientationsView = ArrayView<CeedInt8>;

impl<T> ArrayView<T> {
    /// Give the array back; same as dropping the view.
    pub fn restore(self) {}
}

impl<T> Deref for ArrayView<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> Drop for ArrayView<T> {
    fn drop(&mut self) {
        let readers = self.root.num_readers.get();
        self.root.num_readers.set(readers.saturating_sub(1));
    }
}

impl<T: fmt::Debug> fmt::Debug for ArrayView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("len", &self.data.len())
            .finish()
    }
}
