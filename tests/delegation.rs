mod util;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ceed_restrict::backend::IndexData;
use ceed_restrict::prelude::*;
use ceed_restrict::restriction::RestrictionShape;
use serial_test::serial;

/// Gather-only backend: plain unblocked offset restrictions and nothing else.
#[derive(Debug)]
struct GatherOnly {
    resource: String,
}

#[derive(Debug)]
struct GatherOnlyRestriction {
    offsets: Arc<[CeedInt]>,
}

fn gather_only(resource: &str) -> Result<Box<dyn Backend>, CeedError> {
    Ok(Box::new(GatherOnly {
        resource: resource.to_string(),
    }))
}

impl Backend for GatherOnly {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn supports(&self, cap: Capability) -> bool {
        cap == Capability::CreateStandard
    }

    fn delegate_resource(&self) -> Option<&str> {
        self.resource
            .ends_with("/fallback")
            .then_some("/cpu/self/ref/serial")
    }

    fn create_restriction(
        &self,
        _ceed: &Ceed,
        shape: &RestrictionShape,
        data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        if shape.num_comp != 1 {
            return Err(CeedError::Backend("single component only".into()));
        }
        let offsets = data
            .offsets
            .ok_or(CeedError::MissingData("offsets"))?
            .shared();
        Ok(Box::new(GatherOnlyRestriction { offsets }))
    }
}

impl RestrictionImpl for GatherOnlyRestriction {
    fn resource(&self) -> &str {
        "/test/gather"
    }

    fn supports(&self, cap: Capability) -> bool {
        cap == Capability::Apply
    }

    fn e_layout(&self) -> Option<[usize; 3]> {
        Some([1, self.offsets.len(), self.offsets.len()])
    }

    fn apply(
        &self,
        _mode: ApplyMode,
        t_mode: TransposeMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<(), CeedError> {
        for (i, &o) in self.offsets.iter().enumerate() {
            match t_mode {
                TransposeMode::NoTranspose => v[i] = u[o as usize],
                TransposeMode::Transpose => v[o as usize] += u[i],
            }
        }
        Ok(())
    }
}

/// Builds points restrictions whose index data cannot be checked out.
#[derive(Debug)]
struct OpaquePoints;

#[derive(Debug)]
struct OpaquePointsRestriction;

fn opaque_points(_resource: &str) -> Result<Box<dyn Backend>, CeedError> {
    Ok(Box::new(OpaquePoints))
}

impl Backend for OpaquePoints {
    fn resource(&self) -> &str {
        "/test/opaque-points"
    }

    fn supports(&self, cap: Capability) -> bool {
        cap == Capability::CreateAtPoints
    }

    fn create_at_points_restriction(
        &self,
        _ceed: &Ceed,
        _shape: &RestrictionShape,
        _data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        Ok(Box::new(OpaquePointsRestriction))
    }
}

impl RestrictionImpl for OpaquePointsRestriction {
    fn resource(&self) -> &str {
        "/test/opaque-points"
    }

    fn supports(&self, cap: Capability) -> bool {
        cap == Capability::Apply
    }

    fn e_layout(&self) -> Option<[usize; 3]> {
        None
    }

    fn apply(
        &self,
        _mode: ApplyMode,
        _t_mode: TransposeMode,
        _u: &[Scalar],
        _v: &mut [Scalar],
    ) -> Result<(), CeedError> {
        Ok(())
    }
}

static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Runs its destroy hook only for single-element restrictions.
#[derive(Debug)]
struct Tracked;

#[derive(Debug)]
struct TrackedRestriction {
    has_destroy: bool,
}

fn tracked(_resource: &str) -> Result<Box<dyn Backend>, CeedError> {
    Ok(Box::new(Tracked))
}

impl Backend for Tracked {
    fn resource(&self) -> &str {
        "/test/tracked"
    }

    fn supports(&self, cap: Capability) -> bool {
        cap == Capability::CreateStandard
    }

    fn create_restriction(
        &self,
        _ceed: &Ceed,
        shape: &RestrictionShape,
        _data: IndexData,
    ) -> Result<Box<dyn RestrictionImpl>, CeedError> {
        Ok(Box::new(TrackedRestriction {
            has_destroy: shape.num_elem == 1,
        }))
    }
}

impl RestrictionImpl for TrackedRestriction {
    fn resource(&self) -> &str {
        "/test/tracked"
    }

    fn supports(&self, cap: Capability) -> bool {
        cap == Capability::Apply || (cap == Capability::Destroy && self.has_destroy)
    }

    fn e_layout(&self) -> Option<[usize; 3]> {
        None
    }

    fn apply(
        &self,
        _mode: ApplyMode,
        _t_mode: TransposeMode,
        _u: &[Scalar],
        _v: &mut [Scalar],
    ) -> Result<(), CeedError> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), CeedError> {
        HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn register_once(prefix: &str) {
    if !ceed_restrict::ceed::registered_backends()
        .iter()
        .any(|p| p == prefix)
    {
        register_backend(prefix, 10, gather_only).unwrap();
    }
}

#[test]
#[serial]
fn custom_backend_builds_and_applies() {
    register_once("/test/gather");
    let ceed = Ceed::init("/test/gather").unwrap();
    let r = ElemRestriction::create(&ceed, 2, 2, 1, 1, 3, MemType::Host, &[2, 1, 1, 0]).unwrap();
    let mut e = r.create_e_vector();
    r.apply(
        TransposeMode::NoTranspose,
        &CeedVector::from_slice(&[1.0, 2.0, 3.0]),
        &mut e,
    )
    .unwrap();
    assert_eq!(e.to_vec(), vec![3.0, 2.0, 2.0, 1.0]);
    let mut m = r.create_l_vector();
    r.multiplicity(&mut m).unwrap();
    assert_eq!(m.to_vec(), vec![1.0, 2.0, 1.0]);
}

#[test]
#[serial]
fn missing_hooks_are_unsupported_without_delegate() {
    register_once("/test/gather");
    let ceed = Ceed::init("/test/gather").unwrap();
    assert!(ceed.delegate().is_none());

    let err = ElemRestriction::create_blocked(&ceed, 2, 2, 2, 1, 1, 3, MemType::Host, &[0, 1, 1, 2])
        .unwrap_err();
    assert_eq!(
        err,
        CeedError::Unsupported {
            op: "ElemRestrictionCreateBlocked",
            backend: "/test/gather".into()
        }
    );
    assert_eq!(err.kind(), ErrorKind::Unsupported);

    let r = ElemRestriction::create(&ceed, 2, 2, 1, 1, 3, MemType::Host, &[0, 1, 1, 2]).unwrap();
    assert!(matches!(r.offsets(MemType::Host), Err(CeedError::Unsupported { .. })));
    assert!(matches!(r.create_unsigned_copy(), Err(CeedError::Unsupported { .. })));
    let mut y = CeedVector::new(2);
    assert!(matches!(
        r.apply_block(0, TransposeMode::NoTranspose, &CeedVector::new(3), &mut y),
        Err(CeedError::Unsupported { .. })
    ));
    // backend-specific rejection passes through unchanged
    assert_eq!(
        ElemRestriction::create(&ceed, 1, 1, 2, 1, 2, MemType::Host, &[0]).unwrap_err(),
        CeedError::Backend("single component only".into())
    );
}

#[test]
#[serial]
fn missing_hooks_fall_back_to_delegate() {
    register_once("/test/gather/fallback");
    let ceed = Ceed::init("/test/gather/fallback").unwrap();
    assert_eq!(ceed.delegate().map(Ceed::resource), Some("/cpu/self/ref/serial"));

    let blocked =
        ElemRestriction::create_blocked(&ceed, 2, 2, 2, 1, 1, 3, MemType::Host, &[0, 1, 1, 2]).unwrap();
    // built by, and owned by, the delegate context
    assert!(blocked.ceed().ptr_eq(ceed.delegate().unwrap()));
    assert_eq!(blocked.offsets(MemType::Host).unwrap().len(), 4);

    let plain = ElemRestriction::create(&ceed, 2, 2, 1, 1, 3, MemType::Host, &[0, 1, 1, 2]).unwrap();
    assert!(plain.offsets(MemType::Host).is_err());
}

#[test]
#[serial]
fn duplicate_prefix_is_rejected() {
    register_once("/test/gather");
    assert_eq!(
        register_backend("/test/gather", 1, gather_only).unwrap_err().kind(),
        ErrorKind::Validation
    );
}

#[test]
#[serial]
fn memcheck_runs_on_the_reference_backend() {
    let ceed = Ceed::init("/cpu/self/memcheck").unwrap();
    let r = ElemRestriction::create(&ceed, 3, 2, 1, 1, 4, MemType::Host, &[0, 1, 1, 2, 2, 3]).unwrap();
    assert!(ceed.vector(3).as_slice().iter().all(|x| x.is_nan()));
    assert_eq!(r.ceed().resource(), "/cpu/self/ref/serial");
    let mut e = r.create_e_vector();
    r.apply(
        TransposeMode::NoTranspose,
        &CeedVector::from_slice(&[10.0, 20.0, 30.0, 40.0]),
        &mut e,
    )
    .unwrap();
    assert_eq!(e.to_vec(), vec![10.0, 20.0, 20.0, 30.0, 30.0, 40.0]);
}

#[test]
#[serial]
fn generic_resource_resolves_to_reference() {
    let ceed = Ceed::init("/cpu/self").unwrap();
    let r = ElemRestriction::create(&ceed, 1, 2, 1, 1, 2, MemType::Host, &[1, 0]).unwrap();
    assert_eq!(r.offsets(MemType::Host).unwrap().to_vec(), vec![1, 0]);
    assert!(matches!(
        Ceed::init("/gpu/cuda"),
        Err(CeedError::UnknownResource(_))
    ));
}

#[test]
#[serial]
fn points_description_needs_no_offsets_checkout() {
    if !ceed_restrict::ceed::registered_backends()
        .iter()
        .any(|p| p == "/test/opaque-points")
    {
        register_backend("/test/opaque-points", 10, opaque_points).unwrap();
    }
    let ceed = Ceed::init("/test/opaque-points").unwrap();
    // 2 elements: [p0, p1], [p2]
    let r = ElemRestriction::create_at_points(&ceed, 2, 3, 1, 3, MemType::Host, &[3, 5, 6, 0, 1, 2])
        .unwrap();
    assert!(r.max_points_in_element().is_err());
    assert_eq!(
        r.to_string(),
        "CeedElemRestriction at points from (3, 1) to 2 elements with a maximum of 2 points on an element"
    );
}

#[test]
#[serial]
fn destroy_hook_runs_only_when_advertised() {
    if !ceed_restrict::ceed::registered_backends()
        .iter()
        .any(|p| p == "/test/tracked")
    {
        register_backend("/test/tracked", 10, tracked).unwrap();
    }
    let ceed = Ceed::init("/test/tracked").unwrap();
    let before = HOOK_CALLS.load(Ordering::SeqCst);

    let mut without = Some(ElemRestriction::create(&ceed, 2, 1, 1, 1, 2, MemType::Host, &[0, 1]).unwrap());
    ElemRestriction::destroy(&mut without).unwrap();
    assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), before);

    let mut with = Some(ElemRestriction::create(&ceed, 1, 1, 1, 1, 2, MemType::Host, &[1]).unwrap());
    let view = with.as_ref().unwrap().reference();
    ElemRestriction::destroy(&mut with).unwrap();
    assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), before);
    drop(view);
    assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), before + 1);
}
