//! Creation entry points: one per variant, unblocked and blocked.
//!
//! Each entry resolves a context able to build the variant (falling back
//! along the delegate chain), validates sizes and index data, computes the
//! derived sizes, permutes and pads index data for blocked variants, and
//! hands the result to the backend.
//!
//! Index arrays are passed as [`HostArray`], whose variant selects the copy
//! mode. `mem_type` names where the backend should expect them.

use log::debug;

use crate::backend::{Capability, IndexData};
use crate::ceed::Ceed;
use crate::ceed_error::CeedError;
use crate::data::array::{ArrayStore, HostArray, MemType};
use crate::restriction::codec::{
    num_blocks, permute_pad_curl_orients, permute_pad_offsets, permute_pad_orients,
};
use crate::restriction::{ElemRestriction, RestrictionShape, RestrictionType, STRIDES_BACKEND};
use crate::{CeedInt, CeedInt8};

fn check_sizes(
    elem_size: usize,
    block_size: usize,
    num_comp: usize,
    comp_stride: usize,
) -> Result<(), CeedError> {
    if elem_size < 1 {
        return Err(CeedError::InvalidParameter(
            "element size must be at least 1".into(),
        ));
    }
    if block_size < 1 {
        return Err(CeedError::InvalidParameter(
            "block size must be at least 1".into(),
        ));
    }
    if num_comp < 1 {
        return Err(CeedError::InvalidParameter(
            "restriction must have at least 1 component".into(),
        ));
    }
    if num_comp > 1 && comp_stride < 1 {
        return Err(CeedError::InvalidParameter(
            "component stride must be at least 1".into(),
        ));
    }
    Ok(())
}

fn overflow(what: &str) -> CeedError {
    CeedError::InvalidParameter(format!("{what} overflows the index range"))
}

fn checked_product(what: &str, factors: &[usize]) -> Result<usize, CeedError> {
    factors
        .iter()
        .try_fold(1usize, |acc, &f| acc.checked_mul(f))
        .ok_or_else(|| overflow(what))
}

fn check_len(what: &'static str, found: usize, expected: usize) -> Result<(), CeedError> {
    if found != expected {
        return Err(CeedError::ArrayLength {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

/// Every offset, shifted by the last component, must address the L-vector.
fn check_offsets(
    offsets: &[CeedInt],
    elem_size: usize,
    num_comp: usize,
    comp_stride: usize,
    l_size: usize,
) -> Result<(), CeedError> {
    let last_comp = checked_product("component stride", &[num_comp - 1, comp_stride])?;
    if num_comp > 1 && last_comp >= l_size {
        return Err(CeedError::InvalidParameter(format!(
            "component stride {comp_stride} puts component {} outside L-vector of size {l_size}",
            num_comp - 1
        )));
    }
    match offsets.iter().position(|&o| {
        o < 0
            || (o as usize)
                .checked_add(last_comp)
                .is_none_or(|i| i >= l_size)
    }) {
        Some(i) => Err(CeedError::OffsetOutOfRange {
            elem: i / elem_size,
            node: i % elem_size,
            offset: offsets[i],
            l_size,
        }),
        None => Ok(()),
    }
}

fn check_strides(
    num_elem: usize,
    elem_size: usize,
    num_comp: usize,
    l_size: usize,
    strides: [usize; 3],
) -> Result<(), CeedError> {
    let needed = checked_product("num_elem * elem_size * num_comp", &[num_elem, elem_size, num_comp])?;
    if l_size < needed {
        return Err(CeedError::InvalidParameter(format!(
            "L-vector size {l_size} must be at least num_elem * elem_size * num_comp = {needed}"
        )));
    }
    if strides != STRIDES_BACKEND && num_elem > 0 {
        let [s0, s1, s2] = strides;
        let last = [
            (elem_size - 1).checked_mul(s0),
            (num_comp - 1).checked_mul(s1),
            (num_elem - 1).checked_mul(s2),
        ]
        .into_iter()
        .try_fold(0usize, |acc, term| acc.checked_add(term?))
        .ok_or_else(|| overflow("strides"))?;
        if last >= l_size {
            return Err(CeedError::InvalidParameter(format!(
                "strides {strides:?} address index {last}, outside L-vector of size {l_size}"
            )));
        }
    }
    Ok(())
}

/// Validate the `[num_elem + 1 range starts | point indices]` layout and
/// return the largest number of points in any element.
fn check_points(
    offsets: &[CeedInt],
    num_elem: usize,
    num_points: usize,
    num_comp: usize,
    l_size: usize,
) -> Result<usize, CeedError> {
    let head = num_elem.checked_add(1).ok_or_else(|| overflow("num_elem"))?;
    let total = head
        .checked_add(num_points)
        .ok_or_else(|| overflow("num_elem + num_points"))?;
    check_len("points offsets", offsets.len(), total)?;
    let bad = |msg: String| -> Result<usize, CeedError> { Err(CeedError::InvalidParameter(msg)) };
    if offsets[0] as i64 != head as i64 || offsets[num_elem] as i64 != offsets.len() as i64 {
        return bad(format!(
            "point ranges must span [{head}, {}), found [{}, {})",
            offsets.len(),
            offsets[0],
            offsets[num_elem]
        ));
    }
    let mut max_points = 0;
    for (e, w) in offsets[..head].windows(2).enumerate() {
        if w[1] < w[0] {
            return bad(format!("point range of element {e} is decreasing"));
        }
        max_points = max_points.max((w[1] - w[0]) as usize);
    }
    let l_points = l_size / num_comp;
    if let Some(i) = offsets[head..]
        .iter()
        .position(|&p| p < 0 || p as usize >= l_points)
    {
        let elem = offsets[..num_elem]
            .iter()
            .rposition(|&start| start as usize <= head + i)
            .unwrap_or(0);
        return Err(CeedError::OffsetOutOfRange {
            elem,
            node: head + i - offsets[elem] as usize,
            offset: offsets[head + i],
            l_size,
        });
    }
    Ok(max_points)
}

#[allow(clippy::too_many_arguments)]
fn offset_shape(
    rstr_type: RestrictionType,
    num_elem: usize,
    elem_size: usize,
    block_size: usize,
    num_comp: usize,
    comp_stride: usize,
    l_size: usize,
    strides: Option<[usize; 3]>,
) -> Result<RestrictionShape, CeedError> {
    let num_block = num_blocks(num_elem, block_size);
    let e_size = checked_product("E-vector size", &[num_block, block_size, elem_size, num_comp])?;
    Ok(RestrictionShape {
        rstr_type,
        num_elem,
        elem_size,
        num_comp,
        comp_stride,
        l_size,
        e_size,
        block_size,
        num_block,
        num_points: 0,
        strides,
    })
}

/// Build through the first context in the delegate chain implementing `cap`.
fn build(
    ceed: &Ceed,
    cap: Capability,
    shape: RestrictionShape,
    data: IndexData,
) -> Result<ElemRestriction, CeedError> {
    let target = ceed.resolve_for(cap)?.clone();
    let backend = target.backend();
    let imp = match cap {
        Capability::CreateBlocked => backend.create_blocked_restriction(&target, &shape, data)?,
        Capability::CreateAtPoints => backend.create_at_points_restriction(&target, &shape, data)?,
        _ => backend.create_restriction(&target, &shape, data)?,
    };
    debug!(
        "created {:?} restriction on {}: num_elem={}, elem_size={}, num_comp={}, l_size={}, e_size={}, block_size={}",
        shape.rstr_type,
        target.resource(),
        shape.num_elem,
        shape.elem_size,
        shape.num_comp,
        shape.l_size,
        shape.e_size,
        shape.block_size
    );
    Ok(ElemRestriction::from_impl(target, shape, imp))
}

/// Index arrays of an offset-based variant before blocking.
struct RawIndex<'a> {
    offsets: HostArray<'a, CeedInt>,
    orients: Option<HostArray<'a, bool>>,
    curl_orients: Option<HostArray<'a, CeedInt8>>,
}

#[allow(clippy::too_many_arguments)]
fn create_offset_based(
    ceed: &Ceed,
    rstr_type: RestrictionType,
    num_elem: usize,
    elem_size: usize,
    block_size: usize,
    num_comp: usize,
    comp_stride: usize,
    l_size: usize,
    mem_type: MemType,
    raw: RawIndex<'_>,
) -> Result<ElemRestriction, CeedError> {
    let cap = if block_size > 1 {
        Capability::CreateBlocked
    } else {
        Capability::CreateStandard
    };
    let ceed = ceed.resolve_for(cap)?;
    check_sizes(elem_size, block_size, num_comp, comp_stride)?;
    let n = checked_product("num_elem * elem_size", &[num_elem, elem_size])?;
    check_len("offsets", raw.offsets.len(), n)?;
    if let Some(o) = &raw.orients {
        check_len("orientation", o.len(), n)?;
    }
    if let Some(c) = &raw.curl_orients {
        check_len("curl orientation", c.len(), checked_product("curl orientation length", &[3, n])?)?;
    }
    if mem_type == MemType::Host {
        check_offsets(raw.offsets.as_slice(), elem_size, num_comp, comp_stride, l_size)?;
    }

    let shape = offset_shape(
        rstr_type, num_elem, elem_size, block_size, num_comp, comp_stride, l_size, None,
    )?;
    let data = if block_size > 1 {
        IndexData {
            mem_type,
            offsets: Some(ArrayStore::owned(permute_pad_offsets(
                raw.offsets.as_slice(),
                num_elem,
                elem_size,
                block_size,
            )?)),
            orients: raw
                .orients
                .map(|o| permute_pad_orients(o.as_slice(), num_elem, elem_size, block_size))
                .transpose()?
                .map(ArrayStore::owned),
            curl_orients: raw
                .curl_orients
                .map(|c| permute_pad_curl_orients(c.as_slice(), num_elem, elem_size, block_size))
                .transpose()?
                .map(ArrayStore::owned),
        }
    } else {
        IndexData {
            mem_type,
            offsets: Some(raw.offsets.into_store()),
            orients: raw.orients.map(HostArray::into_store),
            curl_orients: raw.curl_orients.map(HostArray::into_store),
        }
    };
    build(ceed, cap, shape, data)
}

#[allow(clippy::too_many_arguments)]
fn create_strided_impl(
    ceed: &Ceed,
    num_elem: usize,
    elem_size: usize,
    block_size: usize,
    num_comp: usize,
    l_size: usize,
    strides: [usize; 3],
) -> Result<ElemRestriction, CeedError> {
    let cap = if block_size > 1 {
        Capability::CreateBlocked
    } else {
        Capability::CreateStandard
    };
    let ceed = ceed.resolve_for(cap)?;
    check_sizes(elem_size, block_size, num_comp, 1)?;
    check_strides(num_elem, elem_size, num_comp, l_size, strides)?;
    let shape = offset_shape(
        RestrictionType::Strided,
        num_elem,
        elem_size,
        block_size,
        num_comp,
        1,
        l_size,
        Some(strides),
    )?;
    build(ceed, cap, shape, IndexData::default())
}

impl ElemRestriction {
    /// Offset-based restriction.
    ///
    /// Node `i`, component `j` of element `k` reads L-vector entry
    /// `offsets[k*elem_size + i] + j*comp_stride`.
    #[allow(clippy::too_many_arguments)]
    pub fn create<'a>(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        mem_type: MemType,
        offsets: impl Into<HostArray<'a, CeedInt>>,
    ) -> Result<Self, CeedError> {
        create_offset_based(
            ceed,
            RestrictionType::Standard,
            num_elem,
            elem_size,
            1,
            num_comp,
            comp_stride,
            l_size,
            mem_type,
            RawIndex {
                offsets: offsets.into(),
                orients: None,
                curl_orients: None,
            },
        )
    }

    /// Offset-based restriction with a sign flip (`true` = negate) per node.
    #[allow(clippy::too_many_arguments)]
    pub fn create_oriented<'a>(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        mem_type: MemType,
        offsets: impl Into<HostArray<'a, CeedInt>>,
        orients: impl Into<HostArray<'a, bool>>,
    ) -> Result<Self, CeedError> {
        create_offset_based(
            ceed,
            RestrictionType::Oriented,
            num_elem,
            elem_size,
            1,
            num_comp,
            comp_stride,
            l_size,
            mem_type,
            RawIndex {
                offsets: offsets.into(),
                orients: Some(orients.into()),
                curl_orients: None,
            },
        )
    }

    /// Offset-based restriction with a tridiagonal transform per node.
    ///
    /// `curl_orients` has shape `[num_elem, 3*elem_size]`; row entries
    /// `3n, 3n+1, 3n+2` are the sub-, main and super-diagonal of node `n`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_curl_oriented<'a>(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        mem_type: MemType,
        offsets: impl Into<HostArray<'a, CeedInt>>,
        curl_orients: impl Into<HostArray<'a, CeedInt8>>,
    ) -> Result<Self, CeedError> {
        create_offset_based(
            ceed,
            RestrictionType::CurlOriented,
            num_elem,
            elem_size,
            1,
            num_comp,
            comp_stride,
            l_size,
            mem_type,
            RawIndex {
                offsets: offsets.into(),
                orients: None,
                curl_orients: Some(curl_orients.into()),
            },
        )
    }

    /// Strided restriction: node `i`, component `j`, element `k` reads
    /// `i*strides[0] + j*strides[1] + k*strides[2]`.
    ///
    /// Pass [`STRIDES_BACKEND`] to let the backend choose.
    pub fn create_strided(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        num_comp: usize,
        l_size: usize,
        strides: [usize; 3],
    ) -> Result<Self, CeedError> {
        create_strided_impl(ceed, num_elem, elem_size, 1, num_comp, l_size, strides)
    }

    /// Restriction onto a variable number of points per element.
    ///
    /// `offsets` holds `num_elem + 1` absolute range starts into itself,
    /// followed by the `num_points` point indices. Point indices address
    /// `l_size / num_comp` points with components stored contiguously.
    pub fn create_at_points<'a>(
        ceed: &Ceed,
        num_elem: usize,
        num_points: usize,
        num_comp: usize,
        l_size: usize,
        mem_type: MemType,
        offsets: impl Into<HostArray<'a, CeedInt>>,
    ) -> Result<Self, CeedError> {
        let ceed = ceed.resolve_for(Capability::CreateAtPoints)?;
        let offsets = offsets.into();
        if num_comp < 1 {
            return Err(CeedError::InvalidParameter(
                "restriction must have at least 1 component".into(),
            ));
        }
        let e_size = checked_product("num_points * num_comp", &[num_points, num_comp])?;
        if l_size < e_size {
            return Err(CeedError::InvalidParameter(format!(
                "L-vector size {l_size} must be at least num_points * num_comp = {e_size}"
            )));
        }
        let max_points = if mem_type == MemType::Host {
            check_points(offsets.as_slice(), num_elem, num_points, num_comp, l_size)?
        } else {
            let total = num_elem
                .checked_add(1)
                .and_then(|h| h.checked_add(num_points))
                .ok_or_else(|| overflow("num_elem + num_points"))?;
            check_len("points offsets", offsets.len(), total)?;
            0
        };
        let shape = RestrictionShape {
            rstr_type: RestrictionType::Points,
            num_elem,
            elem_size: max_points,
            num_comp,
            comp_stride: 1,
            l_size,
            e_size,
            block_size: 1,
            num_block: num_elem,
            num_points,
            strides: None,
        };
        let data = IndexData {
            mem_type,
            offsets: Some(offsets.into_store()),
            ..Default::default()
        };
        build(ceed, Capability::CreateAtPoints, shape, data)
    }

    /// Blocked offset-based restriction; `offsets` are given unblocked and
    /// permuted and padded here.
    #[allow(clippy::too_many_arguments)]
    pub fn create_blocked<'a>(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        block_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        mem_type: MemType,
        offsets: impl Into<HostArray<'a, CeedInt>>,
    ) -> Result<Self, CeedError> {
        create_offset_based(
            ceed,
            RestrictionType::Standard,
            num_elem,
            elem_size,
            block_size,
            num_comp,
            comp_stride,
            l_size,
            mem_type,
            RawIndex {
                offsets: offsets.into(),
                orients: None,
                curl_orients: None,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_blocked_oriented<'a>(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        block_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        mem_type: MemType,
        offsets: impl Into<HostArray<'a, CeedInt>>,
        orients: impl Into<HostArray<'a, bool>>,
    ) -> Result<Self, CeedError> {
        create_offset_based(
            ceed,
            RestrictionType::Oriented,
            num_elem,
            elem_size,
            block_size,
            num_comp,
            comp_stride,
            l_size,
            mem_type,
            RawIndex {
                offsets: offsets.into(),
                orients: Some(orients.into()),
                curl_orients: None,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_blocked_curl_oriented<'a>(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        block_size: usize,
        num_comp: usize,
        comp_stride: usize,
        l_size: usize,
        mem_type: MemType,
        offsets: impl Into<HostArray<'a, CeedInt>>,
        curl_orients: impl Into<HostArray<'a, CeedInt8>>,
    ) -> Result<Self, CeedError> {
        create_offset_based(
            ceed,
            RestrictionType::CurlOriented,
            num_elem,
            elem_size,
            block_size,
            num_comp,
            comp_stride,
            l_size,
            mem_type,
            RawIndex {
                offsets: offsets.into(),
                orients: None,
                curl_orients: Some(curl_orients.into()),
            },
        )
    }

    pub fn create_blocked_strided(
        ceed: &Ceed,
        num_elem: usize,
        elem_size: usize,
        block_size: usize,
        num_comp: usize,
        l_size: usize,
        strides: [usize; 3],
    ) -> Result<Self, CeedError> {
        create_strided_impl(
            ceed, num_elem, elem_size, block_size, num_comp, l_size, strides,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ceed() -> Ceed {
        Ceed::init("/cpu/self/ref/serial").unwrap()
    }

    #[test]
    fn e_size_follows_block_padding() {
        let offsets: Vec<CeedInt> = (0..10).collect();
        let r = ElemRestriction::create_blocked(&ceed(), 5, 2, 4, 1, 1, 10, MemType::Host, &offsets)
            .unwrap();
        assert_eq!(r.num_blocks(), 2);
        assert_eq!(r.e_size(), 2 * 4 * 2);
    }

    #[test]
    fn rejects_bad_sizes() {
        let c = ceed();
        let err = ElemRestriction::create(&c, 1, 0, 1, 1, 1, MemType::Host, &[] as &[CeedInt; 0])
            .unwrap_err();
        assert!(matches!(err, CeedError::InvalidParameter(_)));
        let err = ElemRestriction::create(&c, 1, 1, 2, 0, 4, MemType::Host, &[0]).unwrap_err();
        assert!(matches!(err, CeedError::InvalidParameter(_)));
        let err = ElemRestriction::create_blocked(&c, 1, 1, 0, 1, 1, 4, MemType::Host, &[0])
            .unwrap_err();
        assert!(matches!(err, CeedError::InvalidParameter(_)));
    }

    #[test]
    fn offsets_are_range_checked_including_last_component() {
        let c = ceed();
        let err = ElemRestriction::create(&c, 1, 2, 2, 2, 4, MemType::Host, &[0, 2]).unwrap_err();
        assert_eq!(
            err,
            CeedError::OffsetOutOfRange {
                elem: 0,
                node: 1,
                offset: 2,
                l_size: 4
            }
        );
        assert!(ElemRestriction::create(&c, 1, 2, 1, 1, 4, MemType::Host, &[-1, 0]).is_err());
    }

    #[test]
    fn array_shapes_are_checked() {
        let c = ceed();
        let err = ElemRestriction::create_curl_oriented(
            &c,
            1,
            2,
            1,
            1,
            2,
            MemType::Host,
            &[0, 1],
            &[0 as CeedInt8, 1, 0],
        )
        .unwrap_err();
        assert_eq!(
            err,
            CeedError::ArrayLength {
                what: "curl orientation",
                expected: 6,
                found: 3
            }
        );
    }

    #[test]
    fn strided_bounds() {
        let c = ceed();
        assert!(ElemRestriction::create_strided(&c, 2, 2, 1, 3, STRIDES_BACKEND).is_err());
        assert!(ElemRestriction::create_strided(&c, 2, 2, 1, 4, [1, 0, 3]).is_err());
        let r = ElemRestriction::create_strided(&c, 2, 2, 1, 5, [1, 0, 3]).unwrap();
        assert_eq!(r.strides().unwrap(), [1, 0, 3]);
    }

    #[test]
    fn points_layout_is_validated() {
        let c = ceed();
        // 2 elements: [p0, p1], [p2]
        let good = [3, 5, 6, 0, 1, 2];
        let r = ElemRestriction::create_at_points(&c, 2, 3, 1, 3, MemType::Host, &good).unwrap();
        assert_eq!(r.max_points_in_element().unwrap(), 2);
        assert_eq!(r.e_size(), 3);

        let decreasing = [3, 2, 6, 0, 1, 2];
        assert!(ElemRestriction::create_at_points(&c, 2, 3, 1, 3, MemType::Host, &decreasing).is_err());
        let out_of_range = [3, 5, 6, 0, 1, 3];
        assert!(matches!(
            ElemRestriction::create_at_points(&c, 2, 3, 1, 3, MemType::Host, &out_of_range),
            Err(CeedError::OffsetOutOfRange { elem: 1, node: 0, .. })
        ));
    }

    #[test]
    fn huge_strides_are_rejected_without_overflow() {
        let c = ceed();
        assert!(matches!(
            ElemRestriction::create(&c, 1, 1, 2, usize::MAX, 10, MemType::Host, &[1]),
            Err(CeedError::InvalidParameter(_))
        ));
        assert!(matches!(
            ElemRestriction::create_strided(&c, 2, 3, 1, 10, [usize::MAX, 0, 0]),
            Err(CeedError::InvalidParameter(_))
        ));
        assert!(matches!(
            ElemRestriction::create_blocked_strided(&c, 2, 3, 2, 1, 10, [0, 0, usize::MAX]),
            Err(CeedError::InvalidParameter(_))
        ));
        assert!(matches!(
            ElemRestriction::create_strided(&c, usize::MAX, 2, 2, 10, STRIDES_BACKEND),
            Err(CeedError::InvalidParameter(_))
        ));
        assert!(matches!(
            ElemRestriction::create_at_points(&c, 1, usize::MAX, 2, 10, MemType::Host, &[2, 2]),
            Err(CeedError::InvalidParameter(_))
        ));
    }

    #[test]
    fn device_memory_is_a_backend_error() {
        let err = ElemRestriction::create(&ceed(), 1, 1, 1, 1, 1, MemType::Device, &[0]).unwrap_err();
        assert_eq!(err, CeedError::Backend("can only provide HOST memory".into()));
    }
}
