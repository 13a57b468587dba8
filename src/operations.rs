//! CSG set-operator math
//!
//! The hard operators are exact; the blend variants use the polynomial
//! smooth min/max kernel, whose influence region is bounded by the
//! threshold `k` (a fact the clipping logic in `types` relies on).
//!
//! Author: Moroya Sakamoto

/// Hard union
#[inline(always)]
pub fn sdf_union(a: f32, b: f32) -> f32 {
    a.min(b)
}

/// Hard intersection
#[inline(always)]
pub fn sdf_inter(a: f32, b: f32) -> f32 {
    a.max(b)
}

/// Hard difference (subtract `b` from `a`)
#[inline(always)]
pub fn sdf_diff(a: f32, b: f32) -> f32 {
    a.max(-b)
}

/// Polynomial smooth minimum
///
/// Branchless k=0 safety: clamps k to epsilon via max().
#[inline(always)]
pub fn smooth_min(a: f32, b: f32, k: f32) -> f32 {
    let k = k.max(1e-10);
    let h = (k - (a - b).abs()).max(0.0) / k;
    a.min(b) - h * h * k * 0.25
}

/// Polynomial smooth maximum
#[inline(always)]
pub fn smooth_max(a: f32, b: f32, k: f32) -> f32 {
    let k = k.max(1e-10);
    let h = (k - (a - b).abs()).max(0.0) / k;
    a.max(b) + h * h * k * 0.25
}

/// Blended union
#[inline(always)]
pub fn smooth_union(a: f32, b: f32, k: f32) -> f32 {
    smooth_min(a, b, k)
}

/// Blended intersection
#[inline(always)]
pub fn smooth_inter(a: f32, b: f32, k: f32) -> f32 {
    smooth_max(a, b, k)
}

/// Blended difference
#[inline(always)]
pub fn smooth_diff(a: f32, b: f32, k: f32) -> f32 {
    smooth_max(a, -b, k)
}
