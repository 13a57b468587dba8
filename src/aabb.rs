//! Axis-aligned bounding box math
//!
//! Every spatial query in the crate funnels through these boxes: brush
//! canonical bounds, set-operator bound combination, octree cell carving,
//! and meshing grid sizing.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Box spanning the given corners
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An inside-out box that unions as the identity
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// A box covering all of space
    #[inline]
    pub fn infinite() -> Self {
        Self {
            min: Vec3::splat(f32::NEG_INFINITY),
            max: Vec3::splat(f32::INFINITY),
        }
    }

    /// Symmetric box of the given half extents, centered at the origin
    #[inline]
    pub fn symmetric(half_extents: Vec3) -> Self {
        Self {
            min: -half_extents,
            max: half_extents,
        }
    }

    /// True when the box cannot bound anything real: any non-finite
    /// component, or a max that fails to exceed a min on some axis.
    pub fn degenerate(&self) -> bool {
        let finite = self.min.is_finite() && self.max.is_finite();
        !finite || self.max.cmple(self.min).any()
    }

    /// Per-axis size, zero for degenerate boxes
    #[inline]
    pub fn extent(&self) -> Vec3 {
        if self.degenerate() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Geometric center
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Enclosed volume, zero for degenerate boxes
    #[inline]
    pub fn volume(&self) -> f32 {
        let extent = self.extent();
        extent.x * extent.y * extent.z
    }

    /// Smallest cube sharing this box's center and containing it
    pub fn bounding_cube(&self) -> Self {
        let extent = self.extent();
        let half = extent.max_element() * 0.5;
        let center = self.center();
        Self {
            min: center - Vec3::splat(half),
            max: center + Vec3::splat(half),
        }
    }

    /// Box grown by `margin` on every face
    #[inline]
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// Smallest box containing both operands
    #[inline]
    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Largest box contained in both operands (possibly degenerate)
    #[inline]
    pub fn intersection(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Box/box overlap test
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Box/sphere overlap test against the closest point on the box
    pub fn overlaps_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }

    /// Point containment (closed box)
    #[inline]
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}
