//! Surface materials for vertex shading
//!
//! Materials are shared between nodes by `Arc` and compared by address, so
//! two brushes painted from the same handle land in the same vertex slot
//! while two identical-looking handles stay distinct.
//!
//! Two capability tiers exist: every material answers the "chthonic" query
//! (point, normal, view — no external light), and some additionally answer
//! the "photonic" query with an explicit light direction.
//!
//! Author: Moroya Sakamoto

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared material handle; identity is the allocation, not the contents
pub type MaterialShared = Arc<Material>;

/// Closed set of material variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Material {
    /// Constant unlit color
    SolidColor {
        /// Linear RGB
        color: Vec3,
    },
    /// View-dependent wrap BSDF (Palecek 2022, "PBR Based Rendering")
    PbrBr {
        /// Linear RGB albedo
        color: Vec3,
    },
    /// Normal visualization, `n * 0.5 + 0.5`
    DebugNormals,
}

impl Material {
    /// Shared solid-color material
    pub fn solid_color(color: Vec3) -> MaterialShared {
        Arc::new(Material::SolidColor { color })
    }

    /// Shared wrap-BSDF material
    pub fn pbrbr(color: Vec3) -> MaterialShared {
        Arc::new(Material::PbrBr { color })
    }

    /// Shared normal-debug material
    pub fn debug_normals() -> MaterialShared {
        Arc::new(Material::DebugNormals)
    }

    /// True when the material accepts an explicit light direction
    pub fn is_photonic(&self) -> bool {
        matches!(self, Material::PbrBr { .. })
    }

    /// Representative color for UI swatches and placeholder shading
    pub fn guess_color(&self) -> Vec3 {
        match self {
            Material::SolidColor { color } => *color,
            Material::PbrBr { color } => *color,
            Material::DebugNormals => Vec3::ONE,
        }
    }

    /// Shade without an external light
    pub fn eval_chthonic(&self, _point: Vec3, normal: Vec3, view: Vec3) -> Vec4 {
        match self {
            Material::SolidColor { color } => color.extend(1.0),
            Material::PbrBr { color } => {
                let half = (normal * 0.75 + view).normalize_or_zero();
                let d = normal.dot(half).max(0.0).powi(2);
                let f = 1.0 - normal.dot(view).max(0.0);
                let bsdf = d + f * 0.25;
                (*color * bsdf).extend(1.0)
            }
            Material::DebugNormals => (normal * 0.5 + Vec3::splat(0.5)).extend(1.0),
        }
    }

    /// Shade with an external light direction
    ///
    /// Only meaningful when `is_photonic()`; others fall back to the
    /// chthonic response.
    pub fn eval_photonic(&self, point: Vec3, normal: Vec3, view: Vec3, light: Vec3) -> Vec4 {
        match self {
            Material::PbrBr { .. } => self.eval_chthonic(point, normal, -light),
            _ => self.eval_chthonic(point, normal, view),
        }
    }
}

/// Address equality for shared material handles
#[inline]
pub fn same_material(a: &MaterialShared, b: &MaterialShared) -> bool {
    Arc::ptr_eq(a, b)
}
