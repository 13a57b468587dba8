//! Closed-form brush distance functions
//!
//! One file per brush. Every function evaluates in canonical space (brush
//! centered at the origin, z as the symmetry axis where one exists) and has
//! a matching canonical bounds function that is symmetric about the origin.
//! World placement is the transform machine's job, never the brush's.
//!
//! Author: Moroya Sakamoto

pub mod box3d;
pub mod cone;
pub mod coninder;
pub mod cylinder;
pub mod ellipsoid;
pub mod plane;
pub mod sphere;
pub mod torus;

pub use box3d::{box3d_bounds, sdf_box3d};
pub use cone::{cone_bounds, sdf_cone};
pub use coninder::{coninder_bounds, sdf_coninder};
pub use cylinder::{cylinder_bounds, sdf_cylinder};
pub use ellipsoid::{ellipsoid_bounds, sdf_ellipsoid};
pub use plane::{plane_bounds, sdf_plane};
pub use sphere::{sdf_sphere, sphere_bounds};
pub use torus::{sdf_torus, torus_bounds};
