//! # Selvedge
//!
//! A mesh-to-pattern parameterization engine: turns a 3D triangle mesh and a
//! fabric material profile into flat 2D pattern panels that can be cut and
//! sewn back into the surface.
//!
//! The pipeline segments the mesh into near-developable patches guided by
//! discrete Gaussian curvature, flattens each patch with local/global
//! as-rigid-as-possible iteration, measures stretch and shear against the
//! material's limits (re-cutting patches that miss them), then matches seam
//! pairs across panel boundaries and offsets each boundary by the seam
//! allowance.
//!
//! ## Features
//!
//! - **Half-edge data structure**: O(1) adjacency queries with type-safe indices
//! - **Manifold validation**: non-manifold edges and bowtie vertices rejected up front
//! - **Material-driven segmentation**: cut placement derived from the fabric's stretch limit
//! - **Parallel flattening**: independent patches fan out across a rayon pool
//! - **Warnings, not failures**: quality misses are reported on the pattern, never panicked on
//!
//! ## Quick Start
//!
//! ```
//! use selvedge::prelude::*;
//! use nalgebra::Point3;
//!
//! // A single flat quad: already developable.
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2], [0, 2, 3]];
//!
//! let profile = MaterialProfile::default();
//! let pattern = generate_pattern_from_triangles(&vertices, &faces, &profile).unwrap();
//!
//! assert_eq!(pattern.num_panels(), 1);
//! assert!(pattern.is_clean());
//! for panel in &pattern.panels {
//!     println!(
//!         "panel {}: {} boundary points, stretch {:.4}",
//!         panel.id,
//!         panel.boundary.len(),
//!         panel.distortion.max_stretch
//!     );
//! }
//! ```
//!
//! ## Tuning the Material
//!
//! ```
//! use selvedge::prelude::*;
//!
//! // A stiff woven fabric: little stretch, generous allowance.
//! let profile = MaterialProfile::default()
//!     .with_stretch_limit(1.02)
//!     .with_shear_limit_deg(4.0)
//!     .with_allowance_width(0.015);
//! assert!(profile.validate().is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod material;
pub mod mesh;
pub mod pattern;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_meshes;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use selvedge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::flatten::CancelToken;
    pub use crate::error::{PatternError, Result};
    pub use crate::material::MaterialProfile;
    pub use crate::mesh::{
        build_from_triangles, to_face_vertex, Face, FaceId, HalfEdge, HalfEdgeId, HalfEdgeMesh,
        MeshIndex, Vertex, VertexId,
    };
    pub use crate::pattern::{Panel, Pattern, PatternWarning};
    pub use crate::pipeline::{
        generate_pattern, generate_pattern_cancellable, generate_pattern_from_triangles,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
