//! Core mesh data structures.
//!
//! The mesh graph is a half-edge (doubly-connected edge list) representation
//! of a triangle mesh, giving O(1) adjacency queries: across-edge face
//! neighbors, ordered one-rings, and ordered boundary loops. It is the
//! read-only foundation every later pipeline stage queries.
//!
//! # Construction
//!
//! Meshes enter through [`build_from_triangles`], which performs full
//! manifold validation — an edge with three incident faces or a bowtie vertex
//! is a fatal input error, reported before any pipeline work starts:
//!
//! ```
//! use selvedge::mesh::{HalfEdgeMesh, build_from_triangles};
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
//! ```

mod builder;
mod halfedge;
mod index;

pub use builder::{build_from_triangles, to_face_vertex};
pub use halfedge::{Face, HalfEdge, HalfEdgeMesh, Vertex};
pub use index::{FaceId, HalfEdgeId, MeshIndex, VertexId};
