//! Mesh construction and manifold validation.
//!
//! [`build_from_triangles`] is the single entry point for getting a mesh into
//! the pipeline. It rejects structurally invalid input up front — empty
//! meshes, bad indices, degenerate faces, non-manifold edges and vertices —
//! so every later stage can assume a clean manifold-with-boundary mesh.

use std::collections::HashMap;

use nalgebra::Point3;

use super::halfedge::HalfEdgeMesh;
use super::index::{FaceId, HalfEdgeId, MeshIndex, VertexId};
use crate::error::{PatternError, Result};

/// Build a half-edge mesh from vertices and triangle faces.
///
/// # Arguments
/// * `vertices` - List of vertex positions
/// * `faces` - List of triangles, each as `[v0, v1, v2]` indices with
///   consistent counter-clockwise winding
///
/// # Errors
///
/// * [`PatternError::EmptyMesh`] - no faces
/// * [`PatternError::InvalidVertexIndex`] - a face references a missing vertex
/// * [`PatternError::DegenerateFace`] - repeated indices within a face
/// * [`PatternError::NonManifoldEdge`] - an edge with 3+ incident faces, or
///   two faces traversing it in the same direction
/// * [`PatternError::NonManifoldVertex`] - a vertex whose incident faces do
///   not form a single fan (or single fan-with-boundary)
///
/// # Example
/// ```
/// use selvedge::mesh::{build_from_triangles, HalfEdgeMesh};
/// use nalgebra::Point3;
///
/// let vertices = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ];
/// let faces = vec![[0, 1, 2]];
///
/// let mesh: HalfEdgeMesh = build_from_triangles(&vertices, &faces).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_faces(), 1);
/// ```
pub fn build_from_triangles<I: MeshIndex>(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> Result<HalfEdgeMesh<I>> {
    if faces.is_empty() {
        return Err(PatternError::EmptyMesh);
    }

    validate_faces(vertices.len(), faces)?;
    validate_edges(faces)?;

    let mut mesh = HalfEdgeMesh::with_capacity(vertices.len(), faces.len());

    let vertex_ids: Vec<VertexId<I>> = vertices.iter().map(|&pos| mesh.add_vertex(pos)).collect();

    // Map from directed edge (v0, v1) to half-edge ID.
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId<I>> = HashMap::new();

    // First pass: create interior half-edges and faces.
    for face in faces {
        let [v0, v1, v2] = *face;

        let he0 = HalfEdgeId::<I>::new(mesh.num_halfedges());
        let he1 = HalfEdgeId::<I>::new(mesh.num_halfedges() + 1);
        let he2 = HalfEdgeId::<I>::new(mesh.num_halfedges() + 2);

        for _ in 0..3 {
            mesh.halfedges.push(super::halfedge::HalfEdge::new());
        }

        let face_id = FaceId::<I>::new(mesh.num_faces());
        mesh.faces.push(super::halfedge::Face::new(he0));

        for (he, origin, next, prev) in [
            (he0, v0, he1, he2),
            (he1, v1, he2, he0),
            (he2, v2, he0, he1),
        ] {
            let h = mesh.halfedge_mut(he);
            h.origin = vertex_ids[origin];
            h.next = next;
            h.prev = prev;
            h.face = face_id;
        }

        // Overwritten for shared vertices; fixed up for boundary below.
        mesh.vertex_mut(vertex_ids[v0]).halfedge = he0;
        mesh.vertex_mut(vertex_ids[v1]).halfedge = he1;
        mesh.vertex_mut(vertex_ids[v2]).halfedge = he2;

        edge_map.insert((v0, v1), he0);
        edge_map.insert((v1, v2), he1);
        edge_map.insert((v2, v0), he2);
    }

    // Second pass: link twins, creating boundary half-edges where unmatched.
    for (&(v0, v1), &he) in &edge_map {
        if let Some(&twin) = edge_map.get(&(v1, v0)) {
            mesh.halfedge_mut(he).twin = twin;
        } else {
            let boundary_he = HalfEdgeId::<I>::new(mesh.num_halfedges());
            mesh.halfedges.push(super::halfedge::HalfEdge::new());

            mesh.halfedge_mut(he).twin = boundary_he;
            let bhe = mesh.halfedge_mut(boundary_he);
            bhe.origin = vertex_ids[v1];
            bhe.twin = he;
            // Face stays invalid: this is a boundary half-edge.
        }
    }

    link_boundary_loops(&mut mesh)?;
    fix_boundary_vertex_halfedges(&mut mesh);
    validate_vertex_fans(&mesh, faces)?;

    Ok(mesh)
}

/// Reject out-of-range indices and degenerate faces.
fn validate_faces(num_vertices: usize, faces: &[[usize; 3]]) -> Result<()> {
    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            if vi >= num_vertices {
                return Err(PatternError::InvalidVertexIndex {
                    face: fi,
                    vertex: vi,
                });
            }
        }
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return Err(PatternError::DegenerateFace { face: fi });
        }
    }
    Ok(())
}

/// Reject non-manifold edges before any construction work.
///
/// An undirected edge may be used by at most two faces, and a directed edge
/// by at most one (a repeat means two faces share the edge with the same
/// winding).
fn validate_edges(faces: &[[usize; 3]]) -> Result<()> {
    let mut directed: HashMap<(usize, usize), usize> = HashMap::new();
    let mut undirected: HashMap<(usize, usize), usize> = HashMap::new();

    for face in faces {
        for i in 0..3 {
            let v0 = face[i];
            let v1 = face[(i + 1) % 3];

            let seen = directed.entry((v0, v1)).or_insert(0);
            *seen += 1;
            if *seen > 1 {
                return Err(PatternError::NonManifoldEdge { v0, v1 });
            }

            let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
            let count = undirected.entry(key).or_insert(0);
            *count += 1;
            if *count > 2 {
                return Err(PatternError::NonManifoldEdge {
                    v0: key.0,
                    v1: key.1,
                });
            }
        }
    }
    Ok(())
}

/// Link boundary half-edges into loops via their `next`/`prev` pointers.
///
/// A manifold vertex has at most one outgoing boundary half-edge; a second
/// one means the vertex joins two boundary fans at a point.
fn link_boundary_loops<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) -> Result<()> {
    let boundary_hes: Vec<HalfEdgeId<I>> = mesh
        .halfedge_ids()
        .filter(|&he| mesh.is_boundary_halfedge(he))
        .collect();

    let mut outgoing: HashMap<usize, HalfEdgeId<I>> = HashMap::new();
    for he in &boundary_hes {
        let origin = mesh.origin(*he).index();
        if outgoing.insert(origin, *he).is_some() {
            return Err(PatternError::NonManifoldVertex { vertex: origin });
        }
    }

    for &he in &boundary_hes {
        let dest = mesh.dest(he).index();
        if let Some(&next_he) = outgoing.get(&dest) {
            mesh.halfedge_mut(he).next = next_he;
            mesh.halfedge_mut(next_he).prev = he;
        }
    }
    Ok(())
}

/// Ensure boundary vertices point to a boundary half-edge, so one-ring walks
/// starting there cover the full fan.
fn fix_boundary_vertex_halfedges<I: MeshIndex>(mesh: &mut HalfEdgeMesh<I>) {
    for vid in mesh.vertex_ids().collect::<Vec<_>>() {
        let start_he = mesh.vertex(vid).halfedge;
        if !start_he.is_valid() {
            continue;
        }

        let mut he = start_he;
        loop {
            if mesh.is_boundary_halfedge(he) {
                mesh.vertex_mut(vid).halfedge = he;
                break;
            }
            he = mesh.next(mesh.twin(he));
            if he == start_he {
                break;
            }
        }
    }
}

/// Verify that each vertex's incident faces form a single fan.
///
/// The one-ring walk from the vertex's half-edge visits one fan; if the walk
/// finds fewer faces than the face list says are incident, the vertex joins
/// two fans at a point (a "bowtie") and the mesh is non-manifold.
fn validate_vertex_fans<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, faces: &[[usize; 3]]) -> Result<()> {
    let mut incident_count = vec![0usize; mesh.num_vertices()];
    for face in faces {
        for &vi in face {
            incident_count[vi] += 1;
        }
    }

    for v in mesh.vertex_ids() {
        let walked = mesh.vertex_faces(v).count();
        if walked != incident_count[v.index()] {
            return Err(PatternError::NonManifoldVertex { vertex: v.index() });
        }
    }
    Ok(())
}

/// Convert a half-edge mesh back to a face-vertex representation.
///
/// Returns a (vertices, faces) tuple.
pub fn to_face_vertex<I: MeshIndex>(mesh: &HalfEdgeMesh<I>) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices: Vec<Point3<f64>> = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();

    let faces: Vec<[usize; 3]> = mesh
        .face_ids()
        .map(|f| {
            let [v0, v1, v2] = mesh.face_triangle(f);
            [v0.index(), v1.index(), v2.index()]
        })
        .collect();

    (vertices, faces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3]];
        (vertices, faces)
    }

    #[test]
    fn test_build_square() {
        let (vertices, faces) = square();
        let mesh: HalfEdgeMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_faces(), 2);
        // 6 interior half-edges + 4 boundary half-edges.
        assert_eq!(mesh.num_halfedges(), 10);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_empty_mesh() {
        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&[], &[]);
        assert!(matches!(result, Err(PatternError::EmptyMesh)));
    }

    #[test]
    fn test_invalid_vertex_index() {
        let vertices = vec![Point3::new(0.0, 0.0, 0.0)];
        let faces = vec![[0, 1, 2]];

        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(
            result,
            Err(PatternError::InvalidVertexIndex { .. })
        ));
    }

    #[test]
    fn test_degenerate_face() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let faces = vec![[0, 0, 2]];

        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(result, Err(PatternError::DegenerateFace { .. })));
    }

    #[test]
    fn test_edge_with_three_faces_rejected() {
        // Three triangles sharing the edge (0, 1).
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
            Point3::new(0.5, 0.0, 1.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];

        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(result, Err(PatternError::NonManifoldEdge { .. })));
    }

    #[test]
    fn test_inconsistent_winding_rejected() {
        // Both faces traverse edge (0, 1) in the same direction.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 1, 3]];

        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(result, Err(PatternError::NonManifoldEdge { .. })));
    }

    #[test]
    fn test_bowtie_vertex_rejected() {
        // Two triangles meeting only at vertex 2.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [2, 4, 3]];

        let result: Result<HalfEdgeMesh<u32>> = build_from_triangles(&vertices, &faces);
        assert!(matches!(
            result,
            Err(PatternError::NonManifoldVertex { vertex: 2 })
        ));
    }

    #[test]
    fn test_roundtrip() {
        let (vertices, faces) = square();
        let mesh: HalfEdgeMesh<u32> = build_from_triangles(&vertices, &faces).unwrap();

        let (out_verts, out_faces) = to_face_vertex(&mesh);
        assert_eq!(vertices.len(), out_verts.len());
        assert_eq!(faces, out_faces);

        for (v_in, v_out) in vertices.iter().zip(out_verts.iter()) {
            assert!((v_in - v_out).norm() < 1e-12);
        }
    }
}
