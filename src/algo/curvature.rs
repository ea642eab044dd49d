//! Curvature and developability analysis.
//!
//! Estimates discrete Gaussian curvature per vertex via the angle defect
//! (`2π − Σθ` for interior vertices, `π − Σθ` on the boundary) normalized by
//! the mixed Voronoi area, and flags vertices whose curvature magnitude
//! exceeds the material's threshold. Those high-curvature vertices seed the
//! segmentation planner's cuts: a region that cannot flatten within the
//! fabric's stretch limit must be cut apart near them.
//!
//! # References
//!
//! - Meyer, M., et al. (2003). "Discrete Differential-Geometry Operators for
//!   Triangulated 2-Manifolds." Visualization and Mathematics III.

use std::f64::consts::PI;

use nalgebra::Point3;
use rayon::prelude::*;

use crate::mesh::{HalfEdgeMesh, MeshIndex, VertexId};

/// Per-vertex curvature estimates and developability flags.
#[derive(Debug, Clone)]
pub struct CurvatureField {
    gaussian: Vec<f64>,
    high: Vec<bool>,
    unreliable: Vec<bool>,
}

impl CurvatureField {
    /// Gaussian curvature estimate at a vertex (0 where unreliable).
    #[inline]
    pub fn gaussian<I: MeshIndex>(&self, v: VertexId<I>) -> f64 {
        self.gaussian[v.index()]
    }

    /// Whether the vertex exceeds the high-curvature threshold.
    #[inline]
    pub fn is_high<I: MeshIndex>(&self, v: VertexId<I>) -> bool {
        self.high[v.index()]
    }

    /// Whether the estimate is unreliable (degenerate mixed area).
    #[inline]
    pub fn is_unreliable<I: MeshIndex>(&self, v: VertexId<I>) -> bool {
        self.unreliable[v.index()]
    }

    /// All Gaussian curvature values, indexed by vertex.
    #[inline]
    pub fn gaussian_values(&self) -> &[f64] {
        &self.gaussian
    }

    /// Number of vertices flagged high-curvature.
    pub fn num_high(&self) -> usize {
        self.high.iter().filter(|&&h| h).count()
    }

    /// Indices of vertices flagged high-curvature.
    pub fn high_vertices(&self) -> impl Iterator<Item = usize> + '_ {
        self.high
            .iter()
            .enumerate()
            .filter_map(|(i, &h)| if h { Some(i) } else { None })
    }

    /// Number of vertices in the field.
    #[inline]
    pub fn len(&self) -> usize {
        self.gaussian.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gaussian.is_empty()
    }
}

/// Analyze curvature for all vertices, flagging those with |K| above
/// `threshold`.
///
/// Boundary vertices are never flagged high: they already lie on a cut, so
/// they cannot seed another. Vertices whose mixed area degenerates to zero
/// are flagged unreliable instead of being assigned a spurious value.
///
/// Runs in parallel across vertices.
pub fn analyze_curvature<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, threshold: f64) -> CurvatureField {
    let n = mesh.num_vertices();

    let samples: Vec<(f64, bool, bool)> = (0..n)
        .into_par_iter()
        .map(|idx| {
            let v = VertexId::<I>::new(idx);
            let area = mixed_area(mesh, v);

            if area < AREA_EPS {
                return (0.0, false, true);
            }

            let on_boundary = mesh.is_boundary_vertex(v);
            let full_angle = if on_boundary { PI } else { 2.0 * PI };
            let defect = full_angle - angle_sum(mesh, v);
            let gaussian = defect / area;

            let high = !on_boundary && gaussian.abs() > threshold;
            (gaussian, high, false)
        })
        .collect();

    let mut gaussian = Vec::with_capacity(n);
    let mut high = Vec::with_capacity(n);
    let mut unreliable = Vec::with_capacity(n);
    for (g, h, u) in samples {
        gaussian.push(g);
        high.push(h);
        unreliable.push(u);
    }

    CurvatureField {
        gaussian,
        high,
        unreliable,
    }
}

const AREA_EPS: f64 = 1e-12;

/// Angle at vertex `a` in triangle (a, b, c).
fn triangle_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let lab = ab.norm();
    let lac = ac.norm();
    if lab < 1e-12 || lac < 1e-12 {
        return 0.0;
    }
    (ab.dot(&ac) / (lab * lac)).clamp(-1.0, 1.0).acos()
}

/// Cotangent of the angle at vertex `a` in triangle (a, b, c).
fn cotangent_angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cross_norm = ab.cross(&ac).norm();
    if cross_norm < 1e-10 {
        0.0
    } else {
        ab.dot(&ac) / cross_norm
    }
}

/// Index (0, 1, 2) of the obtuse corner, if any.
fn obtuse_vertex(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Option<usize> {
    let half_pi = PI / 2.0;
    if triangle_angle(p0, p1, p2) > half_pi {
        Some(0)
    } else if triangle_angle(p1, p0, p2) > half_pi {
        Some(1)
    } else if triangle_angle(p2, p0, p1) > half_pi {
        Some(2)
    } else {
        None
    }
}

/// Mixed Voronoi area at a vertex (Meyer et al.): Voronoi contribution in
/// non-obtuse triangles, area/2 at an obtuse corner, area/4 elsewhere.
fn mixed_area<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
    let mut area = 0.0;

    for f in mesh.vertex_faces(v) {
        let verts = mesh.face_triangle(f);
        let [p0, p1, p2] = mesh.face_positions(f);
        let tri_area = mesh.face_area(f);

        let (local_idx, p_vertex, p_prev, p_next) = if verts[0] == v {
            (0, &p0, &p2, &p1)
        } else if verts[1] == v {
            (1, &p1, &p0, &p2)
        } else {
            (2, &p2, &p1, &p0)
        };

        match obtuse_vertex(&p0, &p1, &p2) {
            None => {
                // Voronoi area: (1/8) (|PR|² cot Q + |PQ|² cot R).
                let pr = p_next - p_vertex;
                let pq = p_prev - p_vertex;
                let cot_q = cotangent_angle(p_prev, p_vertex, p_next);
                let cot_r = cotangent_angle(p_next, p_vertex, p_prev);
                area += 0.125 * (pr.norm_squared() * cot_q + pq.norm_squared() * cot_r);
            }
            Some(obtuse_idx) if obtuse_idx == local_idx => area += tri_area / 2.0,
            Some(_) => area += tri_area / 4.0,
        }
    }

    area
}

/// Sum of incident triangle angles at a vertex.
fn angle_sum<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, v: VertexId<I>) -> f64 {
    let mut sum = 0.0;
    for f in mesh.vertex_faces(v) {
        let verts = mesh.face_triangle(f);
        let [p0, p1, p2] = mesh.face_positions(f);
        sum += if verts[0] == v {
            triangle_angle(&p0, &p1, &p2)
        } else if verts[1] == v {
            triangle_angle(&p1, &p0, &p2)
        } else {
            triangle_angle(&p2, &p0, &p1)
        };
    }
    sum
}
