//! Patch flattening by local/global as-rigid-as-possible iteration.
//!
//! Maps one near-developable patch to the plane while minimizing metric
//! distortion. The algorithm alternates a local step (per-triangle best-fit
//! rotations via 2×2 SVD) with a global step (a cotangent-weighted Laplacian
//! solve for the 2D coordinates). The initial layout is an orthographic
//! projection onto the patch's best-fit plane; two anchor vertices remove
//! the remaining rigid-motion freedom, so the output is deterministic up to
//! floating point.
//!
//! Hitting the iteration cap is not an error: the flattener returns the best
//! layout found with [`FlattenOutcome::converged`] set to `false`, and the
//! pipeline downgrades that to a warning on the panel.
//!
//! # References
//!
//! - Liu, L., Zhang, L., Xu, Y., Gotsman, C., & Gortler, S. J. (2008).
//!   "A Local/Global Approach to Mesh Parameterization." SGP 2008.

mod sparse;

pub use sparse::{conjugate_gradient, CgOutcome, SparseMatrix};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::{DVector, Matrix2, Matrix3, Point2, Point3, SymmetricEigen, Vector2, Vector3};

use crate::error::{PatternError, Result};

/// Cooperative cancellation flag, checked once per flattening iteration.
///
/// Clone freely; all clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. In-flight flattening stops at the next
    /// iteration boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Options for the local/global flattening loop.
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    /// Cap on local/global iterations.
    pub max_iterations: usize,

    /// Relative energy-decrease threshold that counts as converged.
    pub tolerance: f64,

    /// Cap on conjugate gradient iterations per global solve.
    pub max_cg_iterations: usize,

    /// Relative residual tolerance for the conjugate gradient solver.
    pub cg_tolerance: f64,

    /// Optional cancellation token.
    pub cancel: Option<CancelToken>,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-6,
            max_cg_iterations: 1000,
            cg_tolerance: 1e-8,
            cancel: None,
        }
    }
}

impl FlattenOptions {
    /// Defaults suitable for garment-scale patches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, cap: usize) -> Self {
        self.max_iterations = cap;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Result of flattening one patch.
#[derive(Debug, Clone)]
pub struct FlattenOutcome {
    /// 2D position per patch vertex, anchored: the first pin sits at the
    /// origin, the second on the positive x axis.
    pub coords: Vec<Point2<f64>>,

    /// Local/global iterations performed.
    pub iterations: usize,

    /// Whether the energy decrease dropped below tolerance before the cap.
    pub converged: bool,

    /// Whether the loop was cancelled mid-flight.
    pub cancelled: bool,

    /// Final as-rigid-as-possible energy.
    pub energy: f64,
}

/// Flatten one patch given as indexed triangles.
///
/// `vertices` and `faces` are patch-local: every vertex is referenced by
/// some face. Patches without boundary (a fully closed patch can reach the
/// flattener when segmentation produced a single patch on a closed mesh)
/// are handled by pinning two arbitrary vertices; their distortion will be
/// large and the caller's distortion check deals with it.
pub fn flatten_patch(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    options: &FlattenOptions,
) -> Result<FlattenOutcome> {
    if vertices.is_empty() || faces.is_empty() {
        return Err(PatternError::EmptyMesh);
    }

    let n = vertices.len();

    let (pin0, pin1) = select_pins(vertices, faces, n);
    let pin_distance = (vertices[pin1] - vertices[pin0]).norm();

    // Initial layout: orthographic projection onto the best-fit plane,
    // rigidly moved into the anchor frame.
    let mut coords = project_to_best_plane(vertices);
    align_to_pins(&mut coords, pin0, pin1);

    let rest_edges = rest_edge_vectors(vertices, faces);
    let weights = cotangent_weights(vertices, faces);
    let system = build_system_matrix(faces, n, &weights, pin0, pin1);

    let mut u = DVector::from_iterator(n, coords.iter().map(|p| p.x));
    let mut v = DVector::from_iterator(n, coords.iter().map(|p| p.y));

    let mut prev_energy = f64::INFINITY;
    let mut energy = f64::INFINITY;
    let mut iterations = 0;
    let mut converged = false;
    let mut cancelled = false;

    for _ in 0..options.max_iterations {
        if let Some(token) = &options.cancel {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }
        }

        let rotations = best_fit_rotations(&coords, faces, &rest_edges);
        energy = arap_energy(&coords, faces, &rest_edges, &rotations, &weights);

        // Relative decrease below tolerance means the layout has settled.
        if prev_energy.is_finite() {
            let decrease = prev_energy - energy;
            let scale = prev_energy.max(1e-12);
            if decrease.abs() / scale < options.tolerance {
                converged = true;
                break;
            }
        }
        prev_energy = energy;

        let (rhs_u, rhs_v) = build_rhs(faces, n, &weights, &rest_edges, &rotations, pin1, pin_distance);

        // Warm-start each axis from the previous layout.
        let sol_u = conjugate_gradient(&system, &rhs_u, Some(&u), options.max_cg_iterations, options.cg_tolerance);
        let sol_v = conjugate_gradient(&system, &rhs_v, Some(&v), options.max_cg_iterations, options.cg_tolerance);
        u = sol_u.x;
        v = sol_v.x;

        for i in 0..n {
            coords[i] = Point2::new(u[i], v[i]);
        }
        iterations += 1;
    }

    // Snap exactly into the anchor frame; the penalty leaves the pins a
    // hair off their targets.
    align_to_pins(&mut coords, pin0, pin1);

    Ok(FlattenOutcome {
        coords,
        iterations,
        converged,
        cancelled,
        energy,
    })
}

const PIN_PENALTY: f64 = 1e10;

/// Pick the two anchor vertices: a boundary vertex and the boundary vertex
/// farthest from it in 3D. A patch without boundary falls back to vertex 0
/// and its farthest peer.
fn select_pins(vertices: &[Point3<f64>], faces: &[[usize; 3]], n: usize) -> (usize, usize) {
    let boundary = boundary_vertices(faces, n);
    let candidates: Vec<usize> = if boundary.is_empty() {
        (0..n).collect()
    } else {
        boundary
    };

    let pin0 = candidates[0];
    let mut pin1 = pin0;
    let mut best = -1.0;
    for &c in &candidates {
        let d = (vertices[c] - vertices[pin0]).norm_squared();
        if d > best {
            best = d;
            pin1 = c;
        }
    }
    (pin0, pin1)
}

/// Vertices on an undirected edge with only one incident face.
fn boundary_vertices(faces: &[[usize; 3]], n: usize) -> Vec<usize> {
    let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
    for face in faces {
        for i in 0..3 {
            let v0 = face[i];
            let v1 = face[(i + 1) % 3];
            let key = if v0 < v1 { (v0, v1) } else { (v1, v0) };
            *edge_count.entry(key).or_insert(0) += 1;
        }
    }

    let mut on_boundary: HashSet<usize> = HashSet::new();
    for ((v0, v1), count) in edge_count {
        if count == 1 {
            on_boundary.insert(v0);
            on_boundary.insert(v1);
        }
    }

    let mut result: Vec<usize> = (0..n).filter(|v| on_boundary.contains(v)).collect();
    result.sort_unstable();
    result
}

/// Orthographic projection onto the vertex cloud's best-fit plane.
fn project_to_best_plane(vertices: &[Point3<f64>]) -> Vec<Point2<f64>> {
    let n = vertices.len() as f64;
    let centroid: Vector3<f64> = vertices.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n;

    let mut covariance = Matrix3::zeros();
    for p in vertices {
        let d = p.coords - centroid;
        covariance += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(covariance);

    // The normal is the direction of least variance; the other two
    // eigenvectors span the plane.
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let axis_u: Vector3<f64> = eigen.eigenvectors.column(order[2]).clone_owned();
    let axis_v: Vector3<f64> = eigen.eigenvectors.column(order[1]).clone_owned();

    vertices
        .iter()
        .map(|p| {
            let d = p.coords - centroid;
            Point2::new(d.dot(&axis_u), d.dot(&axis_v))
        })
        .collect()
}

/// Rigidly transform the layout so `pin0` sits at the origin and `pin1` on
/// the positive x axis.
fn align_to_pins(coords: &mut [Point2<f64>], pin0: usize, pin1: usize) {
    let origin = coords[pin0].coords;
    for p in coords.iter_mut() {
        p.coords -= origin;
    }

    let axis = coords[pin1].coords;
    let len = axis.norm();
    if len < 1e-12 {
        return;
    }
    let (cos, sin) = (axis.x / len, axis.y / len);
    let rotation = Matrix2::new(cos, sin, -sin, cos);
    for p in coords.iter_mut() {
        p.coords = rotation * p.coords;
    }
}

/// Rest-state 2D edge vectors per face: each 3D triangle laid out in its
/// own plane. Degenerate triangles get zero vectors and drop out of both
/// the energy and the right-hand side.
fn rest_edge_vectors(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Vec<[Vector2<f64>; 3]> {
    let mut edges = Vec::with_capacity(faces.len());

    for face in faces {
        let p0 = &vertices[face[0]];
        let p1 = &vertices[face[1]];
        let p2 = &vertices[face[2]];

        let e1 = p1 - p0;
        let e2 = p2 - p0;

        let e1_len = e1.norm();
        let normal = e1.cross(&e2);
        if e1_len < 1e-10 || normal.norm() < 1e-10 {
            edges.push([Vector2::zeros(); 3]);
            continue;
        }

        let x_axis = e1 / e1_len;
        let y_axis = normal.cross(&e1).normalize();

        let q1 = Vector2::new(e1_len, 0.0);
        let q2 = Vector2::new(e2.dot(&x_axis), e2.dot(&y_axis));

        edges.push([q1, q2 - q1, -q2]);
    }

    edges
}

fn canonical_edge(v0: usize, v1: usize) -> (usize, usize) {
    if v0 < v1 {
        (v0, v1)
    } else {
        (v1, v0)
    }
}

/// Cotangent weight per undirected edge, clamped positive so the system
/// stays positive definite on poor triangulations.
fn cotangent_weights(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
) -> HashMap<(usize, usize), f64> {
    let mut weights: HashMap<(usize, usize), f64> = HashMap::new();

    for face in faces {
        let p0 = &vertices[face[0]];
        let p1 = &vertices[face[1]];
        let p2 = &vertices[face[2]];

        // Each edge accumulates the cotangent of its opposite angle.
        *weights.entry(canonical_edge(face[0], face[1])).or_insert(0.0) += cotangent(p2, p0, p1);
        *weights.entry(canonical_edge(face[1], face[2])).or_insert(0.0) += cotangent(p0, p1, p2);
        *weights.entry(canonical_edge(face[0], face[2])).or_insert(0.0) += cotangent(p1, p0, p2);
    }

    for w in weights.values_mut() {
        *w = (*w * 0.5).max(1e-6);
    }

    weights
}

/// Cotangent of the angle at `a` in triangle (a, b, c).
fn cotangent(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cross_len = ab.cross(&ac).norm();
    if cross_len < 1e-10 {
        0.0
    } else {
        ab.dot(&ac) / cross_len
    }
}

/// Local step: per-triangle rotation closest to the map from rest edges to
/// current layout edges.
fn best_fit_rotations(
    coords: &[Point2<f64>],
    faces: &[[usize; 3]],
    rest_edges: &[[Vector2<f64>; 3]],
) -> Vec<Matrix2<f64>> {
    let mut rotations = Vec::with_capacity(faces.len());

    for (fi, face) in faces.iter().enumerate() {
        let u0 = coords[face[0]].coords;
        let u1 = coords[face[1]].coords;
        let u2 = coords[face[2]].coords;
        let current = [u1 - u0, u2 - u1, u0 - u2];

        let mut s = Matrix2::zeros();
        for i in 0..3 {
            s += current[i] * rest_edges[fi][i].transpose();
        }

        rotations.push(closest_rotation(&s));
    }

    rotations
}

/// Nearest rotation (det +1) to a 2×2 matrix, via SVD.
fn closest_rotation(m: &Matrix2<f64>) -> Matrix2<f64> {
    if m.norm() < 1e-12 {
        return Matrix2::identity();
    }

    let svd = m.svd(true, true);
    let u = svd.u.unwrap();
    let v_t = svd.v_t.unwrap();

    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed[(0, 1)] = -u_fixed[(0, 1)];
        u_fixed[(1, 1)] = -u_fixed[(1, 1)];
        r = u_fixed * v_t;
    }
    r
}

/// Cotangent Laplacian with both anchors penalty-pinned on the diagonal.
fn build_system_matrix(
    faces: &[[usize; 3]],
    n: usize,
    weights: &HashMap<(usize, usize), f64>,
    pin0: usize,
    pin1: usize,
) -> SparseMatrix {
    let mut triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(faces.len() * 12 + 2);

    for face in faces {
        for i in 0..3 {
            let v0 = face[i];
            let v1 = face[(i + 1) % 3];
            let w = weights[&canonical_edge(v0, v1)];

            triplets.push((v0, v0, w));
            triplets.push((v1, v1, w));
            triplets.push((v0, v1, -w));
            triplets.push((v1, v0, -w));
        }
    }

    triplets.push((pin0, pin0, PIN_PENALTY));
    triplets.push((pin1, pin1, PIN_PENALTY));

    SparseMatrix::from_triplets(n, &triplets)
}

/// Global-step right-hand side: rotated rest edges scattered to both edge
/// endpoints, plus the pin targets.
fn build_rhs(
    faces: &[[usize; 3]],
    n: usize,
    weights: &HashMap<(usize, usize), f64>,
    rest_edges: &[[Vector2<f64>; 3]],
    rotations: &[Matrix2<f64>],
    pin1: usize,
    pin_distance: f64,
) -> (DVector<f64>, DVector<f64>) {
    let mut rhs_u = DVector::zeros(n);
    let mut rhs_v = DVector::zeros(n);

    for (fi, face) in faces.iter().enumerate() {
        let r = &rotations[fi];
        for i in 0..3 {
            let v0 = face[i];
            let v1 = face[(i + 1) % 3];
            let w = weights[&canonical_edge(v0, v1)];
            let rotated = r * rest_edges[fi][i];

            // The rest edge points v0 -> v1, so the Laplacian rows want
            // -w * R * e at v0 and +w * R * e at v1.
            rhs_u[v0] -= w * rotated.x;
            rhs_v[v0] -= w * rotated.y;
            rhs_u[v1] += w * rotated.x;
            rhs_v[v1] += w * rotated.y;
        }
    }

    // Anchor targets: pin0 at the origin (contributes nothing), pin1 at its
    // 3D distance along +x.
    rhs_u[pin1] += PIN_PENALTY * pin_distance;

    (rhs_u, rhs_v)
}

/// As-rigid-as-possible energy of the current layout under the given
/// per-face rotations.
fn arap_energy(
    coords: &[Point2<f64>],
    faces: &[[usize; 3]],
    rest_edges: &[[Vector2<f64>; 3]],
    rotations: &[Matrix2<f64>],
    weights: &HashMap<(usize, usize), f64>,
) -> f64 {
    let mut energy = 0.0;

    for (fi, face) in faces.iter().enumerate() {
        let u0 = coords[face[0]].coords;
        let u1 = coords[face[1]].coords;
        let u2 = coords[face[2]].coords;
        let current = [u1 - u0, u2 - u1, u0 - u2];

        for i in 0..3 {
            let w = weights[&canonical_edge(face[i], face[(i + 1) % 3])];
            let target = rotations[fi] * rest_edges[fi][i];
            energy += w * (current[i] - target).norm_squared();
        }
    }

    energy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes::{flat_grid, hemisphere, pyramid};
    use approx::assert_relative_eq;

    fn edge_len(coords: &[Point2<f64>], a: usize, b: usize) -> f64 {
        (coords[a] - coords[b]).norm()
    }

    #[test]
    fn test_flat_patch_is_isometric() {
        let (vertices, faces) = flat_grid(3, 1.0);
        let outcome = flatten_patch(&vertices, &faces, &FlattenOptions::new()).unwrap();

        assert!(outcome.converged);
        assert!(!outcome.cancelled);

        // Every mesh edge keeps its length.
        for face in &faces {
            for i in 0..3 {
                let a = face[i];
                let b = face[(i + 1) % 3];
                let d3 = (vertices[a] - vertices[b]).norm();
                let d2 = edge_len(&outcome.coords, a, b);
                assert_relative_eq!(d2, d3, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_output_is_anchored() {
        let (vertices, faces) = flat_grid(2, 1.0);
        let outcome = flatten_patch(&vertices, &faces, &FlattenOptions::new()).unwrap();

        let (pin0, pin1) = select_pins(&vertices, &faces, vertices.len());
        assert!(outcome.coords[pin0].coords.norm() < 1e-9);
        assert!(outcome.coords[pin1].y.abs() < 1e-9);
        assert!(outcome.coords[pin1].x > 0.0);
    }

    #[test]
    fn test_rigid_motion_invariance() {
        use nalgebra::Rotation3;

        let (vertices, faces) = flat_grid(2, 1.0);
        let rotation = Rotation3::from_euler_angles(0.4, -1.1, 2.3);
        let moved: Vec<_> = vertices
            .iter()
            .map(|p| rotation * p + Vector3::new(5.0, -2.0, 7.0))
            .collect();

        let a = flatten_patch(&vertices, &faces, &FlattenOptions::new()).unwrap();
        let b = flatten_patch(&moved, &faces, &FlattenOptions::new()).unwrap();

        // The layouts agree up to reflection: compare pairwise distances.
        for i in 0..vertices.len() {
            for j in (i + 1)..vertices.len() {
                assert_relative_eq!(
                    (a.coords[i] - a.coords[j]).norm(),
                    (b.coords[i] - b.coords[j]).norm(),
                    epsilon = 1e-5
                );
            }
        }
    }

    #[test]
    fn test_tilted_planar_strip_energy_drives_to_zero() {
        // A planar strip tilted out of every coordinate plane: isometric to
        // the plane, so the energy must decrease to zero rather than settle
        // on a nonzero fixed point.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(1.0, 2.0, 1.0),
        ];
        let faces = vec![[0, 1, 3], [0, 3, 2], [2, 3, 5], [2, 5, 4]];
        let outcome = flatten_patch(&vertices, &faces, &FlattenOptions::new()).unwrap();

        assert!(outcome.converged);
        assert!(outcome.energy < 1e-9, "energy {}", outcome.energy);
        for face in &faces {
            for i in 0..3 {
                let (a, b) = (face[i], face[(i + 1) % 3]);
                let d3 = (vertices[a] - vertices[b]).norm();
                assert_relative_eq!(edge_len(&outcome.coords, a, b), d3, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_curved_patch_converges() {
        let (vertices, faces) = pyramid(0.3);
        let outcome = flatten_patch(&vertices, &faces, &FlattenOptions::new()).unwrap();

        assert!(outcome.converged);
        assert!(outcome.energy.is_finite());
        // A shallow pyramid flattens with mild, nonzero residual energy.
        assert!(outcome.energy > 0.0);
    }

    #[test]
    fn test_iteration_cap_not_fatal() {
        let (vertices, faces) = hemisphere(8, 4, 1.0);
        let options = FlattenOptions::new().with_max_iterations(1).with_tolerance(1e-16);
        let outcome = flatten_patch(&vertices, &faces, &options).unwrap();

        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.coords.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn test_cancel_token_stops_early() {
        let (vertices, faces) = hemisphere(8, 4, 1.0);
        let token = CancelToken::new();
        token.cancel();
        let options = FlattenOptions::new().with_cancel(token);
        let outcome = flatten_patch(&vertices, &faces, &options).unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.iterations, 0);
    }

    #[test]
    fn test_empty_input_is_error() {
        let result = flatten_patch(&[], &[], &FlattenOptions::new());
        assert!(matches!(result, Err(PatternError::EmptyMesh)));
    }

    #[test]
    fn test_closest_rotation_strips_scale() {
        let angle: f64 = 0.5;
        let rot = Matrix2::new(angle.cos(), -angle.sin(), angle.sin(), angle.cos());
        let r = closest_rotation(&(2.0 * rot));
        assert!((r - rot).norm() < 1e-10);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-10);
    }
}
