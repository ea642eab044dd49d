//! Mesh segmentation into near-developable patches.
//!
//! Greedy breadth-first patch growth: seed at the triangle farthest (in graph
//! distance) from any high-curvature vertex, expand across face adjacency
//! while a cheap pre-flattening proxy — the cumulative angular deviation of
//! admitted normals from the patch's running area-weighted mean normal —
//! stays under budget, then seal and seed again from the unassigned triangle
//! farthest from everything already assigned. The result is an exact
//! partition of the mesh's faces.
//!
//! The pipeline re-invokes [`grow_patches`] on a single offending patch with
//! a tightened budget when its post-flattening distortion exceeds the
//! material limits; retry bookkeeping lives in the pipeline, not here.

use std::collections::VecDeque;

use nalgebra::Vector3;

use crate::algo::curvature::CurvatureField;
use crate::mesh::{FaceId, HalfEdgeMesh, MeshIndex};

/// Assignment state of one triangle in the shared pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    /// Not part of this growth run.
    Excluded,
    /// Up for grabs.
    Unassigned,
    /// Claimed by the patch with this index.
    Assigned(usize),
}

/// The shared unassigned-triangle pool consumed by patch growth.
///
/// Assignment of a triangle to a patch is the one mutation, exposed only
/// through [`claim`](TrianglePool::claim): claim-and-assign is a single
/// operation, so a triangle can never end up in two patches.
#[derive(Debug)]
pub struct TrianglePool {
    state: Vec<PoolState>,
    remaining: usize,
}

impl TrianglePool {
    /// Create a pool over `num_faces` triangles with only `faces` in play.
    pub fn new(num_faces: usize, faces: &[usize]) -> Self {
        let mut state = vec![PoolState::Excluded; num_faces];
        for &f in faces {
            state[f] = PoolState::Unassigned;
        }
        Self {
            state,
            remaining: faces.len(),
        }
    }

    /// Claim a triangle for a patch. Returns false if it was already taken
    /// or is not part of this run.
    pub fn claim(&mut self, face: usize, patch: usize) -> bool {
        if self.state[face] != PoolState::Unassigned {
            return false;
        }
        self.state[face] = PoolState::Assigned(patch);
        self.remaining -= 1;
        true
    }

    /// Whether a triangle is still up for grabs.
    #[inline]
    pub fn is_unassigned(&self, face: usize) -> bool {
        self.state[face] == PoolState::Unassigned
    }

    /// Number of triangles not yet claimed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn is_assigned(&self, face: usize) -> bool {
        matches!(self.state[face], PoolState::Assigned(_))
    }
}

/// An original mesh edge chosen as a segmentation boundary.
///
/// Separates two patches; the seam builder later pairs the corresponding 2D
/// boundary edges on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutEdge {
    /// First endpoint (mesh vertex index).
    pub v0: usize,
    /// Second endpoint (mesh vertex index).
    pub v1: usize,
    /// Patch on one side.
    pub patch_a: usize,
    /// Patch on the other side.
    pub patch_b: usize,
}

/// Partition the given faces into patches by budgeted breadth-first growth.
///
/// `faces` is usually every face of the mesh; the pipeline passes a single
/// patch's faces when re-segmenting it with a tightened budget. `curvature`
/// supplies the cut-seed candidates. `budget` is the cumulative
/// normal-deviation allowance per patch, in radians.
///
/// Every face in `faces` ends up in exactly one returned patch.
pub fn grow_patches<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    faces: &[usize],
    curvature: &CurvatureField,
    budget: f64,
) -> Vec<Vec<usize>> {
    if faces.is_empty() {
        return Vec::new();
    }

    let mut pool = TrianglePool::new(mesh.num_faces(), faces);
    let dist_to_high = distance_to_high_curvature(mesh, faces, curvature);
    let mut patches: Vec<Vec<usize>> = Vec::new();

    while pool.remaining() > 0 {
        let seed = if patches.is_empty() {
            // Start as far from trouble as possible.
            faces
                .iter()
                .copied()
                .filter(|&f| pool.is_unassigned(f))
                .max_by_key(|&f| dist_to_high[f])
                .expect("pool is non-empty")
        } else {
            farthest_from_assigned(mesh, faces, &pool)
        };

        let patch_id = patches.len();
        let patch = grow_one_patch(mesh, seed, patch_id, budget, &mut pool);
        patches.push(patch);
    }

    patches
}

/// Grow a single patch from `seed` until no admissible neighbor remains.
fn grow_one_patch<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    seed: usize,
    patch_id: usize,
    budget: f64,
    pool: &mut TrianglePool,
) -> Vec<usize> {
    let mut patch = Vec::new();
    let mut queue = VecDeque::new();

    // Running area-weighted normal of the patch and the deviation spent so far.
    let mut normal_sum = Vector3::zeros();
    let mut deviation_sum = 0.0;

    let claimed = pool.claim(seed, patch_id);
    debug_assert!(claimed);
    patch.push(seed);
    normal_sum += face_area_normal(mesh, seed);
    queue.push_back(seed);

    while let Some(f) = queue.pop_front() {
        for neighbor in mesh.face_neighbors(FaceId::<I>::new(f)) {
            if !neighbor.is_valid() {
                continue;
            }
            let nf = neighbor.index();
            if !pool.is_unassigned(nf) {
                continue;
            }

            let deviation = normal_deviation(&normal_sum, mesh, nf);
            if deviation_sum + deviation > budget {
                continue;
            }

            pool.claim(nf, patch_id);
            deviation_sum += deviation;
            normal_sum += face_area_normal(mesh, nf);
            patch.push(nf);
            queue.push_back(nf);
        }
    }

    patch
}

fn face_area_normal<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, face: usize) -> Vector3<f64> {
    let f = FaceId::<I>::new(face);
    mesh.face_normal(f) * mesh.face_area(f)
}

/// Angle between a face's normal and the patch's running mean normal.
fn normal_deviation<I: MeshIndex>(
    normal_sum: &Vector3<f64>,
    mesh: &HalfEdgeMesh<I>,
    face: usize,
) -> f64 {
    let len = normal_sum.norm();
    if len < 1e-12 {
        return 0.0;
    }
    let mean = normal_sum / len;
    let n = mesh.face_normal(FaceId::<I>::new(face));
    if n.norm() < 1e-12 {
        // Degenerate face: admit for free, the distortion evaluator will
        // not count it either.
        return 0.0;
    }
    mean.dot(&n).clamp(-1.0, 1.0).acos()
}

/// Multi-source BFS distance (in face hops) from faces touching a
/// high-curvature vertex. Faces unreachable from any such vertex get
/// `usize::MAX`.
fn distance_to_high_curvature<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    faces: &[usize],
    curvature: &CurvatureField,
) -> Vec<usize> {
    let mut in_play = vec![false; mesh.num_faces()];
    for &f in faces {
        in_play[f] = true;
    }

    let mut dist = vec![usize::MAX; mesh.num_faces()];
    let mut queue = VecDeque::new();

    for &f in faces {
        let touches_high = mesh
            .face_triangle(FaceId::<I>::new(f))
            .iter()
            .any(|&v| curvature.is_high(v));
        if touches_high {
            dist[f] = 0;
            queue.push_back(f);
        }
    }

    while let Some(f) = queue.pop_front() {
        for neighbor in mesh.face_neighbors(FaceId::<I>::new(f)) {
            if !neighbor.is_valid() {
                continue;
            }
            let nf = neighbor.index();
            if in_play[nf] && dist[nf] == usize::MAX {
                dist[nf] = dist[f] + 1;
                queue.push_back(nf);
            }
        }
    }

    dist
}

/// The unassigned face farthest (BFS over unassigned faces) from any
/// assigned face. Falls back to the first unassigned face for disconnected
/// leftovers.
fn farthest_from_assigned<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    faces: &[usize],
    pool: &TrianglePool,
) -> usize {
    let mut dist = vec![usize::MAX; mesh.num_faces()];
    let mut queue = VecDeque::new();

    // Sources: unassigned faces adjacent to an assigned one.
    for &f in faces {
        if !pool.is_unassigned(f) {
            continue;
        }
        let frontier = mesh
            .face_neighbors(FaceId::<I>::new(f))
            .iter()
            .any(|n| n.is_valid() && pool.is_assigned(n.index()));
        if frontier {
            dist[f] = 0;
            queue.push_back(f);
        }
    }

    let mut best = None;
    while let Some(f) = queue.pop_front() {
        best = Some(f);
        for neighbor in mesh.face_neighbors(FaceId::<I>::new(f)) {
            if !neighbor.is_valid() {
                continue;
            }
            let nf = neighbor.index();
            if pool.is_unassigned(nf) && dist[nf] == usize::MAX {
                dist[nf] = dist[f] + 1;
                queue.push_back(nf);
            }
        }
    }

    // BFS visits in increasing distance, so the last pop is the farthest.
    best.unwrap_or_else(|| {
        faces
            .iter()
            .copied()
            .find(|&f| pool.is_unassigned(f))
            .expect("caller checked remaining > 0")
    })
}

/// Collect the cut edges implied by a face-to-patch assignment: every
/// interior mesh edge whose two faces landed in different patches.
pub fn cut_edges<I: MeshIndex>(mesh: &HalfEdgeMesh<I>, assignment: &[usize]) -> Vec<CutEdge> {
    let mut cuts = Vec::new();

    for he in mesh.halfedge_ids() {
        let twin = mesh.twin(he);
        if he.index() > twin.index() {
            continue; // Visit each edge once.
        }
        let fa = mesh.face_of(he);
        let fb = mesh.face_of(twin);
        if !fa.is_valid() || !fb.is_valid() {
            continue;
        }
        let pa = assignment[fa.index()];
        let pb = assignment[fb.index()];
        if pa != pb {
            cuts.push(CutEdge {
                v0: mesh.origin(he).index(),
                v1: mesh.dest(he).index(),
                patch_a: pa,
                patch_b: pb,
            });
        }
    }

    cuts
}
