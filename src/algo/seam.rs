//! Boundary loop extraction and seam matching.
//!
//! After segmentation, every cut edge of the original mesh appears as a
//! boundary edge on two panels (or twice on the same panel, when a cut opens
//! a tube into a single piece). Because triangle winding is consistent, the
//! two appearances carry the same vertex pair in opposite directed order, so
//! matching is a hash lookup: directed edge (a, b) on one side, (b, a) on
//! the other. Edges of the original mesh boundary have no partner and stay
//! unmatched; those are garment openings, not seams.

use std::collections::{HashMap, HashSet};

/// One side of a seam: an edge on a panel's boundary polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeamSide {
    /// Panel index within the pattern.
    pub panel: usize,
    /// Edge index into the panel's boundary polygon: edge `i` runs from
    /// boundary vertex `i` to vertex `i + 1` (wrapping).
    pub edge: usize,
}

/// A matched pair of boundary edges to be sewn together.
///
/// The two sides traverse the shared mesh edge in opposite directions, so
/// walking both boundaries forward brings corresponding points together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeamPair {
    /// First side, the lower (panel, edge) of the two.
    pub a: SeamSide,
    /// Second side.
    pub b: SeamSide,
}

/// Extract the ordered boundary loops of an indexed triangle patch.
///
/// A directed edge with no reverse counterpart is a boundary edge; chaining
/// them by shared endpoints yields the loops, each returned as a vertex
/// cycle in boundary traversal order. At a pinch vertex with several
/// outgoing boundary edges the walk takes the first unused one, so every
/// boundary edge lands in exactly one loop.
pub fn boundary_loops(faces: &[[usize; 3]], n_vertices: usize) -> Vec<Vec<usize>> {
    let mut directed: HashSet<(usize, usize)> = HashSet::new();
    for face in faces {
        for i in 0..3 {
            directed.insert((face[i], face[(i + 1) % 3]));
        }
    }

    // Boundary edges, grouped by origin.
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n_vertices];
    let mut num_boundary_edges = 0;
    for &(v0, v1) in &directed {
        if !directed.contains(&(v1, v0)) {
            outgoing[v0].push(v1);
            num_boundary_edges += 1;
        }
    }

    let mut loops = Vec::new();
    let mut consumed = 0;

    for start in 0..n_vertices {
        while let Some(first) = pop_edge(&mut outgoing, start) {
            let mut cycle = vec![start, first];
            consumed += 1;

            let mut current = first;
            while current != start {
                let next = pop_edge(&mut outgoing, current)
                    .expect("boundary edges of a valid patch chain into cycles");
                consumed += 1;
                if next == start {
                    break;
                }
                cycle.push(next);
                current = next;
            }

            loops.push(cycle);
        }
    }

    debug_assert_eq!(consumed, num_boundary_edges);
    loops
}

fn pop_edge(outgoing: &mut [Vec<usize>], from: usize) -> Option<usize> {
    outgoing[from].pop()
}

/// Match boundary edges across panels into seam pairs.
///
/// `boundaries[p]` is panel `p`'s boundary polygon as a cycle of original
/// mesh vertex indices. Each returned pair is emitted once, with `a` the
/// lexicographically smaller (panel, edge) side.
pub fn match_seams(boundaries: &[Vec<usize>]) -> Vec<SeamPair> {
    let mut by_edge: HashMap<(usize, usize), SeamSide> = HashMap::new();

    for (panel, boundary) in boundaries.iter().enumerate() {
        for edge in 0..boundary.len() {
            let v0 = boundary[edge];
            let v1 = boundary[(edge + 1) % boundary.len()];
            by_edge.insert((v0, v1), SeamSide { panel, edge });
        }
    }

    let mut pairs = Vec::new();
    for (&(v0, v1), &side) in &by_edge {
        if let Some(&other) = by_edge.get(&(v1, v0)) {
            if (side.panel, side.edge) < (other.panel, other.edge) {
                pairs.push(SeamPair { a: side, b: other });
            }
        }
    }

    pairs.sort_by_key(|p| (p.a.panel, p.a.edge));
    pairs
}
