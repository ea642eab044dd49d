//! Seam allowance offsetting of panel boundary polygons.
//!
//! Offsets a simple polygon outward by the material's allowance width using
//! mitered corners. Convex corner miters are clamped so a near-degenerate
//! spike cannot shoot the offset point far away; concave corners get a flat
//! cap at exactly the allowance width. A negative width shrinks instead,
//! which also gives the obvious round-trip test.
//!
//! The offset of a valid boundary can still self-intersect (a narrow neck
//! swallowed by the width); that is reported as [`OffsetResult::SelfIntersecting`]
//! and the caller falls back to the un-offset boundary with a warning rather
//! than emitting a tangled cut line.

use nalgebra::{Point2, Vector2};

/// Lower bound on the miter's cosine, capping spike elongation at 4× width.
const MITER_COS_MIN: f64 = 0.25;

/// Result of offsetting one boundary polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum OffsetResult {
    /// A simple offset polygon, same winding as the input.
    Offset(Vec<Point2<f64>>),
    /// The offset curve crossed itself.
    SelfIntersecting,
}

/// Signed area of a polygon; positive for counter-clockwise winding.
pub fn signed_area(polygon: &[Point2<f64>]) -> f64 {
    let n = polygon.len();
    let mut sum = 0.0;
    for i in 0..n {
        let p = &polygon[i];
        let q = &polygon[(i + 1) % n];
        sum += p.x * q.y - q.x * p.y;
    }
    sum / 2.0
}

/// Offset a simple polygon by `width` (positive grows, negative shrinks).
///
/// Consecutive duplicate points are dropped before offsetting. Polygons
/// that degenerate below three distinct vertices are reported as
/// self-intersecting, as is any offset whose edges cross.
pub fn offset_polygon(polygon: &[Point2<f64>], width: f64) -> OffsetResult {
    let points = dedup_consecutive(polygon);
    let n = points.len();
    if n < 3 {
        return OffsetResult::SelfIntersecting;
    }

    // Outward is to the right of the travel direction for clockwise
    // polygons and to the left for counter-clockwise ones.
    let orient = if signed_area(&points) >= 0.0 { 1.0 } else { -1.0 };

    let mut offset = Vec::with_capacity(n);
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let here = points[i];
        let next = points[(i + 1) % n];

        let d0 = (here - prev).normalize();
        let d1 = (next - here).normalize();

        // Outward edge normals.
        let n0 = orient * Vector2::new(d0.y, -d0.x);
        let n1 = orient * Vector2::new(d1.y, -d1.x);

        let bisector_raw = n0 + n1;
        let bisector_len = bisector_raw.norm();
        if bisector_len < 1e-12 {
            // 180° reversal: offset straight out along one normal.
            offset.push(here + n0 * width);
            continue;
        }
        let bisector = bisector_raw / bisector_len;

        let convex = orient * (d0.x * d1.y - d0.y * d1.x) >= 0.0;
        let length = if convex {
            // Mitered: reach the intersection of the two offset edges,
            // clamped so spikes stay bounded.
            width / bisector.dot(&n0).max(MITER_COS_MIN)
        } else {
            // Capped at the bare width.
            width
        };

        offset.push(here + bisector * length);
    }

    // A shrink past the polygon's medial axis flips the winding without
    // necessarily crossing any edge pair; that counts as tangled too.
    let inverted = signed_area(&offset) * signed_area(&points) <= 0.0;

    if inverted || has_self_intersection(&offset) {
        OffsetResult::SelfIntersecting
    } else {
        OffsetResult::Offset(offset)
    }
}

fn dedup_consecutive(polygon: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut points: Vec<Point2<f64>> = Vec::with_capacity(polygon.len());
    for &p in polygon {
        if points.last().map_or(true, |last| (p - last).norm() > 1e-12) {
            points.push(p);
        }
    }
    if points.len() > 1 {
        let first = points[0];
        if (points[points.len() - 1] - first).norm() <= 1e-12 {
            points.pop();
        }
    }
    points
}

/// Brute-force check of every non-adjacent edge pair. Panel boundaries are
/// at most a few hundred vertices, so quadratic is fine here.
fn has_self_intersection(polygon: &[Point2<f64>]) -> bool {
    let n = polygon.len();
    for i in 0..n {
        let a0 = polygon[i];
        let a1 = polygon[(i + 1) % n];
        for j in (i + 1)..n {
            // Skip the shared-endpoint neighbors.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let b0 = polygon[j];
            let b1 = polygon[(j + 1) % n];
            if segments_cross(a0, a1, b0, b1) {
                return true;
            }
        }
    }
    false
}

fn segments_cross(
    a0: Point2<f64>,
    a1: Point2<f64>,
    b0: Point2<f64>,
    b1: Point2<f64>,
) -> bool {
    let d1 = orient2d(b0, b1, a0);
    let d2 = orient2d(b0, b1, a1);
    let d3 = orient2d(a0, a1, b0);
    let d4 = orient2d(a0, a1, b1);

    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// Twice the signed area of triangle (a, b, c).
fn orient2d(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}
