//! Per-triangle distortion measurement of a flattened layout.
//!
//! For each triangle the 2×2 Jacobian of the map from the triangle's rest
//! plane to its 2D layout is decomposed by SVD into principal stretches
//! σ1 ≥ σ2. Stretch is reported as `max(σ1, 1/σ2)`, so 1.0 means isometric
//! and both stretching and compression count against the fabric's limit.
//! Shear is the angular deviation, in degrees, of the mapped right angle
//! from 90°.

use nalgebra::{Matrix2, Point2, Point3, Vector2};

use crate::material::MaterialProfile;

/// Distortion of a single triangle.
#[derive(Debug, Clone, Copy)]
pub struct TriangleDistortion {
    /// Worst principal stretch factor, ≥ 1.
    pub stretch: f64,
    /// Shear angle deviation from 90°, in degrees.
    pub shear_deg: f64,
}

impl TriangleDistortion {
    /// The distortion of an isometric (or degenerate) triangle.
    pub fn identity() -> Self {
        Self {
            stretch: 1.0,
            shear_deg: 0.0,
        }
    }
}

/// Distortion of a whole flattened patch.
#[derive(Debug, Clone)]
pub struct DistortionReport {
    /// Per-triangle measurements, indexed like the face list.
    pub per_triangle: Vec<TriangleDistortion>,
    /// Worst stretch over all triangles.
    pub max_stretch: f64,
    /// 95th percentile stretch.
    pub p95_stretch: f64,
    /// Worst shear deviation over all triangles, in degrees.
    pub max_shear_deg: f64,
}

impl DistortionReport {
    /// Whether the patch respects the material's stretch and shear limits.
    pub fn within_limits(&self, profile: &MaterialProfile) -> bool {
        self.max_stretch <= profile.stretch_limit && self.max_shear_deg <= profile.shear_limit_deg
    }
}

/// Measure the distortion of a flattened patch.
///
/// `vertices` and `coords` are indexed identically; `faces` reference both.
/// Triangles that are degenerate in 3D are reported as identity (the
/// flattener ignores them too); triangles degenerate only in 2D get
/// infinite stretch, which any material limit rejects.
pub fn evaluate(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    coords: &[Point2<f64>],
) -> DistortionReport {
    let per_triangle: Vec<TriangleDistortion> = faces
        .iter()
        .map(|face| triangle_distortion(vertices, coords, face))
        .collect();

    let max_stretch = per_triangle
        .iter()
        .map(|d| d.stretch)
        .fold(1.0_f64, f64::max);
    let max_shear_deg = per_triangle
        .iter()
        .map(|d| d.shear_deg)
        .fold(0.0_f64, f64::max);
    let p95_stretch = percentile_95(&per_triangle);

    DistortionReport {
        per_triangle,
        max_stretch,
        p95_stretch,
        max_shear_deg,
    }
}

fn triangle_distortion(
    vertices: &[Point3<f64>],
    coords: &[Point2<f64>],
    face: &[usize; 3],
) -> TriangleDistortion {
    let p0 = &vertices[face[0]];
    let p1 = &vertices[face[1]];
    let p2 = &vertices[face[2]];

    // Rest-plane coordinates of the 3D triangle.
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let e1_len = e1.norm();
    let normal = e1.cross(&e2);
    if e1_len < 1e-10 || normal.norm() < 1e-10 {
        return TriangleDistortion::identity();
    }
    let x_axis = e1 / e1_len;
    let y_axis = normal.cross(&e1).normalize();

    let q1 = Vector2::new(e1_len, 0.0);
    let q2 = Vector2::new(e2.dot(&x_axis), e2.dot(&y_axis));

    let u1 = coords[face[1]] - coords[face[0]];
    let u2 = coords[face[2]] - coords[face[0]];

    // J maps rest edges to layout edges: [u1 u2] = J [q1 q2].
    let rest = Matrix2::from_columns(&[q1, q2]);
    let layout = Matrix2::from_columns(&[u1, u2]);
    let inverse = match rest.try_inverse() {
        Some(inv) => inv,
        None => return TriangleDistortion::identity(),
    };
    let jacobian = layout * inverse;

    let svd = jacobian.svd(false, false);
    let sigma1 = svd.singular_values[0].max(svd.singular_values[1]);
    let sigma2 = svd.singular_values[0].min(svd.singular_values[1]);

    let stretch = if sigma2 < 1e-12 {
        f64::INFINITY
    } else {
        sigma1.max(1.0 / sigma2)
    };

    // Angle between the images of the rest frame's axes.
    let jx = jacobian * Vector2::x();
    let jy = jacobian * Vector2::y();
    let denom = jx.norm() * jy.norm();
    let shear_deg = if denom < 1e-15 {
        90.0
    } else {
        let angle = (jx.dot(&jy) / denom).clamp(-1.0, 1.0).acos();
        (angle.to_degrees() - 90.0).abs()
    };

    TriangleDistortion { stretch, shear_deg }
}

/// 95th percentile of stretch, by sorted rank.
fn percentile_95(per_triangle: &[TriangleDistortion]) -> f64 {
    if per_triangle.is_empty() {
        return 1.0;
    }
    let mut stretches: Vec<f64> = per_triangle.iter().map(|d| d.stretch).collect();
    stretches.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((stretches.len() as f64) * 0.95).ceil() as usize;
    stretches[rank.saturating_sub(1).min(stretches.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::flatten::{flatten_patch, FlattenOptions};
    use crate::test_meshes::{flat_grid, hemisphere};
    use approx::assert_relative_eq;

    #[test]
    fn test_isometric_layout_has_unit_stretch() {
        let (vertices, faces) = flat_grid(3, 1.0);
        // The mesh is already planar: its own xy coordinates are an isometry.
        let coords: Vec<Point2<f64>> = vertices.iter().map(|p| Point2::new(p.x, p.y)).collect();

        let report = evaluate(&vertices, &faces, &coords);
        assert_relative_eq!(report.max_stretch, 1.0, epsilon = 1e-9);
        assert_relative_eq!(report.p95_stretch, 1.0, epsilon = 1e-9);
        assert!(report.max_shear_deg < 1e-6);
    }

    #[test]
    fn test_uniform_scale_reads_as_stretch() {
        let (vertices, faces) = flat_grid(2, 1.0);
        let coords: Vec<Point2<f64>> = vertices
            .iter()
            .map(|p| Point2::new(1.1 * p.x, 1.1 * p.y))
            .collect();

        let report = evaluate(&vertices, &faces, &coords);
        assert_relative_eq!(report.max_stretch, 1.1, epsilon = 1e-9);
        assert!(report.max_shear_deg < 1e-6);
    }

    #[test]
    fn test_compression_counts_like_stretch() {
        let (vertices, faces) = flat_grid(2, 1.0);
        let coords: Vec<Point2<f64>> = vertices
            .iter()
            .map(|p| Point2::new(0.8 * p.x, 0.8 * p.y))
            .collect();

        let report = evaluate(&vertices, &faces, &coords);
        // 1 / 0.8 = 1.25.
        assert_relative_eq!(report.max_stretch, 1.25, epsilon = 1e-9);
    }

    #[test]
    fn test_shear_measured_in_degrees() {
        let (vertices, faces) = flat_grid(2, 1.0);
        // x' = x + y tan(10°): pure shear.
        let tan10 = 10.0_f64.to_radians().tan();
        let coords: Vec<Point2<f64>> = vertices
            .iter()
            .map(|p| Point2::new(p.x + tan10 * p.y, p.y))
            .collect();

        let report = evaluate(&vertices, &faces, &coords);
        assert_relative_eq!(report.max_shear_deg, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hemisphere_layout_exceeds_tight_limit() {
        let (vertices, faces) = hemisphere(12, 6, 1.0);
        let outcome = flatten_patch(&vertices, &faces, &FlattenOptions::new()).unwrap();
        let report = evaluate(&vertices, &faces, &outcome.coords);

        // A whole hemisphere cannot flatten within 1%.
        let strict = MaterialProfile::default().with_stretch_limit(1.01);
        assert!(!report.within_limits(&strict));
        assert!(report.max_stretch > 1.01);
    }

    #[test]
    fn test_within_limits_respects_profile() {
        let (vertices, faces) = flat_grid(2, 1.0);
        let coords: Vec<Point2<f64>> = vertices.iter().map(|p| Point2::new(p.x, p.y)).collect();
        let report = evaluate(&vertices, &faces, &coords);

        assert!(report.within_limits(&MaterialProfile::default()));
    }
}
