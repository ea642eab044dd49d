//! End-to-end pattern generation.
//!
//! The pipeline runs the stages in order: curvature analysis, greedy
//! segmentation, parallel per-patch flattening and distortion measurement,
//! bounded re-segmentation of patches that miss the material limits, then
//! seam matching and allowance offsetting. Patches are independent between
//! the segmentation and seam stages, so flattening fans out across a rayon
//! worker pool and joins before seams are matched.
//!
//! Only structurally invalid input is a hard error; everything the pipeline
//! discovers about its own output quality is reported as
//! [`PatternWarning`]s on the returned [`Pattern`].

use std::collections::HashMap;

use nalgebra::{Point2, Point3};
use rayon::prelude::*;

use crate::algo::curvature::{analyze_curvature, CurvatureField};
use crate::algo::distortion::{self, DistortionReport};
use crate::algo::flatten::{flatten_patch, CancelToken, FlattenOptions, FlattenOutcome};
use crate::algo::offset::{offset_polygon, signed_area, OffsetResult};
use crate::algo::seam::{boundary_loops, match_seams};
use crate::algo::segment::grow_patches;
use crate::error::{PatternError, Result};
use crate::material::MaterialProfile;
use crate::mesh::{build_from_triangles, FaceId, HalfEdgeMesh, MeshIndex};
use crate::pattern::{Panel, Pattern, PatternWarning};

/// Budget multiplier applied when a patch is re-segmented after missing the
/// material limits.
const BUDGET_TIGHTEN: f64 = 0.5;

/// Generate a pattern for a mesh under a material profile.
pub fn generate_pattern<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    profile: &MaterialProfile,
) -> Result<Pattern> {
    run(mesh, profile, None)
}

/// Like [`generate_pattern`], with cooperative cancellation. On
/// cancellation the partial pattern is returned with a
/// [`PatternWarning::Cancelled`] warning.
pub fn generate_pattern_cancellable<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    profile: &MaterialProfile,
    cancel: CancelToken,
) -> Result<Pattern> {
    run(mesh, profile, Some(cancel))
}

/// Convenience entry point from raw indexed triangles: builds and validates
/// the mesh, then generates the pattern.
pub fn generate_pattern_from_triangles(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    profile: &MaterialProfile,
) -> Result<Pattern> {
    let mesh = build_from_triangles::<u32>(vertices, faces)?;
    generate_pattern(&mesh, profile)
}

/// A patch awaiting flattening, with its remaining retry allowance.
struct WorkItem {
    faces: Vec<usize>,
    retries_left: usize,
    budget: f64,
}

/// A flattened patch with its extraction tables and measurements.
struct FlatPatch {
    /// Original mesh face indices.
    faces: Vec<usize>,
    /// Faces re-indexed into the patch-local vertex space.
    local_faces: Vec<[usize; 3]>,
    /// Patch-local vertex index to original mesh vertex index.
    global_vertices: Vec<usize>,
    outcome: FlattenOutcome,
    report: DistortionReport,
}

fn run<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    profile: &MaterialProfile,
    cancel: Option<CancelToken>,
) -> Result<Pattern> {
    profile.validate()?;
    if mesh.num_faces() == 0 {
        return Err(PatternError::EmptyMesh);
    }

    let threshold = profile.effective_curvature_threshold();
    let curvature = analyze_curvature(mesh, threshold);
    log::debug!(
        "curvature: {}/{} vertices above threshold {:.3}",
        curvature.num_high(),
        curvature.len(),
        threshold
    );

    let budget = profile.effective_normal_budget();
    let all_faces: Vec<usize> = (0..mesh.num_faces()).collect();
    let mut worklist: Vec<WorkItem> = grow_patches(mesh, &all_faces, &curvature, budget)
        .into_iter()
        .map(|faces| WorkItem {
            faces,
            retries_left: profile.max_segmentation_retries,
            budget,
        })
        .collect();
    log::debug!(
        "segmentation: {} initial patches, budget {:.3} rad",
        worklist.len(),
        budget
    );

    let mut finished: Vec<FlatPatch> = Vec::new();
    let mut was_cancelled = false;

    while !worklist.is_empty() {
        let batch = std::mem::take(&mut worklist);

        // Fan out: each patch flattens independently.
        let processed: Vec<(usize, f64, FlatPatch)> = batch
            .into_par_iter()
            .enumerate()
            .map(|(idx, item)| {
                if item.faces.is_empty() {
                    return Err(PatternError::EmptyPatch { patch: idx });
                }
                let flat = flatten_one(mesh, &item.faces, profile, cancel.as_ref())?;
                Ok((item.retries_left, item.budget, flat))
            })
            .collect::<Result<Vec<_>>>()?;

        for (retries_left, item_budget, flat) in processed {
            if flat.outcome.cancelled {
                was_cancelled = true;
                finished.push(flat);
                continue;
            }

            if flat.report.within_limits(profile) || retries_left == 0 || flat.faces.len() == 1 {
                finished.push(flat);
                continue;
            }

            // Missed the limits with retries in hand: re-segment this patch
            // alone under a tighter budget.
            let tightened = item_budget * BUDGET_TIGHTEN;
            log::debug!(
                "patch of {} faces at stretch {:.4}: re-segmenting with budget {:.3}",
                flat.faces.len(),
                flat.report.max_stretch,
                tightened
            );
            let sub = resegment(mesh, &flat.faces, &curvature, tightened);
            worklist.extend(sub.into_iter().map(|faces| WorkItem {
                faces,
                retries_left: retries_left - 1,
                budget: tightened,
            }));
        }
    }

    log::debug!("final segmentation: {} patches", finished.len());

    let mut warnings = Vec::new();
    if was_cancelled {
        warnings.push(PatternWarning::Cancelled);
    }

    let (panels, global_boundaries) = assemble_panels(finished, profile, &mut warnings);
    let seams = match_seams(&global_boundaries);
    log::debug!(
        "assembled {} panels, {} seam pairs, {} warnings",
        panels.len(),
        seams.len(),
        warnings.len()
    );
    for warning in &warnings {
        log::warn!("{warning}");
    }

    Ok(Pattern {
        panels,
        seams,
        warnings,
    })
}

fn resegment<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    faces: &[usize],
    curvature: &CurvatureField,
    budget: f64,
) -> Vec<Vec<usize>> {
    grow_patches(mesh, faces, curvature, budget)
}

/// Extract, flatten, and measure one patch.
fn flatten_one<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    faces: &[usize],
    profile: &MaterialProfile,
    cancel: Option<&CancelToken>,
) -> Result<FlatPatch> {
    let (vertices, local_faces, global_vertices) = extract_patch(mesh, faces);

    let mut options = FlattenOptions::new()
        .with_max_iterations(profile.max_flatten_iterations)
        .with_tolerance(profile.convergence_tolerance);
    if let Some(token) = cancel {
        options = options.with_cancel(token.clone());
    }

    let outcome = flatten_patch(&vertices, &local_faces, &options)?;
    let report = distortion::evaluate(&vertices, &local_faces, &outcome.coords);

    Ok(FlatPatch {
        faces: faces.to_vec(),
        local_faces,
        global_vertices,
        outcome,
        report,
    })
}

/// Re-index a face subset into a compact patch-local vertex space.
fn extract_patch<I: MeshIndex>(
    mesh: &HalfEdgeMesh<I>,
    faces: &[usize],
) -> (Vec<Point3<f64>>, Vec<[usize; 3]>, Vec<usize>) {
    let mut local_of: HashMap<usize, usize> = HashMap::new();
    let mut vertices = Vec::new();
    let mut global_vertices = Vec::new();
    let mut local_faces = Vec::with_capacity(faces.len());

    for &f in faces {
        let tri = mesh.face_triangle(FaceId::<I>::new(f));
        let mut local = [0usize; 3];
        for (k, vid) in tri.iter().enumerate() {
            let g = vid.index();
            let l = *local_of.entry(g).or_insert_with(|| {
                vertices.push(*mesh.position(*vid));
                global_vertices.push(g);
                vertices.len() - 1
            });
            local[k] = l;
        }
        local_faces.push(local);
    }

    (vertices, local_faces, global_vertices)
}

/// Turn flattened patches into panels: pick each patch's boundary polygon,
/// offset the allowance, and collect quality warnings.
fn assemble_panels(
    finished: Vec<FlatPatch>,
    profile: &MaterialProfile,
    warnings: &mut Vec<PatternWarning>,
) -> (Vec<Panel>, Vec<Vec<usize>>) {
    let mut panels = Vec::with_capacity(finished.len());
    let mut global_boundaries = Vec::with_capacity(finished.len());

    for (id, flat) in finished.into_iter().enumerate() {
        let loops = boundary_loops(&flat.local_faces, flat.global_vertices.len());
        // A single loop is the expected shape. Several loops mean holes; no
        // loop at all means a closed patch whose outline stays empty. Both
        // deserve a warning.
        if loops.len() != 1 {
            warnings.push(PatternWarning::MultipleBoundaryLoops {
                panel: id,
                loops: loops.len(),
            });
        }

        // The panel outline is the loop enclosing the most area; extra
        // loops are interior holes (or stray pinches) and are dropped.
        let outline = loops
            .into_iter()
            .max_by(|a, b| {
                let area_a = signed_area(&to_coords(a, &flat.outcome.coords)).abs();
                let area_b = signed_area(&to_coords(b, &flat.outcome.coords)).abs();
                area_a
                    .partial_cmp(&area_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or_default();

        let boundary = to_coords(&outline, &flat.outcome.coords);
        let boundary_vertices: Vec<usize> =
            outline.iter().map(|&v| flat.global_vertices[v]).collect();

        let allowance = if boundary.len() >= 3 {
            match offset_polygon(&boundary, profile.allowance_width) {
                OffsetResult::Offset(points) => points,
                OffsetResult::SelfIntersecting => {
                    warnings.push(PatternWarning::AllowanceSelfIntersection { panel: id });
                    boundary.clone()
                }
            }
        } else {
            boundary.clone()
        };

        if !flat.outcome.converged && !flat.outcome.cancelled {
            warnings.push(PatternWarning::NotConverged {
                panel: id,
                iterations: flat.outcome.iterations,
            });
        }
        if flat.report.max_stretch > profile.stretch_limit {
            warnings.push(PatternWarning::StretchLimitExceeded {
                panel: id,
                max_stretch: flat.report.max_stretch,
                limit: profile.stretch_limit,
            });
        }
        if flat.report.max_shear_deg > profile.shear_limit_deg {
            warnings.push(PatternWarning::ShearLimitExceeded {
                panel: id,
                max_shear_deg: flat.report.max_shear_deg,
                limit: profile.shear_limit_deg,
            });
        }

        global_boundaries.push(boundary_vertices.clone());
        panels.push(Panel {
            id,
            faces: flat.faces,
            boundary,
            boundary_vertices,
            allowance,
            distortion: flat.report,
            converged: flat.outcome.converged,
        });
    }

    (panels, global_boundaries)
}

fn to_coords(local_loop: &[usize], coords: &[Point2<f64>]) -> Vec<Point2<f64>> {
    local_loop.iter().map(|&v| coords[v]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes::{flat_grid, hemisphere, roof};
    use approx::assert_relative_eq;

    fn assert_face_partition(pattern: &Pattern, num_faces: usize) {
        let mut seen = vec![false; num_faces];
        for panel in &pattern.panels {
            for &f in &panel.faces {
                assert!(!seen[f], "face {} in two panels", f);
                seen[f] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "face missing from all panels");
    }

    #[test]
    fn test_flat_grid_is_one_clean_panel() {
        let (vertices, faces) = flat_grid(4, 1.0);
        let profile = MaterialProfile::default();
        let pattern = generate_pattern_from_triangles(&vertices, &faces, &profile).unwrap();

        assert_eq!(pattern.num_panels(), 1);
        assert!(pattern.is_clean(), "warnings: {:?}", pattern.warnings);
        assert!(pattern.seams.is_empty());
        assert_face_partition(&pattern, faces.len());

        let panel = &pattern.panels[0];
        assert!(panel.converged);
        assert_relative_eq!(panel.distortion.max_stretch, 1.0, epsilon = 1e-6);
        // Allowance sits outside the boundary.
        assert!(
            signed_area(&panel.allowance).abs() > signed_area(&panel.boundary).abs()
        );
    }

    #[test]
    fn test_non_manifold_input_is_fatal() {
        // Three faces on one edge.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
            Point3::new(0.5, 0.0, 1.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3], [1, 0, 4]];
        let result = generate_pattern_from_triangles(&vertices, &faces, &MaterialProfile::default());
        assert!(matches!(result, Err(PatternError::NonManifoldEdge { .. })));
    }

    #[test]
    fn test_invalid_profile_is_fatal() {
        let (vertices, faces) = flat_grid(2, 1.0);
        let profile = MaterialProfile::default().with_stretch_limit(0.9);
        let result = generate_pattern_from_triangles(&vertices, &faces, &profile);
        assert!(matches!(result, Err(PatternError::InvalidParameter { .. })));
    }

    #[test]
    fn test_roof_splits_at_ridge_with_matched_seams() {
        let (vertices, faces) = roof();
        // Force a split at the ridge: the roof is developable, so the
        // default budget would keep it whole.
        let profile = MaterialProfile::default().with_normal_deviation_budget(0.5);
        let pattern = generate_pattern_from_triangles(&vertices, &faces, &profile).unwrap();

        assert_eq!(pattern.num_panels(), 2);
        assert!(pattern.is_clean(), "warnings: {:?}", pattern.warnings);
        assert_face_partition(&pattern, faces.len());
        assert_eq!(pattern.seams.len(), 2);

        // Both sides of each seam are the same mesh edge; flattened without
        // distortion, their 2D lengths agree.
        for pair in &pattern.seams {
            let a = &pattern.panels[pair.a.panel];
            let b = &pattern.panels[pair.b.panel];
            let la = (a.boundary[pair.a.edge]
                - a.boundary[(pair.a.edge + 1) % a.boundary.len()])
            .norm();
            let lb = (b.boundary[pair.b.edge]
                - b.boundary[(pair.b.edge + 1) % b.boundary.len()])
            .norm();
            assert_relative_eq!(la, lb, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_seam_sides_traverse_opposite_directions() {
        let (vertices, faces) = roof();
        let profile = MaterialProfile::default().with_normal_deviation_budget(0.5);
        let pattern = generate_pattern_from_triangles(&vertices, &faces, &profile).unwrap();

        for pair in &pattern.seams {
            let a = &pattern.panels[pair.a.panel];
            let b = &pattern.panels[pair.b.panel];
            let a0 = a.boundary_vertices[pair.a.edge];
            let a1 = a.boundary_vertices[(pair.a.edge + 1) % a.boundary_vertices.len()];
            let b0 = b.boundary_vertices[pair.b.edge];
            let b1 = b.boundary_vertices[(pair.b.edge + 1) % b.boundary_vertices.len()];
            assert_eq!((a0, a1), (b1, b0));
        }
    }

    #[test]
    fn test_hemisphere_yields_multiple_panels() {
        let (vertices, faces) = hemisphere(12, 6, 1.0);
        let profile = MaterialProfile::default();
        let pattern = generate_pattern_from_triangles(&vertices, &faces, &profile).unwrap();

        assert!(pattern.num_panels() >= 2);
        assert_face_partition(&pattern, faces.len());
        assert!(!pattern.seams.is_empty());

        // Every panel either meets the limits or carries a warning saying
        // why it does not.
        for panel in &pattern.panels {
            if !panel.distortion.within_limits(&profile) {
                let warned = pattern.warnings.iter().any(|w| {
                    matches!(
                        w,
                        PatternWarning::StretchLimitExceeded { panel: p, .. }
                        | PatternWarning::ShearLimitExceeded { panel: p, .. }
                        if *p == panel.id
                    )
                });
                assert!(warned, "panel {} over limits but not warned", panel.id);
            }
        }
    }

    #[test]
    fn test_closed_patch_warns_about_empty_outline() {
        // A closed tetrahedron segmented into one patch has no boundary at
        // all: the panel ships with an empty outline and says so.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 0.866, 0.0),
            Point3::new(0.5, 0.289, 0.816),
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
        let profile = MaterialProfile::default()
            .with_normal_deviation_budget(10.0)
            .with_max_segmentation_retries(0);
        let pattern = generate_pattern_from_triangles(&vertices, &faces, &profile).unwrap();

        assert_eq!(pattern.num_panels(), 1);
        assert!(pattern.panels[0].boundary.is_empty());
        assert!(pattern.panels[0].allowance.is_empty());
        assert!(pattern
            .warnings
            .contains(&PatternWarning::MultipleBoundaryLoops { panel: 0, loops: 0 }));
    }

    #[test]
    fn test_cancellation_returns_partial_pattern() {
        let (vertices, faces) = hemisphere(8, 4, 1.0);
        let mesh = build_from_triangles::<u32>(&vertices, &faces).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let pattern =
            generate_pattern_cancellable(&mesh, &MaterialProfile::default(), token).unwrap();

        assert!(pattern.warnings.contains(&PatternWarning::Cancelled));
        // Panels exist but none of them iterated.
        assert!(!pattern.panels.is_empty());
        assert!(pattern.panels.iter().all(|p| !p.converged));
    }

    #[test]
    fn test_empty_mesh_is_fatal() {
        let result =
            generate_pattern_from_triangles(&[], &[], &MaterialProfile::default());
        assert!(matches!(result, Err(PatternError::EmptyMesh)));
    }
}
