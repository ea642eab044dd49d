//! Pattern output types.
//!
//! A [`Pattern`] is the immutable end product of the pipeline: flat panels
//! with their boundary polygons and allowance outlines, the seam pairs that
//! sew them back together, and the warnings accumulated along the way.
//! Warnings are quality reports, not errors; a pattern with warnings is
//! still usable, it just missed a material limit somewhere.

use std::fmt;

use nalgebra::Point2;

use crate::algo::distortion::DistortionReport;
use crate::algo::seam::SeamPair;

/// One flattened pattern panel.
#[derive(Debug, Clone)]
pub struct Panel {
    /// Panel index within the pattern.
    pub id: usize,

    /// Original mesh face indices covered by this panel.
    pub faces: Vec<usize>,

    /// Boundary polygon in panel coordinates, in traversal order.
    pub boundary: Vec<Point2<f64>>,

    /// Original mesh vertex index for each boundary polygon vertex.
    pub boundary_vertices: Vec<usize>,

    /// Cut line: the boundary offset by the allowance width, or a copy of
    /// the boundary when the offset self-intersected (reported via
    /// [`PatternWarning::AllowanceSelfIntersection`]).
    pub allowance: Vec<Point2<f64>>,

    /// Distortion of the flattened layout.
    pub distortion: DistortionReport,

    /// Whether the flattening energy settled before the iteration cap.
    pub converged: bool,
}

/// A complete generated pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The flattened panels.
    pub panels: Vec<Panel>,

    /// Matched seam pairs across (or within) panels.
    pub seams: Vec<SeamPair>,

    /// Quality warnings accumulated during generation.
    pub warnings: Vec<PatternWarning>,
}

impl Pattern {
    /// Number of panels.
    pub fn num_panels(&self) -> usize {
        self.panels.len()
    }

    /// Whether the pattern was produced without any warning.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Worst stretch over all panels.
    pub fn max_stretch(&self) -> f64 {
        self.panels
            .iter()
            .map(|p| p.distortion.max_stretch)
            .fold(1.0_f64, f64::max)
    }
}

/// A non-fatal quality issue noticed during pattern generation.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternWarning {
    /// A panel's flattening hit the iteration cap before the energy
    /// settled.
    NotConverged {
        /// Affected panel.
        panel: usize,
        /// Iterations spent.
        iterations: usize,
    },

    /// A panel still exceeds the material's stretch limit after all
    /// segmentation retries.
    StretchLimitExceeded {
        /// Affected panel.
        panel: usize,
        /// Measured worst stretch.
        max_stretch: f64,
        /// The material's limit.
        limit: f64,
    },

    /// A panel still exceeds the material's shear limit after all
    /// segmentation retries.
    ShearLimitExceeded {
        /// Affected panel.
        panel: usize,
        /// Measured worst shear deviation, degrees.
        max_shear_deg: f64,
        /// The material's limit, degrees.
        limit: f64,
    },

    /// The allowance offset self-intersected; the panel carries its
    /// un-offset boundary as the cut line instead.
    AllowanceSelfIntersection {
        /// Affected panel.
        panel: usize,
    },

    /// A panel's boundary is not a single loop. With several loops the
    /// largest by area becomes the boundary polygon and the rest are
    /// dropped; with zero loops (a closed patch) the panel's boundary and
    /// allowance polygons are empty.
    MultipleBoundaryLoops {
        /// Affected panel.
        panel: usize,
        /// Total loops found.
        loops: usize,
    },

    /// Generation was cancelled; panels flattened so far are returned
    /// as-is.
    Cancelled,
}

impl fmt::Display for PatternWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternWarning::NotConverged { panel, iterations } => {
                write!(f, "panel {panel}: flattening not converged after {iterations} iterations")
            }
            PatternWarning::StretchLimitExceeded {
                panel,
                max_stretch,
                limit,
            } => write!(
                f,
                "panel {panel}: stretch {max_stretch:.4} exceeds material limit {limit:.4}"
            ),
            PatternWarning::ShearLimitExceeded {
                panel,
                max_shear_deg,
                limit,
            } => write!(
                f,
                "panel {panel}: shear {max_shear_deg:.2}° exceeds material limit {limit:.2}°"
            ),
            PatternWarning::AllowanceSelfIntersection { panel } => {
                write!(f, "panel {panel}: allowance offset self-intersects, using raw boundary")
            }
            PatternWarning::MultipleBoundaryLoops { panel, loops } => {
                if *loops == 0 {
                    write!(f, "panel {panel}: no boundary loop, panel outline is empty")
                } else {
                    write!(f, "panel {panel}: {loops} boundary loops, keeping the largest")
                }
            }
            PatternWarning::Cancelled => write!(f, "pattern generation cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let w = PatternWarning::StretchLimitExceeded {
            panel: 2,
            max_stretch: 1.0832,
            limit: 1.05,
        };
        assert_eq!(
            w.to_string(),
            "panel 2: stretch 1.0832 exceeds material limit 1.0500"
        );

        let w = PatternWarning::Cancelled;
        assert_eq!(w.to_string(), "pattern generation cancelled");
    }

    #[test]
    fn test_empty_pattern_is_clean() {
        let pattern = Pattern {
            panels: Vec::new(),
            seams: Vec::new(),
            warnings: Vec::new(),
        };
        assert!(pattern.is_clean());
        assert_eq!(pattern.num_panels(), 0);
        assert_eq!(pattern.max_stretch(), 1.0);
    }
}
