//! Fabric material profiles.
//!
//! A [`MaterialProfile`] bundles the fabric parameters and solver limits that
//! drive a pattern-generation run: how much the fabric may stretch and shear,
//! how wide the seam allowance is, and how hard the pipeline may try before
//! accepting an imperfect panel.

use crate::error::{PatternError, Result};

/// Fabric parameters and solver limits for one pattern-generation run.
///
/// Two tunables are normally derived from the stretch limit rather than set
/// directly: the curvature threshold that seeds cuts, and the normal-deviation
/// budget that caps patch growth. A stretchier fabric tolerates more curvature
/// per panel, so both grow with `stretch_limit`. Override them only when the
/// derived values segment badly for a particular mesh.
#[derive(Debug, Clone)]
pub struct MaterialProfile {
    /// Maximum tolerated per-triangle stretch ratio. Must be > 1.
    pub stretch_limit: f64,

    /// Maximum tolerated per-triangle shear deviation, in degrees.
    pub shear_limit_deg: f64,

    /// Seam allowance width, in the mesh's length units.
    pub allowance_width: f64,

    /// Maximum re-segmentation attempts per patch whose distortion exceeds
    /// the limits. Zero disables the retry loop.
    pub max_segmentation_retries: usize,

    /// Iteration cap for the per-patch flattening solver. Must be >= 1.
    pub max_flatten_iterations: usize,

    /// Relative energy-decrease tolerance for flattening convergence.
    /// Must be > 0.
    pub convergence_tolerance: f64,

    /// Override for the high-curvature threshold (|K| above which a vertex
    /// seeds cuts). `None` derives it from the stretch limit.
    pub curvature_threshold: Option<f64>,

    /// Override for the patch-growth normal-deviation budget, in radians.
    /// `None` derives it from the stretch limit.
    pub normal_deviation_budget: Option<f64>,
}

impl Default for MaterialProfile {
    fn default() -> Self {
        Self {
            stretch_limit: 1.05,
            shear_limit_deg: 8.0,
            allowance_width: 0.01,
            max_segmentation_retries: 3,
            max_flatten_iterations: 50,
            convergence_tolerance: 1e-6,
            curvature_threshold: None,
            normal_deviation_budget: None,
        }
    }
}

impl MaterialProfile {
    /// Set the stretch limit.
    pub fn with_stretch_limit(mut self, limit: f64) -> Self {
        self.stretch_limit = limit;
        self
    }

    /// Set the shear limit in degrees.
    pub fn with_shear_limit_deg(mut self, limit: f64) -> Self {
        self.shear_limit_deg = limit;
        self
    }

    /// Set the seam allowance width.
    pub fn with_allowance_width(mut self, width: f64) -> Self {
        self.allowance_width = width;
        self
    }

    /// Set the per-patch re-segmentation retry cap.
    pub fn with_max_segmentation_retries(mut self, retries: usize) -> Self {
        self.max_segmentation_retries = retries;
        self
    }

    /// Set the flattening iteration cap.
    pub fn with_max_flatten_iterations(mut self, iterations: usize) -> Self {
        self.max_flatten_iterations = iterations;
        self
    }

    /// Set the flattening convergence tolerance.
    pub fn with_convergence_tolerance(mut self, tolerance: f64) -> Self {
        self.convergence_tolerance = tolerance;
        self
    }

    /// Override the derived curvature threshold.
    pub fn with_curvature_threshold(mut self, threshold: f64) -> Self {
        self.curvature_threshold = Some(threshold);
        self
    }

    /// Override the derived normal-deviation budget (radians).
    pub fn with_normal_deviation_budget(mut self, budget: f64) -> Self {
        self.normal_deviation_budget = Some(budget);
        self
    }

    /// Validate all parameters, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        if !(self.stretch_limit > 1.0) {
            return Err(PatternError::invalid_param(
                "stretch_limit",
                self.stretch_limit,
                "must be greater than 1.0",
            ));
        }
        if !(self.shear_limit_deg > 0.0) {
            return Err(PatternError::invalid_param(
                "shear_limit_deg",
                self.shear_limit_deg,
                "must be positive",
            ));
        }
        if !(self.allowance_width >= 0.0) || !self.allowance_width.is_finite() {
            return Err(PatternError::invalid_param(
                "allowance_width",
                self.allowance_width,
                "must be finite and non-negative",
            ));
        }
        if self.max_flatten_iterations == 0 {
            return Err(PatternError::invalid_param(
                "max_flatten_iterations",
                self.max_flatten_iterations,
                "must be at least 1",
            ));
        }
        if !(self.convergence_tolerance > 0.0) {
            return Err(PatternError::invalid_param(
                "convergence_tolerance",
                self.convergence_tolerance,
                "must be positive",
            ));
        }
        if let Some(t) = self.curvature_threshold {
            if !(t > 0.0) {
                return Err(PatternError::invalid_param(
                    "curvature_threshold",
                    t,
                    "must be positive",
                ));
            }
        }
        if let Some(b) = self.normal_deviation_budget {
            if !(b > 0.0) {
                return Err(PatternError::invalid_param(
                    "normal_deviation_budget",
                    b,
                    "must be positive",
                ));
            }
        }
        Ok(())
    }

    /// The |K| threshold above which an interior vertex is flagged
    /// high-curvature.
    ///
    /// Derived as `8 * (stretch_limit - 1)` unless overridden: a fabric that
    /// stretches 5% absorbs roughly that much Gaussian curvature per unit
    /// area before a cut is needed.
    pub fn effective_curvature_threshold(&self) -> f64 {
        self.curvature_threshold
            .unwrap_or(8.0 * (self.stretch_limit - 1.0))
    }

    /// The cumulative normal-deviation budget (radians) for patch growth.
    ///
    /// Derived as `40 * (stretch_limit - 1)` clamped to `[0.5, 2π]` unless
    /// overridden.
    pub fn effective_normal_budget(&self) -> f64 {
        self.normal_deviation_budget
            .unwrap_or((40.0 * (self.stretch_limit - 1.0)).clamp(0.5, std::f64::consts::TAU))
    }
}
