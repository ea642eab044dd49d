//! Pattern generation algorithms.
//!
//! The pipeline stages, in order of use:
//!
//! - [`curvature`]: discrete Gaussian curvature and cut-seed flags
//! - [`segment`]: greedy growth of near-developable patches
//! - [`flatten`]: local/global as-rigid-as-possible flattening
//! - [`distortion`]: stretch and shear measurement against material limits
//! - [`seam`]: boundary loop extraction and seam pair matching
//! - [`offset`]: seam allowance offsetting of the boundary polygons

pub mod curvature;
pub mod distortion;
pub mod flatten;
pub mod offset;
pub mod seam;
pub mod segment;
