//! Error types for selvedge.
//!
//! Only structural input invalidity is fatal: a malformed mesh or an invalid
//! material profile aborts the run with one of these errors. Per-panel
//! degradations (non-convergence, exceeded stretch limits, allowance
//! self-intersection) are *not* errors; they surface as
//! [`PatternWarning`](crate::pattern::PatternWarning)s attached to the output.

use thiserror::Error;

/// Result type alias using [`PatternError`].
pub type Result<T> = std::result::Result<T, PatternError>;

/// Fatal errors that abort a pattern-generation run.
#[derive(Error, Debug)]
pub enum PatternError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices (degenerate triangle).
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// An edge has more than two incident faces, or two faces traverse it in
    /// the same direction (inconsistent winding).
    #[error("edge ({v0}, {v1}) is non-manifold")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// A vertex's incident faces do not form a single fan or a single
    /// fan-with-boundary.
    #[error("vertex {vertex} is non-manifold (incident faces form multiple fans)")]
    NonManifoldVertex {
        /// The vertex index.
        vertex: usize,
    },

    /// A patch handed to the flattener has no triangles.
    #[error("patch {patch} has no triangles")]
    EmptyPatch {
        /// The patch index.
        patch: usize,
    },

    /// Invalid material profile parameter.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl PatternError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        PatternError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
