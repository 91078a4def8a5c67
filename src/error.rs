//! AdaptError: Unified error type for mesh-adapt public APIs
//!
//! This error type is used throughout the mesh-adapt library to provide robust,
//! non-panicking error handling for all fallible public APIs. The only
//! exception is [`ShapeMismatch`](AdaptError::ShapeMismatch) surfaced through
//! the infallible convenience wrappers: changing a tensor's dimension after it
//! has been fixed is a programmer error, and those wrappers panic with a
//! diagnostic instead of letting the error travel through recoverable control
//! flow.

use crate::mesh::VertexId;
use thiserror::Error;

/// Unified error type for mesh-adapt operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdaptError {
    /// A raw tensor buffer does not match the dimension fixed at first set.
    #[error("tensor shape mismatch: expected {expected} raw components, found {found}")]
    ShapeMismatch {
        /// Raw component count implied by the fixed dimension (`d*d`).
        expected: usize,
        /// Raw component count actually supplied.
        found: usize,
    },
    /// A tensor dimension outside the supported set {2, 3}.
    #[error("unsupported tensor dimension {0} (must be 2 or 3)")]
    UnsupportedDimension(usize),
    /// NaN or Inf encountered in a tensor or an eigen-solver output.
    ///
    /// Local recovery: the offending operator leaves its receiver unchanged.
    #[error("non-finite value encountered in {0}")]
    NonFinite(&'static str),
    /// The adaptation cycle observed a non-finite edge length; fatal for the
    /// current cycle. The caller may damp the metric field and retry.
    #[error("adaptation cycle diverged: maximal edge length = {l_max}")]
    NumericDivergence {
        /// The offending length as reported by the mesh.
        l_max: f64,
    },
    /// A vertex id outside the metric field's slot range.
    #[error("vertex {vertex} out of bounds for field of length {len}")]
    VertexOutOfBounds {
        /// Offending vertex id.
        vertex: VertexId,
        /// Current field length in slots.
        len: usize,
    },
    /// A remap table or mesh whose length disagrees with the field.
    #[error("length mismatch: field holds {expected} slots, peer reports {found}")]
    RemapLength {
        /// Slots currently held by the field.
        expected: usize,
        /// Length reported by the remap table or mesh.
        found: usize,
    },
    /// Two surviving slots remapped onto the same target.
    #[error("remap target {0} assigned more than once")]
    DuplicateRemapTarget(VertexId),
    /// Inconsistent driver configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
