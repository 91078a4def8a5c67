//! # mesh-adapt
//!
//! mesh-adapt is the anisotropic metric core of an unstructured mesh
//! adaptation toolchain for scientific computing and PDE codes. It owns the
//! symmetric positive-definite tensor field that defines the non-Euclidean
//! metric every geometric kernel measures with, and the fixed-point driver
//! that schedules coarsening, swapping, refinement, defragmentation and
//! smoothing until the mesh's longest edge settles near the target and its
//! worst element quality clears a threshold.
//!
//! ## Features
//! - Eigen-based SPD projection and metric intersection on monomorphic
//!   2×2/3×3 tensor kernels, with a runtime-dimension tagged tensor for
//!   callers that receive the dimension as data
//! - A dense per-vertex [`MetricField`](metric::MetricField) with
//!   aspect-ratio clamping and message-based reconciliation after mesh
//!   refinement and defragmentation
//! - The [`AdaptiveMesh`](mesh::AdaptiveMesh) trait abstracting the
//!   geometric operators; the mesh itself, its topology and its I/O live
//!   elsewhere
//! - The [`adapt_cycle`](driver::adapt_cycle) driver with deterministic loop
//!   structure and a per-cycle [`CycleReport`](driver::CycleReport)
//! - Optional `rayon` feature for parallel per-vertex field work;
//!   `check-invariants` feature for always-on invariant validation
//!
//! ## Usage
//! Add `mesh-adapt` as a dependency in your `Cargo.toml` and enable features
//! as needed:
//!
//! ```toml
//! [dependencies]
//! mesh-adapt = "0.2"
//! # Optional features:
//! # features = ["rayon", "check-invariants"]
//! ```
//!
//! Per-vertex tensors are supplied row-major; callers holding only the
//! independent upper-triangle components fan them out with
//! [`fan_out_2d`](metric::fan_out_2d) / [`fan_out_3d`](metric::fan_out_3d)
//! before writing them into the field.

pub mod debug_invariants;
pub mod driver;
pub mod error;
pub mod mesh;
pub mod metric;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::driver::{adapt_cycle, AdaptConfig, CycleReport, InnerStop, Termination};
    pub use crate::error::AdaptError;
    pub use crate::mesh::{metric_edge_length, AdaptiveMesh, VertexBirth, VertexId, VertexRemap};
    pub use crate::metric::{
        fan_out_2d, fan_out_3d, MetricField, MetricField2, MetricField3, MetricTensor, SpdTensor,
        Tensor2, Tensor3,
    };
}
