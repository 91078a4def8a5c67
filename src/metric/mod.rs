//! Anisotropic metric tensors: the measuring stick of the mesh adapter.
//!
//! Every geometric kernel (coarsening, refinement, swapping, smoothing)
//! measures edge lengths and element qualities under a per-vertex SPD tensor
//! field. This module owns that field and its algebra:
//!
//! - [`eigen`]: dense 2×2/3×3 symmetric eigen-decomposition;
//! - [`tensor`]: SPD projection, length queries, and metric intersection on
//!   monomorphic [`Tensor2`]/[`Tensor3`] kernels plus the runtime-dimension
//!   [`MetricTensor`];
//! - [`field`]: the per-vertex [`MetricField`] with aspect-ratio clamping
//!   and mesh reconciliation.

pub mod eigen;
pub mod field;
pub mod tensor;

pub use field::{MetricField, MetricField2, MetricField3};
pub use tensor::{fan_out_2d, fan_out_3d, MetricTensor, SpdTensor, Tensor2, Tensor3};
