//! Mesh-facing surface of the metric core.
//!
//! The adapter core owns the *metric* and the *schedule*, not the mesh. This
//! module defines the entire boundary between the two:
//! - [`VertexId`]: a dense slot index into per-vertex arrays. Geometric
//!   kernels may leave dead slots behind; those stay addressable until the
//!   mesh defragments and emits a [`VertexRemap`].
//! - [`VertexBirth`] / [`VertexRemap`]: the remap messages a mesh emits after
//!   structural operations. The metric field consumes them to rebuild itself;
//!   there is no back-pointer from field to mesh.
//! - [`AdaptiveMesh`]: the operator interface the adaptation driver fires.
//! - [`metric_edge_length`]: edge length under an averaged vertex metric,
//!   the one formula every geometric kernel measures with.

use crate::error::AdaptError;
use crate::metric::tensor::SpdTensor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense per-vertex slot index.
///
/// Unlike topological entity handles, slot 0 is a perfectly valid vertex:
/// deletions are expressed through [`VertexRemap`], never through a reserved
/// sentinel value.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct VertexId(u32);

impl VertexId {
    /// Wrap a raw slot index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw slot index.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The slot index as a `usize`, for direct array indexing.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for VertexId {
    #[inline]
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<VertexId> for u32 {
    #[inline]
    fn from(v: VertexId) -> Self {
        v.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A vertex created by edge refinement, with the edge endpoints it bisects.
///
/// The metric field interpolates the new vertex's tensor as the linear
/// average of the parents' tensors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexBirth {
    /// Slot of the newly created vertex.
    pub vertex: VertexId,
    /// Endpoints of the split edge; must predate the refinement batch.
    pub parents: [VertexId; 2],
}

/// Slot remap emitted by [`AdaptiveMesh::defragment`].
///
/// Entry `i` names the new slot of old vertex `i`, or `None` when the slot
/// was dead. Surviving slots map injectively into `0..new_len`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRemap {
    old_to_new: Vec<Option<VertexId>>,
    new_len: usize,
}

impl VertexRemap {
    /// Build a remap table, validating bounds and injectivity.
    ///
    /// # Errors
    /// [`AdaptError::VertexOutOfBounds`] when a target is `≥ new_len`;
    /// [`AdaptError::DuplicateRemapTarget`] when two slots share a target.
    pub fn try_new(
        old_to_new: Vec<Option<VertexId>>,
        new_len: usize,
    ) -> Result<Self, AdaptError> {
        let mut seen = vec![false; new_len];
        for target in old_to_new.iter().flatten() {
            let slot = seen
                .get_mut(target.index())
                .ok_or(AdaptError::VertexOutOfBounds {
                    vertex: *target,
                    len: new_len,
                })?;
            if *slot {
                return Err(AdaptError::DuplicateRemapTarget(*target));
            }
            *slot = true;
        }
        Ok(Self {
            old_to_new,
            new_len,
        })
    }

    /// The identity remap over `len` live slots.
    pub fn identity(len: usize) -> Self {
        Self {
            old_to_new: (0..len).map(|i| Some(VertexId::new(i as u32))).collect(),
            new_len: len,
        }
    }

    /// Number of old slots covered by the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.old_to_new.len()
    }

    /// Whether the table covers no slots at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.old_to_new.is_empty()
    }

    /// Number of slots after defragmentation.
    #[inline]
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// New slot of old vertex `v`, or `None` when the slot was dead.
    #[inline]
    pub fn target(&self, v: VertexId) -> Option<VertexId> {
        self.old_to_new.get(v.index()).copied().flatten()
    }

    /// `(old, new)` pairs for every surviving slot, in old-slot order.
    pub fn iter_surviving(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.old_to_new
            .iter()
            .enumerate()
            .filter_map(|(old, new)| new.map(|n| (VertexId::new(old as u32), n)))
    }
}

/// Length of the edge `(xa, xb)` under the averaged metric
/// `M̄ = (M_a + M_b)/2`: `ℓ_M = √(vᵀ M̄ v)` with `v = x_b − x_a`.
pub fn metric_edge_length<const D: usize, T: SpdTensor<D>>(
    xa: &[f64; D],
    xb: &[f64; D],
    ma: &T,
    mb: &T,
) -> f64 {
    let mbar = T::midpoint(ma, mb).to_mat();
    let mut v = [0.0; D];
    for k in 0..D {
        v[k] = xb[k] - xa[k];
    }
    let mut acc = 0.0;
    for i in 0..D {
        for j in 0..D {
            acc += v[i] * mbar[i][j] * v[j];
        }
    }
    acc.sqrt()
}

/// The geometric-operator surface the adaptation driver schedules.
///
/// The driver fires these in a strict order (coarsen → swap → refine,
/// defragment, smooth) and only ever observes the mesh through
/// [`maximal_edge_length`](Self::maximal_edge_length) and
/// [`min_quality`](Self::min_quality). Structural operations communicate
/// vertex churn back through return values (a refinement batch reports its
/// [`VertexBirth`]es, defragmentation reports a [`VertexRemap`]) so the
/// metric field can reconcile without holding a reference to the mesh.
pub trait AdaptiveMesh<const D: usize> {
    /// Number of vertex slots, dead slots included.
    fn num_vertices(&self) -> usize;

    /// Longest edge length under the cached vertex metrics.
    fn maximal_edge_length(&self) -> f64;

    /// Worst element quality in the current mesh, in `[0, 1]`.
    fn min_quality(&self) -> f64;

    /// Cache the regularised metric for vertex `v`; `raw` is the row-major
    /// `D·D` tensor block.
    fn store_vertex_metric(&mut self, v: VertexId, raw: &[f64]) -> Result<(), AdaptError>;

    /// Collapse edges shorter than `l_low` in metric without creating any
    /// edge longer than `l_ref`. Returns the number of collapses performed.
    fn coarsen(&mut self, l_low: f64, l_ref: f64) -> Result<u32, AdaptError>;

    /// Flip interior faces/edges whose minimum adjacent quality is below
    /// `q_threshold` when the flip strictly improves it. Returns the number
    /// of flips performed.
    fn swap(&mut self, q_threshold: f64) -> Result<u32, AdaptError>;

    /// Split edges longer than `l_ref` in metric. Returns the batch of
    /// vertex births for the metric field to interpolate.
    fn refine(&mut self, l_ref: f64) -> Result<Vec<VertexBirth>, AdaptError>;

    /// Compact dead vertex slots, emitting the remap for per-vertex data.
    fn defragment(&mut self) -> VertexRemap;

    /// Quality-constrained Laplacian vertex relocation.
    fn smart_laplacian(&mut self, iterations: usize, omega: f64) -> Result<(), AdaptError>;

    /// Vertex relocation maximising the worst adjacent element quality.
    fn optimisation_linf(&mut self, iterations: usize) -> Result<(), AdaptError>;
}

#[cfg(test)]
mod layout_tests {
    //! Compile-time assertion that `VertexId` has the same size as `u32`.
    use super::*;
    use static_assertions::{assert_eq_align, assert_eq_size};

    // If this fails, our repr(transparent) guarantee is broken!
    assert_eq_size!(VertexId, u32);
    assert_eq_align!(VertexId, u32);
}
