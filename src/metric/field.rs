//! Per-vertex metric tensor field.
//!
//! A `MetricField` owns one SPD tensor per vertex slot of the mesh it is
//! bound to. The binding is loose on purpose: the field never holds a
//! reference to the mesh. Structural mesh operations communicate vertex
//! churn through messages ([`VertexBirth`] batches from refinement, a
//! [`VertexRemap`] from defragmentation) which the field consumes to
//! rebuild itself, after which [`update_mesh`](MetricField::update_mesh)
//! pushes the regularised tensors back into the mesh's per-vertex cache.
//!
//! Non-finite input tensors are skipped silently at the per-vertex level and
//! surfaced in aggregate through [`non_finite_skips`](MetricField::non_finite_skips).

use crate::debug_invariants::DebugInvariants;
use crate::error::AdaptError;
use crate::mesh::{AdaptiveMesh, VertexBirth, VertexId, VertexRemap};
use crate::metric::tensor::{SpdTensor, Tensor2, Tensor3};

/// Dense per-vertex SPD tensor field of dimension `D`.
#[derive(Clone, Debug, Default)]
pub struct MetricField<const D: usize, T: SpdTensor<D>> {
    tensors: Vec<T>,
    non_finite_skips: u64,
}

/// 2D metric field.
pub type MetricField2 = MetricField<2, Tensor2>;
/// 3D metric field.
pub type MetricField3 = MetricField<3, Tensor3>;

impl<const D: usize, T: SpdTensor<D>> MetricField<D, T> {
    /// Field of `n` zero ("no information") tensors.
    pub fn with_vertices(n: usize) -> Self {
        Self {
            tensors: vec![T::default(); n],
            non_finite_skips: 0,
        }
    }

    /// Field sized to the mesh's current vertex-slot count.
    pub fn for_mesh<M: AdaptiveMesh<D>>(mesh: &M) -> Self {
        Self::with_vertices(mesh.num_vertices())
    }

    /// Number of vertex slots covered by the field.
    #[inline]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the field covers no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Count of non-finite tensors dropped so far. Drops are silent at the
    /// per-vertex level and surfaced only in aggregate.
    #[inline]
    pub fn non_finite_skips(&self) -> u64 {
        self.non_finite_skips
    }

    /// Non-owning view of the tensor at vertex `v`.
    #[inline]
    pub fn metric(&self, v: VertexId) -> Option<&T> {
        self.tensors.get(v.index())
    }

    /// All tensors in slot order.
    #[inline]
    pub fn metrics(&self) -> &[T] {
        &self.tensors
    }

    /// Write the raw row-major `D·D` tensor for vertex `v`, projecting to
    /// SPD. Non-finite input is skipped and counted, not an error.
    ///
    /// # Errors
    /// [`AdaptError::VertexOutOfBounds`] for a slot outside the field;
    /// [`AdaptError::ShapeMismatch`] when `raw.len() != D·D`.
    pub fn try_set_metric(&mut self, raw: &[f64], v: VertexId) -> Result<(), AdaptError> {
        let len = self.tensors.len();
        let slot = self
            .tensors
            .get_mut(v.index())
            .ok_or(AdaptError::VertexOutOfBounds { vertex: v, len })?;
        match T::try_from_raw(raw) {
            Ok(t) => {
                *slot = t;
                #[cfg(any(debug_assertions, feature = "check-invariants"))]
                self.debug_assert_invariants();
                Ok(())
            }
            Err(AdaptError::NonFinite(_)) => {
                self.non_finite_skips += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Write the tensor for vertex `v`.
    ///
    /// # Panics
    /// Panics where [`try_set_metric`](Self::try_set_metric) would error:
    /// out-of-range slots and wrong buffer lengths are programmer errors.
    pub fn set_metric(&mut self, raw: &[f64], v: VertexId) {
        if let Err(e) = self.try_set_metric(raw, v) {
            panic!("metric field write failed: {e}");
        }
    }

    /// Bound every tensor's eigenvalue spread to `λ_max/λ_min ≤ r_max`.
    /// Per-vertex work is independent and runs in parallel when the `rayon`
    /// feature is enabled. Tensors that fail to decompose are skipped and
    /// counted.
    ///
    /// # Errors
    /// [`AdaptError::Config`] when `r_max < 1`.
    pub fn apply_max_aspect_ratio(&mut self, r_max: f64) -> Result<(), AdaptError> {
        if !(r_max >= 1.0) {
            return Err(AdaptError::Config(format!(
                "max aspect ratio must be >= 1, got {r_max}"
            )));
        }

        #[cfg(feature = "rayon")]
        let skips: u64 = {
            use rayon::prelude::*;
            self.tensors
                .par_iter_mut()
                .map(|t| u64::from(t.clamp_aspect_ratio(r_max).is_err()))
                .sum()
        };
        #[cfg(not(feature = "rayon"))]
        let skips: u64 = self
            .tensors
            .iter_mut()
            .map(|t| u64::from(t.clamp_aspect_ratio(r_max).is_err()))
            .sum();

        self.non_finite_skips += skips;
        Ok(())
    }

    /// Scale every tensor by `s`. With `s < 1` this damps the metric, the
    /// documented retry path after a diverged adaptation cycle.
    pub fn scale(&mut self, s: f64) {
        for t in &mut self.tensors {
            t.scale(s);
        }
    }

    /// Grow the field with a refinement batch: each newborn vertex receives
    /// the linear average of its parent edge's endpoint tensors.
    ///
    /// Births are processed in order, so a parent may itself be an earlier
    /// birth of the same batch.
    ///
    /// # Errors
    /// [`AdaptError::VertexOutOfBounds`] when a parent slot is not live at
    /// the time its birth is processed.
    pub fn absorb_births(&mut self, births: &[VertexBirth]) -> Result<(), AdaptError> {
        for birth in births {
            let len = self.tensors.len();
            let pa = *self
                .tensors
                .get(birth.parents[0].index())
                .ok_or(AdaptError::VertexOutOfBounds {
                    vertex: birth.parents[0],
                    len,
                })?;
            let pb = *self
                .tensors
                .get(birth.parents[1].index())
                .ok_or(AdaptError::VertexOutOfBounds {
                    vertex: birth.parents[1],
                    len,
                })?;
            let idx = birth.vertex.index();
            if idx >= self.tensors.len() {
                self.tensors.resize(idx + 1, T::default());
            }
            self.tensors[idx] = T::midpoint(&pa, &pb);
        }
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        self.debug_assert_invariants();
        Ok(())
    }

    /// Rebuild the field from a defragmentation remap: surviving slots keep
    /// their tensors at their new positions, dead slots are dropped.
    ///
    /// # Errors
    /// [`AdaptError::RemapLength`] when the table does not cover exactly the
    /// field's current slots.
    pub fn apply_remap(&mut self, remap: &VertexRemap) -> Result<(), AdaptError> {
        if remap.len() != self.tensors.len() {
            return Err(AdaptError::RemapLength {
                expected: self.tensors.len(),
                found: remap.len(),
            });
        }
        let mut rebuilt = vec![T::default(); remap.new_len()];
        for (old, new) in remap.iter_surviving() {
            rebuilt[new.index()] = self.tensors[old.index()];
        }
        self.tensors = rebuilt;
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        self.debug_assert_invariants();
        Ok(())
    }

    /// Push every tensor into the mesh's per-vertex metric cache.
    ///
    /// # Errors
    /// [`AdaptError::RemapLength`] when the mesh's slot count disagrees with
    /// the field, i.e. a remap or birth message was not applied first.
    pub fn update_mesh<M: AdaptiveMesh<D>>(&self, mesh: &mut M) -> Result<(), AdaptError> {
        if mesh.num_vertices() != self.tensors.len() {
            return Err(AdaptError::RemapLength {
                expected: self.tensors.len(),
                found: mesh.num_vertices(),
            });
        }
        for (i, t) in self.tensors.iter().enumerate() {
            mesh.store_vertex_metric(VertexId::new(i as u32), t.raw())?;
        }
        Ok(())
    }
}

impl<const D: usize, T: SpdTensor<D>> DebugInvariants for MetricField<D, T> {
    fn debug_assert_invariants(&self) {
        crate::adapt_debug_assert_ok!(self.validate_invariants(), "MetricField invalid");
    }

    fn validate_invariants(&self) -> Result<(), AdaptError> {
        for t in &self.tensors {
            if t.has_non_finite() {
                return Err(AdaptError::NonFinite("metric field entry"));
            }
            let m = t.to_mat();
            for i in 0..D {
                for j in (i + 1)..D {
                    if (m[i][j] - m[j][i]).abs() > 1e-12 * (1.0 + m[i][j].abs()) {
                        return Err(AdaptError::NonFinite("asymmetric metric field entry"));
                    }
                }
            }
        }
        Ok(())
    }
}
