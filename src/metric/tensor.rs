//! Symmetric positive-definite metric tensors.
//!
//! A metric tensor induces a local inner product: the length of an edge with
//! displacement `v` is `√(vᵀ M v)`, so *large* eigenvalues mean *short*
//! edges. Tensors are stored as dense row-major blocks with the upper
//! triangle authoritative; every public mutator leaves the tensor SPD or
//! identically zero. The all-zero tensor is a legal sentinel meaning "no
//! information": it is a fixed point of every operator and a no-op source
//! for [`constrain`](SpdTensor::constrain).
//!
//! Two monomorphic kernels, [`Tensor2`] and [`Tensor3`], carry the hot-path
//! algebra behind the [`SpdTensor`] trait; [`MetricTensor`] is the
//! runtime-dimension tagged union for callers that receive the dimension as
//! data. The dimension of a `MetricTensor` is fixed at construction and a
//! later `set` with a different component count is a fatal shape mismatch.

use crate::error::AdaptError;
use crate::metric::eigen;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aspect-ratio ties below this margin keep `self` as the reference space.
const ASPECT_TIE_TOL: f64 = 1e-12;

fn mat_mul<const D: usize>(a: &[[f64; D]; D], b: &[[f64; D]; D]) -> [[f64; D]; D] {
    let mut out = [[0.0; D]; D];
    for i in 0..D {
        for j in 0..D {
            let mut acc = 0.0;
            for k in 0..D {
                acc += a[i][k] * b[k][j];
            }
            out[i][j] = acc;
        }
    }
    out
}

/// `a · bᵀ`
fn mat_mul_nt<const D: usize>(a: &[[f64; D]; D], b: &[[f64; D]; D]) -> [[f64; D]; D] {
    let mut out = [[0.0; D]; D];
    for i in 0..D {
        for j in 0..D {
            let mut acc = 0.0;
            for k in 0..D {
                acc += a[i][k] * b[j][k];
            }
            out[i][j] = acc;
        }
    }
    out
}

/// `aᵀ · b`
fn mat_mul_tn<const D: usize>(a: &[[f64; D]; D], b: &[[f64; D]; D]) -> [[f64; D]; D] {
    let mut out = [[0.0; D]; D];
    for i in 0..D {
        for j in 0..D {
            let mut acc = 0.0;
            for k in 0..D {
                acc += a[k][i] * b[k][j];
            }
            out[i][j] = acc;
        }
    }
    out
}

fn symmetrise<const D: usize>(m: &mut [[f64; D]; D]) {
    for i in 0..D {
        for j in (i + 1)..D {
            let avg = 0.5 * (m[i][j] + m[j][i]);
            m[i][j] = avg;
            m[j][i] = avg;
        }
    }
}

fn aspect_of<const D: usize>(vals: &[f64; D]) -> f64 {
    let min = vals.iter().copied().fold(f64::INFINITY, f64::min);
    let max = vals.iter().copied().fold(0.0f64, f64::max);
    min / max
}

/// Monomorphic SPD tensor kernel of dimension `D`.
///
/// Implementors supply storage access and the eigen-solver binding; the
/// metric algebra (SPD projection, lengths, intersection, clamping) is
/// provided dimension-generically on top.
pub trait SpdTensor<const D: usize>:
    Copy + Default + PartialEq + Send + Sync + fmt::Debug + 'static
{
    /// Raw component count, `D·D`.
    const RAW_LEN: usize;

    /// Row-major view of the dense block.
    fn raw(&self) -> &[f64];
    /// Mutable row-major view of the dense block.
    fn raw_mut(&mut self) -> &mut [f64];
    /// Copy out as a dense matrix.
    fn to_mat(&self) -> [[f64; D]; D];
    /// Wrap a dense matrix without projection; callers must keep it SPD.
    fn from_mat(m: &[[f64; D]; D]) -> Self;
    /// Eigen-decompose a dense block (signed-absolute eigenvalues, row
    /// eigenvectors).
    fn decompose_mat(m: &[[f64; D]; D]) -> Result<([f64; D], [[f64; D]; D]), AdaptError>;
    /// Recompose `Σ |λ_k| v_k v_kᵀ`.
    fn recompose_mat(vals: &[f64; D], vecs: &[[f64; D]; D]) -> [[f64; D]; D];

    /// Ingest a raw row-major buffer: mirror the upper triangle, then project
    /// onto the SPD cone.
    ///
    /// # Errors
    /// [`AdaptError::ShapeMismatch`] when `raw.len() != D·D`;
    /// [`AdaptError::NonFinite`] when the buffer contains NaN or Inf.
    fn try_from_raw(raw: &[f64]) -> Result<Self, AdaptError> {
        if raw.len() != Self::RAW_LEN {
            return Err(AdaptError::ShapeMismatch {
                expected: Self::RAW_LEN,
                found: raw.len(),
            });
        }
        let mut m = [[0.0; D]; D];
        for i in 0..D {
            for j in 0..D {
                m[i][j] = raw[i * D + j];
            }
        }
        // Upper triangle is authoritative.
        for i in 0..D {
            for j in (i + 1)..D {
                m[j][i] = m[i][j];
            }
        }
        let mut t = Self::from_mat(&m);
        t.positive_definiteness()?;
        Ok(t)
    }

    /// Whether every component is exactly zero.
    #[inline]
    fn is_zero(&self) -> bool {
        self.raw().iter().all(|&x| x == 0.0)
    }

    /// Whether any component is NaN or infinite.
    #[inline]
    fn has_non_finite(&self) -> bool {
        self.raw().iter().any(|x| !x.is_finite())
    }

    /// Project onto the SPD cone along eigenvalue signs: decompose, replace
    /// every eigenvalue by its absolute value, recompose. Identity on the
    /// zero tensor; idempotent on SPD input.
    fn positive_definiteness(&mut self) -> Result<(), AdaptError> {
        if self.is_zero() {
            return Ok(());
        }
        let (vals, vecs) = Self::decompose_mat(&self.to_mat())?;
        *self = Self::from_mat(&Self::recompose_mat(&vals, &vecs));
        Ok(())
    }

    /// Eigen pair of the current tensor.
    fn eigen_decomp(&self) -> Result<([f64; D], [[f64; D]; D]), AdaptError> {
        Self::decompose_mat(&self.to_mat())
    }

    /// Store `V·diag(|λ|)·Vᵀ`; SPD by construction for any input pair.
    fn eigen_undecomp(&mut self, vals: &[f64; D], vecs: &[[f64; D]; D]) {
        *self = Self::from_mat(&Self::recompose_mat(vals, vecs));
    }

    /// Multiply every component by `s`; SPD is preserved for `s ≥ 0`.
    fn scale(&mut self, s: f64) {
        for x in self.raw_mut() {
            *x *= s;
        }
    }

    /// `√(d / Σλ_i)`: edge length of the isotropic tensor with the same
    /// mean resolution. NaN when any eigenvalue vanishes.
    fn average_length(&self) -> Result<f64, AdaptError> {
        let (vals, _) = self.eigen_decomp()?;
        if vals.iter().any(|&l| l == 0.0) {
            return Ok(f64::NAN);
        }
        let sum: f64 = vals.iter().sum();
        Ok((D as f64 / sum).sqrt())
    }

    /// `√(1/λ_min)`: the longest unit-metric edge this tensor allows.
    fn max_length(&self) -> Result<f64, AdaptError> {
        let (vals, _) = self.eigen_decomp()?;
        let min = vals.iter().copied().fold(f64::INFINITY, f64::min);
        Ok((1.0 / min).sqrt())
    }

    /// `√(1/λ_max)`: the shortest unit-metric edge this tensor allows.
    fn min_length(&self) -> Result<f64, AdaptError> {
        let (vals, _) = self.eigen_decomp()?;
        let max = vals.iter().copied().fold(0.0f64, f64::max);
        Ok((1.0 / max).sqrt())
    }

    /// `λ_min/λ_max ∈ (0, 1]`; smaller means more anisotropic. NaN for the
    /// zero tensor.
    fn aspect_ratio(&self) -> Result<f64, AdaptError> {
        let (vals, _) = self.eigen_decomp()?;
        Ok(aspect_of(&vals))
    }

    /// Collapse every eigenvalue to the smallest one, making the tensor
    /// isotropic at the coarsest resolution it prescribes.
    fn isotropise(&mut self) -> Result<(), AdaptError> {
        if self.is_zero() {
            return Ok(());
        }
        let (vals, vecs) = self.eigen_decomp()?;
        let min = vals.iter().copied().fold(f64::INFINITY, f64::min);
        self.eigen_undecomp(&[min; D], &vecs);
        Ok(())
    }

    /// Bound the eigenvalue spread to `λ_max/λ_min ≤ r_max` by raising small
    /// eigenvalues to `λ_max/r_max`.
    fn clamp_aspect_ratio(&mut self, r_max: f64) -> Result<(), AdaptError> {
        if self.is_zero() {
            return Ok(());
        }
        let (mut vals, vecs) = self.eigen_decomp()?;
        let max = vals.iter().copied().fold(0.0f64, f64::max);
        let floor = max / r_max;
        for v in vals.iter_mut() {
            *v = v.max(floor);
        }
        self.eigen_undecomp(&vals, &vecs);
        Ok(())
    }

    /// Linear average of two tensors; SPD because the cone is convex.
    fn midpoint(a: &Self, b: &Self) -> Self {
        let (ma, mb) = (a.to_mat(), b.to_mat());
        let mut m = [[0.0; D]; D];
        for i in 0..D {
            for j in 0..D {
                m[i][j] = 0.5 * (ma[i][j] + mb[i][j]);
            }
        }
        Self::from_mat(&m)
    }

    /// Metric intersection: superpose `other` onto `self`, preserving short
    /// edges (`preserve_short = true`, the default sense) or long edges.
    ///
    /// The operand with the larger aspect ratio (the more isotropic one) is
    /// factored as `FᵀF` and the other operand is clamped against the
    /// identity in that reference space; ties within `1e-12` keep `self` as
    /// the reference. A zero or non-finite `other` carries no information
    /// and leaves `self` unchanged; a zero `self` is a fixed point.
    ///
    /// # Errors
    /// [`AdaptError::NonFinite`] when the candidate result contains NaN or
    /// Inf (e.g. a singular reference); `self` is left unchanged.
    fn constrain(&mut self, other: &Self, preserve_short: bool) -> Result<(), AdaptError> {
        if other.is_zero() || other.has_non_finite() {
            return Ok(());
        }
        if self.is_zero() {
            return Ok(());
        }

        let m_self = self.to_mat();
        let m_other = other.to_mat();
        let (l_self, _) = Self::decompose_mat(&m_self)?;
        let (l_other, _) = Self::decompose_mat(&m_other)?;

        let (m_ref, m_in) = if aspect_of(&l_other) > aspect_of(&l_self) + ASPECT_TIE_TOL {
            (&m_other, &m_self)
        } else {
            (&m_self, &m_other)
        };

        // F = diag(√λ)·V factors the reference as FᵀF; V's rows are its
        // eigenvectors.
        let (lr, vr) = Self::decompose_mat(m_ref)?;
        let mut sqrt_l = [0.0; D];
        let mut inv_sqrt_l = [0.0; D];
        for k in 0..D {
            sqrt_l[k] = lr[k].sqrt();
            inv_sqrt_l[k] = 1.0 / sqrt_l[k];
        }

        // M̃ = F⁻ᵀ·M_in·F⁻¹: the other operand seen from the reference space.
        let vmvt = mat_mul_nt(&mat_mul(&vr, m_in), &vr);
        let mut mapped = [[0.0; D]; D];
        for i in 0..D {
            for j in 0..D {
                mapped[i][j] = inv_sqrt_l[i] * vmvt[i][j] * inv_sqrt_l[j];
            }
        }
        symmetrise(&mut mapped);
        if mapped.iter().any(|row| row.iter().any(|x| !x.is_finite())) {
            return Err(AdaptError::NonFinite("metric intersection mapping"));
        }

        let (mut mu, w) = Self::decompose_mat(&mapped)?;
        for m in mu.iter_mut() {
            *m = if preserve_short { m.max(1.0) } else { m.min(1.0) };
        }
        let clamped = Self::recompose_mat(&mu, &w);

        // Lift back: Fᵀ·(W·diag(μ)·Wᵀ)·F.
        let mut scaled = [[0.0; D]; D];
        for i in 0..D {
            for j in 0..D {
                scaled[i][j] = sqrt_l[i] * clamped[i][j] * sqrt_l[j];
            }
        }
        let mut out = mat_mul(&mat_mul_tn(&vr, &scaled), &vr);
        symmetrise(&mut out);

        if out.iter().any(|row| row.iter().any(|x| !x.is_finite())) {
            return Err(AdaptError::NonFinite("metric intersection"));
        }
        *self = Self::from_mat(&out);
        Ok(())
    }
}

/// Dense symmetric 2×2 metric tensor, row-major `[m00, m01, m10, m11]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor2 {
    m: [f64; 4],
}

impl Default for Tensor2 {
    fn default() -> Self {
        Self { m: [0.0; 4] }
    }
}

impl Tensor2 {
    /// The zero tensor ("no information").
    pub const fn zero() -> Self {
        Self { m: [0.0; 4] }
    }

    /// Diagonal tensor `diag(d0, d1)`; SPD for non-negative entries.
    pub const fn diagonal(d0: f64, d1: f64) -> Self {
        Self {
            m: [d0, 0.0, 0.0, d1],
        }
    }
}

impl SpdTensor<2> for Tensor2 {
    const RAW_LEN: usize = 4;

    #[inline]
    fn raw(&self) -> &[f64] {
        &self.m
    }

    #[inline]
    fn raw_mut(&mut self) -> &mut [f64] {
        &mut self.m
    }

    fn to_mat(&self) -> [[f64; 2]; 2] {
        [[self.m[0], self.m[1]], [self.m[2], self.m[3]]]
    }

    fn from_mat(m: &[[f64; 2]; 2]) -> Self {
        Self {
            m: [m[0][0], m[0][1], m[1][0], m[1][1]],
        }
    }

    fn decompose_mat(m: &[[f64; 2]; 2]) -> Result<([f64; 2], [[f64; 2]; 2]), AdaptError> {
        eigen::decompose2(m)
    }

    fn recompose_mat(vals: &[f64; 2], vecs: &[[f64; 2]; 2]) -> [[f64; 2]; 2] {
        eigen::recompose2(vals, vecs)
    }
}

impl fmt::Display for Tensor2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.m[0], self.m[1])?;
        writeln!(f, "{} {}", self.m[2], self.m[3])
    }
}

/// Dense symmetric 3×3 metric tensor, row-major.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor3 {
    m: [f64; 9],
}

impl Default for Tensor3 {
    fn default() -> Self {
        Self { m: [0.0; 9] }
    }
}

impl Tensor3 {
    /// The zero tensor ("no information").
    pub const fn zero() -> Self {
        Self { m: [0.0; 9] }
    }

    /// Diagonal tensor `diag(d0, d1, d2)`; SPD for non-negative entries.
    pub const fn diagonal(d0: f64, d1: f64, d2: f64) -> Self {
        Self {
            m: [d0, 0.0, 0.0, 0.0, d1, 0.0, 0.0, 0.0, d2],
        }
    }
}

impl SpdTensor<3> for Tensor3 {
    const RAW_LEN: usize = 9;

    #[inline]
    fn raw(&self) -> &[f64] {
        &self.m
    }

    #[inline]
    fn raw_mut(&mut self) -> &mut [f64] {
        &mut self.m
    }

    fn to_mat(&self) -> [[f64; 3]; 3] {
        [
            [self.m[0], self.m[1], self.m[2]],
            [self.m[3], self.m[4], self.m[5]],
            [self.m[6], self.m[7], self.m[8]],
        ]
    }

    fn from_mat(m: &[[f64; 3]; 3]) -> Self {
        Self {
            m: [
                m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
            ],
        }
    }

    fn decompose_mat(m: &[[f64; 3]; 3]) -> Result<([f64; 3], [[f64; 3]; 3]), AdaptError> {
        eigen::decompose3(m)
    }

    fn recompose_mat(vals: &[f64; 3], vecs: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
        eigen::recompose3(vals, vecs)
    }
}

impl fmt::Display for Tensor3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} {}", self.m[0], self.m[1], self.m[2])?;
        writeln!(f, "{} {} {}", self.m[3], self.m[4], self.m[5])?;
        writeln!(f, "{} {} {}", self.m[6], self.m[7], self.m[8])
    }
}

/// Expand the 3 independent components `[m00, m01, m11]` of a symmetric 2×2
/// matrix to full row-major storage.
pub const fn fan_out_2d(upper: &[f64; 3]) -> [f64; 4] {
    [upper[0], upper[1], upper[1], upper[2]]
}

/// Expand the 6 independent components `[m00, m01, m02, m11, m12, m22]` of a
/// symmetric 3×3 matrix to full row-major storage.
pub const fn fan_out_3d(upper: &[f64; 6]) -> [f64; 9] {
    [
        upper[0], upper[1], upper[2], upper[1], upper[3], upper[4], upper[2], upper[4], upper[5],
    ]
}

/// Runtime-dimension metric tensor.
///
/// The dimension is fixed when the tensor is constructed; a later
/// [`set`](MetricTensor::set) with a different component count is a
/// programmer error and panics, while [`try_set`](MetricTensor::try_set)
/// surfaces it as [`AdaptError::ShapeMismatch`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetricTensor {
    /// 2×2 tensor.
    Dim2(Tensor2),
    /// 3×3 tensor.
    Dim3(Tensor3),
}

impl MetricTensor {
    /// Construct from a raw row-major buffer of `dimension²` components,
    /// projecting to SPD.
    ///
    /// # Errors
    /// [`AdaptError::UnsupportedDimension`] unless `dimension ∈ {2, 3}`;
    /// [`AdaptError::ShapeMismatch`] when the buffer length disagrees;
    /// [`AdaptError::NonFinite`] when the buffer contains NaN or Inf.
    pub fn try_new(dimension: usize, raw: &[f64]) -> Result<Self, AdaptError> {
        match dimension {
            2 => Ok(Self::Dim2(Tensor2::try_from_raw(raw)?)),
            3 => Ok(Self::Dim3(Tensor3::try_from_raw(raw)?)),
            d => Err(AdaptError::UnsupportedDimension(d)),
        }
    }

    /// Construct from a raw buffer.
    ///
    /// # Panics
    /// Panics where [`try_new`](Self::try_new) would error: an inconsistent
    /// tensor dimension cannot be adapted on meaningfully.
    pub fn new(dimension: usize, raw: &[f64]) -> Self {
        match Self::try_new(dimension, raw) {
            Ok(t) => t,
            Err(e) => panic!("metric tensor construction failed: {e}"),
        }
    }

    /// Tensor dimension, 2 or 3.
    #[inline]
    pub fn dimension(&self) -> usize {
        match self {
            Self::Dim2(_) => 2,
            Self::Dim3(_) => 3,
        }
    }

    /// Non-owning row-major view of the current SPD tensor.
    #[inline]
    pub fn raw(&self) -> &[f64] {
        match self {
            Self::Dim2(t) => t.raw(),
            Self::Dim3(t) => t.raw(),
        }
    }

    /// Overwrite from a raw buffer, projecting to SPD. The dimension fixed
    /// at construction must not change.
    ///
    /// # Errors
    /// [`AdaptError::ShapeMismatch`] when `raw.len()` disagrees with the
    /// fixed dimension; [`AdaptError::NonFinite`] for NaN/Inf input (the
    /// tensor is left unchanged).
    pub fn try_set(&mut self, raw: &[f64]) -> Result<(), AdaptError> {
        match self {
            Self::Dim2(t) => *t = Tensor2::try_from_raw(raw)?,
            Self::Dim3(t) => *t = Tensor3::try_from_raw(raw)?,
        }
        Ok(())
    }

    /// Overwrite from a raw buffer. Non-finite input is ignored (the tensor
    /// keeps its previous value).
    ///
    /// # Panics
    /// Panics when the buffer length disagrees with the dimension fixed at
    /// construction; see [`try_set`](Self::try_set) for the fallible form.
    pub fn set(&mut self, raw: &[f64]) {
        match self.try_set(raw) {
            Ok(()) => {}
            Err(e @ AdaptError::ShapeMismatch { .. }) => {
                panic!("metric tensor dimension is fixed at first set: {e}")
            }
            Err(_) => {}
        }
    }

    /// Multiply every component by `s`; SPD is preserved for `s ≥ 0`.
    pub fn scale(&mut self, s: f64) {
        match self {
            Self::Dim2(t) => t.scale(s),
            Self::Dim3(t) => t.scale(s),
        }
    }

    /// Re-project onto the SPD cone; identity on SPD or zero tensors.
    pub fn positive_definiteness(&mut self) -> Result<(), AdaptError> {
        match self {
            Self::Dim2(t) => t.positive_definiteness(),
            Self::Dim3(t) => t.positive_definiteness(),
        }
    }

    /// Collapse every eigenvalue to the smallest one.
    pub fn isotropise(&mut self) -> Result<(), AdaptError> {
        match self {
            Self::Dim2(t) => t.isotropise(),
            Self::Dim3(t) => t.isotropise(),
        }
    }

    /// `√(d / Σλ_i)`; NaN when any eigenvalue vanishes.
    pub fn average_length(&self) -> Result<f64, AdaptError> {
        match self {
            Self::Dim2(t) => t.average_length(),
            Self::Dim3(t) => t.average_length(),
        }
    }

    /// `√(1/λ_min)`.
    pub fn max_length(&self) -> Result<f64, AdaptError> {
        match self {
            Self::Dim2(t) => t.max_length(),
            Self::Dim3(t) => t.max_length(),
        }
    }

    /// `√(1/λ_max)`.
    pub fn min_length(&self) -> Result<f64, AdaptError> {
        match self {
            Self::Dim2(t) => t.min_length(),
            Self::Dim3(t) => t.min_length(),
        }
    }

    /// `λ_min/λ_max`; NaN for the zero tensor.
    pub fn aspect_ratio(&self) -> Result<f64, AdaptError> {
        match self {
            Self::Dim2(t) => t.aspect_ratio(),
            Self::Dim3(t) => t.aspect_ratio(),
        }
    }

    /// Eigen pair as flat buffers: `d` eigenvalues and a row-major `d×d`
    /// matrix whose rows are the eigenvectors.
    pub fn eigen_decomp(&self) -> Result<(Vec<f64>, Vec<f64>), AdaptError> {
        match self {
            Self::Dim2(t) => {
                let (vals, vecs) = t.eigen_decomp()?;
                Ok((vals.to_vec(), vecs.iter().flatten().copied().collect()))
            }
            Self::Dim3(t) => {
                let (vals, vecs) = t.eigen_decomp()?;
                Ok((vals.to_vec(), vecs.iter().flatten().copied().collect()))
            }
        }
    }

    /// Store `V·diag(|λ|)·Vᵀ` from flat buffers laid out as produced by
    /// [`eigen_decomp`](Self::eigen_decomp).
    ///
    /// # Errors
    /// [`AdaptError::ShapeMismatch`] when the buffer lengths disagree with
    /// the tensor dimension.
    pub fn eigen_undecomp(&mut self, vals: &[f64], vecs: &[f64]) -> Result<(), AdaptError> {
        let d = self.dimension();
        if vals.len() != d {
            return Err(AdaptError::ShapeMismatch {
                expected: d,
                found: vals.len(),
            });
        }
        if vecs.len() != d * d {
            return Err(AdaptError::ShapeMismatch {
                expected: d * d,
                found: vecs.len(),
            });
        }
        match self {
            Self::Dim2(t) => {
                let v = [[vecs[0], vecs[1]], [vecs[2], vecs[3]]];
                t.eigen_undecomp(&[vals[0], vals[1]], &v);
            }
            Self::Dim3(t) => {
                let v = [
                    [vecs[0], vecs[1], vecs[2]],
                    [vecs[3], vecs[4], vecs[5]],
                    [vecs[6], vecs[7], vecs[8]],
                ];
                t.eigen_undecomp(&[vals[0], vals[1], vals[2]], &v);
            }
        }
        Ok(())
    }

    /// Metric intersection with `other`; see [`SpdTensor::constrain`].
    ///
    /// # Errors
    /// [`AdaptError::ShapeMismatch`] when the operands' dimensions differ;
    /// [`AdaptError::NonFinite`] when the candidate result is non-finite
    /// (`self` unchanged).
    pub fn constrain(&mut self, other: &MetricTensor, preserve_short: bool) -> Result<(), AdaptError> {
        match (self, other) {
            (Self::Dim2(a), Self::Dim2(b)) => a.constrain(b, preserve_short),
            (Self::Dim3(a), Self::Dim3(b)) => a.constrain(b, preserve_short),
            (me, other) => Err(AdaptError::ShapeMismatch {
                expected: me.dimension() * me.dimension(),
                found: other.dimension() * other.dimension(),
            }),
        }
    }
}

impl fmt::Display for MetricTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dim2(t) => t.fmt(f),
            Self::Dim3(t) => t.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_raw_close(t: &[f64], expect: &[f64], tol: f64) {
        assert_eq!(t.len(), expect.len());
        for (a, b) in t.iter().zip(expect) {
            assert!((a - b).abs() <= tol, "expected {expect:?}, got {t:?}");
        }
    }

    #[test]
    fn identity_round_trip() {
        let t = Tensor2::try_from_raw(&[1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_raw_close(t.raw(), &[1.0, 0.0, 0.0, 1.0], 1e-14);
        let (vals, vecs) = t.eigen_decomp().unwrap();
        assert_raw_close(&vals, &[1.0, 1.0], 1e-14);
        assert_eq!(vecs, [[1.0, 0.0], [0.0, 1.0]]);
        assert!((t.average_length().unwrap() - 1.0).abs() <= 1e-14);
    }

    #[test]
    fn indefinite_projection() {
        let t = Tensor2::try_from_raw(&[1.0, 0.0, 0.0, -4.0]).unwrap();
        assert_raw_close(t.raw(), &[1.0, 0.0, 0.0, 4.0], 1e-12);
        assert!((t.max_length().unwrap() - 1.0).abs() <= 1e-12);
        assert!((t.min_length().unwrap() - 0.5).abs() <= 1e-12);
    }

    #[test]
    fn lower_triangle_mirrors_upper() {
        let t = Tensor2::try_from_raw(&[2.0, 0.5, 99.0, 3.0]).unwrap();
        let m = t.to_mat();
        assert!((m[1][0] - m[0][1]).abs() <= 1e-12);
    }

    #[test]
    fn intersection_preserves_short() {
        let mut a = Tensor2::diagonal(1.0, 1.0);
        let b = Tensor2::diagonal(4.0, 4.0);
        a.constrain(&b, true).unwrap();
        assert_raw_close(a.raw(), &[4.0, 0.0, 0.0, 4.0], 1e-10);
    }

    #[test]
    fn intersection_preserves_long() {
        let mut a = Tensor2::diagonal(1.0, 1.0);
        let b = Tensor2::diagonal(4.0, 4.0);
        a.constrain(&b, false).unwrap();
        assert_raw_close(a.raw(), &[1.0, 0.0, 0.0, 1.0], 1e-10);
    }

    #[test]
    fn intersection_of_crossed_anisotropies() {
        let mut a = Tensor2::diagonal(4.0, 1.0);
        let b = Tensor2::diagonal(1.0, 4.0);
        a.constrain(&b, true).unwrap();
        assert_raw_close(a.raw(), &[4.0, 0.0, 0.0, 4.0], 1e-10);
    }

    #[test]
    fn constrain_ignores_zero_and_nan_sources() {
        let mut a = Tensor2::diagonal(2.0, 3.0);
        let before = a;
        a.constrain(&Tensor2::zero(), true).unwrap();
        assert_eq!(a, before);

        let mut poisoned = Tensor2::diagonal(1.0, 1.0);
        poisoned.raw_mut()[1] = f64::NAN;
        a.constrain(&poisoned, true).unwrap();
        assert_eq!(a, before);
    }

    #[test]
    fn zero_tensor_is_fixed_point() {
        let mut z = Tensor3::zero();
        z.positive_definiteness().unwrap();
        assert_eq!(z, Tensor3::zero());
        z.scale(7.0);
        assert_eq!(z, Tensor3::zero());
        z.isotropise().unwrap();
        assert_eq!(z, Tensor3::zero());
        z.clamp_aspect_ratio(10.0).unwrap();
        assert_eq!(z, Tensor3::zero());
        z.constrain(&Tensor3::diagonal(1.0, 2.0, 3.0), true).unwrap();
        assert_eq!(z, Tensor3::zero());
    }

    #[test]
    fn aspect_clamp() {
        let mut t = Tensor2::diagonal(1.0, 100.0);
        t.clamp_aspect_ratio(10.0).unwrap();
        assert_raw_close(t.raw(), &[10.0, 0.0, 0.0, 100.0], 1e-9);
    }

    #[test]
    fn isotropise_collapses_to_min_in_3d() {
        let mut t = Tensor3::diagonal(4.0, 9.0, 1.0);
        t.isotropise().unwrap();
        assert_raw_close(
            t.raw(),
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            1e-10,
        );
    }

    #[test]
    fn scale_rescales_lengths() {
        let mut t = Tensor2::diagonal(1.0, 1.0);
        t.scale(4.0);
        assert!((t.max_length().unwrap() - 0.5).abs() <= 1e-12);
    }

    #[test]
    fn fan_out_helpers() {
        assert_eq!(fan_out_2d(&[1.0, 2.0, 3.0]), [1.0, 2.0, 2.0, 3.0]);
        assert_eq!(
            fan_out_3d(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            [1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0]
        );
    }

    #[test]
    fn runtime_tensor_fixes_dimension() {
        let mut t = MetricTensor::try_new(2, &[1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(t.dimension(), 2);
        assert_eq!(
            t.try_set(&[1.0; 9]).unwrap_err(),
            AdaptError::ShapeMismatch {
                expected: 4,
                found: 9
            }
        );
        t.try_set(&[2.0, 0.0, 0.0, 2.0]).unwrap();
        assert_eq!(t.raw(), &[2.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    #[should_panic(expected = "dimension is fixed")]
    fn infallible_set_panics_on_shape_mismatch() {
        let mut t = MetricTensor::new(2, &[1.0, 0.0, 0.0, 1.0]);
        t.set(&[1.0; 9]);
    }

    #[test]
    fn infallible_set_skips_non_finite() {
        let mut t = MetricTensor::new(2, &[1.0, 0.0, 0.0, 1.0]);
        t.set(&[f64::NAN, 0.0, 0.0, 1.0]);
        assert_eq!(t.raw(), &[1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn unsupported_dimension_is_rejected() {
        assert_eq!(
            MetricTensor::try_new(4, &[0.0; 16]).unwrap_err(),
            AdaptError::UnsupportedDimension(4)
        );
    }

    #[test]
    fn runtime_eigen_round_trip() {
        let mut t = MetricTensor::try_new(3, &fan_out_3d(&[4.0, 1.0, 0.0, 3.0, 0.5, 2.0])).unwrap();
        let before: Vec<f64> = t.raw().to_vec();
        let (vals, vecs) = t.eigen_decomp().unwrap();
        t.eigen_undecomp(&vals, &vecs).unwrap();
        assert_raw_close(t.raw(), &before, 1e-10);
    }

    #[test]
    fn mixed_dimension_constrain_is_shape_mismatch() {
        let mut a = MetricTensor::try_new(2, &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let b = MetricTensor::try_new(3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        assert!(matches!(
            a.constrain(&b, true),
            Err(AdaptError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn display_prints_rows() {
        let t = MetricTensor::try_new(2, &[1.0, 0.0, 0.0, 2.0]).unwrap();
        assert_eq!(format!("{t}"), "1 0\n0 2\n");
    }

    #[test]
    fn serde_round_trip() {
        let t = MetricTensor::try_new(2, &[2.0, 0.5, 0.5, 3.0]).unwrap();
        let s = serde_json::to_string(&t).expect("serialize");
        let back: MetricTensor = serde_json::from_str(&s).expect("deserialize");
        assert_eq!(back, t);
    }
}
