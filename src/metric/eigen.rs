//! Dense symmetric eigen-decomposition for 2×2 and 3×3 tensors.
//!
//! Decomposition is **signed-absolute**: returned eigenvalues are `|λ_i|`, so
//! recomposing a decomposition projects the input onto the SPD cone along its
//! eigenvalue signs. Eigenvectors are returned as the *rows* of the vector
//! matrix (`vecs[k]` is the unit eigenvector paired with `vals[k]`), matching
//! the row-major tensor storage used throughout the crate.
//!
//! # Algorithm
//! The 2×2 path is closed form. The 3×3 path solves the characteristic
//! polynomial in Cardano's trigonometric form and extracts eigenvectors from
//! cross products of rows of `T − λI`; whenever the trigonometric argument
//! leaves `[-1, 1]` by more than `4·ulp·‖T‖_F`, or the cross products
//! degenerate (clustered eigenvalues), the solver falls back to cyclic Jacobi
//! sweeps, which are unconditionally robust for symmetric input.
//!
//! The zero matrix decomposes to all-zero eigenvalues *and* eigenvectors so
//! that recomposition reproduces the zero tensor exactly.

use crate::error::AdaptError;

/// Maximum Jacobi sweeps; 3×3 input converges in a handful.
const MAX_JACOBI_SWEEPS: usize = 32;

/// Frobenius norm of a dense `d×d` block.
fn frobenius<const D: usize>(m: &[[f64; D]; D]) -> f64 {
    m.iter()
        .flat_map(|row| row.iter())
        .map(|x| x * x)
        .sum::<f64>()
        .sqrt()
}

fn is_zero<const D: usize>(m: &[[f64; D]; D]) -> bool {
    m.iter().all(|row| row.iter().all(|&x| x == 0.0))
}

fn all_finite<const D: usize>(m: &[[f64; D]; D]) -> bool {
    m.iter().all(|row| row.iter().all(|x| x.is_finite()))
}

fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross3(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm3(a: [f64; 3]) -> f64 {
    dot3(a, a).sqrt()
}

fn scale3(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Decompose a symmetric 2×2 block into `(|λ|, row eigenvectors)`.
///
/// # Errors
/// Returns [`AdaptError::NonFinite`] if any entry is NaN or infinite.
pub fn decompose2(m: &[[f64; 2]; 2]) -> Result<([f64; 2], [[f64; 2]; 2]), AdaptError> {
    if !all_finite(m) {
        return Err(AdaptError::NonFinite("2x2 eigen-decomposition input"));
    }
    if is_zero(m) {
        return Ok(([0.0; 2], [[0.0; 2]; 2]));
    }

    let a = m[0][0];
    let b = m[0][1];
    let c = m[1][1];
    let half_tr = 0.5 * (a + c);
    let delta = 0.5 * (a - c);
    let disc = (delta * delta + b * b).sqrt();

    // Isotropic within round-off: any orthonormal basis diagonalises.
    if disc <= f64::EPSILON * (a.abs() + b.abs() + c.abs()) {
        let lam = half_tr.abs();
        return Ok(([lam, lam], [[1.0, 0.0], [0.0, 1.0]]));
    }

    let l1 = half_tr + disc;
    let l2 = half_tr - disc;

    let v1 = if b != 0.0 {
        let raw = [b, l1 - a];
        let n = (raw[0] * raw[0] + raw[1] * raw[1]).sqrt();
        [raw[0] / n, raw[1] / n]
    } else if a >= c {
        [1.0, 0.0]
    } else {
        [0.0, 1.0]
    };
    let v2 = [-v1[1], v1[0]];

    Ok(([l1.abs(), l2.abs()], [v1, v2]))
}

/// Decompose a symmetric 3×3 block into `(|λ|, row eigenvectors)`.
///
/// # Errors
/// Returns [`AdaptError::NonFinite`] if any entry is NaN or infinite.
pub fn decompose3(m: &[[f64; 3]; 3]) -> Result<([f64; 3], [[f64; 3]; 3]), AdaptError> {
    if !all_finite(m) {
        return Err(AdaptError::NonFinite("3x3 eigen-decomposition input"));
    }
    if is_zero(m) {
        return Ok(([0.0; 3], [[0.0; 3]; 3]));
    }

    let fro = frobenius(m);
    let q = (m[0][0] + m[1][1] + m[2][2]) / 3.0;
    let p1 = m[0][1] * m[0][1] + m[0][2] * m[0][2] + m[1][2] * m[1][2];
    let p2 = (m[0][0] - q) * (m[0][0] - q)
        + (m[1][1] - q) * (m[1][1] - q)
        + (m[2][2] - q) * (m[2][2] - q)
        + 2.0 * p1;

    // Multiple of the identity within round-off.
    if p2.sqrt() <= f64::EPSILON * fro {
        let lam = q.abs();
        let mut vecs = [[0.0; 3]; 3];
        for (k, row) in vecs.iter_mut().enumerate() {
            row[k] = 1.0;
        }
        return Ok(([lam; 3], vecs));
    }

    let p = (p2 / 6.0).sqrt();
    let mut b = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            b[i][j] = m[i][j] / p;
        }
        b[i][i] -= q / p;
    }
    let r = 0.5 * det3(&b);

    // Exact arithmetic keeps r in [-1, 1]; a larger excursion means the
    // analytic form has lost too much precision for this input.
    if r.abs() > 1.0 + 4.0 * f64::EPSILON * fro.max(1.0) {
        return Ok(jacobi3(m));
    }
    let r = r.clamp(-1.0, 1.0);

    let phi = r.acos() / 3.0;
    let two_p = 2.0 * p;
    let eig_hi = q + two_p * phi.cos();
    let eig_lo = q + two_p * (phi + 2.0 * std::f64::consts::PI / 3.0).cos();
    let eig_mid = 3.0 * q - eig_hi - eig_lo;

    match analytic_vectors3(m, eig_hi, eig_lo, fro) {
        Some((v_hi, v_lo)) => {
            let v_mid = cross3(v_lo, v_hi);
            Ok((
                [eig_hi.abs(), eig_mid.abs(), eig_lo.abs()],
                [v_hi, v_mid, v_lo],
            ))
        }
        // Clustered spectrum: cross products degenerate, Jacobi is exact
        // enough regardless of conditioning.
        None => Ok(jacobi3(m)),
    }
}

/// Recompose `Σ_k |λ_k| v_k v_kᵀ` from a 2×2 eigen pair.
pub fn recompose2(vals: &[f64; 2], vecs: &[[f64; 2]; 2]) -> [[f64; 2]; 2] {
    recompose(vals, vecs)
}

/// Recompose `Σ_k |λ_k| v_k v_kᵀ` from a 3×3 eigen pair.
pub fn recompose3(vals: &[f64; 3], vecs: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    recompose(vals, vecs)
}

fn recompose<const D: usize>(vals: &[f64; D], vecs: &[[f64; D]; D]) -> [[f64; D]; D] {
    let mut out = [[0.0; D]; D];
    for k in 0..D {
        let lam = vals[k].abs();
        for i in 0..D {
            for j in 0..D {
                out[i][j] += lam * vecs[k][i] * vecs[k][j];
            }
        }
    }
    // Mirror the upper triangle so accumulated round-off cannot skew symmetry.
    for i in 0..D {
        for j in (i + 1)..D {
            let avg = 0.5 * (out[i][j] + out[j][i]);
            out[i][j] = avg;
            out[j][i] = avg;
        }
    }
    out
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Extract eigenvectors for the extremal eigenvalues via row cross products.
///
/// Returns `None` when the spectrum is too clustered for the analytic path.
fn analytic_vectors3(
    m: &[[f64; 3]; 3],
    eig_hi: f64,
    eig_lo: f64,
    fro: f64,
) -> Option<([f64; 3], [f64; 3])> {
    let scale = fro.max(eig_hi.abs()).max(eig_lo.abs()).max(1.0);
    let floor = f64::EPSILON.sqrt() * scale * scale;

    let v_hi = kernel_vector3(m, eig_hi, floor)?;
    let v_lo_raw = kernel_vector3(m, eig_lo, floor)?;

    // Re-orthogonalise the second vector against the first; clustered
    // eigenvalues can leave the raw cross products slightly correlated.
    let proj = dot3(v_lo_raw, v_hi);
    let mut v_lo = [
        v_lo_raw[0] - proj * v_hi[0],
        v_lo_raw[1] - proj * v_hi[1],
        v_lo_raw[2] - proj * v_hi[2],
    ];
    let n = norm3(v_lo);
    if n <= 1e-6 {
        return None;
    }
    v_lo = scale3(v_lo, 1.0 / n);
    Some((v_hi, v_lo))
}

/// Unit vector spanning the kernel of `m − λI`, or `None` if degenerate.
fn kernel_vector3(m: &[[f64; 3]; 3], lambda: f64, floor: f64) -> Option<[f64; 3]> {
    let r0 = [m[0][0] - lambda, m[0][1], m[0][2]];
    let r1 = [m[1][0], m[1][1] - lambda, m[1][2]];
    let r2 = [m[2][0], m[2][1], m[2][2] - lambda];

    let candidates = [cross3(r0, r1), cross3(r0, r2), cross3(r1, r2)];
    let mut best = candidates[0];
    let mut best_norm = norm3(best);
    for c in &candidates[1..] {
        let n = norm3(*c);
        if n > best_norm {
            best = *c;
            best_norm = n;
        }
    }
    if best_norm <= floor {
        return None;
    }
    Some(scale3(best, 1.0 / best_norm))
}

/// Cyclic Jacobi sweeps for a symmetric 3×3 block.
///
/// Unconditionally convergent; used as the fallback whenever the analytic
/// path reports insufficient precision.
fn jacobi3(m: &[[f64; 3]; 3]) -> ([f64; 3], [[f64; 3]; 3]) {
    let mut a = *m;
    // Columns of `v` accumulate the eigenvectors.
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let fro = frobenius(m);

    for _ in 0..MAX_JACOBI_SWEEPS {
        let off = (a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2]).sqrt();
        if off <= f64::EPSILON * fro {
            break;
        }
        for &(p, q) in &[(0usize, 1usize), (0, 2), (1, 2)] {
            let apq = a[p][q];
            if apq == 0.0 {
                continue;
            }
            let tau = (a[q][q] - a[p][p]) / (2.0 * apq);
            let t = if tau >= 0.0 {
                1.0 / (tau + (1.0 + tau * tau).sqrt())
            } else {
                -1.0 / (-tau + (1.0 + tau * tau).sqrt())
            };
            let c = 1.0 / (1.0 + t * t).sqrt();
            let s = t * c;

            let app = a[p][p];
            let aqq = a[q][q];
            a[p][p] = app - t * apq;
            a[q][q] = aqq + t * apq;
            a[p][q] = 0.0;
            a[q][p] = 0.0;
            for r in 0..3 {
                if r != p && r != q {
                    let arp = a[r][p];
                    let arq = a[r][q];
                    a[r][p] = c * arp - s * arq;
                    a[p][r] = a[r][p];
                    a[r][q] = s * arp + c * arq;
                    a[q][r] = a[r][q];
                }
            }
            for r in 0..3 {
                let vrp = v[r][p];
                let vrq = v[r][q];
                v[r][p] = c * vrp - s * vrq;
                v[r][q] = s * vrp + c * vrq;
            }
        }
    }

    let vals = [a[0][0].abs(), a[1][1].abs(), a[2][2].abs()];
    // Transpose: rows of the output are eigenvectors.
    let mut vecs = [[0.0; 3]; 3];
    for k in 0..3 {
        for i in 0..3 {
            vecs[k][i] = v[i][k];
        }
    }
    (vals, vecs)
}
