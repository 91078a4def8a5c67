//! Adaptation driver: the fixed-point schedule over the geometric kernels.
//!
//! One adaptation cycle interleaves coarsening, swapping and refinement
//! under a reference length that shrinks geometrically toward the upper
//! target `L_up`, so refinement never overshoots. Swapping sits between
//! coarsen and refine so element quality does not degrade monotonically
//! through the inner loop. Defragmentation is deferred to the outer loop
//! because the inner operators leave dead vertex slots behind; smoothing
//! runs only after the topology has settled for that outer iteration, and a
//! global quality gate exits the cycle early.
//!
//! The loop structure is deterministic for identical inputs: same iteration
//! counts, same termination reason. Bit-identical tensors are not promised;
//! the eigen kernels may round differently across platforms.

use crate::error::AdaptError;
use crate::mesh::AdaptiveMesh;
use crate::metric::field::MetricField;
use crate::metric::tensor::SpdTensor;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// Configuration for one adaptation cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptConfig {
    /// Upper edge-length target under the metric.
    pub l_up: f64,
    /// Lower edge-length target under the metric.
    pub l_low: f64,
    /// Minimum element quality that exits the cycle early.
    pub q_target: f64,
    /// Swap-acceptance quality threshold.
    pub q_swap: f64,
    /// Outer iteration cap.
    pub max_outer: usize,
    /// Inner iteration cap.
    pub max_inner: usize,
    /// Inner convergence tolerance on the maximal edge length.
    pub epsilon_l: f64,
    /// Aspect-ratio clamp applied to the metric field before the loop.
    pub max_aspect_ratio: f64,
}

impl Default for AdaptConfig {
    fn default() -> Self {
        // L_up = sqrt(2) with L_low = L_up/2 keeps the target band centred
        // on 1 and avoids oscillation between refine and coarsen; see
        // X. Li et al., Comp Methods Appl Mech Engrg 194 (2005), Eqn 7.
        Self {
            l_up: SQRT_2,
            l_low: SQRT_2 / 2.0,
            q_target: 0.4,
            q_swap: 0.7,
            max_outer: 5,
            max_inner: 10,
            epsilon_l: 0.01,
            max_aspect_ratio: 10.0,
        }
    }
}

impl AdaptConfig {
    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    /// [`AdaptError::Config`] naming the offending parameter.
    pub fn validate(&self) -> Result<(), AdaptError> {
        if !(self.l_up.is_finite() && self.l_up > 0.0) {
            return Err(AdaptError::Config(format!(
                "upper length target must be positive, got {}",
                self.l_up
            )));
        }
        if !(self.l_low.is_finite() && self.l_low > 0.0 && self.l_low < self.l_up) {
            return Err(AdaptError::Config(format!(
                "lower length target must satisfy 0 < L_low < L_up, got {}",
                self.l_low
            )));
        }
        if !(self.q_target > 0.0 && self.q_target <= 1.0) {
            return Err(AdaptError::Config(format!(
                "quality target must lie in (0, 1], got {}",
                self.q_target
            )));
        }
        if !(self.q_swap > 0.0 && self.q_swap <= 1.0) {
            return Err(AdaptError::Config(format!(
                "swap threshold must lie in (0, 1], got {}",
                self.q_swap
            )));
        }
        if self.max_outer == 0 || self.max_inner == 0 {
            return Err(AdaptError::Config(
                "iteration caps must be at least 1".into(),
            ));
        }
        if !(self.epsilon_l.is_finite() && self.epsilon_l > 0.0) {
            return Err(AdaptError::Config(format!(
                "convergence tolerance must be positive, got {}",
                self.epsilon_l
            )));
        }
        if !(self.max_aspect_ratio >= 1.0) {
            return Err(AdaptError::Config(format!(
                "max aspect ratio must be >= 1, got {}",
                self.max_aspect_ratio
            )));
        }
        Ok(())
    }
}

/// Why the cycle ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The minimum element quality cleared the target.
    QualityReached,
    /// All outer iterations ran without clearing the quality target.
    OuterExhausted,
}

/// Why the most recent inner loop stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InnerStop {
    /// The maximal edge length settled within tolerance of `L_up`.
    Converged,
    /// Two consecutive iterations left the maximal edge length unchanged.
    NoProgress,
    /// The inner iteration cap was reached.
    Exhausted,
}

/// Accounting for one adaptation cycle.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Outer iterations executed.
    pub outer_iters: usize,
    /// Inner iterations executed, summed over all outer iterations.
    pub inner_iters: usize,
    /// Coarsening passes fired.
    pub coarsen_calls: usize,
    /// Swap passes fired.
    pub swap_calls: usize,
    /// Refinement passes fired.
    pub refine_calls: usize,
    /// Smoothing passes fired (Laplacian and L∞ combined).
    pub smooth_calls: usize,
    /// Maximal edge length after the last inner loop.
    pub l_max: f64,
    /// Minimum element quality after the last smoothing pass.
    pub q_min: f64,
    /// Why the cycle ended.
    pub termination: Termination,
    /// Why the last inner loop stopped.
    pub last_inner_stop: InnerStop,
}

/// Run one adaptation cycle over `mesh` with the tensors in `field`.
///
/// The field is clamped to the configured aspect ratio and pushed to the
/// mesh before the loop; refinement births and the defragmentation remap
/// are folded back into the field as the mesh emits them.
///
/// # Errors
/// [`AdaptError::Config`] for an inconsistent configuration;
/// [`AdaptError::NumericDivergence`] when the mesh reports a non-finite
/// maximal edge length (the caller may damp the field with
/// [`MetricField::scale`] and retry); any error surfaced by the mesh's own
/// operators is passed through.
pub fn adapt_cycle<const D: usize, T, M>(
    mesh: &mut M,
    field: &mut MetricField<D, T>,
    config: &AdaptConfig,
) -> Result<CycleReport, AdaptError>
where
    T: SpdTensor<D>,
    M: AdaptiveMesh<D>,
{
    config.validate()?;
    field.apply_max_aspect_ratio(config.max_aspect_ratio)?;
    field.update_mesh(mesh)?;

    let alpha = SQRT_2 / 2.0;
    let mut l_max = mesh.maximal_edge_length();
    if !l_max.is_finite() {
        return Err(AdaptError::NumericDivergence { l_max });
    }

    let mut report = CycleReport {
        outer_iters: 0,
        inner_iters: 0,
        coarsen_calls: 0,
        swap_calls: 0,
        refine_calls: 0,
        smooth_calls: 0,
        l_max,
        q_min: mesh.min_quality(),
        termination: Termination::OuterExhausted,
        last_inner_stop: InnerStop::Exhausted,
    };

    for outer in 0..config.max_outer {
        let mut stale = 0usize;
        let mut stop = InnerStop::Exhausted;

        for inner in 0..config.max_inner {
            let l_ref = (alpha * l_max).max(config.l_up);

            let collapsed = mesh.coarsen(config.l_low, l_ref)?;
            report.coarsen_calls += 1;

            let flipped = mesh.swap(config.q_swap)?;
            report.swap_calls += 1;

            let births = mesh.refine(l_ref)?;
            report.refine_calls += 1;
            field.absorb_births(&births)?;
            field.update_mesh(mesh)?;

            let previous = l_max;
            l_max = mesh.maximal_edge_length();
            if !l_max.is_finite() {
                return Err(AdaptError::NumericDivergence { l_max });
            }
            report.inner_iters += 1;
            trace!(
                "outer {outer} inner {inner}: L_ref={l_ref:.4} L_max={l_max:.4} \
                 collapsed={collapsed} flipped={flipped} split={}",
                births.len()
            );

            if l_max - config.l_up < config.epsilon_l {
                stop = InnerStop::Converged;
                break;
            }
            if (l_max - previous).abs() < config.epsilon_l {
                stale += 1;
                if stale >= 2 {
                    stop = InnerStop::NoProgress;
                    break;
                }
            } else {
                stale = 0;
            }
        }

        let remap = mesh.defragment();
        field.apply_remap(&remap)?;
        field.update_mesh(mesh)?;

        if outer > 0 {
            mesh.smart_laplacian(outer * 10, 1.0)?;
            report.smooth_calls += 1;
        }
        mesh.optimisation_linf(10)?;
        report.smooth_calls += 1;

        report.outer_iters = outer + 1;
        report.last_inner_stop = stop;
        report.l_max = l_max;
        report.q_min = mesh.min_quality();
        debug!(
            "outer {outer}: L_max={l_max:.4} q_min={:.4} inner stop {stop:?}",
            report.q_min
        );

        if report.q_min > config.q_target {
            report.termination = Termination::QualityReached;
            break;
        }
    }

    debug!(
        "cycle done: {:?} after {} outer / {} inner iterations",
        report.termination, report.outer_iters, report.inner_iters
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_targets() {
        let cfg = AdaptConfig::default();
        assert!((cfg.l_up - SQRT_2).abs() <= 1e-15);
        assert!((cfg.l_low - SQRT_2 / 2.0).abs() <= 1e-15);
        assert_eq!(cfg.max_outer, 5);
        assert_eq!(cfg.max_inner, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn inverted_band_is_rejected() {
        let cfg = AdaptConfig {
            l_low: 2.0,
            l_up: 1.0,
            ..AdaptConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AdaptError::Config(_))));
    }

    #[test]
    fn zero_iteration_caps_are_rejected() {
        let cfg = AdaptConfig {
            max_inner: 0,
            ..AdaptConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AdaptError::Config(_))));
    }

    #[test]
    fn config_serde_round_trip() {
        let cfg = AdaptConfig::default();
        let s = serde_json::to_string(&cfg).expect("serialize");
        let back: AdaptConfig = serde_json::from_str(&s).expect("deserialize");
        assert_eq!(back, cfg);
    }
}
