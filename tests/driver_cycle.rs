//! Driver-level tests against a scripted mesh.
//!
//! The mock mesh implements [`AdaptiveMesh`] with prescribed responses so the
//! tests can pin down the driver's *structure*: strict operator ordering,
//! the shrinking reference length, deferred defragmentation, the smoothing
//! schedule, remap/birth plumbing into the metric field, and the documented
//! termination rules.

use mesh_adapt::error::AdaptError;
use mesh_adapt::mesh::{AdaptiveMesh, VertexBirth, VertexId, VertexRemap};
use mesh_adapt::metric::{fan_out_2d, MetricField2, SpdTensor};
use mesh_adapt::driver::{adapt_cycle, AdaptConfig, InnerStop, Termination};

#[derive(Clone, Debug, PartialEq)]
enum Call {
    Coarsen { l_low: f64, l_ref: f64 },
    Swap { q_threshold: f64 },
    Refine { l_ref: f64 },
    Defragment,
    SmartLaplacian { iterations: usize, omega: f64 },
    OptimisationLinf { iterations: usize },
}

/// Mesh double with scripted responses to the driver's queries.
#[derive(Clone, Debug)]
struct ScriptedMesh {
    n_verts: usize,
    dead_slots: usize,
    l_max: f64,
    /// Multiplier applied to `l_max` by each refinement pass.
    l_decay: f64,
    /// `l_max` never drops below this.
    l_floor: f64,
    q_min: f64,
    /// Quality gained by each L∞ optimisation pass.
    q_gain: f64,
    births_per_refine: usize,
    kills_per_coarsen: usize,
    /// Refine call number (1-based) that reports a non-finite length.
    poison_refine_at: Option<usize>,
    refine_count: usize,
    metric_writes: usize,
    calls: Vec<Call>,
}

impl ScriptedMesh {
    fn new(n_verts: usize, l_max: f64, q_min: f64) -> Self {
        Self {
            n_verts,
            dead_slots: 0,
            l_max,
            l_decay: 1.0,
            l_floor: 0.0,
            q_min,
            q_gain: 0.0,
            births_per_refine: 0,
            kills_per_coarsen: 0,
            poison_refine_at: None,
            refine_count: 0,
            metric_writes: 0,
            calls: Vec::new(),
        }
    }
}

impl AdaptiveMesh<2> for ScriptedMesh {
    fn num_vertices(&self) -> usize {
        self.n_verts
    }

    fn maximal_edge_length(&self) -> f64 {
        self.l_max
    }

    fn min_quality(&self) -> f64 {
        self.q_min
    }

    fn store_vertex_metric(&mut self, v: VertexId, raw: &[f64]) -> Result<(), AdaptError> {
        if v.index() >= self.n_verts {
            return Err(AdaptError::VertexOutOfBounds {
                vertex: v,
                len: self.n_verts,
            });
        }
        if raw.len() != 4 {
            return Err(AdaptError::ShapeMismatch {
                expected: 4,
                found: raw.len(),
            });
        }
        self.metric_writes += 1;
        Ok(())
    }

    fn coarsen(&mut self, l_low: f64, l_ref: f64) -> Result<u32, AdaptError> {
        self.calls.push(Call::Coarsen { l_low, l_ref });
        let kills = self.kills_per_coarsen.min(self.n_verts - self.dead_slots);
        self.dead_slots += kills;
        Ok(kills as u32)
    }

    fn swap(&mut self, q_threshold: f64) -> Result<u32, AdaptError> {
        self.calls.push(Call::Swap { q_threshold });
        Ok(0)
    }

    fn refine(&mut self, l_ref: f64) -> Result<Vec<VertexBirth>, AdaptError> {
        self.calls.push(Call::Refine { l_ref });
        self.refine_count += 1;
        let mut births = Vec::new();
        for _ in 0..self.births_per_refine {
            births.push(VertexBirth {
                vertex: VertexId::new(self.n_verts as u32),
                parents: [VertexId::new(0), VertexId::new(1)],
            });
            self.n_verts += 1;
        }
        self.l_max = (self.l_max * self.l_decay).max(self.l_floor);
        if self.poison_refine_at == Some(self.refine_count) {
            self.l_max = f64::NAN;
        }
        Ok(births)
    }

    fn defragment(&mut self) -> VertexRemap {
        self.calls.push(Call::Defragment);
        let dead = self.dead_slots.min(self.n_verts);
        let new_len = self.n_verts - dead;
        // Dead slots are retired from the front so survivors shift down.
        let table: Vec<Option<VertexId>> = (0..self.n_verts)
            .map(|i| {
                if i < dead {
                    None
                } else {
                    Some(VertexId::new((i - dead) as u32))
                }
            })
            .collect();
        self.n_verts = new_len;
        self.dead_slots = 0;
        VertexRemap::try_new(table, new_len).expect("scripted remap is well-formed")
    }

    fn smart_laplacian(&mut self, iterations: usize, omega: f64) -> Result<(), AdaptError> {
        self.calls.push(Call::SmartLaplacian { iterations, omega });
        Ok(())
    }

    fn optimisation_linf(&mut self, iterations: usize) -> Result<(), AdaptError> {
        self.calls.push(Call::OptimisationLinf { iterations });
        self.q_min = (self.q_min + self.q_gain).min(1.0);
        Ok(())
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12
}

#[test]
fn converging_cycle_reaches_quality_gate() {
    let mut mesh = ScriptedMesh::new(4, 4.0, 0.1);
    mesh.l_decay = 0.4;
    mesh.l_floor = 1.0;
    mesh.q_gain = 0.25;
    let mut field = MetricField2::with_vertices(4);
    let config = AdaptConfig::default();

    let report = adapt_cycle(&mut mesh, &mut field, &config).unwrap();

    assert_eq!(report.termination, Termination::QualityReached);
    assert_eq!(report.last_inner_stop, InnerStop::Converged);
    // Outer 0 converges in two inner iterations (4.0 → 1.6 → 1.0), outer 1
    // in one; quality climbs 0.1 → 0.35 → 0.6 past the 0.4 gate.
    assert_eq!(report.outer_iters, 2);
    assert_eq!(report.inner_iters, 3);
    assert_eq!(report.coarsen_calls, 3);
    assert_eq!(report.swap_calls, 3);
    assert_eq!(report.refine_calls, 3);
    assert_eq!(report.smooth_calls, 3);
    assert!((report.q_min - 0.6).abs() <= 1e-12);
    // D1: the maximal length settled inside the tolerance band.
    assert!(report.l_max - config.l_up < config.epsilon_l);
}

#[test]
fn operator_order_is_strict() {
    let mut mesh = ScriptedMesh::new(4, 4.0, 0.1);
    mesh.l_decay = 0.4;
    mesh.l_floor = 1.0;
    mesh.q_gain = 0.25;
    let mut field = MetricField2::with_vertices(4);
    let config = AdaptConfig::default();

    adapt_cycle(&mut mesh, &mut field, &config).unwrap();

    let alpha = std::f64::consts::SQRT_2 / 2.0;
    let expected = vec![
        // Outer 0, inner 0: L_ref = max(α·4.0, L_up).
        Call::Coarsen {
            l_low: config.l_low,
            l_ref: alpha * 4.0,
        },
        Call::Swap {
            q_threshold: config.q_swap,
        },
        Call::Refine { l_ref: alpha * 4.0 },
        // Outer 0, inner 1: α·1.6 < L_up, so L_ref floors at L_up.
        Call::Coarsen {
            l_low: config.l_low,
            l_ref: config.l_up,
        },
        Call::Swap {
            q_threshold: config.q_swap,
        },
        Call::Refine { l_ref: config.l_up },
        Call::Defragment,
        Call::OptimisationLinf { iterations: 10 },
        // Outer 1: one converged inner iteration, then both smoothers.
        Call::Coarsen {
            l_low: config.l_low,
            l_ref: config.l_up,
        },
        Call::Swap {
            q_threshold: config.q_swap,
        },
        Call::Refine { l_ref: config.l_up },
        Call::Defragment,
        Call::SmartLaplacian {
            iterations: 10,
            omega: 1.0,
        },
        Call::OptimisationLinf { iterations: 10 },
    ];
    assert_eq!(mesh.calls.len(), expected.len());
    for (got, want) in mesh.calls.iter().zip(&expected) {
        match (got, want) {
            (
                Call::Coarsen { l_low: a, l_ref: b },
                Call::Coarsen { l_low: c, l_ref: d },
            ) => {
                assert!(close(*a, *c) && close(*b, *d), "coarsen args {got:?} vs {want:?}");
            }
            (Call::Refine { l_ref: a }, Call::Refine { l_ref: b }) => {
                assert!(close(*a, *b), "refine args {got:?} vs {want:?}");
            }
            (Call::Swap { q_threshold: a }, Call::Swap { q_threshold: b }) => {
                assert!(close(*a, *b));
            }
            _ => assert_eq!(got, want),
        }
    }
}

#[test]
fn stagnant_mesh_stops_with_no_progress() {
    // The length never moves, so every outer iteration's inner loop breaks
    // after two stale iterations and the cycle exhausts its outer budget.
    let mut mesh = ScriptedMesh::new(4, 4.0, 0.1);
    let mut field = MetricField2::with_vertices(4);
    let config = AdaptConfig::default();

    let report = adapt_cycle(&mut mesh, &mut field, &config).unwrap();

    assert_eq!(report.termination, Termination::OuterExhausted);
    assert_eq!(report.last_inner_stop, InnerStop::NoProgress);
    assert_eq!(report.outer_iters, config.max_outer);
    assert_eq!(report.inner_iters, 2 * config.max_outer);
    // D3: operator calls stay within the configured budget.
    let operator_calls = report.coarsen_calls + report.swap_calls + report.refine_calls;
    assert!(operator_calls <= 3 * config.max_outer * config.max_inner);
    assert!(report.smooth_calls <= 2 * config.max_outer);
}

#[test]
fn divergence_aborts_the_cycle() {
    let mut mesh = ScriptedMesh::new(4, 4.0, 0.1);
    mesh.l_decay = 0.9;
    mesh.poison_refine_at = Some(2);
    let mut field = MetricField2::with_vertices(4);

    let err = adapt_cycle(&mut mesh, &mut field, &AdaptConfig::default()).unwrap_err();
    assert!(matches!(err, AdaptError::NumericDivergence { .. }));

    // The documented retry path: damp the field and run again on a mesh
    // that no longer diverges.
    field.scale(0.5);
    let mut retry_mesh = ScriptedMesh::new(4, 4.0, 0.5);
    retry_mesh.l_decay = 0.2;
    retry_mesh.l_floor = 1.0;
    let report = adapt_cycle(&mut retry_mesh, &mut field, &AdaptConfig::default()).unwrap();
    assert_eq!(report.termination, Termination::QualityReached);
}

#[test]
fn births_and_remap_flow_into_the_field() {
    let mut mesh = ScriptedMesh::new(2, 1.0, 0.1);
    mesh.births_per_refine = 1;
    mesh.kills_per_coarsen = 1;
    mesh.q_gain = 1.0;
    let config = AdaptConfig {
        max_outer: 1,
        ..AdaptConfig::default()
    };

    let mut field = MetricField2::with_vertices(2);
    field.set_metric(&fan_out_2d(&[2.0, 0.0, 2.0]), VertexId::new(0));
    field.set_metric(&fan_out_2d(&[4.0, 0.0, 4.0]), VertexId::new(1));

    let report = adapt_cycle(&mut mesh, &mut field, &config).unwrap();
    assert_eq!(report.termination, Termination::QualityReached);
    assert_eq!(report.inner_iters, 1);

    // One birth grew the field to 3; the defragment retired one dead slot,
    // shifting survivors down.
    assert_eq!(field.len(), 2);
    assert_eq!(mesh.num_vertices(), 2);
    // Slot 1 now holds the newborn's tensor: the parents' midpoint.
    let newborn = field.metric(VertexId::new(1)).unwrap();
    assert_eq!(newborn.raw(), &[3.0, 0.0, 0.0, 3.0]);
    // Metric pushes: 2 at the prologue, 3 after the birth, 2 after the
    // remap.
    assert_eq!(mesh.metric_writes, 7);
}

#[test]
fn structure_is_deterministic() {
    let run = || {
        let mut mesh = ScriptedMesh::new(4, 4.0, 0.1);
        mesh.l_decay = 0.7;
        mesh.l_floor = 1.2;
        mesh.q_gain = 0.11;
        let mut field = MetricField2::with_vertices(4);
        let report = adapt_cycle(&mut mesh, &mut field, &AdaptConfig::default()).unwrap();
        (report, mesh.calls)
    };
    let (report_a, calls_a) = run();
    let (report_b, calls_b) = run();
    assert_eq!(report_a, report_b);
    assert_eq!(calls_a, calls_b);
}

#[test]
fn invalid_config_fails_before_touching_the_mesh() {
    let mut mesh = ScriptedMesh::new(2, 4.0, 0.1);
    let mut field = MetricField2::with_vertices(2);
    let config = AdaptConfig {
        l_low: 3.0,
        ..AdaptConfig::default()
    };
    let err = adapt_cycle(&mut mesh, &mut field, &config).unwrap_err();
    assert!(matches!(err, AdaptError::Config(_)));
    assert!(mesh.calls.is_empty());
    assert_eq!(mesh.metric_writes, 0);
}

#[test]
fn field_length_mismatch_is_reported() {
    let mut mesh = ScriptedMesh::new(4, 4.0, 0.1);
    let mut field = MetricField2::with_vertices(3);
    let err = adapt_cycle(&mut mesh, &mut field, &AdaptConfig::default()).unwrap_err();
    assert_eq!(
        err,
        AdaptError::RemapLength {
            expected: 3,
            found: 4
        }
    );
}
