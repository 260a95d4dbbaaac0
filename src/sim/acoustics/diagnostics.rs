use std::fmt;

use serde::{Deserialize, Serialize};

use super::tracer::{RayTrace, Termination};
use crate::sim::error::TraceError;

/// Aggregate summary of a trace run.
///
/// A large escaped fraction usually means the scene is not closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Rays the source emits.
    pub rays_requested: usize,
    /// Rays whose trace completed (including failed ones).
    pub rays_traced: usize,
    pub escaped: usize,
    pub energy_floor: usize,
    pub time_budget: usize,
    pub bounce_limit: usize,
    pub failed_missing_material: usize,
    pub failed_geometry: usize,
    /// Failures carrying a configuration error, e.g. from a trace file
    /// written by another tool.
    pub failed_other: usize,
    /// Rays never started because the run was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
    /// Receiver contributions outside `[0, max_duration_ms)`.
    pub contributions_dropped: usize,
}

impl RunDiagnostics {
    pub fn from_traces(rays_requested: usize, traces: &[RayTrace]) -> Self {
        let mut d = Self {
            rays_requested,
            rays_traced: traces.len(),
            skipped: rays_requested.saturating_sub(traces.len()),
            ..Self::default()
        };
        d.cancelled = d.skipped > 0;

        for trace in traces {
            match &trace.termination {
                Termination::Escaped => d.escaped += 1,
                Termination::EnergyFloor => d.energy_floor += 1,
                Termination::TimeBudget => d.time_budget += 1,
                Termination::BounceLimit => d.bounce_limit += 1,
                Termination::Failed(TraceError::MissingMaterial { .. }) => {
                    d.failed_missing_material += 1
                }
                Termination::Failed(TraceError::GeometryQueryFailure(_)) => {
                    d.failed_geometry += 1
                }
                Termination::Failed(TraceError::InvalidConfiguration(_)) => d.failed_other += 1,
            }
        }
        d
    }

    pub fn rays_failed(&self) -> usize {
        self.failed_missing_material + self.failed_geometry + self.failed_other
    }

    /// Fraction of traced rays that left the scene.
    pub fn escaped_fraction(&self) -> f64 {
        if self.rays_traced == 0 {
            return 0.0;
        }
        self.escaped as f64 / self.rays_traced as f64
    }
}

impl fmt::Display for RunDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "traced {}/{} rays (escaped {}, energy floor {}, time budget {}, bounce limit {}, failed {})",
            self.rays_traced,
            self.rays_requested,
            self.escaped,
            self.energy_floor,
            self.time_budget,
            self.bounce_limit,
            self.rays_failed(),
        )?;
        if self.cancelled {
            write!(f, ", cancelled with {} rays skipped", self.skipped)?;
        }
        if self.contributions_dropped > 0 {
            write!(f, ", {} contributions dropped", self.contributions_dropped)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::bands::BandValues;
    use crate::sim::error::GeometryError;

    fn trace(termination: Termination) -> RayTrace {
        RayTrace {
            ray_index: 0,
            initial_power: BandValues::zeros(),
            bounces: Vec::new(),
            termination,
        }
    }

    #[test]
    fn test_counts_by_kind() {
        let traces = vec![
            trace(Termination::Escaped),
            trace(Termination::Escaped),
            trace(Termination::EnergyFloor),
            trace(Termination::TimeBudget),
            trace(Termination::BounceLimit),
            trace(Termination::Failed(TraceError::MissingMaterial {
                surface: "x".into(),
            })),
            trace(Termination::Failed(TraceError::GeometryQueryFailure(
                GeometryError::Query("boom".into()),
            ))),
        ];
        let d = RunDiagnostics::from_traces(10, &traces);
        assert_eq!(d.rays_traced, 7);
        assert_eq!(d.escaped, 2);
        assert_eq!(d.energy_floor, 1);
        assert_eq!(d.time_budget, 1);
        assert_eq!(d.bounce_limit, 1);
        assert_eq!(d.failed_missing_material, 1);
        assert_eq!(d.failed_geometry, 1);
        assert_eq!(d.failed_other, 0);
        assert_eq!(d.rays_failed(), 2);
        assert_eq!(d.skipped, 3);
        assert!(d.cancelled);
        assert!((d.escaped_fraction() - 2.0 / 7.0).abs() < 1e-12);

        let text = d.to_string();
        assert!(text.starts_with("traced 7/10 rays"));
        assert!(text.contains("3 rays skipped"));
    }

    #[test]
    fn test_configuration_failure_is_not_a_geometry_failure() {
        let traces = vec![trace(Termination::Failed(TraceError::invalid("bad ray")))];
        let d = RunDiagnostics::from_traces(1, &traces);
        assert_eq!(d.failed_geometry, 0);
        assert_eq!(d.failed_other, 1);
        assert_eq!(d.rays_failed(), 1);
    }

    #[test]
    fn test_empty_run() {
        let d = RunDiagnostics::from_traces(0, &[]);
        assert_eq!(d.escaped_fraction(), 0.0);
        assert!(!d.cancelled);
    }
}
