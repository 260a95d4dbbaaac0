use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Point;
use crate::sim::acoustics::receiver::{DEFAULT_KEY_PRECISION, check_key_precision};
use crate::sim::acoustics::tracer::{DEFAULT_SPEED_OF_SOUND, TraceParams};
use crate::sim::bands::{BandSet, OctaveBand};
use crate::sim::error::{Result, TraceError};

/// Parameters of an acoustic ray tracing run.
///
/// Missing fields take their defaults when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // Source
    pub source_name: String,
    pub source: Point,
    /// Total power per band (W). Bands without an entry use `default_source_power`.
    pub source_power: BTreeMap<OctaveBand, f64>,
    pub default_source_power: f64,
    pub num_rays: usize,
    pub bands: BandSet,
    /// Fraction of a ray's initial power below which it stops.
    pub min_power_fraction: f64,

    // Tracing
    pub max_bounces: usize,
    pub max_duration_ms: u32,
    pub speed_of_sound: f64,
    /// Seed for diffuse reflection draws.
    pub scatter_seed: u64,

    // Receivers
    pub receivers: Vec<Point>,
    /// Radius of the spherical receiver volume (m).
    pub receiver_radius: f64,
    /// Decimals used in receiver keys.
    pub receiver_key_precision: usize,

    // Memory
    /// If `true`, keep every ray's bounce records in the result.
    pub store_traces: bool,
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self {
            source_name: "source".to_string(),
            source: Point::new(0.0, 0.0, 0.0),
            source_power: BTreeMap::new(),
            default_source_power: 1.0,
            num_rays: 1000,
            bands: BandSet::all(),
            min_power_fraction: 0.01,
            max_bounces: 10,
            max_duration_ms: 2000,
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
            scatter_seed: 0,
            receivers: Vec::new(),
            receiver_radius: 0.3,
            receiver_key_precision: DEFAULT_KEY_PRECISION,
            store_traces: false,
        }
    }

    /// Sets the same power on every configured band.
    pub fn set_uniform_power(&mut self, watts: f64) {
        self.source_power = self.bands.iter().map(|b| (b, watts)).collect();
        self.default_source_power = watts;
    }

    /// Power per band of the configured bands.
    pub fn resolve_source_power(&self) -> BTreeMap<OctaveBand, f64> {
        self.bands
            .iter()
            .map(|b| {
                let watts = self
                    .source_power
                    .get(&b)
                    .copied()
                    .unwrap_or(self.default_source_power);
                (b, watts)
            })
            .collect()
    }

    pub fn trace_params(&self) -> TraceParams {
        TraceParams {
            max_bounces: self.max_bounces,
            max_duration_ms: self.max_duration_ms,
            speed_of_sound: self.speed_of_sound,
            scatter_seed: self.scatter_seed,
        }
    }

    /// Checks everything that can be checked without a scene.
    pub fn validate(&self) -> Result<()> {
        self.trace_params().validate()?;
        if self.num_rays == 0 {
            return Err(TraceError::invalid("num_rays must be greater than 0"));
        }
        if self.bands.is_empty() {
            return Err(TraceError::invalid("at least one frequency band is required"));
        }
        if !self.receiver_radius.is_finite() || self.receiver_radius <= 0.0 {
            return Err(TraceError::invalid(format!(
                "receiver_radius must be positive, got {}",
                self.receiver_radius
            )));
        }
        check_key_precision(self.receiver_key_precision)?;
        if let Some(p) = self.receivers.iter().find(|p| !p.is_finite()) {
            return Err(TraceError::invalid(format!(
                "receiver position {p} is not finite"
            )));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}
