use std::collections::BTreeMap;
use std::fmt;

use crate::sim::bands::{BandSet, BandValues, OctaveBand};
use crate::sim::error::{Result, TraceError};
use crate::{Point, Vector};

/// Omnidirectional point source emitting a deterministic Fibonacci ray set.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    /// Emission point.
    pub origin: Point,
    /// Bands carried by the rays.
    pub bands: BandSet,
    /// Total acoustic power per band in watts.
    pub power: BandValues,
    /// Fraction of a ray's initial power below which it is negligible.
    pub min_power_fraction: f64,
    directions: Vec<Vector>,
    ray_power: BandValues,
    ray_min_power: BandValues,
}

impl Source {
    /// Generates a source with `num_rays` Fibonacci-sphere directions.
    ///
    /// Every band of `bands` needs a finite, non-negative entry in `power`.
    pub fn generate(
        name: &str,
        origin: Point,
        power: &BTreeMap<OctaveBand, f64>,
        num_rays: usize,
        bands: BandSet,
        min_power_fraction: f64,
    ) -> Result<Self> {
        if num_rays == 0 {
            return Err(TraceError::invalid("num_rays must be greater than 0"));
        }
        if bands.is_empty() {
            return Err(TraceError::invalid("source needs at least one frequency band"));
        }
        if !(0.0..=1.0).contains(&min_power_fraction) {
            return Err(TraceError::invalid(format!(
                "min_power_fraction {min_power_fraction} is outside [0, 1]"
            )));
        }
        if !origin.is_finite() {
            return Err(TraceError::invalid(format!(
                "source origin {origin} is not finite"
            )));
        }

        let mut total = BandValues::zeros();
        for band in bands.iter() {
            let watts = power.get(&band).copied().ok_or_else(|| {
                TraceError::invalid(format!("source '{name}' has no power for {band}"))
            })?;
            if !watts.is_finite() || watts < 0.0 {
                return Err(TraceError::invalid(format!(
                    "source '{name}' has invalid power {watts} W for {band}"
                )));
            }
            total[band] = watts;
        }

        let ray_power = total.scale(1.0 / num_rays as f64);
        let ray_min_power = ray_power.scale(min_power_fraction);

        Ok(Self {
            name: name.to_string(),
            origin,
            bands,
            power: total,
            min_power_fraction,
            directions: fibonacci_directions(num_rays),
            ray_power,
            ray_min_power,
        })
    }

    /// Same power in every band of `bands`.
    pub fn uniform(
        name: &str,
        origin: Point,
        watts: f64,
        num_rays: usize,
        bands: BandSet,
        min_power_fraction: f64,
    ) -> Result<Self> {
        let power: BTreeMap<OctaveBand, f64> = bands.iter().map(|b| (b, watts)).collect();
        Self::generate(name, origin, &power, num_rays, bands, min_power_fraction)
    }

    pub fn num_rays(&self) -> usize {
        self.directions.len()
    }

    pub fn directions(&self) -> &[Vector] {
        &self.directions
    }

    pub fn direction(&self, ray_index: usize) -> Option<Vector> {
        self.directions.get(ray_index).copied()
    }

    /// Initial per-band power of one ray (the same for every ray).
    pub fn ray_power(&self) -> &BandValues {
        &self.ray_power
    }

    /// Per-band power below which a ray is negligible.
    pub fn ray_min_power(&self) -> &BandValues {
        &self.ray_min_power
    }
}

/// Deterministic, approximately uniform directions on the unit sphere.
pub fn fibonacci_directions(num_rays: usize) -> Vec<Vector> {
    let n = num_rays as f64;
    let offset = 2.0 / n;
    let increment = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());

    (0..num_rays)
        .map(|i| {
            let y = (i as f64 * offset - 1.0) + offset / 2.0;
            let r = (1.0 - y * y).max(0.0).sqrt();
            let phi = (i % num_rays) as f64 * increment;
            let v = Vector::new(phi.cos() * r, y, phi.sin() * r);
            // Already unit length up to round-off
            v.normalize().unwrap_or(v)
        })
        .collect()
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(80);
        writeln!(f, "{rule}")?;
        writeln!(f, "Source summary")?;
        writeln!(f, "{rule}")?;
        writeln!(f)?;
        writeln!(f, "- name: {}", self.name)?;
        writeln!(f, "- type: fibonacci_uniform")?;
        writeln!(f, "- xyz: {:.3}", self.origin)?;
        if let Some(first) = self.bands.first() {
            writeln!(f, "- power: {} (W)", self.power[first])?;
        }
        writeln!(f, "- number of rays: {}", self.num_rays())?;
        if let (Some(lo), Some(hi)) = (self.bands.first(), self.bands.last()) {
            writeln!(
                f,
                "- frequencies: {} from {}Hz to {}Hz",
                self.bands.len(),
                lo.center_frequency(),
                hi.center_frequency()
            )?;
        }
        writeln!(f, "- min_power: {} %", self.min_power_fraction * 100.0)?;
        writeln!(f)?;
        writeln!(f, "{rule}")
    }
}
