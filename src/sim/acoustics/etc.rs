//! Energy-time curve: per-band energy in 1 ms bins.

use std::collections::BTreeMap;

use crate::sim::bands::{BandSet, BandValues, OctaveBand};
use crate::sim::error::{Result, TraceError};

/// Longest curve accepted from configurations and files (one minute).
pub const MAX_DURATION_MS: u32 = 60_000;

/// Rejects curve lengths of 0 or above [`MAX_DURATION_MS`].
pub fn check_duration(max_duration_ms: u32) -> Result<()> {
    if max_duration_ms == 0 || max_duration_ms > MAX_DURATION_MS {
        return Err(TraceError::invalid(format!(
            "max_duration_ms must be in 1..={MAX_DURATION_MS}, got {max_duration_ms}"
        )));
    }
    Ok(())
}

/// Accumulated energy per band per millisecond bin over `[0, max_duration_ms)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyTimeCurve {
    bands: BandSet,
    max_duration_ms: u32,
    bins: Vec<BandValues>,
}

impl EnergyTimeCurve {
    /// Allocates `max_duration_ms` zeroed bins. Callers taking the length
    /// from outside input should run [`check_duration`] first.
    pub fn new(bands: BandSet, max_duration_ms: u32) -> Self {
        Self {
            bands,
            max_duration_ms,
            bins: vec![BandValues::zeros(); max_duration_ms as usize],
        }
    }

    pub fn bands(&self) -> &BandSet {
        &self.bands
    }

    pub fn max_duration_ms(&self) -> u32 {
        self.max_duration_ms
    }

    /// Adds `energy` into `time_bin` for every band of the curve.
    ///
    /// Returns false (and adds nothing) if the bin is outside the curve.
    pub fn add(&mut self, time_bin: i64, energy: &BandValues) -> bool {
        if time_bin < 0 || time_bin >= i64::from(self.max_duration_ms) {
            return false;
        }
        self.bins[time_bin as usize].add_assign_over(energy, &self.bands);
        true
    }

    /// Energy of one band in one bin (0 outside the curve or its bands).
    pub fn get(&self, band: OctaveBand, time_bin: u32) -> f64 {
        if !self.bands.contains(band) {
            return 0.0;
        }
        self.bins
            .get(time_bin as usize)
            .map(|b| b[band])
            .unwrap_or(0.0)
    }

    /// All bins of one band, index = time in ms.
    pub fn band_curve(&self, band: OctaveBand) -> Vec<f64> {
        if !self.bands.contains(band) {
            return vec![0.0; self.bins.len()];
        }
        self.bins.iter().map(|b| b[band]).collect()
    }

    pub fn bins(&self) -> &[BandValues] {
        &self.bins
    }

    /// Adds another curve bin by bin. Both must share bands and duration.
    pub fn merge(&mut self, other: &EnergyTimeCurve) -> Result<()> {
        if self.bands != other.bands || self.max_duration_ms != other.max_duration_ms {
            return Err(TraceError::invalid(format!(
                "cannot merge curves of {} ms / {} bands with {} ms / {} bands",
                self.max_duration_ms,
                self.bands.len(),
                other.max_duration_ms,
                other.bands.len()
            )));
        }
        self.add_bins(other);
        Ok(())
    }

    /// Bin-wise addition for curves known to share a shape.
    pub(super) fn add_bins(&mut self, other: &EnergyTimeCurve) {
        for (a, b) in self.bins.iter_mut().zip(other.bins.iter()) {
            a.add_assign_over(b, &self.bands);
        }
    }

    /// Total energy of one band.
    pub fn band_energy(&self, band: OctaveBand) -> f64 {
        self.band_curve(band).iter().sum()
    }

    /// Total energy over all bands and bins.
    pub fn total_energy(&self) -> f64 {
        self.bins.iter().map(|b| b.sum_over(&self.bands)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_energy() == 0.0
    }

    /// First bin holding energy in any band.
    pub fn first_nonzero_bin(&self) -> Option<u32> {
        self.bins
            .iter()
            .position(|b| b.sum_over(&self.bands) > 0.0)
            .map(|i| i as u32)
    }

    /// Sparse nested form: band -> bin -> energy. Empty bins are omitted.
    pub fn to_nested(&self) -> BTreeMap<OctaveBand, BTreeMap<u32, f64>> {
        self.bands
            .iter()
            .map(|band| {
                let bins = self
                    .bins
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| b[band] != 0.0)
                    .map(|(i, b)| (i as u32, b[band]))
                    .collect();
                (band, bins)
            })
            .collect()
    }

    /// Rebuilds a curve from its nested form.
    pub fn from_nested(
        nested: &BTreeMap<OctaveBand, BTreeMap<u32, f64>>,
        max_duration_ms: u32,
    ) -> Result<Self> {
        check_duration(max_duration_ms)?;
        let bands: BandSet = nested.keys().copied().collect();
        let mut etc = Self::new(bands, max_duration_ms);
        for (&band, bins) in nested {
            for (&bin, &energy) in bins {
                if !energy.is_finite() || energy < 0.0 {
                    return Err(TraceError::invalid(format!(
                        "invalid energy {energy} at {band}, bin {bin}"
                    )));
                }
                if bin >= max_duration_ms {
                    return Err(TraceError::invalid(format!(
                        "bin {bin} at {band} is outside [0, {max_duration_ms})"
                    )));
                }
                etc.bins[bin as usize][band] = energy;
            }
        }
        Ok(etc)
    }
}
