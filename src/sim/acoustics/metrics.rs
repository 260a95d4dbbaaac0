//! Room acoustic parameters computed from an energy-time curve.
//!
//! All functions work on 1 ms bins and return seconds (decay times), dB
//! (clarity) or ratios. `None` means the curve does not carry enough decay
//! to estimate the value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::etc::EnergyTimeCurve;
use crate::sim::bands::OctaveBand;

/// Bin width of an energy-time curve in seconds.
const BIN_SECONDS: f64 = 0.001;

/// STI bands and their weights (male speech).
const STI_WEIGHTS: [(OctaveBand, f64); 6] = [
    (OctaveBand::Hz125, 0.129),
    (OctaveBand::Hz250, 0.143),
    (OctaveBand::Hz500, 0.114),
    (OctaveBand::Hz1000, 0.114),
    (OctaveBand::Hz2000, 0.186),
    (OctaveBand::Hz4000, 0.171),
];

/// Schroeder backward-integrated decay of one band in dB (0 dB at t = 0).
///
/// Empty if the band holds no energy.
pub fn schroeder_decay(etc: &EnergyTimeCurve, band: OctaveBand) -> Vec<f64> {
    let curve = etc.band_curve(band);
    let total: f64 = curve.iter().sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut remaining = total;
    curve
        .iter()
        .map(|&e| {
            let db = 10.0 * (remaining / total).max(1e-300).log10();
            remaining -= e;
            db
        })
        .collect()
}

/// Line fit over the decay between `start_db` and `end_db`, extrapolated to -60 dB.
fn decay_time(decay: &[f64], start_db: f64, end_db: f64) -> Option<f64> {
    let i_start = decay.iter().position(|&v| v <= start_db)?;
    let i_end = decay.iter().position(|&v| v <= end_db)?;
    if i_end <= i_start {
        return None;
    }

    let n = (i_end - i_start + 1) as f64;
    let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
    for (i, &y) in decay.iter().enumerate().take(i_end + 1).skip(i_start) {
        let x = i as f64 * BIN_SECONDS;
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
    }
    let denom = n * sxx - sx * sx;
    if denom == 0.0 {
        return None;
    }
    let slope = (n * sxy - sx * sy) / denom;
    if slope >= 0.0 {
        return None;
    }
    Some(-60.0 / slope)
}

/// Early decay time (0 to -10 dB).
pub fn edt(etc: &EnergyTimeCurve, band: OctaveBand) -> Option<f64> {
    decay_time(&schroeder_decay(etc, band), 0.0, -10.0)
}

/// Reverberation time from the -5 to -25 dB range.
pub fn t20(etc: &EnergyTimeCurve, band: OctaveBand) -> Option<f64> {
    decay_time(&schroeder_decay(etc, band), -5.0, -25.0)
}

/// Reverberation time from the -5 to -35 dB range.
pub fn t30(etc: &EnergyTimeCurve, band: OctaveBand) -> Option<f64> {
    decay_time(&schroeder_decay(etc, band), -5.0, -35.0)
}

/// T30, or T20 when the curve is too short.
pub fn rt60(etc: &EnergyTimeCurve, band: OctaveBand) -> Option<f64> {
    t30(etc, band).or_else(|| t20(etc, band))
}

fn early_late(etc: &EnergyTimeCurve, band: OctaveBand, boundary_ms: usize) -> Option<(f64, f64)> {
    let curve = etc.band_curve(band);
    if boundary_ms >= curve.len() {
        return None;
    }
    let early = curve[..boundary_ms].iter().sum();
    let late = curve[boundary_ms..].iter().sum();
    Some((early, late))
}

/// Clarity C80 in dB.
pub fn c80(etc: &EnergyTimeCurve, band: OctaveBand) -> Option<f64> {
    let (early, late) = early_late(etc, band, 80)?;
    if late <= 0.0 {
        return None;
    }
    Some(10.0 * (early / late).log10())
}

/// Definition D50: early (first 50 ms) to total energy ratio.
pub fn d50(etc: &EnergyTimeCurve, band: OctaveBand) -> Option<f64> {
    let (early, late) = early_late(etc, band, 50)?;
    let total = early + late;
    if total <= 0.0 {
        return None;
    }
    Some(early / total)
}

/// Simplified speech transmission index from per-band reverberation times.
///
/// Uses a single 1 Hz modulation frequency per band and no noise term.
pub fn sti(etc: &EnergyTimeCurve) -> Option<f64> {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (band, w) in STI_WEIGHTS {
        if !etc.bands().contains(band) {
            continue;
        }
        let t = rt60(etc, band).unwrap_or(0.0);
        if t <= 0.0 {
            continue;
        }
        let f_mod = 1.0;
        let m = 1.0 / (1.0 + (2.0 * std::f64::consts::PI * f_mod * t / 13.8).powi(2)).sqrt();
        let snr = 10.0 * (m / (1.0 - m).max(1e-10)).log10();
        weighted += w * snr.clamp(-15.0, 15.0);
        total_weight += w;
    }

    if total_weight <= 0.0 {
        return None;
    }
    let mean_snr = weighted / total_weight;
    Some(((mean_snr + 15.0) / 30.0).clamp(0.0, 1.0))
}

/// Metrics of one band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandMetrics {
    pub edt: Option<f64>,
    pub t20: Option<f64>,
    pub t30: Option<f64>,
    pub c80: Option<f64>,
    pub d50: Option<f64>,
}

/// Metrics for every band of a receiver's curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAcousticReport {
    pub bands: BTreeMap<OctaveBand, BandMetrics>,
    pub sti: Option<f64>,
}

impl RoomAcousticReport {
    pub fn from_etc(etc: &EnergyTimeCurve) -> Self {
        let bands = etc
            .bands()
            .iter()
            .map(|band| {
                let m = BandMetrics {
                    edt: edt(etc, band),
                    t20: t20(etc, band),
                    t30: t30(etc, band),
                    c80: c80(etc, band),
                    d50: d50(etc, band),
                };
                (band, m)
            })
            .collect();
        Self {
            bands,
            sti: sti(etc),
        }
    }
}
