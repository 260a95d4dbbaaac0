//! Reduction of per-ray receiver contributions into energy-time curves.
//!
//! Accumulation is plain addition, so partial curves built on different
//! workers can be merged in any order. Running it twice over the same rays
//! doubles the energy.

use std::collections::BTreeMap;

use rayon::prelude::*;

use super::etc::EnergyTimeCurve;
use super::receiver::{ProximityTest, Receiver, ReceiverKey};
use super::tracer::RayTrace;
use crate::sim::bands::{BandSet, BandValues};

/// Energy a ray delivers to a receiver in one time bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    /// Arrival time in ms. May fall outside the curve; such values are dropped.
    pub time_bin: i64,
    pub energy: BandValues,
}

/// Contributions of one ray, one list per receiver (same order as the receivers).
#[derive(Debug, Clone, PartialEq)]
pub struct RayContributions {
    pub ray_index: usize,
    pub per_receiver: Vec<Vec<Contribution>>,
}

/// Curves per receiver and the number of contributions dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulation {
    pub etcs: BTreeMap<ReceiverKey, EnergyTimeCurve>,
    pub dropped: usize,
}

impl Accumulation {
    pub fn new(receivers: &[Receiver], bands: BandSet, max_duration_ms: u32) -> Self {
        let etcs = receivers
            .iter()
            .map(|r| (r.key.clone(), EnergyTimeCurve::new(bands, max_duration_ms)))
            .collect();
        Self { etcs, dropped: 0 }
    }

    pub fn get(&self, key: &ReceiverKey) -> Option<&EnergyTimeCurve> {
        self.etcs.get(key)
    }
}

/// Runs the proximity test for every ray and receiver, in parallel.
pub fn collect_contributions<T: ProximityTest + ?Sized>(
    receivers: &[Receiver],
    rays: &[RayTrace],
    proximity: &T,
    speed_of_sound: f64,
) -> Vec<RayContributions> {
    rays.par_iter()
        .map(|ray| RayContributions {
            ray_index: ray.ray_index,
            per_receiver: receivers
                .iter()
                .map(|r| proximity.contributions(r, ray, speed_of_sound))
                .collect(),
        })
        .collect()
}

/// Builds one curve per receiver from the contributions of many rays.
///
/// Contributions outside `[0, max_duration_ms)` are dropped and counted.
pub fn accumulate(
    receivers: &[Receiver],
    contributions: &[RayContributions],
    bands: BandSet,
    max_duration_ms: u32,
) -> Accumulation {
    let empty = || {
        (
            vec![EnergyTimeCurve::new(bands, max_duration_ms); receivers.len()],
            0usize,
        )
    };

    let (curves, dropped) = contributions
        .par_iter()
        .fold(empty, |(mut curves, mut dropped), ray| {
            dropped += add_ray(&mut curves, ray);
            (curves, dropped)
        })
        .reduce(empty, |(mut a, da), (b, db)| {
            for (ca, cb) in a.iter_mut().zip(b.iter()) {
                ca.add_bins(cb);
            }
            (a, da + db)
        });

    if dropped > 0 {
        log::warn!(
            "Dropped {dropped} receiver contributions outside [0, {max_duration_ms}) ms"
        );
    }

    let etcs = receivers
        .iter()
        .map(|r| r.key.clone())
        .zip(curves)
        .collect();
    Accumulation { etcs, dropped }
}

/// Sequentially adds more contributions to an existing accumulation.
///
/// Receivers without a curve in `acc` are skipped.
pub fn accumulate_into(
    acc: &mut Accumulation,
    receivers: &[Receiver],
    contributions: &[RayContributions],
) {
    let mut dropped = 0;
    for ray in contributions {
        for (receiver, list) in receivers.iter().zip(ray.per_receiver.iter()) {
            let Some(etc) = acc.etcs.get_mut(&receiver.key) else {
                continue;
            };
            for c in list {
                if !etc.add(c.time_bin, &c.energy) {
                    dropped += 1;
                }
            }
        }
    }
    if dropped > 0 {
        log::warn!("Dropped {dropped} receiver contributions outside the curve");
    }
    acc.dropped += dropped;
}

fn add_ray(curves: &mut [EnergyTimeCurve], ray: &RayContributions) -> usize {
    let mut dropped = 0;
    for (etc, list) in curves.iter_mut().zip(ray.per_receiver.iter()) {
        for c in list {
            if !etc.add(c.time_bin, &c.energy) {
                dropped += 1;
            }
        }
    }
    dropped
}
