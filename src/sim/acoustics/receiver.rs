use std::fmt;

use serde::{Deserialize, Serialize};

use super::accumulator::Contribution;
use super::tracer::RayTrace;
use crate::Point;
use crate::sim::error::{Result, TraceError};

/// Default number of decimals used in receiver keys.
pub const DEFAULT_KEY_PRECISION: usize = 3;

/// Largest accepted key precision. Finer keys stop being exact in `f64`.
pub const MAX_KEY_PRECISION: usize = 12;

/// Rejects key precisions above [`MAX_KEY_PRECISION`].
pub fn check_key_precision(precision: usize) -> Result<()> {
    if precision > MAX_KEY_PRECISION {
        return Err(TraceError::invalid(format!(
            "receiver key precision must be at most {MAX_KEY_PRECISION}, got {precision}"
        )));
    }
    Ok(())
}

/// Geometric fingerprint of a receiver position, e.g. `"5.000,5.000,9.000"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiverKey(String);

impl ReceiverKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the key of a point: coordinates rounded to `precision` decimals,
/// comma separated, with negative zero written as zero.
///
/// Precisions above [`MAX_KEY_PRECISION`] are capped.
pub fn geometric_key(point: Point, precision: usize) -> ReceiverKey {
    let precision = precision.min(MAX_KEY_PRECISION);
    let factor = 10f64.powi(precision as i32);
    let coord = |v: f64| {
        let scaled = (v * factor).round() / factor;
        // Coordinates too large to scale are already integral
        let mut r = if scaled.is_finite() { scaled } else { v };
        if r == 0.0 {
            r = 0.0;
        }
        format!("{r:.precision$}")
    };
    ReceiverKey(format!(
        "{},{},{}",
        coord(point.x),
        coord(point.y),
        coord(point.z)
    ))
}

/// A microphone position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub position: Point,
    pub key: ReceiverKey,
}

impl Receiver {
    pub fn new(position: Point) -> Self {
        Self::with_precision(position, DEFAULT_KEY_PRECISION)
    }

    pub fn with_precision(position: Point, precision: usize) -> Self {
        Self {
            position,
            key: geometric_key(position, precision),
        }
    }
}

/// Receivers deduplicated by key, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverSet {
    receivers: Vec<Receiver>,
}

impl ReceiverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from positions. Non-finite positions and key precisions
    /// above [`MAX_KEY_PRECISION`] are rejected.
    pub fn from_points<I>(points: I, precision: usize) -> Result<Self>
    where
        I: IntoIterator<Item = Point>,
    {
        check_key_precision(precision)?;
        let mut set = Self::new();
        for p in points {
            if !p.is_finite() {
                return Err(TraceError::invalid(format!(
                    "receiver position {p} is not finite"
                )));
            }
            set.insert(Receiver::with_precision(p, precision));
        }
        Ok(set)
    }

    /// Adds a receiver. Returns false if one with the same key exists.
    pub fn insert(&mut self, receiver: Receiver) -> bool {
        if self.receivers.iter().any(|r| r.key == receiver.key) {
            log::debug!("Duplicate receiver {} ignored", receiver.key);
            return false;
        }
        self.receivers.push(receiver);
        true
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Receiver> {
        self.receivers.iter()
    }

    pub fn as_slice(&self) -> &[Receiver] {
        &self.receivers
    }

    pub fn get(&self, key: &ReceiverKey) -> Option<&Receiver> {
        self.receivers.iter().find(|r| &r.key == key)
    }
}

/// Decides which parts of a ray trace reach a receiver.
pub trait ProximityTest: Sync {
    /// Time-binned energy the ray delivers to `receiver`.
    fn contributions(
        &self,
        receiver: &Receiver,
        trace: &RayTrace,
        speed_of_sound: f64,
    ) -> Vec<Contribution>;
}

/// Spherical receiver volume.
///
/// A segment passing within `radius` of the receiver contributes once, at its
/// point of closest approach, with the power the ray carried along it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereProximity {
    pub radius: f64,
}

impl SphereProximity {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    fn contains(&self, center: Point, p: Point) -> bool {
        center.distance(&p) <= self.radius
    }
}

impl ProximityTest for SphereProximity {
    fn contributions(
        &self,
        receiver: &Receiver,
        trace: &RayTrace,
        speed_of_sound: f64,
    ) -> Vec<Contribution> {
        let center = receiver.position;
        let mut out = Vec::new();
        let mut travelled = 0.0;
        let mut carried = trace.initial_power;
        let mut previous_near = false;

        for bounce in &trace.bounces {
            let seg = bounce.end - bounce.start;
            let len2 = seg.dot(seg);
            let t = if len2 > 0.0 {
                ((center - bounce.start).dot(seg) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let closest = bounce.start + seg * t;
            let near = closest.distance(&center) <= self.radius;

            // A ray reflecting inside the sphere is one visit, counted on
            // the segment that entered it.
            let continues_visit = previous_near && self.contains(center, bounce.start);

            if near && !continues_visit {
                let distance = travelled + t * bounce.length;
                let time_bin = (distance / speed_of_sound * 1000.0).floor() as i64;
                out.push(Contribution {
                    time_bin,
                    energy: carried,
                });
            }
            previous_near = near;
            travelled += bounce.length;
            carried = bounce.power;
        }
        out
    }
}
