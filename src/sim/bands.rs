//! Octave bands and per-band value containers.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Number of octave bands tracked by the simulation (63 Hz to 8 kHz).
pub const NUM_OCTAVE_BANDS: usize = 8;

/// Center frequencies of the octave bands in Hz.
pub const OCTAVE_BAND_FREQUENCIES: [f64; NUM_OCTAVE_BANDS] =
    [63.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0];

/// One of the 8 octave bands, serialized by its center frequency label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OctaveBand {
    #[serde(rename = "63")]
    Hz63,
    #[serde(rename = "125")]
    Hz125,
    #[serde(rename = "250")]
    Hz250,
    #[serde(rename = "500")]
    Hz500,
    #[serde(rename = "1000")]
    Hz1000,
    #[serde(rename = "2000")]
    Hz2000,
    #[serde(rename = "4000")]
    Hz4000,
    #[serde(rename = "8000")]
    Hz8000,
}

impl OctaveBand {
    /// All bands in ascending frequency order.
    pub const ALL: [OctaveBand; NUM_OCTAVE_BANDS] = [
        OctaveBand::Hz63,
        OctaveBand::Hz125,
        OctaveBand::Hz250,
        OctaveBand::Hz500,
        OctaveBand::Hz1000,
        OctaveBand::Hz2000,
        OctaveBand::Hz4000,
        OctaveBand::Hz8000,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn center_frequency(self) -> f64 {
        OCTAVE_BAND_FREQUENCIES[self.index()]
    }
}

impl fmt::Display for OctaveBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.center_frequency())
    }
}

/// Ordered set of octave bands. Iteration is always in ascending frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<OctaveBand>", into = "Vec<OctaveBand>")]
pub struct BandSet {
    mask: u8,
}

impl BandSet {
    pub fn empty() -> Self {
        Self { mask: 0 }
    }

    pub fn all() -> Self {
        Self { mask: u8::MAX }
    }

    pub fn single(band: OctaveBand) -> Self {
        let mut set = Self::empty();
        set.insert(band);
        set
    }

    pub fn insert(&mut self, band: OctaveBand) {
        self.mask |= 1 << band.index();
    }

    pub fn contains(&self, band: OctaveBand) -> bool {
        self.mask & (1 << band.index()) != 0
    }

    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = OctaveBand> + '_ {
        OctaveBand::ALL.into_iter().filter(|b| self.contains(*b))
    }

    pub fn first(&self) -> Option<OctaveBand> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<OctaveBand> {
        self.iter().last()
    }
}

impl FromIterator<OctaveBand> for BandSet {
    fn from_iter<I: IntoIterator<Item = OctaveBand>>(iter: I) -> Self {
        let mut set = Self::empty();
        for band in iter {
            set.insert(band);
        }
        set
    }
}

impl From<Vec<OctaveBand>> for BandSet {
    fn from(bands: Vec<OctaveBand>) -> Self {
        bands.into_iter().collect()
    }
}

impl From<BandSet> for Vec<OctaveBand> {
    fn from(set: BandSet) -> Self {
        set.iter().collect()
    }
}

/// Dense per-band values, indexed by [`OctaveBand`].
///
/// Bands outside the set a value is used with are simply ignored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandValues(pub [f64; NUM_OCTAVE_BANDS]);

impl BandValues {
    pub fn zeros() -> Self {
        Self([0.0; NUM_OCTAVE_BANDS])
    }

    pub fn uniform(value: f64) -> Self {
        Self([value; NUM_OCTAVE_BANDS])
    }

    /// Sum over the bands of `bands`.
    pub fn sum_over(&self, bands: &BandSet) -> f64 {
        bands.iter().map(|b| self[b]).sum()
    }

    /// Mean over the bands of `bands` (0 for an empty set).
    pub fn mean_over(&self, bands: &BandSet) -> f64 {
        if bands.is_empty() {
            return 0.0;
        }
        self.sum_over(bands) / bands.len() as f64
    }

    /// Element-wise product.
    pub fn scaled_by(&self, factors: &BandValues) -> Self {
        let mut out = *self;
        for (v, f) in out.0.iter_mut().zip(factors.0.iter()) {
            *v *= f;
        }
        out
    }

    pub fn scale(&self, factor: f64) -> Self {
        let mut out = *self;
        for v in out.0.iter_mut() {
            *v *= factor;
        }
        out
    }

    /// Adds `other` into `self` for the bands of `bands`.
    pub fn add_assign_over(&mut self, other: &BandValues, bands: &BandSet) {
        for b in bands.iter() {
            self[b] += other[b];
        }
    }
}

impl Index<OctaveBand> for BandValues {
    type Output = f64;
    fn index(&self, band: OctaveBand) -> &f64 {
        &self.0[band.index()]
    }
}

impl IndexMut<OctaveBand> for BandValues {
    fn index_mut(&mut self, band: OctaveBand) -> &mut f64 {
        &mut self.0[band.index()]
    }
}
