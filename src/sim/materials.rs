use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sim::bands::{BandSet, BandValues, NUM_OCTAVE_BANDS, OctaveBand};
use crate::sim::error::{Result, TraceError};

/// Identifier of a reflecting surface, shared between the geometry provider
/// and the surface registry.
#[derive(Eq, PartialEq, Hash, Debug, Clone, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SurfaceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SurfaceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acoustic surface material with per-band absorption, scattering and transmission.
///
/// Bands may be left undefined; a material used with a source that needs
/// an undefined band is rejected when the [`SurfaceRegistry`] is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcousticMaterial {
    pub name: String,
    /// Fraction of incident energy lost on reflection [0.0, 1.0].
    pub absorption: BTreeMap<OctaveBand, f64>,
    /// Fraction of reflected energy leaving diffusely [0.0, 1.0].
    pub scattering: BTreeMap<OctaveBand, f64>,
    /// Fraction of incident energy passing through the surface [0.0, 1.0].
    #[serde(default)]
    pub transmission: BTreeMap<OctaveBand, f64>,
}

impl AcousticMaterial {
    /// Creates a material from full octave-band arrays (63 Hz to 8 kHz), no transmission.
    pub fn new(
        name: &str,
        absorption: [f64; NUM_OCTAVE_BANDS],
        scattering: [f64; NUM_OCTAVE_BANDS],
    ) -> Self {
        let zip = |values: [f64; NUM_OCTAVE_BANDS]| -> BTreeMap<OctaveBand, f64> {
            OctaveBand::ALL.into_iter().zip(values).collect()
        };
        Self {
            name: name.to_string(),
            absorption: zip(absorption),
            scattering: zip(scattering),
            transmission: zip([0.0; NUM_OCTAVE_BANDS]),
        }
    }

    /// Creates a material with the same coefficients in all bands.
    pub fn uniform(name: &str, absorption: f64, scattering: f64) -> Self {
        Self::new(
            name,
            [absorption; NUM_OCTAVE_BANDS],
            [scattering; NUM_OCTAVE_BANDS],
        )
    }

    /// Creates a material defined only for the given bands.
    pub fn for_bands(name: &str, bands: &BandSet, absorption: f64, scattering: f64) -> Self {
        Self {
            name: name.to_string(),
            absorption: bands.iter().map(|b| (b, absorption)).collect(),
            scattering: bands.iter().map(|b| (b, scattering)).collect(),
            transmission: bands.iter().map(|b| (b, 0.0)).collect(),
        }
    }

    pub fn with_transmission(mut self, transmission: [f64; NUM_OCTAVE_BANDS]) -> Self {
        self.transmission = OctaveBand::ALL.into_iter().zip(transmission).collect();
        self
    }

    /// Resolves this material into dense coefficients for `bands`.
    ///
    /// Every band of `bands` must have absorption and scattering in [0, 1],
    /// and absorption + transmission must not exceed 1. Missing transmission
    /// entries mean no transmission.
    pub fn resolve(&self, bands: &BandSet) -> Result<SurfaceCoefficients> {
        let mut absorption = BandValues::zeros();
        let mut scattering = BandValues::zeros();
        let mut transmission = BandValues::zeros();

        for band in bands.iter() {
            let alpha = required(&self.absorption, band, &self.name, "absorption")?;
            let s = required(&self.scattering, band, &self.name, "scattering")?;
            let tau = match self.transmission.get(&band) {
                Some(&t) => check_unit(t, &self.name, "transmission", band)?,
                None => 0.0,
            };
            if alpha + tau > 1.0 + 1e-12 {
                return Err(TraceError::invalid(format!(
                    "material '{}': absorption + transmission = {} exceeds 1 at {band}",
                    self.name,
                    alpha + tau
                )));
            }
            absorption[band] = alpha;
            scattering[band] = s;
            transmission[band] = tau;
        }

        Ok(SurfaceCoefficients {
            material: self.name.clone(),
            absorption,
            scattering,
            transmission,
            mean_scattering: scattering.mean_over(bands),
        })
    }
}

fn required(
    values: &BTreeMap<OctaveBand, f64>,
    band: OctaveBand,
    material: &str,
    what: &str,
) -> Result<f64> {
    let value = values.get(&band).copied().ok_or_else(|| {
        TraceError::invalid(format!("material '{material}' has no {what} for {band}"))
    })?;
    check_unit(value, material, what, band)
}

fn check_unit(value: f64, material: &str, what: &str, band: OctaveBand) -> Result<f64> {
    if !(0.0..=1.0).contains(&value) {
        return Err(TraceError::invalid(format!(
            "material '{material}': {what} {value} at {band} is outside [0, 1]"
        )));
    }
    Ok(value)
}

/// Dense coefficients of a surface, resolved for the bands of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceCoefficients {
    /// Name of the material the coefficients come from.
    pub material: String,
    pub absorption: BandValues,
    pub scattering: BandValues,
    pub transmission: BandValues,
    /// Mean scattering over the run's bands; drives the choice between
    /// specular and diffuse reflection.
    pub mean_scattering: f64,
}

impl SurfaceCoefficients {
    /// Per-band fraction of energy kept on reflection (`1 - absorption`).
    pub fn reflection_factors(&self) -> BandValues {
        let mut out = BandValues::zeros();
        for (o, a) in out.0.iter_mut().zip(self.absorption.0.iter()) {
            *o = 1.0 - a;
        }
        out
    }
}

/// Read-only map from surface identifier to resolved coefficients.
#[derive(Debug, Clone)]
pub struct SurfaceRegistry {
    bands: BandSet,
    surfaces: HashMap<SurfaceId, SurfaceCoefficients>,
}

impl SurfaceRegistry {
    pub fn new(bands: BandSet) -> Self {
        Self {
            bands,
            surfaces: HashMap::new(),
        }
    }

    /// Registers (or replaces) a surface. Fails if the material does not
    /// cover every band of the registry or has out-of-range coefficients.
    pub fn insert(&mut self, surface: SurfaceId, material: &AcousticMaterial) -> Result<()> {
        let coefficients = material.resolve(&self.bands)?;
        self.surfaces.insert(surface, coefficients);
        Ok(())
    }

    pub fn bands(&self) -> &BandSet {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn contains(&self, surface: &SurfaceId) -> bool {
        self.surfaces.contains_key(surface)
    }

    /// Coefficients of a surface; unregistered surfaces are a `MissingMaterial` error.
    pub fn lookup(&self, surface: &SurfaceId) -> Result<&SurfaceCoefficients> {
        self.surfaces
            .get(surface)
            .ok_or_else(|| TraceError::MissingMaterial {
                surface: surface.clone(),
            })
    }
}

/// Library of named materials with pattern assignment to surfaces.
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    /// Material definitions by name.
    materials: HashMap<String, AcousticMaterial>,
    /// Assignments: surface id pattern -> material name.
    assignments: Vec<(String, String)>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a material to the library.
    pub fn add(&mut self, material: AcousticMaterial) {
        self.materials.insert(material.name.clone(), material);
    }

    /// Assigns a material to surfaces whose id contains `pattern`.
    pub fn assign(&mut self, pattern: &str, material_name: &str) {
        self.assignments
            .push((pattern.to_string(), material_name.to_string()));
    }

    /// Looks up the material for a surface. Last matching assignment wins.
    pub fn lookup(&self, surface: &SurfaceId) -> Option<&AcousticMaterial> {
        for (pattern, material_name) in self.assignments.iter().rev() {
            if surface.as_str().contains(pattern.as_str()) {
                return self.materials.get(material_name);
            }
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<&AcousticMaterial> {
        self.materials.get(name)
    }

    /// Builds a registry for `surfaces` and the given bands.
    ///
    /// An assignment naming an unknown material is a configuration error.
    /// Surfaces without any assignment stay unregistered; rays hitting them
    /// fail with `MissingMaterial`.
    pub fn build_registry<'a, I>(&self, surfaces: I, bands: BandSet) -> Result<SurfaceRegistry>
    where
        I: IntoIterator<Item = &'a SurfaceId>,
    {
        for (pattern, material_name) in &self.assignments {
            if !self.materials.contains_key(material_name) {
                return Err(TraceError::invalid(format!(
                    "assignment '{pattern}' refers to unknown material '{material_name}'"
                )));
            }
        }

        let mut registry = SurfaceRegistry::new(bands);
        for surface in surfaces {
            match self.lookup(surface) {
                Some(material) => registry.insert(surface.clone(), material)?,
                None => log::warn!("No material assigned to surface '{surface}'"),
            }
        }
        Ok(registry)
    }

    /// Creates a library pre-populated with common room materials.
    pub fn with_presets() -> Self {
        let mut lib = Self::new();
        lib.add(AcousticMaterial::new(
            "concrete",
            [0.01, 0.01, 0.01, 0.02, 0.02, 0.02, 0.03, 0.03],
            [0.10; NUM_OCTAVE_BANDS],
        ));
        lib.add(
            AcousticMaterial::new(
                "glass",
                [0.25, 0.18, 0.06, 0.04, 0.03, 0.02, 0.02, 0.02],
                [0.05; NUM_OCTAVE_BANDS],
            )
            .with_transmission([0.05, 0.04, 0.03, 0.02, 0.01, 0.01, 0.01, 0.01]),
        );
        lib.add(AcousticMaterial::new(
            "gypsum",
            [0.30, 0.29, 0.10, 0.05, 0.04, 0.07, 0.09, 0.09],
            [0.10; NUM_OCTAVE_BANDS],
        ));
        lib.add(AcousticMaterial::new(
            "carpet",
            [0.01, 0.02, 0.06, 0.14, 0.37, 0.60, 0.65, 0.65],
            [0.40, 0.40, 0.40, 0.40, 0.50, 0.50, 0.50, 0.50],
        ));
        lib.add(AcousticMaterial::new(
            "wood",
            [0.15, 0.15, 0.11, 0.10, 0.07, 0.06, 0.07, 0.07],
            [0.10; NUM_OCTAVE_BANDS],
        ));
        lib
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uniform_material() {
        let mat = AcousticMaterial::uniform("plaster", 0.1, 0.2);
        let c = mat.resolve(&BandSet::all()).unwrap();
        for band in OctaveBand::ALL {
            assert!((c.absorption[band] - 0.1).abs() < 1e-12);
            assert!((c.scattering[band] - 0.2).abs() < 1e-12);
            assert!((c.reflection_factors()[band] - 0.9).abs() < 1e-12);
        }
        assert!((c.mean_scattering - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_missing_band_is_invalid_configuration() {
        let mat = AcousticMaterial::for_bands("low", &BandSet::single(OctaveBand::Hz125), 0.1, 0.0);
        assert!(mat.resolve(&BandSet::single(OctaveBand::Hz125)).is_ok());
        let err = mat.resolve(&BandSet::single(OctaveBand::Hz500)).unwrap_err();
        assert!(matches!(err, TraceError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_out_of_range_coefficients_rejected() {
        let mat = AcousticMaterial::uniform("bad", 1.2, 0.0);
        assert!(matches!(
            mat.resolve(&BandSet::all()),
            Err(TraceError::InvalidConfiguration(_))
        ));

        let mat = AcousticMaterial::uniform("nan", f64::NAN, 0.0);
        assert!(mat.resolve(&BandSet::all()).is_err());
    }

    #[test]
    fn test_absorption_plus_transmission_limit() {
        let mat = AcousticMaterial::uniform("leaky", 0.7, 0.0)
            .with_transmission([0.4; NUM_OCTAVE_BANDS]);
        assert!(mat.resolve(&BandSet::all()).is_err());

        let mat = AcousticMaterial::uniform("ok", 0.6, 0.0)
            .with_transmission([0.4; NUM_OCTAVE_BANDS]);
        assert!(mat.resolve(&BandSet::all()).is_ok());
    }

    #[test]
    fn test_registry_lookup_missing_material() {
        let mut reg = SurfaceRegistry::new(BandSet::all());
        reg.insert("floor".into(), &AcousticMaterial::uniform("m", 0.1, 0.0))
            .unwrap();
        assert!(reg.lookup(&"floor".into()).is_ok());
        let err = reg.lookup(&"ceiling".into()).unwrap_err();
        assert_eq!(
            err,
            TraceError::MissingMaterial {
                surface: "ceiling".into()
            }
        );
    }

    #[test]
    fn test_library_last_assignment_wins() {
        let mut lib = MaterialLibrary::with_presets();
        lib.assign("/", "concrete");
        lib.assign("floor", "carpet");

        let floor: SurfaceId = "room/floor".into();
        let wall: SurfaceId = "room/wall_0".into();
        assert_eq!(lib.lookup(&floor).unwrap().name, "carpet");
        assert_eq!(lib.lookup(&wall).unwrap().name, "concrete");

        let reg = lib.build_registry([&floor, &wall], BandSet::all()).unwrap();
        assert_eq!(reg.len(), 2);
        let carpet = reg.lookup(&floor).unwrap();
        assert!((carpet.absorption[OctaveBand::Hz4000] - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_library_unassigned_surface_stays_unregistered() {
        let mut lib = MaterialLibrary::with_presets();
        lib.assign("wall", "wood");
        let floor: SurfaceId = "floor".into();
        let reg = lib.build_registry([&floor], BandSet::all()).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_library_unknown_material_rejected() {
        let mut lib = MaterialLibrary::new();
        lib.assign("wall", "unobtainium");
        let wall: SurfaceId = "wall".into();
        assert!(lib.build_registry([&wall], BandSet::all()).is_err());
    }

    #[test]
    fn test_material_serde_uses_band_labels() {
        let mat = AcousticMaterial::for_bands("m", &BandSet::single(OctaveBand::Hz500), 0.3, 0.1);
        let json = serde_json::to_value(&mat).unwrap();
        assert_eq!(json["absorption"]["500"], 0.3);
        let back: AcousticMaterial = serde_json::from_value(json).unwrap();
        assert_eq!(back, mat);
    }
}
