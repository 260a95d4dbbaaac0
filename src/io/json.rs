//! Versioned JSON files for scenes, sources, configurations, ray traces
//! and energy-time curves.

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::sim::acoustics::etc::EnergyTimeCurve;
use crate::sim::acoustics::receiver::ReceiverKey;
use crate::sim::acoustics::tracer::RayTrace;
use crate::sim::bands::{BandSet, OctaveBand};
use crate::sim::engine::FlatScene;
use crate::sim::materials::SurfaceId;
use crate::sim::rays::{SimulationConfig, SimulationResult};
use crate::{Point, Polygon, Source};

/// Version written to (and accepted from) every file.
pub const FORMAT_VERSION: u32 = 1;

/// Energy-time curves of all receivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcFile {
    pub version: u32,
    pub max_duration_ms: u32,
    pub receivers: BTreeMap<ReceiverKey, EtcEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcEntry {
    pub position: Point,
    /// band -> ms bin -> energy (empty bins omitted)
    pub bands: BTreeMap<OctaveBand, BTreeMap<u32, f64>>,
}

/// Source definition. Directions are regenerated on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub version: u32,
    pub name: String,
    pub origin: Point,
    pub bands: BandSet,
    pub power: BTreeMap<OctaveBand, f64>,
    pub num_rays: usize,
    pub min_power_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracesFile {
    pub version: u32,
    pub speed_of_sound: f64,
    pub rays: Vec<RayTrace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFile {
    pub version: u32,
    pub surfaces: Vec<SceneSurface>,
}

/// Convex planar polygon. Vertex order sets the normal (right-hand rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSurface {
    pub id: SurfaceId,
    pub vertices: Vec<Point>,
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create file: {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)
        .with_context(|| format!("Failed to write {what} file: {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse {what} file: {}", path.display()))
}

fn check_version(version: u32, path: &Path) -> Result<()> {
    if version != FORMAT_VERSION {
        return Err(anyhow!(
            "Unsupported format version {version} in {} (expected {FORMAT_VERSION})",
            path.display()
        ));
    }
    Ok(())
}

/// Writes the energy-time curves of a simulation result.
pub fn write_etcs(path: &Path, result: &SimulationResult) -> Result<()> {
    let receivers = result
        .receivers
        .iter()
        .filter_map(|r| {
            let etc = result.etcs.get(&r.key)?;
            let entry = EtcEntry {
                position: r.position,
                bands: etc.to_nested(),
            };
            Some((r.key.clone(), entry))
        })
        .collect();
    let file = EtcFile {
        version: FORMAT_VERSION,
        max_duration_ms: result.config.max_duration_ms,
        receivers,
    };
    write_json(path, &file, "ETC")
}

/// Reads energy-time curves, keyed by receiver, with receiver positions.
pub fn read_etcs(path: &Path) -> Result<BTreeMap<ReceiverKey, (Point, EnergyTimeCurve)>> {
    let file: EtcFile = read_json(path, "ETC")?;
    check_version(file.version, path)?;

    file.receivers
        .into_iter()
        .map(|(key, entry)| {
            let etc = EnergyTimeCurve::from_nested(&entry.bands, file.max_duration_ms)
                .with_context(|| format!("Invalid curve for receiver {key}"))?;
            Ok::<_, anyhow::Error>((key, (entry.position, etc)))
        })
        .collect()
}

pub fn write_source(path: &Path, source: &Source) -> Result<()> {
    let file = SourceFile {
        version: FORMAT_VERSION,
        name: source.name.clone(),
        origin: source.origin,
        bands: source.bands,
        power: source.bands.iter().map(|b| (b, source.power[b])).collect(),
        num_rays: source.num_rays(),
        min_power_fraction: source.min_power_fraction,
    };
    write_json(path, &file, "source")
}

pub fn read_source(path: &Path) -> Result<Source> {
    let file: SourceFile = read_json(path, "source")?;
    check_version(file.version, path)?;
    let source = Source::generate(
        &file.name,
        file.origin,
        &file.power,
        file.num_rays,
        file.bands,
        file.min_power_fraction,
    )
    .with_context(|| format!("Invalid source in {}", path.display()))?;
    Ok(source)
}

pub fn write_traces(path: &Path, rays: &[RayTrace], speed_of_sound: f64) -> Result<()> {
    let file = TracesFile {
        version: FORMAT_VERSION,
        speed_of_sound,
        rays: rays.to_vec(),
    };
    write_json(path, &file, "traces")
}

pub fn read_traces(path: &Path) -> Result<TracesFile> {
    let file: TracesFile = read_json(path, "traces")?;
    check_version(file.version, path)?;
    Ok(file)
}

/// Reads a configuration. Missing fields take their defaults.
pub fn read_config(path: &Path) -> Result<SimulationConfig> {
    let config: SimulationConfig = read_json(path, "config")?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

pub fn write_config(path: &Path, config: &SimulationConfig) -> Result<()> {
    write_json(path, config, "config")
}

pub fn write_scene(path: &Path, scene: &FlatScene) -> Result<()> {
    let surfaces = scene
        .surface_ids()
        .iter()
        .zip(scene.polygons.iter())
        .map(|(id, poly)| SceneSurface {
            id: id.clone(),
            vertices: poly.vertices().to_vec(),
        })
        .collect();
    let file = SceneFile {
        version: FORMAT_VERSION,
        surfaces,
    };
    write_json(path, &file, "scene")
}

pub fn read_scene(path: &Path) -> Result<FlatScene> {
    let file: SceneFile = read_json(path, "scene")?;
    check_version(file.version, path)?;

    let mut surfaces = Vec::with_capacity(file.surfaces.len());
    for s in file.surfaces {
        let poly = Polygon::new(s.id.as_str(), s.vertices, None)
            .with_context(|| format!("Invalid surface {}", s.id))?;
        surfaces.push((s.id, poly));
    }
    FlatScene::new(surfaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::acoustics::tracer::{RayTracer, TraceParams};
    use crate::sim::materials::{AcousticMaterial, MaterialLibrary};
    use crate::sim::rays::Simulation;
    use tempfile::NamedTempFile;

    fn small_result() -> SimulationResult {
        let scene = FlatScene::from_box(3.0, 3.0, 3.0, None, "room").unwrap();
        let mut lib = MaterialLibrary::new();
        lib.add(AcousticMaterial::uniform("walls", 0.3, 0.0));
        lib.assign("room", "walls");
        let mut config = SimulationConfig::new();
        config.num_rays = 100;
        config.bands = BandSet::single(OctaveBand::Hz500);
        config.source = Point::new(1.5, 1.5, 0.5);
        config.receivers = vec![Point::new(1.5, 1.5, 2.0)];
        config.receiver_radius = 0.5;
        config.store_traces = true;
        Simulation::with_materials(scene, &lib, config).unwrap().run()
    }

    #[test]
    fn test_etc_file() {
        let result = small_result();
        let tmp = NamedTempFile::new().unwrap();
        write_etcs(tmp.path(), &result).unwrap();

        let curves = read_etcs(tmp.path()).unwrap();
        assert_eq!(curves.len(), 1);
        let key = &result.receivers[0].key;
        let (pos, etc) = &curves[key];
        assert_eq!(*pos, Point::new(1.5, 1.5, 2.0));
        assert_eq!(etc, &result.etcs[key]);

        let text = std::fs::read_to_string(tmp.path()).unwrap();
        assert!(text.contains("\"version\": 1"));
        assert!(text.contains("\"500\""));
    }

    #[test]
    fn test_source_file_regenerates_directions() {
        let source = Source::uniform(
            "src",
            Point::new(1.0, 2.0, 3.0),
            2.0,
            64,
            BandSet::all(),
            0.05,
        )
        .unwrap();
        let tmp = NamedTempFile::new().unwrap();
        write_source(tmp.path(), &source).unwrap();
        let back = read_source(tmp.path()).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn test_traces_file() {
        let result = small_result();
        let rays = result.traces.unwrap();
        let tmp = NamedTempFile::new().unwrap();
        write_traces(tmp.path(), &rays, 343.0).unwrap();
        let back = read_traces(tmp.path()).unwrap();
        assert_eq!(back.rays, rays);
    }

    #[test]
    fn test_config_file() {
        let mut config = SimulationConfig::new();
        config.num_rays = 321;
        config.receivers.push(Point::new(1.0, 1.0, 1.0));
        let tmp = NamedTempFile::new().unwrap();
        write_config(tmp.path(), &config).unwrap();
        assert_eq!(read_config(tmp.path()).unwrap(), config);

        std::fs::write(tmp.path(), r#"{"max_bounces": 0}"#).unwrap();
        assert!(read_config(tmp.path()).is_err());
    }

    #[test]
    fn test_scene_file() {
        let scene = FlatScene::from_box(2.0, 3.0, 4.0, None, "hall").unwrap();
        let tmp = NamedTempFile::new().unwrap();
        write_scene(tmp.path(), &scene).unwrap();
        let back = read_scene(tmp.path()).unwrap();
        assert_eq!(back.surface_ids(), scene.surface_ids());

        // Same geometry traces the same way
        let source = Source::uniform("s", Point::new(1.0, 1.0, 1.0), 1.0, 20, BandSet::all(), 0.01)
            .unwrap();
        let mut reg = crate::sim::materials::SurfaceRegistry::new(BandSet::all());
        for id in scene.surface_ids() {
            reg.insert(id.clone(), &AcousticMaterial::uniform("m", 0.1, 0.0))
                .unwrap();
        }
        let params = TraceParams::new(5, 2000);
        let a = RayTracer::new(&source, &reg, &scene, params).trace().unwrap();
        let b = RayTracer::new(&source, &reg, &back, params).trace().unwrap();
        assert_eq!(a.rays, b.rays);
    }

    #[test]
    fn test_unsupported_version() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"version": 2, "max_duration_ms": 10, "receivers": {}}"#,
        )
        .unwrap();
        let err = read_etcs(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported format version 2"));
    }

    #[test]
    fn test_oversized_curve_file_is_an_error() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"version": 1, "max_duration_ms": 4294967295, "receivers": {"0.000,0.000,0.000": {"position": [0, 0, 0], "bands": {}}}}"#,
        )
        .unwrap();
        let err = read_etcs(tmp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("max_duration_ms"));

        std::fs::write(tmp.path(), r#"{"max_duration_ms": 4294967295}"#).unwrap();
        assert!(read_config(tmp.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = read_source(Path::new("/nonexistent/source.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to open file"));
    }
}
