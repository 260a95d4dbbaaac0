//! Event-driven ray tracing from a source through a reflecting scene.
//!
//! Each ray is propagated surface to surface: intersect, attenuate by the
//! hit surface's absorption, record a bounce, check termination, reflect.
//! Rays are independent and traced in parallel with rayon.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::diagnostics::RunDiagnostics;
use super::etc::check_duration;
use super::source::Source;
use crate::{Point, Vector};
use crate::sim::bands::BandValues;
use crate::sim::engine::GeometryProvider;
use crate::sim::error::{Result, TraceError};
use crate::sim::materials::SurfaceRegistry;

/// Speed of sound in air at about 20°C, in m/s.
pub const DEFAULT_SPEED_OF_SOUND: f64 = 343.0;

/// State of a ray right after one surface interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounce {
    /// Bounce index, starting at 0.
    pub index: usize,
    /// Arrival time at the hit point in whole milliseconds (floored).
    pub time_ms: u64,
    /// Length of the segment ending at this bounce.
    pub length: f64,
    /// Per-band power after this bounce's absorption.
    pub power: BandValues,
    /// Segment start.
    pub start: Point,
    /// Segment end (hit point).
    pub end: Point,
}

/// Why a ray stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No surface in the ray's direction.
    Escaped,
    /// `max_bounces` bounces recorded.
    BounceLimit,
    /// Arrival time reached `max_duration_ms`.
    TimeBudget,
    /// Every band fell below the source's minimum per-ray power.
    EnergyFloor,
    /// Per-ray fault; bounces recorded before it are kept.
    Failed(TraceError),
}

/// Finished trace of one source ray.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RayTrace {
    pub ray_index: usize,
    /// Per-band power leaving the source along this ray.
    pub initial_power: BandValues,
    pub bounces: Vec<Bounce>,
    pub termination: Termination,
}

impl RayTrace {
    /// Total traveled path length.
    pub fn path_length(&self) -> f64 {
        self.bounces.iter().map(|b| b.length).sum()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.termination, Termination::Failed(_))
    }
}

/// Limits of a trace run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceParams {
    pub max_bounces: usize,
    pub max_duration_ms: u32,
    pub speed_of_sound: f64,
    /// Seed of the per-ray generators used for diffuse reflection.
    pub scatter_seed: u64,
}

impl TraceParams {
    pub fn new(max_bounces: usize, max_duration_ms: u32) -> Self {
        Self {
            max_bounces,
            max_duration_ms,
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
            scatter_seed: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_bounces == 0 {
            return Err(TraceError::invalid("max_bounces must be greater than 0"));
        }
        check_duration(self.max_duration_ms)?;
        if !self.speed_of_sound.is_finite() || self.speed_of_sound <= 0.0 {
            return Err(TraceError::invalid(format!(
                "speed_of_sound must be positive, got {}",
                self.speed_of_sound
            )));
        }
        Ok(())
    }
}

/// Shared flag (plus optional deadline) checked between rays.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Traces of all completed rays, ordered by ray index.
#[derive(Debug, Clone)]
pub struct TraceRun {
    pub rays: Vec<RayTrace>,
    pub diagnostics: RunDiagnostics,
}

impl TraceRun {
    pub fn get(&self, ray_index: usize) -> Option<&RayTrace> {
        self.rays
            .binary_search_by_key(&ray_index, |r| r.ray_index)
            .ok()
            .map(|i| &self.rays[i])
    }
}

/// Traces every ray of a source through a scene.
pub struct RayTracer<'a, P: GeometryProvider + ?Sized> {
    source: &'a Source,
    registry: &'a SurfaceRegistry,
    provider: &'a P,
    params: TraceParams,
}

impl<'a, P: GeometryProvider + ?Sized> RayTracer<'a, P> {
    pub fn new(
        source: &'a Source,
        registry: &'a SurfaceRegistry,
        provider: &'a P,
        params: TraceParams,
    ) -> Self {
        Self {
            source,
            registry,
            provider,
            params,
        }
    }

    /// Checks run parameters and that the registry covers the source's bands.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        for band in self.source.bands.iter() {
            if !self.registry.bands().contains(band) {
                return Err(TraceError::invalid(format!(
                    "surface registry has no coefficients for {band} used by source '{}'",
                    self.source.name
                )));
            }
        }
        Ok(())
    }

    /// Validates, then traces all rays.
    pub fn trace(&self) -> Result<TraceRun> {
        self.validate()?;
        Ok(self.run(&CancelToken::new()))
    }

    /// Traces all rays in parallel. Rays not started before `cancel` fires
    /// are skipped; completed rays are returned.
    ///
    /// Call [`RayTracer::validate`] first.
    pub fn run(&self, cancel: &CancelToken) -> TraceRun {
        let num_rays = self.source.num_rays();
        log::debug!(
            "Tracing {num_rays} rays from '{}' (max {} bounces, {} ms)",
            self.source.name,
            self.params.max_bounces,
            self.params.max_duration_ms
        );

        let rays: Vec<RayTrace> = self
            .source
            .directions()
            .par_iter()
            .enumerate()
            .filter_map(|(i, &direction)| {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(self.propagate(i, direction))
                }
            })
            .collect();

        let diagnostics = RunDiagnostics::from_traces(num_rays, &rays);
        TraceRun { rays, diagnostics }
    }

    /// Traces a single ray. Fails only for an index the source does not emit.
    pub fn trace_ray(&self, ray_index: usize) -> Result<RayTrace> {
        let direction = self.source.direction(ray_index).ok_or_else(|| {
            TraceError::invalid(format!(
                "ray index {ray_index} out of range (source emits {} rays)",
                self.source.num_rays()
            ))
        })?;
        Ok(self.propagate(ray_index, direction))
    }

    fn propagate(&self, ray_index: usize, mut direction: Vector) -> RayTrace {
        let initial_power = *self.source.ray_power();
        let mut trace = RayTrace {
            ray_index,
            initial_power,
            bounces: Vec::new(),
            termination: Termination::BounceLimit,
        };
        let finish = |mut trace: RayTrace, termination: Termination| {
            if let Termination::Failed(err) = &termination {
                log::warn!("Ray {ray_index} failed: {err}");
            }
            trace.termination = termination;
            trace
        };

        let bands = &self.source.bands;
        let min_power = self.source.ray_min_power();
        let speed = self.params.speed_of_sound;
        let mut rng = StdRng::seed_from_u64(ray_seed(self.params.scatter_seed, ray_index));

        let mut origin = self.source.origin;
        let mut remaining = initial_power;
        let mut cumulative = 0.0;

        for index in 0..self.params.max_bounces {
            let hit = match self.provider.intersect(origin, direction) {
                Ok(Some(hit)) => hit,
                Ok(None) => return finish(trace, Termination::Escaped),
                Err(e) => return finish(trace, Termination::Failed(e.into())),
            };
            let surface = match self.registry.lookup(&hit.surface) {
                Ok(s) => s,
                Err(e) => return finish(trace, Termination::Failed(e)),
            };

            remaining = remaining.scaled_by(&surface.reflection_factors());
            let length = origin.distance(&hit.point);
            cumulative += length;
            let time_ms = (cumulative / speed * 1000.0).floor() as u64;

            trace.bounces.push(Bounce {
                index,
                time_ms,
                length,
                power: remaining,
                start: origin,
                end: hit.point,
            });

            if time_ms >= u64::from(self.params.max_duration_ms) {
                return finish(trace, Termination::TimeBudget);
            }
            let negligible = bands
                .iter()
                .all(|b| remaining[b] < min_power[b] || initial_power[b] == 0.0);
            if negligible {
                return finish(trace, Termination::EnergyFloor);
            }
            if index + 1 == self.params.max_bounces {
                break;
            }

            direction = match self.provider.next_direction(
                origin,
                &hit,
                surface.mean_scattering,
                &mut rng,
            ) {
                Ok(d) => d,
                Err(e) => return finish(trace, Termination::Failed(e.into())),
            };
            origin = hit.point;
        }

        finish(trace, Termination::BounceLimit)
    }
}

/// Traces all rays of `source` with default speed of sound and scatter seed.
pub fn trace<P: GeometryProvider + ?Sized>(
    source: &Source,
    surfaces: &SurfaceRegistry,
    provider: &P,
    max_bounces: usize,
    max_duration_ms: u32,
) -> Result<TraceRun> {
    let params = TraceParams::new(max_bounces, max_duration_ms);
    RayTracer::new(source, surfaces, provider, params).trace()
}

/// Per-ray generator seed (splitmix64 of the run seed and ray index).
fn ray_seed(seed: u64, ray_index: usize) -> u64 {
    let golden = (ray_index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut z = seed.wrapping_add(golden);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::bands::{BandSet, OctaveBand};
    use crate::sim::engine::{FlatScene, Hit};
    use crate::sim::error::GeometryError;
    use crate::sim::materials::AcousticMaterial;
    use crate::Polygon;
    use rand::RngCore;

    fn box_room(size: f64) -> FlatScene {
        FlatScene::from_box(size, size, size, None, "room").unwrap()
    }

    fn registry(scene: &FlatScene, absorption: f64, scattering: f64) -> SurfaceRegistry {
        let mut reg = SurfaceRegistry::new(BandSet::all());
        let mat = AcousticMaterial::uniform("m", absorption, scattering);
        for id in scene.surface_ids() {
            reg.insert(id.clone(), &mat).unwrap();
        }
        reg
    }

    fn source_at(p: Point, num_rays: usize, min_power_fraction: f64) -> Source {
        Source::uniform("src", p, 1.0, num_rays, BandSet::all(), min_power_fraction).unwrap()
    }

    #[test]
    fn test_lossless_box_keeps_power_and_grows_path() {
        let scene = box_room(4.0);
        let reg = registry(&scene, 0.0, 0.0);
        let source = source_at(Point::new(1.3, 2.1, 0.7), 50, 0.01);
        let params = TraceParams::new(25, 60_000);
        let run = RayTracer::new(&source, &reg, &scene, params).trace().unwrap();

        assert_eq!(run.rays.len(), 50);
        for ray in &run.rays {
            assert_eq!(ray.termination, Termination::BounceLimit);
            assert_eq!(ray.bounces.len(), 25);
            let mut cumulative = 0.0;
            for (i, b) in ray.bounces.iter().enumerate() {
                assert_eq!(b.index, i);
                assert!(b.length > 0.0, "path length must strictly increase");
                cumulative += b.length;
                assert_eq!(b.power, ray.initial_power);
                assert_eq!(b.time_ms, (cumulative / 343.0 * 1000.0).floor() as u64);
                assert!(scene.is_in_bounds(b.end, 1e-6));
            }
            // Segments are contiguous
            for w in ray.bounces.windows(2) {
                assert_eq!(w[0].end, w[1].start);
            }
        }
    }

    #[test]
    fn test_full_absorption_stops_at_energy_floor() {
        let scene = box_room(3.0);
        let reg = registry(&scene, 1.0, 0.0);
        let source = source_at(Point::new(1.5, 1.5, 1.5), 20, 0.001);
        let run = trace(&source, &reg, &scene, 10, 2000).unwrap();

        for ray in &run.rays {
            assert_eq!(ray.termination, Termination::EnergyFloor);
            assert_eq!(ray.bounces.len(), 1);
            assert_eq!(ray.bounces[0].power, BandValues::zeros());
        }
        assert_eq!(run.diagnostics.energy_floor, 20);
    }

    #[test]
    fn test_zero_min_power_never_floors() {
        let scene = box_room(3.0);
        let reg = registry(&scene, 1.0, 0.0);
        let source = source_at(Point::new(1.5, 1.5, 1.5), 5, 0.0);
        let run = trace(&source, &reg, &scene, 4, 2000).unwrap();
        for ray in &run.rays {
            assert_eq!(ray.termination, Termination::BounceLimit);
            assert_eq!(ray.bounces.len(), 4);
        }
    }

    #[test]
    fn test_time_budget() {
        let scene = box_room(10.0);
        let reg = registry(&scene, 0.0, 0.0);
        let source = source_at(Point::new(5.0, 5.0, 5.0), 30, 0.01);
        // Lossless box: only the time budget can stop these rays
        let run = trace(&source, &reg, &scene, 1000, 50).unwrap();
        for ray in &run.rays {
            assert_eq!(ray.termination, Termination::TimeBudget);
            let last = ray.bounces.last().unwrap();
            assert!(last.time_ms >= 50);
            for b in &ray.bounces[..ray.bounces.len() - 1] {
                assert!(b.time_ms < 50);
            }
        }
        assert_eq!(run.diagnostics.time_budget, 30);
    }

    #[test]
    fn test_open_scene_rays_escape() {
        let floor = Polygon::new(
            "floor",
            vec![
                Point::new(-50.0, -50.0, 0.0),
                Point::new(50.0, -50.0, 0.0),
                Point::new(50.0, 50.0, 0.0),
                Point::new(-50.0, 50.0, 0.0),
            ],
            None,
        )
        .unwrap();
        let scene = FlatScene::new(vec![("floor".into(), floor)]).unwrap();
        let reg = registry(&scene, 0.0, 0.0);
        let source = source_at(Point::new(0.0, 0.0, 1.0), 100, 0.01);
        let run = trace(&source, &reg, &scene, 10, 2000).unwrap();

        assert_eq!(run.diagnostics.escaped, 100);
        for ray in &run.rays {
            let dir = source.direction(ray.ray_index).unwrap();
            if dir.dz >= 0.0 {
                assert!(ray.bounces.is_empty());
            } else {
                // At most one floor hit, never padded
                assert!(ray.bounces.len() <= 1);
            }
        }
    }

    #[test]
    fn test_missing_material_fails_only_affected_rays() {
        let scene = box_room(2.0);
        let mut reg = SurfaceRegistry::new(BandSet::all());
        let mat = AcousticMaterial::uniform("m", 0.0, 0.0);
        for id in scene.surface_ids() {
            if id.as_str() != "room/ceiling" {
                reg.insert(id.clone(), &mat).unwrap();
            }
        }
        let source = source_at(Point::new(1.0, 1.0, 1.0), 200, 0.01);
        let run = trace(&source, &reg, &scene, 5, 2000).unwrap();

        assert_eq!(run.rays.len(), 200);
        let failed: Vec<&RayTrace> = run.rays.iter().filter(|r| r.is_failed()).collect();
        assert!(!failed.is_empty());
        assert!(failed.len() < 200);
        for ray in failed {
            assert_eq!(
                ray.termination,
                Termination::Failed(TraceError::MissingMaterial {
                    surface: "room/ceiling".into()
                })
            );
        }
        assert_eq!(
            run.diagnostics.failed_missing_material + run.diagnostics.bounce_limit,
            200
        );
    }

    struct FaultyProvider {
        inner: FlatScene,
    }

    impl GeometryProvider for FaultyProvider {
        fn intersect(
            &self,
            origin: Point,
            direction: Vector,
        ) -> std::result::Result<Option<Hit>, GeometryError> {
            if direction.dz > 0.9 {
                return Err(GeometryError::Query("steep ray".into()));
            }
            self.inner.intersect(origin, direction)
        }

        fn next_direction(
            &self,
            prev: Point,
            hit: &Hit,
            scattering: f64,
            rng: &mut dyn RngCore,
        ) -> std::result::Result<Vector, GeometryError> {
            self.inner.next_direction(prev, hit, scattering, rng)
        }
    }

    #[test]
    fn test_geometry_failure_is_isolated() {
        let provider = FaultyProvider {
            inner: box_room(2.0),
        };
        let reg = registry(&provider.inner, 0.2, 0.0);
        let source = source_at(Point::new(1.0, 1.0, 1.0), 100, 0.01);
        let run = trace(&source, &reg, &provider, 3, 2000).unwrap();
        assert!(run.diagnostics.failed_geometry > 0);
        assert_eq!(run.diagnostics.rays_traced, 100);
        assert!(run.diagnostics.bounce_limit > 0);
    }

    #[test]
    fn test_invalid_params_rejected_before_tracing() {
        let scene = box_room(2.0);
        let reg = registry(&scene, 0.1, 0.0);
        let source = source_at(Point::new(1.0, 1.0, 1.0), 10, 0.01);

        assert!(matches!(
            trace(&source, &reg, &scene, 0, 2000),
            Err(TraceError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            trace(&source, &reg, &scene, 10, 0),
            Err(TraceError::InvalidConfiguration(_))
        ));
        let mut params = TraceParams::new(10, 2000);
        params.speed_of_sound = -1.0;
        assert!(RayTracer::new(&source, &reg, &scene, params).trace().is_err());

        // Registry built for fewer bands than the source uses
        let narrow = SurfaceRegistry::new(BandSet::single(OctaveBand::Hz500));
        assert!(trace(&source, &narrow, &scene, 10, 2000).is_err());
    }

    #[test]
    fn test_scattering_is_reproducible() {
        let scene = box_room(5.0);
        let reg = registry(&scene, 0.05, 0.7);
        let source = source_at(Point::new(2.0, 2.5, 1.0), 64, 0.001);
        let mut params = TraceParams::new(15, 2000);
        params.scatter_seed = 1234;

        let a = RayTracer::new(&source, &reg, &scene, params).trace().unwrap();
        let b = RayTracer::new(&source, &reg, &scene, params).trace().unwrap();
        assert_eq!(a.rays, b.rays);

        // A single ray traced alone matches the parallel run
        let tracer = RayTracer::new(&source, &reg, &scene, params);
        assert_eq!(tracer.trace_ray(17).unwrap(), a.rays[17]);
        assert!(matches!(
            tracer.trace_ray(64),
            Err(TraceError::InvalidConfiguration(_))
        ));

        params.scatter_seed = 99;
        let c = RayTracer::new(&source, &reg, &scene, params).trace().unwrap();
        assert_ne!(a.rays, c.rays);
    }

    #[test]
    fn test_cancelled_run_returns_partial_results() {
        let scene = box_room(2.0);
        let reg = registry(&scene, 0.1, 0.0);
        let source = source_at(Point::new(1.0, 1.0, 1.0), 50, 0.01);
        let tracer = RayTracer::new(&source, &reg, &scene, TraceParams::new(5, 2000));
        tracer.validate().unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let run = tracer.run(&cancel);
        assert!(run.rays.is_empty());
        assert!(run.diagnostics.cancelled);
        assert_eq!(run.diagnostics.skipped, 50);

        let expired = CancelToken::with_deadline(Instant::now());
        assert!(expired.is_cancelled());
    }

    #[test]
    fn test_trace_run_lookup_by_index() {
        let scene = box_room(2.0);
        let reg = registry(&scene, 0.1, 0.0);
        let source = source_at(Point::new(1.0, 1.0, 1.0), 12, 0.01);
        let run = trace(&source, &reg, &scene, 3, 2000).unwrap();
        for i in 0..12 {
            assert_eq!(run.get(i).unwrap().ray_index, i);
        }
        assert!(run.get(12).is_none());
    }

    #[test]
    fn test_ray_seed_differs_per_ray() {
        assert_ne!(ray_seed(0, 0), ray_seed(0, 1));
        assert_ne!(ray_seed(0, 5), ray_seed(1, 5));
    }
}
