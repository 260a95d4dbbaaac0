//! Geometry provider seam and a brute-force reference provider.
//!
//! The tracer only needs two capabilities from the geometry host: the
//! closest surface along a ray, and the outgoing direction after a hit.

pub mod reflection;

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use rand::RngCore;

use crate::geom::ray::Ray;
use crate::sim::error::GeometryError;
use crate::sim::materials::SurfaceId;
use crate::{Point, Polygon, Vector};

use self::reflection::{Hybrid, ReflectionModel};

/// Closest intersection of a ray with the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Identifier used to look up the surface's material.
    pub surface: SurfaceId,
    /// Intersection point.
    pub point: Point,
    /// Provider-owned geometry handle of the hit surface.
    pub handle: usize,
}

/// Geometry host capabilities consumed by the ray tracer.
///
/// Implementations are queried concurrently from many rays and must be
/// deterministic for deterministic replay (stochastic choices draw only
/// from the supplied generator).
pub trait GeometryProvider: Sync {
    /// Nearest surface hit along `direction` from `origin`, or `None` if the ray escapes.
    fn intersect(&self, origin: Point, direction: Vector) -> Result<Option<Hit>, GeometryError>;

    /// Outgoing unit direction for a ray that travelled from `prev` to `hit`.
    ///
    /// `scattering` in [0, 1] is the fraction of energy reflected diffusely.
    fn next_direction(
        &self,
        prev: Point,
        hit: &Hit,
        scattering: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Vector, GeometryError>;
}

/// Flat list of convex polygons searched by brute force.
pub struct FlatScene {
    /// All polygons in the scene.
    pub polygons: Vec<Polygon>,
    /// Surface id for each polygon.
    pub ids: Vec<SurfaceId>,
    index: HashMap<SurfaceId, usize>,
    /// Scene bounding box minimum.
    pub bbox_min: Point,
    /// Scene bounding box maximum.
    pub bbox_max: Point,
}

impl FlatScene {
    /// Creates a scene from `(surface id, polygon)` pairs. Ids must be unique.
    pub fn new(surfaces: Vec<(SurfaceId, Polygon)>) -> Result<Self> {
        if surfaces.is_empty() {
            return Err(anyhow!("Scene has no surfaces"));
        }

        let mut polygons = Vec::with_capacity(surfaces.len());
        let mut ids = Vec::with_capacity(surfaces.len());
        let mut index = HashMap::new();
        for (i, (id, poly)) in surfaces.into_iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(anyhow!("Duplicate surface id: {id}"));
            }
            ids.push(id);
            polygons.push(poly);
        }

        let mut bbox_min = Point::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut bbox_max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in polygons.iter().flat_map(|p| p.vertices().iter()) {
            bbox_min = Point::new(bbox_min.x.min(p.x), bbox_min.y.min(p.y), bbox_min.z.min(p.z));
            bbox_max = Point::new(bbox_max.x.max(p.x), bbox_max.y.max(p.y), bbox_max.z.max(p.z));
        }

        Ok(Self {
            polygons,
            ids,
            index,
            bbox_min,
            bbox_max,
        })
    }

    /// Closed axis-aligned box room. Surface ids are `{name}/{face}`.
    pub fn from_box(
        x: f64,
        y: f64,
        z: f64,
        origin: Option<(f64, f64, f64)>,
        name: &str,
    ) -> Result<Self> {
        let surfaces = Polygon::box_faces(x, y, z, origin)?
            .into_iter()
            .map(|poly| (SurfaceId::from(format!("{name}/{}", poly.name)), poly))
            .collect();
        Self::new(surfaces)
    }

    pub fn surface_ids(&self) -> &[SurfaceId] {
        &self.ids
    }

    pub fn polygon(&self, surface: &SurfaceId) -> Option<&Polygon> {
        self.index.get(surface).map(|&i| &self.polygons[i])
    }

    /// Checks if a point is within the scene bounding box (with margin).
    pub fn is_in_bounds(&self, pos: Point, margin: f64) -> bool {
        pos.x >= self.bbox_min.x - margin
            && pos.x <= self.bbox_max.x + margin
            && pos.y >= self.bbox_min.y - margin
            && pos.y <= self.bbox_max.y + margin
            && pos.z >= self.bbox_min.z - margin
            && pos.z <= self.bbox_max.z + margin
    }
}

impl GeometryProvider for FlatScene {
    fn intersect(&self, origin: Point, direction: Vector) -> Result<Option<Hit>, GeometryError> {
        if !origin.is_finite() {
            return Err(GeometryError::Query(format!("non-finite ray origin {origin}")));
        }
        let ray = Ray::new(origin, direction)
            .ok_or_else(|| GeometryError::DegenerateDirection(direction.to_string()))?;

        Ok(ray
            .intersect_polygons(&self.polygons)
            .map(|(_, point, idx)| Hit {
                surface: self.ids[idx].clone(),
                point,
                handle: idx,
            }))
    }

    fn next_direction(
        &self,
        prev: Point,
        hit: &Hit,
        scattering: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Vector, GeometryError> {
        let polygon = self
            .polygons
            .get(hit.handle)
            .ok_or_else(|| GeometryError::UnknownSurface(hit.surface.clone()))?;
        let incident = (hit.point - prev)
            .normalize()
            .ok_or_else(|| GeometryError::DegenerateDirection(format!("{prev} -> {}", hit.point)))?;

        Hybrid::new(scattering)
            .reflect(incident, polygon.vn, rng)
            .normalize()
            .ok_or_else(|| GeometryError::Query("reflection produced a zero vector".to_string()))
    }
}
