//! Ray casting against planar polygons.

use crate::{Point, Polygon, Vector};

/// Intersections closer than this to the ray origin are ignored.
///
/// Keeps a ray leaving a surface from hitting that same surface again.
pub const MIN_HIT_DISTANCE: f64 = 1e-9;

/// A ray defined by an origin point and a unit direction vector.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point,
    pub direction: Vector,
}

impl Ray {
    /// Creates a new ray. The direction is normalized.
    ///
    /// Returns `None` for a degenerate (zero or non-finite) direction.
    pub fn new(origin: Point, direction: Vector) -> Option<Self> {
        let direction = direction.normalize()?;
        Some(Self { origin, direction })
    }

    /// point = origin + t * direction
    pub fn point_at(&self, t: f64) -> Point {
        self.origin + self.direction * t
    }

    /// Calculates the intersection of this ray with a polygon.
    ///
    /// Returns `Some((t, point))` for hits in front of the origin
    /// (`t > MIN_HIT_DISTANCE`), boundary included.
    pub fn intersect_polygon(&self, polygon: &Polygon) -> Option<(f64, Point)> {
        let (a, b, c, d) = polygon.plane_coefficients();
        let plane_normal = Vector::new(a, b, c);

        let denom = plane_normal.dot(self.direction);
        if denom.abs() < 1e-12 {
            return None; // Parallel to plane
        }

        let origin_dot = a * self.origin.x + b * self.origin.y + c * self.origin.z + d;
        let t = -origin_dot / denom;
        if t < MIN_HIT_DISTANCE {
            return None;
        }

        let mut point = self.point_at(t);
        // Snap back onto the plane to keep round-off from accumulating over bounces
        let residual = a * point.x + b * point.y + c * point.z + d;
        point = point + plane_normal * (-residual);

        if polygon.is_point_inside(point, true) {
            Some((t, point))
        } else {
            None
        }
    }

    /// Returns the closest hit `(t, point, index)` among `polygons`.
    pub fn intersect_polygons<'a, I>(&self, polygons: I) -> Option<(f64, Point, usize)>
    where
        I: IntoIterator<Item = &'a Polygon>,
    {
        let mut closest: Option<(f64, Point, usize)> = None;

        for (idx, polygon) in polygons.into_iter().enumerate() {
            if let Some((t, point)) = self.intersect_polygon(polygon) {
                match closest {
                    None => closest = Some((t, point, idx)),
                    Some((best_t, _, _)) if t < best_t => closest = Some((t, point, idx)),
                    _ => {}
                }
            }
        }

        closest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn make_xy_square() -> Result<Polygon> {
        let pts = vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(2.0, 0.0, 0.0),
            Point::new(2.0, 2.0, 0.0),
            Point::new(0.0, 2.0, 0.0),
        ];
        Polygon::new("square", pts, None)
    }

    #[test]
    fn test_ray_creation() {
        assert!(Ray::new(Point::new(0.0, 0.0, 0.0), Vector::new(3.0, 0.0, 0.0)).is_some());
        assert!(Ray::new(Point::new(0.0, 0.0, 0.0), Vector::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_ray_polygon_intersection() -> Result<()> {
        let polygon = make_xy_square()?;
        let ray = Ray::new(Point::new(1.0, 1.0, -5.0), Vector::new(0.0, 0.0, 1.0)).unwrap();

        let (t, point) = ray.intersect_polygon(&polygon).unwrap();
        assert!((t - 5.0).abs() < 1e-9);
        assert!(point.is_close(&Point::new(1.0, 1.0, 0.0)));
        Ok(())
    }

    #[test]
    fn test_ray_misses_polygon() -> Result<()> {
        let polygon = make_xy_square()?;
        // Pointing away
        let ray = Ray::new(Point::new(1.0, 1.0, -5.0), Vector::new(0.0, 0.0, -1.0)).unwrap();
        assert!(ray.intersect_polygon(&polygon).is_none());
        // Parallel
        let ray = Ray::new(Point::new(1.0, 1.0, 1.0), Vector::new(1.0, 0.0, 0.0)).unwrap();
        assert!(ray.intersect_polygon(&polygon).is_none());
        // Outside bounds
        let ray = Ray::new(Point::new(10.0, 10.0, -5.0), Vector::new(0.0, 0.0, 1.0)).unwrap();
        assert!(ray.intersect_polygon(&polygon).is_none());
        Ok(())
    }

    #[test]
    fn test_origin_on_surface_is_not_a_hit() -> Result<()> {
        let polygon = make_xy_square()?;
        let ray = Ray::new(Point::new(1.0, 1.0, 0.0), Vector::new(0.0, 0.0, 1.0)).unwrap();
        assert!(ray.intersect_polygon(&polygon).is_none());
        Ok(())
    }

    #[test]
    fn test_ray_intersect_multiple_polygons() -> Result<()> {
        let low = make_xy_square()?;
        let pts = vec![
            Point::new(0.0, 0.0, 5.0),
            Point::new(2.0, 0.0, 5.0),
            Point::new(2.0, 2.0, 5.0),
            Point::new(0.0, 2.0, 5.0),
        ];
        let high = Polygon::new("z5", pts, None)?;

        let ray = Ray::new(Point::new(1.0, 1.0, -2.0), Vector::new(0.0, 0.0, 1.0)).unwrap();
        let (t, point, idx) = ray.intersect_polygons([&high, &low]).unwrap();
        assert_eq!(idx, 1);
        assert!((t - 2.0).abs() < 1e-9);
        assert!(point.is_close(&Point::new(1.0, 1.0, 0.0)));
        Ok(())
    }
}
