use anyhow::{Result, anyhow};

use crate::{Point, Vector};

/// Distance tolerance used for coplanarity and containment checks.
const PLANE_TOLERANCE: f64 = 1e-9;

/// Convex planar polygon.
///
/// Vertices are ordered counter-clockwise when looking against the normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub name: String,
    pts: Vec<Point>,
    /// Unit normal.
    pub vn: Vector,
}

impl Polygon {
    /// Creates a polygon from its vertices.
    ///
    /// If `normal` is `None` it is computed from the first three vertices.
    /// Fails for fewer than 3 vertices, collinear points or non-coplanar vertices.
    pub fn new(name: &str, pts: Vec<Point>, normal: Option<Vector>) -> Result<Self> {
        if pts.len() < 3 {
            return Err(anyhow!(
                "Polygon '{name}' needs at least 3 vertices, got {}",
                pts.len()
            ));
        }
        if pts.iter().any(|p| !p.is_finite()) {
            return Err(anyhow!("Polygon '{name}' has non-finite vertices"));
        }

        let vn = match normal {
            Some(n) => n
                .normalize()
                .ok_or_else(|| anyhow!("Polygon '{name}' has a zero-length normal"))?,
            None => Vector::normal(pts[0], pts[1], pts[2])
                .ok_or_else(|| anyhow!("Polygon '{name}' has collinear leading vertices"))?,
        };

        for p in pts.iter().skip(3) {
            let off = (*p - pts[0]).dot(vn);
            if off.abs() > PLANE_TOLERANCE {
                return Err(anyhow!("Polygon '{name}' is not planar"));
            }
        }

        Ok(Self {
            name: name.to_string(),
            pts,
            vn,
        })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.pts
    }

    /// Plane coefficients (a, b, c, d) of `a*x + b*y + c*z + d = 0`.
    pub fn plane_coefficients(&self) -> (f64, f64, f64, f64) {
        let p = self.pts[0];
        let d = -(self.vn.dx * p.x + self.vn.dy * p.y + self.vn.dz * p.z);
        (self.vn.dx, self.vn.dy, self.vn.dz, d)
    }

    /// Checks whether a point lying on the polygon plane is inside the polygon.
    ///
    /// Points on the boundary count as inside if `boundary_in` is true.
    pub fn is_point_inside(&self, pt: Point, boundary_in: bool) -> bool {
        let (a, b, c, d) = self.plane_coefficients();
        if (a * pt.x + b * pt.y + c * pt.z + d).abs() > PLANE_TOLERANCE {
            return false;
        }

        let n = self.pts.len();
        for i in 0..n {
            let p0 = self.pts[i];
            let p1 = self.pts[(i + 1) % n];
            let edge = p1 - p0;
            let to_pt = pt - p0;
            // Positive when the point is on the inner side of the edge
            let side = edge.cross(to_pt).dot(self.vn);
            let tol = PLANE_TOLERANCE * edge.length().max(1.0);
            if boundary_in {
                if side < -tol {
                    return false;
                }
            } else if side <= tol {
                return false;
            }
        }
        true
    }

    /// Returns the 6 inward-facing faces of an axis-aligned box.
    ///
    /// Face names: `floor`, `ceiling`, `wall_0` (y=min), `wall_1` (x=max),
    /// `wall_2` (y=max), `wall_3` (x=min).
    pub fn box_faces(x: f64, y: f64, z: f64, origin: Option<(f64, f64, f64)>) -> Result<Vec<Self>> {
        if x <= 0.0 || y <= 0.0 || z <= 0.0 {
            return Err(anyhow!("Box dimensions must be positive: {x} x {y} x {z}"));
        }
        let (ox, oy, oz) = origin.unwrap_or((0.0, 0.0, 0.0));

        let p0 = Point::new(ox, oy, oz);
        let p1 = Point::new(ox + x, oy, oz);
        let p2 = Point::new(ox + x, oy + y, oz);
        let p3 = Point::new(ox, oy + y, oz);
        let p4 = Point::new(ox, oy, oz + z);
        let p5 = Point::new(ox + x, oy, oz + z);
        let p6 = Point::new(ox + x, oy + y, oz + z);
        let p7 = Point::new(ox, oy + y, oz + z);

        Ok(vec![
            Self::new("floor", vec![p0, p1, p2, p3], None)?,
            Self::new("ceiling", vec![p4, p7, p6, p5], None)?,
            Self::new("wall_0", vec![p0, p4, p5, p1], None)?,
            Self::new("wall_1", vec![p1, p5, p6, p2], None)?,
            Self::new("wall_2", vec![p2, p6, p7, p3], None)?,
            Self::new("wall_3", vec![p3, p7, p4, p0], None)?,
        ])
    }
}
