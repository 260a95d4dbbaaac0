use crate::Point;
use crate::geom::EPS;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Direction or displacement in 3D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Vector {
    pub fn new(dx: f64, dy: f64, dz: f64) -> Self {
        Self { dx, dy, dz }
    }

    /// Displacement from `beg` to `end`.
    pub fn from_points(beg: Point, end: Point) -> Self {
        Self::new(end.x - beg.x, end.y - beg.y, end.z - beg.z)
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.dy * other.dz - self.dz * other.dy,
            self.dz * other.dx - self.dx * other.dz,
            self.dx * other.dy - self.dy * other.dx,
        )
    }

    pub fn dot(self, other: Self) -> f64 {
        self.dx * other.dx + self.dy * other.dy + self.dz * other.dz
    }

    pub fn length_squared(&self) -> f64 {
        self.dot(*self)
    }

    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn is_close(&self, other: &Self) -> bool {
        (*self - *other).as_array().iter().all(|d| d.abs() < EPS)
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|d| d.is_finite())
    }

    fn as_array(&self) -> [f64; 3] {
        [self.dx, self.dy, self.dz]
    }

    /// Unit vector of the same direction.
    ///
    /// Returns `None` for (almost) zero-length or non-finite vectors.
    pub fn normalize(&self) -> Option<Self> {
        let len = self.length();
        if !len.is_finite() || len < EPS {
            return None;
        }
        Some(*self * (1.0 / len))
    }

    /// Mirror image of `self` about the plane with unit normal `normal`.
    ///
    /// Works for either normal orientation.
    pub fn mirror(self, normal: Self) -> Self {
        self - normal * (2.0 * self.dot(normal))
    }

    /// `normal` flipped, if needed, to point against `self`.
    pub fn facing(self, normal: Self) -> Self {
        if self.dot(normal) >= 0.0 { -normal } else { normal }
    }

    /// Unit normal of the plane through 3 points (right-hand rule).
    ///
    /// Returns `None` if the points are collinear.
    pub fn normal(pt0: Point, pt1: Point, pt2: Point) -> Option<Self> {
        Self::from_points(pt0, pt1)
            .cross(Self::from_points(pt0, pt2))
            .normalize()
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = f.precision().unwrap_or(3);
        write!(
            f,
            "[{:.prec$}, {:.prec$}, {:.prec$}]",
            self.dx, self.dy, self.dz
        )
    }
}

impl Add for Vector {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(self.dx + other.dx, self.dy + other.dy, self.dz + other.dz)
    }
}

impl Sub for Vector {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        self + -other
    }
}

impl Neg for Vector {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.dx, -self.dy, -self.dz)
    }
}

impl Mul<f64> for Vector {
    type Output = Self;
    fn mul(self, k: f64) -> Self {
        Self::new(self.dx * k, self.dy * k, self.dz * k)
    }
}

impl Mul<Vector> for f64 {
    type Output = Vector;
    fn mul(self, v: Vector) -> Vector {
        v * self
    }
}
