use rand::{Rng, RngCore};

use crate::Vector;

/// Direction change of a ray at a surface hit.
///
/// Stochastic models draw from the supplied generator only, so a seeded
/// generator makes them reproducible.
pub trait ReflectionModel {
    /// Outgoing unit direction for a unit `incident` direction hitting a
    /// surface with unit `normal` (either orientation).
    fn reflect(&self, incident: Vector, normal: Vector, rng: &mut dyn RngCore) -> Vector;
}

/// Mirror reflection.
pub struct Specular;

impl ReflectionModel for Specular {
    fn reflect(&self, incident: Vector, normal: Vector, _rng: &mut dyn RngCore) -> Vector {
        incident.mirror(normal)
    }
}

/// Lambertian reflection into the hemisphere on the incident side.
pub struct Diffuse;

/// Two unit tangents completing `n` to a right-handed orthonormal basis.
fn tangents(n: Vector) -> (Vector, Vector) {
    let helper = if n.dx.abs() < 0.9 {
        Vector::new(1.0, 0.0, 0.0)
    } else {
        Vector::new(0.0, 1.0, 0.0)
    };
    let t = n
        .cross(helper)
        .normalize()
        .unwrap_or(Vector::new(1.0, 0.0, 0.0));
    (t, n.cross(t))
}

impl ReflectionModel for Diffuse {
    fn reflect(&self, incident: Vector, normal: Vector, rng: &mut dyn RngCore) -> Vector {
        let n = incident.facing(normal);
        let (t, b) = tangents(n);

        // Malley's method: uniform disk sample lifted onto the hemisphere
        let u: f64 = rng.r#gen();
        let phi = std::f64::consts::TAU * rng.r#gen::<f64>();
        let r = u.sqrt();
        t * (r * phi.cos()) + b * (r * phi.sin()) + n * (1.0 - u).sqrt()
    }
}

/// Diffuse with probability `scattering`, specular otherwise.
pub struct Hybrid {
    pub scattering: f64,
}

impl Hybrid {
    /// `scattering` is clamped to [0, 1].
    pub fn new(scattering: f64) -> Self {
        Self {
            scattering: scattering.clamp(0.0, 1.0),
        }
    }
}

impl ReflectionModel for Hybrid {
    fn reflect(&self, incident: Vector, normal: Vector, rng: &mut dyn RngCore) -> Vector {
        // Purely specular surfaces consume no random numbers
        if self.scattering > 0.0 && rng.r#gen::<f64>() < self.scattering {
            Diffuse.reflect(incident, normal, rng)
        } else {
            Specular.reflect(incident, normal, rng)
        }
    }
}
