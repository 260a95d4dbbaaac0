//! Error types for the ray tracing core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::materials::SurfaceId;

/// Fault raised by a geometry provider.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeometryError {
    #[error("degenerate direction vector: {0}")]
    DegenerateDirection(String),

    #[error("unknown surface: {0}")]
    UnknownSurface(SurfaceId),

    #[error("geometry query failed: {0}")]
    Query(String),
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceError {
    /// Bad source, material or run parameters. Rejected before any ray is traced.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A ray hit a surface with no registered coefficients. Fatal for that ray only.
    #[error("no material registered for surface '{surface}'")]
    MissingMaterial { surface: SurfaceId },

    /// The geometry provider faulted. Fatal for that ray only.
    #[error("geometry query failure: {0}")]
    GeometryQueryFailure(#[from] GeometryError),
}

impl TraceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
