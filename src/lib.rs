pub mod geom;
pub mod io;
pub mod sim;

// Prelude
pub use geom::point::Point;
pub use geom::polygon::Polygon;
pub use geom::vector::Vector;
pub use sim::acoustics::etc::EnergyTimeCurve;
pub use sim::acoustics::receiver::{Receiver, ReceiverKey};
pub use sim::acoustics::source::Source;
pub use sim::acoustics::tracer::{CancelToken, RayTrace, Termination, trace};
pub use sim::bands::{BandSet, BandValues, NUM_OCTAVE_BANDS, OctaveBand};
pub use sim::engine::{FlatScene, GeometryProvider, Hit};
pub use sim::error::{GeometryError, TraceError};
pub use sim::materials::{AcousticMaterial, MaterialLibrary, SurfaceId, SurfaceRegistry};
pub use sim::rays::{Simulation, SimulationConfig, SimulationResult};
