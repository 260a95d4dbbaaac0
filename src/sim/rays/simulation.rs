use std::collections::BTreeMap;

use crate::Point;
use crate::sim::acoustics::accumulator::{accumulate, collect_contributions};
use crate::sim::acoustics::diagnostics::RunDiagnostics;
use crate::sim::acoustics::etc::EnergyTimeCurve;
use crate::sim::acoustics::metrics::RoomAcousticReport;
use crate::sim::acoustics::receiver::{
    Receiver, ReceiverKey, ReceiverSet, SphereProximity, geometric_key,
};
use crate::sim::acoustics::source::Source;
use crate::sim::acoustics::tracer::{CancelToken, RayTrace, RayTracer};
use crate::sim::engine::{FlatScene, GeometryProvider};
use crate::sim::error::Result;
use crate::sim::materials::{MaterialLibrary, SurfaceRegistry};

use super::config::SimulationConfig;

/// Result of an acoustic ray tracing simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Bounce records of every traced ray (only if `store_traces` is set).
    pub traces: Option<Vec<RayTrace>>,
    /// Energy-time curve per receiver.
    pub etcs: BTreeMap<ReceiverKey, EnergyTimeCurve>,
    /// Receivers in configuration order (duplicates removed).
    pub receivers: Vec<Receiver>,
    pub diagnostics: RunDiagnostics,
    /// Configuration used for this simulation
    pub config: SimulationConfig,
}

impl SimulationResult {
    pub fn etc(&self, key: &ReceiverKey) -> Option<&EnergyTimeCurve> {
        self.etcs.get(key)
    }

    /// Curve of the receiver placed at `position`.
    pub fn etc_at(&self, position: Point) -> Option<&EnergyTimeCurve> {
        self.etc(&geometric_key(position, self.config.receiver_key_precision))
    }

    /// Room acoustic parameters of one receiver.
    pub fn report(&self, key: &ReceiverKey) -> Option<RoomAcousticReport> {
        self.etc(key).map(RoomAcousticReport::from_etc)
    }
}

/// Source, scene, materials and receivers of one run.
pub struct Simulation<P: GeometryProvider = FlatScene> {
    config: SimulationConfig,
    provider: P,
    registry: SurfaceRegistry,
    source: Source,
    receivers: ReceiverSet,
}

impl Simulation<FlatScene> {
    /// Builds a simulation of a polygon scene with materials assigned from a library.
    pub fn with_materials(
        scene: FlatScene,
        library: &MaterialLibrary,
        config: SimulationConfig,
    ) -> Result<Self> {
        let registry = library.build_registry(scene.surface_ids(), config.bands)?;
        Self::new(scene, registry, config)
    }
}

impl<P: GeometryProvider> Simulation<P> {
    /// Validates the configuration and generates the source rays.
    pub fn new(provider: P, registry: SurfaceRegistry, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let source = Source::generate(
            &config.source_name,
            config.source,
            &config.resolve_source_power(),
            config.num_rays,
            config.bands,
            config.min_power_fraction,
        )?;
        let receivers =
            ReceiverSet::from_points(config.receivers.iter().copied(), config.receiver_key_precision)?;

        let sim = Self {
            config,
            provider,
            registry,
            source,
            receivers,
        };
        sim.tracer().validate()?;
        Ok(sim)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn receivers(&self) -> &ReceiverSet {
        &self.receivers
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    fn tracer(&self) -> RayTracer<'_, P> {
        RayTracer::new(
            &self.source,
            &self.registry,
            &self.provider,
            self.config.trace_params(),
        )
    }

    pub fn run(&self) -> SimulationResult {
        self.run_with_cancel(&CancelToken::new())
    }

    /// Runs the simulation. Rays not started when `cancel` fires are skipped
    /// and the result covers the completed rays only.
    pub fn run_with_cancel(&self, cancel: &CancelToken) -> SimulationResult {
        log::info!(
            "Tracing {} rays from '{}' for {} receivers",
            self.source.num_rays(),
            self.source.name,
            self.receivers.len()
        );

        let run = self.tracer().run(cancel);
        let mut diagnostics = run.diagnostics;

        let receivers = self.receivers.as_slice();
        let proximity = SphereProximity::new(self.config.receiver_radius);
        let contributions =
            collect_contributions(receivers, &run.rays, &proximity, self.config.speed_of_sound);
        let acc = accumulate(
            receivers,
            &contributions,
            self.config.bands,
            self.config.max_duration_ms,
        );
        diagnostics.contributions_dropped = acc.dropped;

        if diagnostics.escaped > 0 {
            log::warn!(
                "{} of {} rays escaped the scene",
                diagnostics.escaped,
                diagnostics.rays_traced
            );
        }
        log::info!("Simulation finished: {diagnostics}");

        SimulationResult {
            traces: self.config.store_traces.then_some(run.rays),
            etcs: acc.etcs,
            receivers: receivers.to_vec(),
            diagnostics,
            config: self.config.clone(),
        }
    }
}
