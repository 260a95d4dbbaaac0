use std::path::Path;

use anyhow::Result;
use roomtrace::io::{read_config, read_scene, write_etcs};
use roomtrace::sim::acoustics::metrics::RoomAcousticReport;
use roomtrace::{FlatScene, MaterialLibrary, Point, Simulation, SimulationConfig};

/// Usage: `roomtrace [config.json] [scene.json] [etc_out.json]`
///
/// Without arguments a 10 x 10 x 10 m concrete box is simulated.
fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    let config = match args.get(1) {
        Some(path) => read_config(Path::new(path))?,
        None => {
            let mut config = SimulationConfig::new();
            config.source = Point::new(5.0, 5.0, 1.0);
            config.receivers = vec![Point::new(5.0, 5.0, 9.0), Point::new(2.0, 8.0, 1.5)];
            config.receiver_radius = 0.5;
            config
        }
    };
    let scene = match args.get(2) {
        Some(path) => read_scene(Path::new(path))?,
        None => FlatScene::from_box(10.0, 10.0, 10.0, None, "room")?,
    };

    let mut materials = MaterialLibrary::with_presets();
    materials.assign("", "concrete");

    let sim = Simulation::with_materials(scene, &materials, config)?;
    println!("{}", sim.source());

    let result = sim.run();
    println!("{}", result.diagnostics);

    for receiver in &result.receivers {
        let Some(etc) = result.etc(&receiver.key) else {
            continue;
        };
        let report = RoomAcousticReport::from_etc(etc);
        println!("Receiver {}: total energy {:.3e} W", receiver.key, etc.total_energy());
        for (band, m) in &report.bands {
            let fmt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{v:.2}"));
            println!(
                "  {band}: EDT {} s, T30 {} s, C80 {} dB, D50 {}",
                fmt(m.edt),
                fmt(m.t30),
                fmt(m.c80),
                fmt(m.d50)
            );
        }
        if let Some(sti) = report.sti {
            println!("  STI: {sti:.2}");
        }
    }

    if let Some(out) = args.get(3) {
        write_etcs(Path::new(out), &result)?;
    }
    Ok(())
}
