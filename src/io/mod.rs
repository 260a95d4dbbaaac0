//! File I/O for scenes, sources, configurations and simulation results.
//!
//! All files are JSON with a `version` field.

pub mod json;

pub use json::{
    FORMAT_VERSION, read_config, read_etcs, read_scene, read_source, read_traces, write_config,
    write_etcs, write_scene, write_source, write_traces,
};
