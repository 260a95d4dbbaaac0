//! Acoustic ray tracing: source, tracer, receivers and energy-time curves.

pub mod accumulator;
pub mod diagnostics;
pub mod etc;
pub mod metrics;
pub mod receiver;
pub mod source;
pub mod tracer;
