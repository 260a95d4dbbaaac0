pub mod acoustics;
pub mod bands;
pub mod engine;
pub mod error;
pub mod materials;
pub mod rays;
