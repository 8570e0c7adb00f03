#[macro_use]
pub mod logging;
pub use logging::StrResult;

pub mod config;
pub mod constants;
pub mod data;
pub mod format;
pub mod geometry;
pub mod graphics;
pub mod postprocess;
pub mod vrs;
