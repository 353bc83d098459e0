//! Schema module - Configuration, sequence and report types for evolution runs.

mod config;
mod evolution;
mod sequence;

pub use config::*;
pub use evolution::*;
pub use sequence::*;
