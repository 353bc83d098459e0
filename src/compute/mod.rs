//! Compute module - Selection, evaluation and the generation loop.

pub mod evolution;

pub use evolution::{Candidate, EngineError, EvolutionEngine, FitnessEvaluator, ObjectiveSet};
