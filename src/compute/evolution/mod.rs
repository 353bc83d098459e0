//! Evolutionary search module for multi-objective codon design.
//!
//! This module provides NSGA-II selection and the generational loop that
//! drives it over synonymous-codon designs.
//!
//! # Overview
//!
//! The evolutionary search system consists of:
//!
//! - **Selection** (`nsga2`): Dominance, non-dominated sorting, crowding distance
//! - **Fitness Evaluation** (`fitness`): Pluggable objectives scored on a worker pool
//! - **Score Cache** (`cache`): Content-addressed reuse of objective vectors
//! - **Variation** (`genome`): Seeded codon mutation and crossover
//! - **Generation Loop** (`search`): Evaluate, select, vary, stop
//! - **Checkpoints** (`checkpoint`): Append-only per-generation records
//!
//! # Example
//!
//! ```rust,no_run
//! use codon_evo::compute::evolution::{
//!     CodonMutator, EvolutionEngine, ObjectiveSet, SynonymTable, objective_fn,
//! };
//! use codon_evo::schema::{CodonSequence, EvolutionConfig};
//!
//! let mut config = EvolutionConfig::default();
//! config.objectives = vec!["gc".to_string()];
//!
//! let objectives = ObjectiveSet::new().with(objective_fn("gc", |seq: &CodonSequence| {
//!     Ok(seq.key().chars().filter(|c| matches!(c, 'G' | 'C')).count() as f64)
//! }));
//! let table = SynonymTable::new(vec![vec!["GCU".into(), "GCC".into()]; 10]);
//! let mutator = CodonMutator::from_config(table, &config);
//! let seed = CodonSequence::new(vec!["GCU".into(); 10]);
//!
//! let mut engine = EvolutionEngine::new(config, objectives, mutator, vec![seed]).unwrap();
//! let result = engine
//!     .run_with_callback(|progress| {
//!         println!("Generation {}: best aggregate = {:.3}",
//!             progress.generation, progress.best_aggregate);
//!     })
//!     .unwrap();
//!
//! println!("Front size: {}", result.front.len());
//! ```
//!
//! # Selection
//!
//! All objectives are maximized. Fronts are taken whole while they fit; the
//! first front that overflows the population is ordered by crowding distance
//! and truncated. Ties keep input order.

mod cache;
mod checkpoint;
mod fitness;
mod genome;
mod nsga2;
mod search;

pub use cache::ScoreCache;
pub use checkpoint::{
    CheckpointSink, JsonLinesCheckpoints, MemoryCheckpoints, PersistenceError, load_checkpoints,
};
pub use fitness::{
    EvaluationError, EvaluationFailure, EvaluationReport, FitnessEvaluator, FnObjective, Objective,
    ObjectiveSet, objective_fn,
};
pub use genome::{CodonMutator, Offspring, SynonymTable, VariationContext, VariationOperator};
pub use nsga2::{
    Selection, SelectionError, assign_crowding_distance, crowd_compare, dominates,
    non_dominated_sort, select, select_fronts,
};
pub use search::{Candidate, EngineError, EvolutionEngine};
