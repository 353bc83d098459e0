//! Codon Evo - Multi-objective evolution of synonymous-codon designs.
//!
//! This crate provides NSGA-II selection (non-dominated sorting and crowding
//! distance) and a generational loop that evaluates candidate sequences in
//! parallel, keeps the best trade-offs between objectives, and produces new
//! designs by codon-level variation.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, sequence and report types
//! - `compute`: Selection, parallel evaluation, variation and the run loop
//!
//! # Example
//!
//! ```rust
//! use codon_evo::compute::evolution::{Candidate, select};
//! use codon_evo::schema::CodonSequence;
//!
//! let pool: Vec<Candidate> = [(1.0, 1.0), (5.0, 5.0), (3.0, 3.0)]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &(a, b))| Candidate::scored(i as u64, CodonSequence::new(vec![]), vec![a, b]))
//!     .collect();
//!
//! let survivors = select(pool, 2).unwrap();
//! let ids: Vec<u64> = survivors.iter().map(|c| c.id).collect();
//! assert_eq!(ids, vec![1, 2]);
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::{Candidate, EngineError, EvolutionEngine, ObjectiveSet};
pub use schema::{CodonSequence, EvolutionConfig, EvolutionResult};
