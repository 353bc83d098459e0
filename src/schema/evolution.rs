//! Progress, checkpoint and result types emitted by an evolution run.

use serde::{Deserialize, Serialize};

// ============================================================================
// Snapshots
// ============================================================================

/// Serializable view of a selected candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateSnapshot {
    /// Unique identifier.
    pub id: u64,
    /// Generation this candidate was created.
    pub generation: usize,
    /// Parent ID (None for seeds).
    pub parent: Option<u64>,
    /// Front index from the last selection (0 = best).
    pub rank: usize,
    /// Objective vector in configured order.
    pub objectives: Vec<f64>,
    /// Sum of the objective vector.
    pub aggregate: f64,
    /// Nucleotide sequence.
    pub sequence: String,
}

/// Best and mean value of one objective across the population.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectiveSummary {
    pub name: String,
    pub best: f64,
    pub mean: f64,
}

/// Summary statistics for one completed generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationStats {
    /// Candidates submitted to the evaluator (scored or not).
    pub pool_size: usize,
    /// Fresh evaluations dispatched to scoring collaborators.
    pub evaluated: usize,
    /// Objective vectors reused from the score cache.
    pub cache_hits: usize,
    /// Candidates excluded because scoring failed.
    pub failures: usize,
    /// Number of non-dominated fronts in the pool.
    pub fronts: usize,
    /// Size of front 0 after selection.
    pub front_size: usize,
    /// Per-objective best/mean over the selected population.
    pub objectives: Vec<ObjectiveSummary>,
    /// Best aggregate score within front 0.
    pub best_aggregate: f64,
    /// Mean aggregate score over the selected population.
    pub mean_aggregate: f64,
}

/// One append-only checkpoint record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointRecord {
    /// Generation index (0 = evaluated seeds).
    pub generation: usize,
    /// Mutation rate used to produce this generation's offspring.
    pub mutation_rate: f64,
    /// Generations since the best aggregate last improved.
    pub stagnation_count: usize,
    /// Best front-0 candidates, highest aggregate first.
    pub best: Vec<CandidateSnapshot>,
    /// Summary statistics.
    pub stats: GenerationStats,
}

// ============================================================================
// Progress and Result Types
// ============================================================================

/// Evolution history for plotting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvolutionHistory {
    /// Best front-0 aggregate per generation.
    pub best_aggregate: Vec<f64>,
    /// Mean aggregate per generation.
    pub mean_aggregate: Vec<f64>,
    /// Front-0 size per generation.
    pub front_size: Vec<usize>,
    /// Mutation rate per generation.
    pub mutation_rate: Vec<f64>,
}

/// Current phase of the generation loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EvolutionPhase {
    /// Seeding the initial population.
    #[default]
    Init,
    /// Scoring unscored candidates.
    Evaluating,
    /// Reducing the pool to the population size.
    Selecting,
    /// Producing offspring.
    Varying,
    /// Stopped early on stagnation or a collapsed mutation rate.
    Converged,
    /// Reached the generation limit.
    Exhausted,
    /// Not enough candidates survived evaluation.
    Failed,
    /// Stopped by the cancellation handle.
    Cancelled,
}

impl EvolutionPhase {
    /// Whether the loop has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Converged | Self::Exhausted | Self::Failed | Self::Cancelled
        )
    }
}

/// Progress update emitted after every completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionProgress {
    /// Current generation number.
    pub generation: usize,
    /// Total generations planned.
    pub total_generations: usize,
    /// Current phase of the loop.
    pub phase: EvolutionPhase,
    /// Best front-0 aggregate seen so far.
    pub best_aggregate: f64,
    /// Generations since last improvement.
    pub stagnation_count: usize,
    /// Current mutation rate.
    pub mutation_rate: f64,
    /// Statistics of the latest generation.
    pub stats: GenerationStats,
    /// Current front 0 (for visualization).
    pub front: Vec<CandidateSnapshot>,
}

/// Reason evolution stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached maximum generations.
    MaxGenerations,
    /// No improvement within the stagnation window.
    Converged,
    /// Expected mutations per offspring fell below the stop threshold.
    MutationExhausted,
    /// User cancelled.
    Cancelled,
}

/// Statistics from an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Total generations run.
    pub generations: usize,
    /// Fresh evaluations performed.
    pub total_evaluations: u64,
    /// Objective vectors served from the cache.
    pub cache_hits: u64,
    /// Candidates dropped after failed evaluation.
    pub failed_evaluations: u64,
    /// Best front-0 aggregate achieved.
    pub best_aggregate: f64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Evaluations per second.
    pub evaluations_per_second: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

/// Final result of an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionResult {
    /// Final population, front-major order.
    pub population: Vec<CandidateSnapshot>,
    /// Final front 0.
    pub front: Vec<CandidateSnapshot>,
    /// Statistics from the run.
    pub stats: EvolutionStats,
    /// Full history for analysis.
    pub history: EvolutionHistory,
}
