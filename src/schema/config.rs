//! Configuration types for an evolution run.

use serde::{Deserialize, Serialize};

/// Top-level run configuration, consumed once at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Objective names in evaluation order. Defines the arity of every
    /// objective vector in the run.
    pub objectives: Vec<String>,
    /// Population and generation settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Fitness evaluation settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Mutation and crossover settings for the default variation operator.
    #[serde(default)]
    pub variation: VariationConfig,
    /// Checkpoint output.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            objectives: vec![
                "folding".to_string(),
                "codon_bias".to_string(),
                "degradation".to_string(),
            ],
            population: PopulationConfig::default(),
            evaluation: EvaluationConfig::default(),
            variation: VariationConfig::default(),
            checkpoint: CheckpointConfig::default(),
            random_seed: None,
        }
    }
}

/// Population and generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of survivors carried between generations (N).
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Offspring produced per generation. The selection pool is
    /// `size + offspring`.
    #[serde(default = "default_offspring")]
    pub offspring: usize,
    /// Maximum number of generations.
    #[serde(default = "default_max_generations")]
    pub max_generations: usize,
    /// Stop if the best front-0 aggregate does not improve for this many
    /// consecutive generations.
    #[serde(default)]
    pub stagnation_window: Option<usize>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            offspring: default_offspring(),
            max_generations: default_max_generations(),
            stagnation_window: None,
        }
    }
}

fn default_population_size() -> usize {
    20
}
fn default_offspring() -> usize {
    100
}
fn default_max_generations() -> usize {
    100
}

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Number of parallel evaluation workers (0 = auto-detect).
    #[serde(default)]
    pub workers: usize,
    /// Maximum number of cached objective vectors (0 disables the cache).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> usize {
    16384
}

/// Crossover strategy applied before mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CrossoverMethod {
    /// Mutation only.
    #[default]
    None,
    /// Exchange a prefix of codons.
    SinglePoint,
    /// Exchange a contiguous window of codons.
    TwoPoint,
    /// Exchange randomly chosen codon positions.
    Binomial,
}

/// Variation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationConfig {
    /// Initial per-position mutation probability (0.0-1.0).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Crossover strategy.
    #[serde(default)]
    pub crossover: CrossoverMethod,
    /// Probability that an offspring is produced by crossover.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Expected fraction of positions exchanged by crossover (< 0.5).
    #[serde(default = "default_crossover_span")]
    pub crossover_span: f64,
    /// Generations without improvement before the mutation rate winds down.
    #[serde(default = "default_winddown_trigger")]
    pub winddown_trigger: usize,
    /// Factor applied to the mutation rate on wind-down.
    #[serde(default = "default_winddown_rate")]
    pub winddown_rate: f64,
    /// Floor for the mutation rate.
    #[serde(default = "default_min_mutation_rate")]
    pub min_mutation_rate: f64,
    /// Stop once the expected number of mutations per offspring drops below
    /// this, after one final full scan.
    #[serde(default = "default_stop_threshold")]
    pub stop_threshold: f64,
    /// Replace every n-th variation step with a full scan of single-codon
    /// mutants (0 = only the final scan).
    #[serde(default)]
    pub full_scan_interval: usize,
    /// Number of top survivors whose single mutants a full scan generates.
    #[serde(default = "default_full_scan_parents")]
    pub full_scan_parents: usize,
}

impl Default for VariationConfig {
    fn default() -> Self {
        Self {
            mutation_rate: default_mutation_rate(),
            crossover: CrossoverMethod::default(),
            crossover_rate: default_crossover_rate(),
            crossover_span: default_crossover_span(),
            winddown_trigger: default_winddown_trigger(),
            winddown_rate: default_winddown_rate(),
            min_mutation_rate: default_min_mutation_rate(),
            stop_threshold: default_stop_threshold(),
            full_scan_interval: 0,
            full_scan_parents: default_full_scan_parents(),
        }
    }
}

fn default_mutation_rate() -> f64 {
    0.1
}
fn default_crossover_rate() -> f64 {
    0.5
}
fn default_crossover_span() -> f64 {
    0.25
}
fn default_winddown_trigger() -> usize {
    15
}
fn default_winddown_rate() -> f64 {
    0.9
}
fn default_min_mutation_rate() -> f64 {
    1e-4
}
fn default_stop_threshold() -> f64 {
    0.2
}
fn default_full_scan_parents() -> usize {
    10
}

/// Checkpoint output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// JSON-lines file receiving one record per generation.
    #[serde(default)]
    pub path: Option<String>,
    /// Number of best front-0 candidates stored per record.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: None,
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

impl EvolutionConfig {
    /// Number of objectives (M).
    pub fn arity(&self) -> usize {
        self.objectives.len()
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.objectives.is_empty() {
            return Err(ConfigError::NoObjectives);
        }
        for (i, name) in self.objectives.iter().enumerate() {
            if self.objectives[..i].contains(name) {
                return Err(ConfigError::DuplicateObjective(name.clone()));
            }
        }

        if self.population.size < 2 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.population.offspring == 0 {
            return Err(ConfigError::NoOffspring);
        }
        if self.population.stagnation_window == Some(0) {
            return Err(ConfigError::InvalidStagnationWindow);
        }

        let check_probability = |value: f64, name: &str| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidProbability {
                    name: name.to_string(),
                    value,
                })
            }
        };

        let v = &self.variation;
        check_probability(v.mutation_rate, "mutation_rate")?;
        check_probability(v.crossover_rate, "crossover_rate")?;
        check_probability(v.winddown_rate, "winddown_rate")?;
        check_probability(v.min_mutation_rate, "min_mutation_rate")?;
        if !(v.stop_threshold.is_finite() && v.stop_threshold >= 0.0) {
            return Err(ConfigError::InvalidStopThreshold(v.stop_threshold));
        }
        if v.full_scan_parents == 0 {
            return Err(ConfigError::NoFullScanParents);
        }
        if !(0.0..0.5).contains(&v.crossover_span) {
            return Err(ConfigError::InvalidProbability {
                name: "crossover_span".to_string(),
                value: v.crossover_span,
            });
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one objective must be configured")]
    NoObjectives,
    #[error("Objective {0:?} is listed more than once")]
    DuplicateObjective(String),
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Offspring count must be positive")]
    NoOffspring,
    #[error("Stagnation window must be positive")]
    InvalidStagnationWindow,
    #[error("Stop threshold must be a non-negative number, got {0}")]
    InvalidStopThreshold(f64),
    #[error("Full scan must draw from at least one parent")]
    NoFullScanParents,
    #[error("{name} must be a probability, got {value}")]
    InvalidProbability { name: String, value: f64 },
    #[error("Registered objectives {registered:?} do not match configured {configured:?}")]
    ObjectiveMismatch {
        configured: Vec<String>,
        registered: Vec<String>,
    },
}
