//! Generation loop for multi-objective codon search.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::schema::{
    CandidateSnapshot, CheckpointRecord, CodonSequence, ConfigError, EvolutionConfig,
    EvolutionHistory, EvolutionPhase, EvolutionProgress, EvolutionResult, EvolutionStats,
    GenerationStats, ObjectiveSummary, StopReason,
};

use super::checkpoint::{CheckpointSink, JsonLinesCheckpoints};
use super::fitness::{EvaluationReport, FitnessEvaluator, ObjectiveSet};
use super::genome::{VariationContext, VariationOperator};
use super::nsga2::{self, SelectionError};

/// A candidate design in the population.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Unique identifier.
    pub id: u64,
    /// The design.
    pub sequence: CodonSequence,
    objectives: Vec<f64>,
    /// Front index, set by selection.
    pub rank: usize,
    /// Crowding distance within the front, set by selection.
    pub crowding_distance: f64,
    /// Generation created.
    pub generation: usize,
    /// Parent ID.
    pub parent: Option<u64>,
}

impl Candidate {
    /// Create an unscored candidate.
    pub fn new(id: u64, sequence: CodonSequence, generation: usize, parent: Option<u64>) -> Self {
        Self {
            id,
            sequence,
            objectives: Vec::new(),
            rank: 0,
            crowding_distance: 0.0,
            generation,
            parent,
        }
    }

    /// Create a candidate with a known objective vector.
    pub fn scored(id: u64, sequence: CodonSequence, objectives: Vec<f64>) -> Self {
        let mut candidate = Self::new(id, sequence, 0, None);
        candidate.objectives = objectives;
        candidate
    }

    /// Objective vector in configured order. Empty until evaluated.
    pub fn objectives(&self) -> &[f64] {
        &self.objectives
    }

    pub fn is_scored(&self) -> bool {
        !self.objectives.is_empty()
    }

    /// Objectives are written once, by the evaluator.
    pub(crate) fn set_objectives(&mut self, objectives: Vec<f64>) {
        debug_assert!(!self.is_scored(), "candidate {} scored twice", self.id);
        self.objectives = objectives;
    }

    /// Sum of the objective vector.
    pub fn aggregate(&self) -> f64 {
        self.objectives.iter().sum()
    }

    /// Convert to snapshot for serialization.
    pub fn to_snapshot(&self) -> CandidateSnapshot {
        CandidateSnapshot {
            id: self.id,
            generation: self.generation,
            parent: self.parent,
            rank: self.rank,
            objectives: self.objectives.clone(),
            aggregate: self.aggregate(),
            sequence: self.sequence.key(),
        }
    }
}

/// Errors that halt an evolution run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Selection failed: {0}")]
    Selection(#[from] SelectionError),
    #[error(
        "Generation {generation} failed: {survivors} of {required} candidates survived evaluation ({failures} failures)"
    )]
    GenerationFailure {
        generation: usize,
        survivors: usize,
        required: usize,
        failures: usize,
    },
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("At least one seed sequence is required")]
    NoSeeds,
}

/// How the next generation's offspring are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VariationStep {
    Regular,
    FullScan,
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine<V> {
    config: EvolutionConfig,
    evaluator: FitnessEvaluator,
    variation: V,
    seeds: Vec<CodonSequence>,
    population: Vec<Candidate>,
    sink: Option<Box<dyn CheckpointSink + Send>>,
    last_checkpoint: Option<CheckpointRecord>,
    last_stats: GenerationStats,
    history: EvolutionHistory,
    phase: EvolutionPhase,
    generation: usize,
    best_aggregate: f64,
    stagnation_count: usize,
    mutation_rate: f64,
    last_winddown: usize,
    in_final_scan: bool,
    next_id: u64,
    total_evaluations: u64,
    cache_hits: u64,
    failed_evaluations: u64,
    cancelled: Arc<AtomicBool>,
}

impl<V: VariationOperator> EvolutionEngine<V> {
    /// Create a new evolution engine.
    ///
    /// The registered objectives must match `config.objectives` name for
    /// name. If `config.checkpoint.path` is set, records are appended to that
    /// file; a file that cannot be opened is logged and the run proceeds
    /// without persistence.
    pub fn new(
        config: EvolutionConfig,
        objectives: ObjectiveSet,
        variation: V,
        seeds: Vec<CodonSequence>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let registered = objectives.names();
        if registered != config.objectives {
            return Err(ConfigError::ObjectiveMismatch {
                configured: config.objectives.clone(),
                registered,
            }
            .into());
        }
        if seeds.is_empty() {
            return Err(EngineError::NoSeeds);
        }

        let evaluator = FitnessEvaluator::new(objectives, &config.evaluation)?;

        let sink: Option<Box<dyn CheckpointSink + Send>> = match &config.checkpoint.path {
            Some(path) => match JsonLinesCheckpoints::create(path) {
                Ok(sink) => {
                    log::info!("Writing checkpoints to {}", sink.path().display());
                    Some(Box::new(sink))
                }
                Err(e) => {
                    log::warn!("Checkpoints disabled, cannot open {path}: {e}");
                    None
                }
            },
            None => None,
        };

        let mutation_rate = config.variation.mutation_rate;
        Ok(Self {
            config,
            evaluator,
            variation,
            seeds,
            population: Vec::new(),
            sink,
            last_checkpoint: None,
            last_stats: GenerationStats::default(),
            history: EvolutionHistory::default(),
            phase: EvolutionPhase::Init,
            generation: 0,
            best_aggregate: f64::NEG_INFINITY,
            stagnation_count: 0,
            mutation_rate,
            last_winddown: 0,
            in_final_scan: false,
            next_id: 0,
            total_evaluations: 0,
            cache_hits: 0,
            failed_evaluations: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the checkpoint sink.
    pub fn with_checkpoint_sink(mut self, sink: Box<dyn CheckpointSink + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Current population, front-major order.
    pub fn population(&self) -> &[Candidate] {
        &self.population
    }

    pub fn phase(&self) -> EvolutionPhase {
        self.phase
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Mutation rate passed to the next variation step.
    pub fn mutation_rate(&self) -> f64 {
        self.mutation_rate
    }

    /// Most recent checkpoint record, kept even if persisting it failed.
    pub fn last_checkpoint(&self) -> Option<&CheckpointRecord> {
        self.last_checkpoint.as_ref()
    }

    pub fn evaluator(&self) -> &FitnessEvaluator {
        &self.evaluator
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Reset run state and build the generation-0 pool from the seeds,
    /// topped up by the variation operator when there are fewer than N.
    fn initialize(&mut self) -> Vec<Candidate> {
        self.population.clear();
        self.history = EvolutionHistory::default();
        self.last_checkpoint = None;
        self.last_stats = GenerationStats::default();
        self.phase = EvolutionPhase::Init;
        self.generation = 0;
        self.best_aggregate = f64::NEG_INFINITY;
        self.stagnation_count = 0;
        self.mutation_rate = self.config.variation.mutation_rate;
        self.last_winddown = 0;
        self.in_final_scan = false;
        self.total_evaluations = 0;
        self.cache_hits = 0;
        self.failed_evaluations = 0;

        let seeds = self.seeds.clone();
        let mut pool = Vec::with_capacity(seeds.len().max(self.config.population.size));
        for sequence in seeds {
            let id = self.next_id();
            pool.push(Candidate::new(id, sequence, 0, None));
        }

        let size = self.config.population.size;
        if pool.len() < size {
            let ctx = VariationContext {
                generation: 0,
                mutation_rate: self.mutation_rate,
                offspring: size - pool.len(),
            };
            for offspring in self.variation.vary(&pool, &ctx) {
                let id = self.next_id();
                pool.push(Candidate::new(id, offspring.sequence, 0, offspring.parent));
            }
        }

        log::info!(
            "Initialized pool of {} candidates from {} seeds",
            pool.len(),
            self.seeds.len()
        );
        pool
    }

    /// Reduce an evaluated pool to the next population.
    ///
    /// Fails the generation when fewer than N candidates were scored, or when
    /// fresh evaluations were dispatched and every one of them failed.
    fn select(
        &mut self,
        report: EvaluationReport,
        pool_size: usize,
    ) -> Result<GenerationStats, EngineError> {
        self.total_evaluations += report.evaluated as u64;
        self.cache_hits += report.cache_hits as u64;
        self.failed_evaluations += report.failures.len() as u64;

        let required = self.config.population.size;
        if report.scored.len() < required {
            self.phase = EvolutionPhase::Failed;
            log::error!(
                "Generation {}: only {} of {} candidates survived evaluation",
                self.generation,
                report.scored.len(),
                required
            );
            return Err(EngineError::GenerationFailure {
                generation: self.generation,
                survivors: report.scored.len(),
                required,
                failures: report.failures.len(),
            });
        }
        if report.evaluated > 0 && report.succeeded == 0 {
            self.phase = EvolutionPhase::Failed;
            log::error!(
                "Generation {}: all {} fresh evaluations failed",
                self.generation,
                report.evaluated
            );
            return Err(EngineError::GenerationFailure {
                generation: self.generation,
                survivors: report.scored.len(),
                required,
                failures: report.failures.len(),
            });
        }

        self.phase = EvolutionPhase::Selecting;
        let selection = match nsga2::select_fronts(report.scored, required) {
            Ok(selection) => selection,
            Err(e) => {
                self.phase = EvolutionPhase::Failed;
                log::error!("Generation {}: {}", self.generation, e);
                return Err(e.into());
            }
        };
        let front_size = selection.front().count();
        let best_aggregate = selection
            .front()
            .map(Candidate::aggregate)
            .fold(f64::NEG_INFINITY, f64::max);
        self.population = selection.survivors;
        let n = self.population.len() as f64;
        let mean_aggregate = self.population.iter().map(Candidate::aggregate).sum::<f64>() / n;

        let objectives = self
            .config
            .objectives
            .iter()
            .enumerate()
            .map(|(m, name)| {
                let values = self.population.iter().map(|c| c.objectives()[m]);
                ObjectiveSummary {
                    name: name.clone(),
                    best: values.clone().fold(f64::NEG_INFINITY, f64::max),
                    mean: values.sum::<f64>() / n,
                }
            })
            .collect();

        Ok(GenerationStats {
            pool_size,
            evaluated: report.evaluated,
            cache_hits: report.cache_hits,
            failures: report.failures.len(),
            fronts: selection.front_count,
            front_size,
            objectives,
            best_aggregate,
            mean_aggregate,
        })
    }

    /// Track improvement, history and checkpoint for a completed generation.
    fn record(&mut self, stats: GenerationStats) {
        if stats.best_aggregate > self.best_aggregate {
            self.best_aggregate = stats.best_aggregate;
            self.stagnation_count = 0;
        } else {
            self.stagnation_count += 1;
        }

        self.history.best_aggregate.push(stats.best_aggregate);
        self.history.mean_aggregate.push(stats.mean_aggregate);
        self.history.front_size.push(stats.front_size);
        self.history.mutation_rate.push(self.mutation_rate);

        log::info!(
            "Generation {}: front 0 = {}, best aggregate = {:.4}, stagnation = {}",
            self.generation,
            stats.front_size,
            stats.best_aggregate,
            self.stagnation_count
        );

        self.last_stats = stats;
        self.checkpoint();
        self.wind_down();
    }

    fn checkpoint(&mut self) {
        let mut best: Vec<&Candidate> = self.population.iter().filter(|c| c.rank == 0).collect();
        best.sort_by(|a, b| b.aggregate().total_cmp(&a.aggregate()));
        best.truncate(self.config.checkpoint.top_k);

        let record = CheckpointRecord {
            generation: self.generation,
            mutation_rate: self.mutation_rate,
            stagnation_count: self.stagnation_count,
            best: best.into_iter().map(Candidate::to_snapshot).collect(),
            stats: self.last_stats.clone(),
        };

        if let Some(sink) = self.sink.as_mut()
            && let Err(e) = sink.checkpoint(&record)
        {
            log::warn!("Checkpoint for generation {} not persisted: {}", self.generation, e);
        }
        self.last_checkpoint = Some(record);
    }

    /// Shrink the mutation rate when the best aggregate has not improved
    /// over the last `winddown_trigger` generations.
    fn wind_down(&mut self) {
        let v = &self.config.variation;
        let trigger = v.winddown_trigger;
        let best = &self.history.best_aggregate;
        if trigger == 0 || best.len() < trigger {
            return;
        }
        if self.generation - self.last_winddown <= trigger {
            return;
        }
        if best[best.len() - 1] <= best[best.len() - trigger] {
            let rate = (self.mutation_rate * v.winddown_rate).max(v.min_mutation_rate);
            log::info!(
                "Generation {}: mutation rate {:.4} -> {:.4}",
                self.generation,
                self.mutation_rate,
                rate
            );
            self.mutation_rate = rate;
            self.last_winddown = self.generation;
        }
    }

    /// Choose how the next generation is produced.
    ///
    /// Every `full_scan_interval`-th generation is a full scan. Otherwise, once
    /// the expected mutations per offspring fall below `stop_threshold`, one
    /// final full scan runs; `None` means the threshold is still undercut
    /// after it.
    fn next_step(&mut self) -> Option<VariationStep> {
        let interval = self.config.variation.full_scan_interval;
        let threshold = self.config.variation.stop_threshold;
        if interval > 0 && (self.generation + 1) % interval == 0 {
            return Some(VariationStep::FullScan);
        }

        match self.variation.expected_mutations(self.mutation_rate) {
            Some(expected) if expected < threshold => {
                if self.in_final_scan {
                    return None;
                }
                log::info!(
                    "Generation {}: {:.3} expected mutations below {}, final full scan",
                    self.generation,
                    expected,
                    threshold
                );
                self.in_final_scan = true;
                Some(VariationStep::FullScan)
            }
            _ => {
                self.in_final_scan = false;
                Some(VariationStep::Regular)
            }
        }
    }

    /// Produce offspring and merge them with the population into the next
    /// pool.
    fn vary(&mut self, step: VariationStep) -> Vec<Candidate> {
        self.phase = EvolutionPhase::Varying;
        let ctx = VariationContext {
            generation: self.generation + 1,
            mutation_rate: self.mutation_rate,
            offspring: self.config.population.offspring,
        };
        let offspring = match step {
            VariationStep::Regular => self.variation.vary(&self.population, &ctx),
            VariationStep::FullScan => self.variation.full_scan(&self.population, &ctx),
        };
        self.generation += 1;

        let mut pool = self.population.clone();
        pool.reserve(offspring.len());
        for child in offspring {
            let id = self.next_id();
            pool.push(Candidate::new(id, child.sequence, self.generation, child.parent));
        }
        log::debug!(
            "Generation {}: pool of {} ({:?}, {} survivors)",
            self.generation,
            pool.len(),
            step,
            self.population.len()
        );
        pool
    }

    /// Get current progress.
    pub fn progress(&self) -> EvolutionProgress {
        EvolutionProgress {
            generation: self.generation,
            total_generations: self.config.population.max_generations,
            phase: self.phase,
            best_aggregate: self.best_aggregate,
            stagnation_count: self.stagnation_count,
            mutation_rate: self.mutation_rate,
            stats: self.last_stats.clone(),
            front: self
                .population
                .iter()
                .filter(|c| c.rank == 0)
                .map(Candidate::to_snapshot)
                .collect(),
        }
    }

    /// Check if evolution should stop.
    fn should_stop(&self) -> Option<StopReason> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some(StopReason::Cancelled);
        }

        if self.generation >= self.config.population.max_generations {
            return Some(StopReason::MaxGenerations);
        }

        if let Some(window) = self.config.population.stagnation_window
            && self.stagnation_count >= window
        {
            return Some(StopReason::Converged);
        }

        None
    }

    fn terminal_phase(reason: StopReason) -> EvolutionPhase {
        match reason {
            StopReason::MaxGenerations => EvolutionPhase::Exhausted,
            StopReason::Converged | StopReason::MutationExhausted => EvolutionPhase::Converged,
            StopReason::Cancelled => EvolutionPhase::Cancelled,
        }
    }

    /// Run evolution with progress callback, invoked once per completed
    /// generation.
    ///
    /// Returns an error only when a generation cannot fill the population,
    /// every fresh evaluation of a generation fails, or selection is given an
    /// invalid pool; the last checkpoint stays available through
    /// [`Self::last_checkpoint`].
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<EvolutionResult, EngineError>
    where
        F: FnMut(&EvolutionProgress),
    {
        let start_time = Instant::now();
        let mut pool = self.initialize();

        let stop_reason = loop {
            self.phase = EvolutionPhase::Evaluating;
            let pool_size = pool.len();
            let report = self.evaluator.evaluate(pool, &self.cancelled);
            if report.cancelled {
                log::info!("Generation {} cancelled during evaluation", self.generation);
                break StopReason::Cancelled;
            }

            let stats = self.select(report, pool_size)?;
            self.record(stats);

            let step = match self.should_stop() {
                Some(reason) => Err(reason),
                None => self.next_step().ok_or(StopReason::MutationExhausted),
            };
            self.phase = match step {
                Ok(_) => EvolutionPhase::Varying,
                Err(reason) => Self::terminal_phase(reason),
            };
            callback(&self.progress());

            let step = match step {
                Ok(step) => step,
                Err(reason) => break reason,
            };
            if self.cancelled.load(Ordering::Relaxed) {
                break StopReason::Cancelled;
            }
            pool = self.vary(step);
        };
        self.phase = Self::terminal_phase(stop_reason);

        let elapsed = start_time.elapsed().as_secs_f64();
        log::info!(
            "Evolution stopped ({:?}) after {} generations in {:.2}s",
            stop_reason,
            self.completed_generations(),
            elapsed
        );
        Ok(self.result(stop_reason, elapsed))
    }

    /// Run evolution (blocking).
    pub fn run(&mut self) -> Result<EvolutionResult, EngineError> {
        self.run_with_callback(|_| {})
    }

    /// Index of the last fully selected generation.
    fn completed_generations(&self) -> usize {
        self.history.best_aggregate.len().saturating_sub(1)
    }

    fn result(&self, stop_reason: StopReason, elapsed: f64) -> EvolutionResult {
        let population: Vec<CandidateSnapshot> =
            self.population.iter().map(Candidate::to_snapshot).collect();
        let front = population.iter().filter(|c| c.rank == 0).cloned().collect();

        EvolutionResult {
            population,
            front,
            stats: EvolutionStats {
                generations: self.completed_generations(),
                total_evaluations: self.total_evaluations,
                cache_hits: self.cache_hits,
                failed_evaluations: self.failed_evaluations,
                best_aggregate: self.best_aggregate,
                elapsed_seconds: elapsed,
                evaluations_per_second: if elapsed > 0.0 {
                    self.total_evaluations as f64 / elapsed
                } else {
                    0.0
                },
                stop_reason,
            },
            history: self.history.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::checkpoint::{PersistenceError, load_checkpoints};
    use crate::compute::evolution::fitness::{EvaluationError, objective_fn};
    use crate::compute::evolution::genome::{CodonMutator, SynonymTable};
    use crate::schema::{EvaluationConfig, PopulationConfig, VariationConfig};
    use std::sync::Mutex;

    const ALANINE: [&str; 4] = ["GCU", "GCC", "GCA", "GCG"];

    fn table(len: usize) -> SynonymTable {
        SynonymTable::new(
            (0..len)
                .map(|_| ALANINE.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn seed(len: usize) -> CodonSequence {
        CodonSequence::new(vec!["GCU".to_string(); len])
    }

    fn gc3(seq: &CodonSequence) -> Result<f64, EvaluationError> {
        Ok(seq.codons.iter().filter(|c| c.ends_with(['G', 'C'])).count() as f64)
    }

    fn u3(seq: &CodonSequence) -> Result<f64, EvaluationError> {
        Ok(seq.codons.iter().filter(|c| c.ends_with('U')).count() as f64)
    }

    fn objectives() -> ObjectiveSet {
        ObjectiveSet::new()
            .with(objective_fn("gc3", gc3))
            .with(objective_fn("u3", u3))
    }

    fn config(size: usize, max_generations: usize) -> EvolutionConfig {
        EvolutionConfig {
            objectives: vec!["gc3".to_string(), "u3".to_string()],
            population: PopulationConfig {
                size,
                offspring: size,
                max_generations,
                stagnation_window: None,
            },
            evaluation: EvaluationConfig {
                workers: 2,
                cache_capacity: 1024,
            },
            random_seed: Some(11),
            ..Default::default()
        }
    }

    fn engine(config: EvolutionConfig) -> EvolutionEngine<CodonMutator> {
        let mutator = CodonMutator::from_config(table(8), &config);
        EvolutionEngine::new(config, objectives(), mutator, vec![seed(8)]).unwrap()
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<CheckpointRecord>>>);

    impl CheckpointSink for SharedSink {
        fn checkpoint(&mut self, record: &CheckpointRecord) -> Result<(), PersistenceError> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct BrokenSink;

    impl CheckpointSink for BrokenSink {
        fn checkpoint(&mut self, _: &CheckpointRecord) -> Result<(), PersistenceError> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[test]
    fn test_evolution_engine_creation() {
        let engine = engine(config(6, 3));
        assert_eq!(engine.phase(), EvolutionPhase::Init);
        assert!(engine.population().is_empty());
        assert_eq!(engine.mutation_rate(), VariationConfig::default().mutation_rate);
    }

    #[test]
    fn test_rejects_mismatched_objectives() {
        let config = config(6, 3);
        let mutator = CodonMutator::from_config(table(8), &config);
        let set = ObjectiveSet::new()
            .with(objective_fn("u3", u3))
            .with(objective_fn("gc3", gc3));
        let result = EvolutionEngine::new(config, set, mutator, vec![seed(8)]);
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::ObjectiveMismatch { .. }))
        ));
    }

    #[test]
    fn test_requires_seeds() {
        let config = config(6, 3);
        let mutator = CodonMutator::from_config(table(8), &config);
        let result = EvolutionEngine::new(config, objectives(), mutator, Vec::new());
        assert!(matches!(result, Err(EngineError::NoSeeds)));
    }

    #[test]
    fn test_evolution_run() {
        let mut engine = engine(config(6, 4));
        let result = engine.run().unwrap();

        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.stats.generations, 4);
        assert_eq!(engine.phase(), EvolutionPhase::Exhausted);
        assert_eq!(result.population.len(), 6);
        assert!(!result.front.is_empty());
        assert!(result.front.iter().all(|c| c.rank == 0));
        assert_eq!(result.history.best_aggregate.len(), 5);
        assert!(result.stats.total_evaluations > 0);
        assert!(!engine.evaluator().cache().is_empty());
        for c in &result.population {
            assert_eq!(c.objectives.len(), 2);
        }
    }

    #[test]
    fn test_zero_generations_scores_seeds_only() {
        let mut engine = engine(config(4, 0));
        let result = engine.run().unwrap();
        assert_eq!(result.stats.generations, 0);
        assert_eq!(result.history.best_aggregate.len(), 1);
        assert!(result.population.iter().all(|c| c.generation == 0));
    }

    #[test]
    fn test_converges_on_stagnation() {
        let mut config = config(4, 50);
        config.objectives = vec!["flat".to_string()];
        config.population.stagnation_window = Some(3);
        let mutator = CodonMutator::from_config(table(8), &config);
        let set = ObjectiveSet::new().with(objective_fn("flat", |_| Ok(1.0)));
        let mut engine = EvolutionEngine::new(config, set, mutator, vec![seed(8)]).unwrap();

        let result = engine.run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Converged);
        assert_eq!(result.stats.generations, 3);
        assert_eq!(engine.phase(), EvolutionPhase::Converged);
    }

    #[test]
    fn test_mutation_rate_winds_down() {
        let mut config = config(4, 6);
        config.objectives = vec!["flat".to_string()];
        config.variation = VariationConfig {
            mutation_rate: 0.4,
            winddown_trigger: 2,
            winddown_rate: 0.5,
            min_mutation_rate: 0.15,
            ..Default::default()
        };
        let mutator = CodonMutator::from_config(table(8), &config);
        let set = ObjectiveSet::new().with(objective_fn("flat", |_| Ok(1.0)));
        let mut engine = EvolutionEngine::new(config, set, mutator, vec![seed(8)]).unwrap();

        let result = engine.run().unwrap();
        let rates = &result.history.mutation_rate;
        assert_eq!(rates.len(), 7);
        assert!(rates[..4].iter().all(|&r| (r - 0.4).abs() < 1e-12));
        assert!(rates[4..].iter().all(|&r| (r - 0.2).abs() < 1e-12));
        assert!((engine.mutation_rate() - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_generation_failure() {
        // 10 seeds, 3 of which cannot be scored.
        let picky = |seq: &CodonSequence| {
            if seq.codons[0] == "GCG" {
                Err(EvaluationError::failed("gc3", "rejected"))
            } else {
                gc3(seq)
            }
        };
        let seeds: Vec<CodonSequence> = (0..10)
            .map(|i| {
                let mut s = seed(8);
                let head = if i % 3 == 2 { "GCG" } else { "GCU" };
                s.codons[0] = head.to_string();
                s.codons[1] = ALANINE[i % 4].to_string();
                s.codons[2] = ALANINE[i / 4].to_string();
                s
            })
            .collect();

        let run = |size: usize| {
            let config = config(size, 0);
            let mutator = CodonMutator::from_config(table(8), &config);
            let set = ObjectiveSet::new()
                .with(objective_fn("gc3", picky))
                .with(objective_fn("u3", u3));
            let mut engine = EvolutionEngine::new(config, set, mutator, seeds.clone()).unwrap();
            let result = engine.run();
            (engine.phase(), result)
        };

        let (phase, result) = run(7);
        assert_eq!(phase, EvolutionPhase::Exhausted);
        let result = result.unwrap();
        assert_eq!(result.population.len(), 7);
        assert_eq!(result.stats.failed_evaluations, 3);

        let (phase, result) = run(8);
        assert_eq!(phase, EvolutionPhase::Failed);
        match result {
            Err(EngineError::GenerationFailure {
                generation,
                survivors,
                required,
                failures,
            }) => {
                assert_eq!((generation, survivors, required, failures), (0, 7, 8, 3));
            }
            other => panic!("expected generation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_cancellation() {
        let mut engine = engine(config(6, 100));
        let cancel = engine.cancel_handle();

        // Cancel immediately
        cancel.store(true, Ordering::Relaxed);

        let result = engine.run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert!(result.population.is_empty());
        assert_eq!(engine.phase(), EvolutionPhase::Cancelled);
    }

    #[test]
    fn test_cancel_from_callback() {
        let mut engine = engine(config(6, 100));
        let cancel = engine.cancel_handle();

        let result = engine
            .run_with_callback(|progress| {
                if progress.generation == 2 {
                    cancel.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.generations, 2);
        assert_eq!(result.population.len(), 6);
    }

    #[test]
    fn test_checkpoint_per_generation() {
        let sink = SharedSink::default();
        let records = Arc::clone(&sink.0);
        let mut config = config(6, 3);
        config.checkpoint.top_k = 2;
        let mut engine = engine(config).with_checkpoint_sink(Box::new(sink));

        let mut seen = Vec::new();
        engine
            .run_with_callback(|progress| seen.push(progress.generation))
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);

        let records = records.lock().unwrap();
        let generations: Vec<usize> = records.iter().map(|r| r.generation).collect();
        assert_eq!(generations, vec![0, 1, 2, 3]);
        for record in records.iter() {
            assert!(!record.best.is_empty() && record.best.len() <= 2);
            assert!(record.best.windows(2).all(|w| w[0].aggregate >= w[1].aggregate));
            assert!(record.best.iter().all(|c| c.rank == 0));
        }
        assert_eq!(engine.last_checkpoint(), records.last());
    }

    #[test]
    fn test_checkpoint_file_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let mut config = config(4, 2);
        config.checkpoint.path = Some(path.to_string_lossy().into_owned());

        engine(config).run().unwrap();
        let records = load_checkpoints(&path).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_persistence_failure_is_not_fatal() {
        let mut engine = engine(config(4, 2)).with_checkpoint_sink(Box::new(BrokenSink));
        let result = engine.run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(engine.last_checkpoint().map(|r| r.generation), Some(2));
    }

    #[test]
    fn test_deterministic_under_seed() {
        let a = engine(config(6, 5)).run().unwrap();
        let b = engine(config(6, 5)).run().unwrap();
        assert_eq!(a.population, b.population);
        assert_eq!(a.history.best_aggregate, b.history.best_aggregate);
    }

    #[test]
    fn test_offspring_record_parentage() {
        let mut engine = engine(config(4, 3));
        engine.run().unwrap();
        let ids: Vec<u64> = engine.population().iter().map(|c| c.id).collect();
        for c in engine.population() {
            if c.generation > 0 {
                assert!(c.parent.is_some());
                assert!(c.parent.unwrap() < c.id);
            }
        }
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_all_offspring_failing_fails_generation() {
        // Seeds score, every mutant is rejected.
        let only_seed = |seq: &CodonSequence| {
            if *seq == seed(8) {
                Ok(1.0)
            } else {
                Err(EvaluationError::failed("seed", "not a seed"))
            }
        };
        let mut config = config(4, 5);
        config.objectives = vec!["seed".to_string()];
        let mutator = CodonMutator::from_config(table(8), &config);
        let set = ObjectiveSet::new().with(objective_fn("seed", only_seed));
        let mut engine = EvolutionEngine::new(config, set, mutator, vec![seed(8); 4]).unwrap();

        match engine.run() {
            Err(EngineError::GenerationFailure {
                generation,
                survivors,
                failures,
                ..
            }) => {
                assert_eq!(generation, 1);
                assert_eq!(survivors, 4);
                assert!(failures > 0);
            }
            other => panic!("expected generation failure, got {other:?}"),
        }
        assert_eq!(engine.phase(), EvolutionPhase::Failed);
        assert_eq!(engine.last_checkpoint().map(|r| r.generation), Some(0));
    }

    #[test]
    fn test_stops_after_final_full_scan() {
        let mut config = config(4, 50);
        config.objectives = vec!["flat".to_string()];
        config.variation = VariationConfig {
            mutation_rate: 0.4,
            winddown_trigger: 2,
            winddown_rate: 0.5,
            min_mutation_rate: 0.0,
            stop_threshold: 5.0,
            ..Default::default()
        };
        let mutator = CodonMutator::from_config(table(8), &config);
        let set = ObjectiveSet::new().with(objective_fn("flat", |_| Ok(1.0)));
        let mut engine = EvolutionEngine::new(config, set, mutator, vec![seed(8)]).unwrap();

        // 24 single mutations: 0.4 * 24 = 9.6 until the rate halves after
        // generation 3, then 4.8 triggers the final scan.
        let mut pools = Vec::new();
        let mut phases = Vec::new();
        let result = engine
            .run_with_callback(|progress| {
                pools.push(progress.stats.pool_size);
                phases.push(progress.phase);
            })
            .unwrap();

        assert_eq!(result.stats.stop_reason, StopReason::MutationExhausted);
        assert_eq!(result.stats.generations, 4);
        assert_eq!(engine.phase(), EvolutionPhase::Converged);
        assert_eq!(pools[1..4], [8, 8, 8]);
        assert_eq!(pools[4], 4 + 4 * 24);
        assert_eq!(phases.last(), Some(&EvolutionPhase::Converged));
        assert!(phases[..4].iter().all(|&p| p == EvolutionPhase::Varying));
    }

    #[test]
    fn test_periodic_full_scan() {
        let mut config = config(6, 4);
        config.variation.full_scan_interval = 2;
        let mut engine = engine(config);

        let mut pools = Vec::new();
        let result = engine
            .run_with_callback(|progress| pools.push(progress.stats.pool_size))
            .unwrap();

        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(pools, vec![6, 12, 6 + 6 * 24, 12, 6 + 6 * 24]);
    }

    #[test]
    fn test_worker_pool_error_converts() {
        // The global pool can only be built once.
        let _ = rayon::ThreadPoolBuilder::new().build_global();
        let err = rayon::ThreadPoolBuilder::new().build_global().unwrap_err();
        let err = EngineError::from(err);
        assert!(matches!(err, EngineError::WorkerPool(_)));
        assert!(err.to_string().starts_with("Failed to build worker pool"));
    }
}
