//! Fitness evaluation for evolutionary codon search.
//!
//! Scoring collaborators are registered as an ordered [`ObjectiveSet`]; the
//! [`FitnessEvaluator`] fans unscored candidates out over a bounded rayon
//! pool and assembles one objective vector per candidate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::schema::{CodonSequence, EvaluationConfig};

use super::cache::ScoreCache;
use super::search::Candidate;

/// A scoring collaborator failed on a sequence.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("Objective {objective} failed: {message}")]
    Failed { objective: String, message: String },
    #[error("Objective {objective} returned non-finite score {value}")]
    NonFinite { objective: String, value: f64 },
}

impl EvaluationError {
    /// Convenience constructor for collaborator failures.
    pub fn failed(objective: impl Into<String>, message: impl ToString) -> Self {
        Self::Failed {
            objective: objective.into(),
            message: message.to_string(),
        }
    }
}

/// A scoring collaborator. Larger scores are better.
pub trait Objective: Send + Sync {
    /// Name used to match the configured objective order.
    fn name(&self) -> &str;

    /// Score a sequence.
    fn score(&self, sequence: &CodonSequence) -> Result<f64, EvaluationError>;
}

/// Objective backed by a closure.
pub struct FnObjective<F> {
    name: String,
    func: F,
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&CodonSequence) -> Result<f64, EvaluationError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, sequence: &CodonSequence) -> Result<f64, EvaluationError> {
        (self.func)(sequence)
    }
}

/// Wrap a closure as an [`Objective`].
pub fn objective_fn<F>(name: impl Into<String>, func: F) -> FnObjective<F>
where
    F: Fn(&CodonSequence) -> Result<f64, EvaluationError> + Send + Sync,
{
    FnObjective {
        name: name.into(),
        func,
    }
}

/// Ordered list of registered scoring collaborators.
#[derive(Default)]
pub struct ObjectiveSet {
    objectives: Vec<Box<dyn Objective>>,
}

impl ObjectiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an objective; its position is its index in every vector.
    pub fn with<O: Objective + 'static>(mut self, objective: O) -> Self {
        self.push(objective);
        self
    }

    pub fn push<O: Objective + 'static>(&mut self, objective: O) {
        self.objectives.push(Box::new(objective));
    }

    /// Registered names in order.
    pub fn names(&self) -> Vec<String> {
        self.objectives.iter().map(|o| o.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    /// Score a sequence with every objective, stopping at the first failure.
    pub fn score(&self, sequence: &CodonSequence) -> Result<Vec<f64>, EvaluationError> {
        self.objectives
            .iter()
            .map(|objective| {
                let value = objective.score(sequence)?;
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(EvaluationError::NonFinite {
                        objective: objective.name().to_string(),
                        value,
                    })
                }
            })
            .collect()
    }
}

/// A candidate excluded from the pool because scoring failed.
#[derive(Debug, Clone)]
pub struct EvaluationFailure {
    pub candidate_id: u64,
    pub error: EvaluationError,
}

/// Outcome of evaluating one pool.
#[derive(Debug, Default)]
pub struct EvaluationReport {
    /// Candidates with objectives, in input order.
    pub scored: Vec<Candidate>,
    /// Candidates dropped this generation.
    pub failures: Vec<EvaluationFailure>,
    /// Distinct sequences sent to the collaborators.
    pub evaluated: usize,
    /// Distinct sequences that every collaborator scored.
    pub succeeded: usize,
    /// Candidates served from the score cache.
    pub cache_hits: usize,
    /// Whether cancellation was observed; results are then incomplete and
    /// must be discarded.
    pub cancelled: bool,
}

/// Evaluates candidates in parallel against an [`ObjectiveSet`].
pub struct FitnessEvaluator {
    objectives: ObjectiveSet,
    cache: ScoreCache,
    pool: rayon::ThreadPool,
}

impl FitnessEvaluator {
    /// Create a new fitness evaluator with its own worker pool.
    pub fn new(
        objectives: ObjectiveSet,
        config: &EvaluationConfig,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("codon-evo-eval-{i}"))
            .build()?;
        Ok(Self {
            objectives,
            cache: ScoreCache::new(config.cache_capacity),
            pool,
        })
    }

    pub fn objectives(&self) -> &ObjectiveSet {
        &self.objectives
    }

    pub fn cache(&self) -> &ScoreCache {
        &self.cache
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Populate objectives for every unscored candidate.
    ///
    /// Candidates that already carry objectives pass through untouched.
    /// Identical sequences are evaluated once. Blocks until every dispatched
    /// task has finished.
    pub fn evaluate(
        &self,
        mut candidates: Vec<Candidate>,
        cancelled: &AtomicBool,
    ) -> EvaluationReport {
        let mut report = EvaluationReport::default();

        // Resolve cache hits and collect one job per distinct sequence.
        let mut job_index: HashMap<String, usize> = HashMap::new();
        let mut jobs: Vec<(String, CodonSequence)> = Vec::new();
        let mut assignment: Vec<Option<usize>> = Vec::with_capacity(candidates.len());

        for candidate in &mut candidates {
            if candidate.is_scored() {
                assignment.push(None);
                continue;
            }
            let key = candidate.sequence.key();
            if let Some(objectives) = self.cache.get(&key) {
                candidate.set_objectives(objectives);
                report.cache_hits += 1;
                assignment.push(None);
                continue;
            }
            let next = jobs.len();
            let job = *job_index.entry(key.clone()).or_insert_with(|| {
                jobs.push((key, candidate.sequence.clone()));
                next
            });
            assignment.push(Some(job));
        }

        if report.cache_hits > 0 {
            log::debug!("{} candidates served from score cache", report.cache_hits);
        }

        let objectives = &self.objectives;
        let results: Vec<Option<Result<Vec<f64>, EvaluationError>>> = self.pool.install(|| {
            jobs.par_iter()
                .map(|(_, sequence)| {
                    if cancelled.load(Ordering::Relaxed) {
                        None
                    } else {
                        Some(objectives.score(sequence))
                    }
                })
                .collect()
        });

        report.evaluated = results.iter().filter(|r| r.is_some()).count();
        report.succeeded = results.iter().filter(|r| matches!(r, Some(Ok(_)))).count();
        if cancelled.load(Ordering::Relaxed) || results.iter().any(Option::is_none) {
            report.cancelled = true;
            return report;
        }

        for ((key, _), result) in jobs.iter().zip(&results) {
            if let Some(Ok(values)) = result {
                self.cache.insert(key.clone(), values.clone());
            }
        }

        for (mut candidate, job) in candidates.into_iter().zip(assignment) {
            let Some(job) = job else {
                report.scored.push(candidate);
                continue;
            };
            match &results[job] {
                Some(Ok(values)) => {
                    candidate.set_objectives(values.clone());
                    report.scored.push(candidate);
                }
                Some(Err(error)) => {
                    log::warn!("Candidate {} excluded: {}", candidate.id, error);
                    report.failures.push(EvaluationFailure {
                        candidate_id: candidate.id,
                        error: error.clone(),
                    });
                }
                None => {}
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn gc_count(seq: &CodonSequence) -> Result<f64, EvaluationError> {
        Ok(seq.key().chars().filter(|c| matches!(c, 'G' | 'C')).count() as f64)
    }

    fn length(seq: &CodonSequence) -> Result<f64, EvaluationError> {
        Ok(seq.len() as f64)
    }

    fn candidate(id: u64, nts: &str) -> Candidate {
        Candidate::new(id, CodonSequence::from_nucleotides(nts), 0, None)
    }

    fn config(workers: usize, cache_capacity: usize) -> EvaluationConfig {
        EvaluationConfig {
            workers,
            cache_capacity,
        }
    }

    #[test]
    fn test_objective_order() {
        let set = ObjectiveSet::new()
            .with(objective_fn("gc", gc_count))
            .with(objective_fn("length", length));
        assert_eq!(set.names(), vec!["gc", "length"]);
        let scores = set.score(&CodonSequence::from_nucleotides("GCCAUG")).unwrap();
        assert_eq!(scores, vec![4.0, 2.0]);
    }

    #[test]
    fn test_non_finite_is_error() {
        let set = ObjectiveSet::new().with(objective_fn("nan", |_| Ok(f64::NAN)));
        assert!(matches!(
            set.score(&CodonSequence::from_nucleotides("AUG")),
            Err(EvaluationError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_evaluate_populates_objectives() {
        let set = ObjectiveSet::new()
            .with(objective_fn("gc", gc_count))
            .with(objective_fn("length", length));
        let evaluator = FitnessEvaluator::new(set, &config(2, 16)).unwrap();
        let cancelled = AtomicBool::new(false);

        let report = evaluator.evaluate(
            vec![candidate(0, "GCCGCC"), candidate(1, "AUGAAAUUU")],
            &cancelled,
        );
        assert!(!report.cancelled);
        assert!(report.failures.is_empty());
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.scored[0].objectives(), &[6.0, 2.0]);
        assert_eq!(report.scored[1].objectives(), &[1.0, 3.0]);
        assert_eq!(report.succeeded, 2);
    }

    #[test]
    fn test_failures_are_reported_and_excluded() {
        // Three of ten candidates fail.
        let set = ObjectiveSet::new().with(objective_fn("picky", |seq: &CodonSequence| {
            if seq.codons[0] == "UAA" {
                Err(EvaluationError::failed("picky", "stop codon at start"))
            } else {
                Ok(1.0)
            }
        }));
        let evaluator = FitnessEvaluator::new(set, &config(4, 0)).unwrap();
        let cancelled = AtomicBool::new(false);

        let pool: Vec<Candidate> = (0..10)
            .map(|i| {
                let head = if i % 3 == 0 && i > 0 { "UAA" } else { "AUG" };
                candidate(i, &format!("{head}{}", "GCU".repeat(i as usize)))
            })
            .collect();
        let report = evaluator.evaluate(pool, &cancelled);

        assert_eq!(report.scored.len(), 7);
        assert_eq!(report.failures.len(), 3);
        let failed: Vec<u64> = report.failures.iter().map(|f| f.candidate_id).collect();
        assert_eq!(failed, vec![3, 6, 9]);
        let kept: Vec<u64> = report.scored.iter().map(|c| c.id).collect();
        assert_eq!(kept, vec![0, 1, 2, 4, 5, 7, 8]);
    }

    #[test]
    fn test_duplicates_and_cache_avoid_repeat_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let set = ObjectiveSet::new().with(objective_fn("count", move |seq: &CodonSequence| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(seq.len() as f64)
        }));
        let evaluator = FitnessEvaluator::new(set, &config(2, 64)).unwrap();
        let cancelled = AtomicBool::new(false);

        let report = evaluator.evaluate(
            vec![candidate(0, "AUGGCU"), candidate(1, "AUGGCU"), candidate(2, "AUG")],
            &cancelled,
        );
        assert_eq!(report.scored.len(), 3);
        assert_eq!(report.evaluated, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let report = evaluator.evaluate(vec![candidate(3, "AUGGCU")], &cancelled);
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.evaluated, 0);
        assert_eq!(report.scored[0].objectives(), &[2.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scored_candidates_pass_through() {
        let set = ObjectiveSet::new().with(objective_fn("never", |_| {
            Err(EvaluationError::failed("never", "should not be called"))
        }));
        let evaluator = FitnessEvaluator::new(set, &config(1, 0)).unwrap();
        let cancelled = AtomicBool::new(false);
        let scored = Candidate::scored(5, CodonSequence::from_nucleotides("AUG"), vec![3.0]);
        let report = evaluator.evaluate(vec![scored], &cancelled);
        assert_eq!(report.evaluated, 0);
        assert_eq!(report.scored[0].objectives(), &[3.0]);
    }

    #[test]
    fn test_cancelled_evaluation_is_discarded() {
        let set = ObjectiveSet::new().with(objective_fn("length", length));
        let evaluator = FitnessEvaluator::new(set, &config(1, 16)).unwrap();
        let cancelled = AtomicBool::new(true);
        let report = evaluator.evaluate(vec![candidate(0, "AUG")], &cancelled);
        assert!(report.cancelled);
        assert!(report.scored.is_empty());
        assert!(evaluator.cache().is_empty());
    }

    #[test]
    fn test_worker_pool_bounds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let set = ObjectiveSet::new().with(objective_fn("slow", move |seq: &CodonSequence| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(seq.len() as f64)
        }));
        let evaluator = FitnessEvaluator::new(set, &config(2, 0)).unwrap();
        assert_eq!(evaluator.workers(), 2);

        let pool: Vec<Candidate> = (0..16)
            .map(|i| candidate(i, &"GCU".repeat(i as usize + 1)))
            .collect();
        let report = evaluator.evaluate(pool, &AtomicBool::new(false));

        assert_eq!(report.evaluated, 16);
        assert_eq!(report.scored.len(), 16);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_during_dispatch_discards_generation() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let set = ObjectiveSet::new().with(objective_fn("cancels", move |seq: &CodonSequence| {
            flag.store(true, Ordering::SeqCst);
            Ok(seq.len() as f64)
        }));
        let evaluator = FitnessEvaluator::new(set, &config(1, 16)).unwrap();

        let pool: Vec<Candidate> = (0..8)
            .map(|i| candidate(i, &"GCC".repeat(i as usize + 1)))
            .collect();
        let report = evaluator.evaluate(pool, &cancelled);

        assert!(report.cancelled);
        assert!(report.evaluated >= 1);
        assert!(report.scored.is_empty());
        assert!(report.failures.is_empty());
        assert!(evaluator.cache().is_empty());
    }
}
