//! Variation operators for evolutionary codon search.
//!
//! Provides the [`VariationOperator`] seam used by the generation loop and a
//! seeded default, [`CodonMutator`], that mutates and recombines codon
//! choices within a caller-supplied [`SynonymTable`].

use rand::prelude::*;
use rand::seq::index;
use rand_distr::{Binomial, Distribution};

use crate::schema::{CodonSequence, CrossoverMethod, EvolutionConfig, VariationConfig};

use super::search::Candidate;

/// Per-generation inputs to a variation operator.
#[derive(Debug, Clone, Copy)]
pub struct VariationContext {
    /// Generation the offspring will belong to.
    pub generation: usize,
    /// Current per-position mutation probability.
    pub mutation_rate: f64,
    /// Number of offspring requested.
    pub offspring: usize,
}

/// A new sequence and the candidate it was derived from.
#[derive(Debug, Clone)]
pub struct Offspring {
    pub sequence: CodonSequence,
    pub parent: Option<u64>,
}

/// Produces offspring sequences from the current population.
///
/// Implementations may be randomized but must be reproducible under a fixed
/// seed.
pub trait VariationOperator {
    fn vary(&mut self, population: &[Candidate], ctx: &VariationContext) -> Vec<Offspring>;

    /// Exhaustive neighbourhood step, used periodically and once before the
    /// run stops on a collapsed mutation rate. Defaults to [`Self::vary`].
    fn full_scan(&mut self, population: &[Candidate], ctx: &VariationContext) -> Vec<Offspring> {
        self.vary(population, ctx)
    }

    /// Expected number of mutations per offspring at `mutation_rate`, if the
    /// operator can tell. `None` never triggers the mutation stop.
    fn expected_mutations(&self, _mutation_rate: f64) -> Option<f64> {
        None
    }
}

/// Allowed codons for every position of the design.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    choices: Vec<Vec<String>>,
}

impl SynonymTable {
    /// Create from per-position codon lists.
    pub fn new(choices: Vec<Vec<String>>) -> Self {
        Self { choices }
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// Allowed codons at `position`.
    pub fn choices(&self, position: usize) -> &[String] {
        self.choices.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Positions that have at least one alternative codon.
    pub fn mutable_positions(&self) -> Vec<usize> {
        (0..self.choices.len())
            .filter(|&i| self.choices[i].len() > 1)
            .collect()
    }

    /// Number of distinct single-codon substitutions.
    pub fn single_mutations(&self) -> usize {
        self.choices.iter().map(|c| c.len().saturating_sub(1)).sum()
    }

    /// Number of distinct designs the table encodes, saturating.
    pub fn design_space(&self) -> u128 {
        self.choices
            .iter()
            .fold(1u128, |acc, c| acc.saturating_mul(c.len().max(1) as u128))
    }
}

/// Seeded mutation and crossover over a [`SynonymTable`].
pub struct CodonMutator {
    table: SynonymTable,
    mutable: Vec<usize>,
    config: VariationConfig,
    rng: StdRng,
}

impl CodonMutator {
    /// Create from seed.
    pub fn new(table: SynonymTable, config: VariationConfig, seed: u64) -> Self {
        let mutable = table.mutable_positions();
        log::debug!(
            "Synonym table: {} positions, {} single mutations, {} designs",
            table.len(),
            table.single_mutations(),
            table.design_space()
        );
        Self {
            table,
            mutable,
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create from a run configuration, seeding from `random_seed` when set.
    pub fn from_config(table: SynonymTable, config: &EvolutionConfig) -> Self {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        Self::new(table, config.variation.clone(), seed)
    }

    /// Generate a uniformly random design from the table.
    pub fn random_sequence(&mut self) -> CodonSequence {
        let codons = (0..self.table.len())
            .map(|i| {
                self.table
                    .choices(i)
                    .choose(&mut self.rng)
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();
        CodonSequence::new(codons)
    }

    /// Draw a count from `Binomial(n, p)`, clamped to `[lo, hi]`.
    fn binomial_count(&mut self, n: usize, p: f64, lo: usize, hi: usize) -> usize {
        let drawn = Binomial::new(n as u64, p.clamp(0.0, 1.0))
            .map(|dist| dist.sample(&mut self.rng) as usize)
            .unwrap_or(lo);
        drawn.clamp(lo, hi.max(lo))
    }

    /// Replace a binomially distributed number of codons (at least one)
    /// with different allowed codons.
    pub fn mutate(&mut self, sequence: &mut CodonSequence, rate: f64) {
        let mutable: Vec<usize> = self
            .mutable
            .iter()
            .copied()
            .filter(|&i| i < sequence.len())
            .collect();
        if mutable.is_empty() {
            return;
        }

        let n = self.binomial_count(mutable.len(), rate, 1, mutable.len());
        for pick in index::sample(&mut self.rng, mutable.len(), n) {
            let position = mutable[pick];
            let current = &sequence.codons[position];
            let alternatives: Vec<&String> = self
                .table
                .choices(position)
                .iter()
                .filter(|c| *c != current)
                .collect();
            if let Some(codon) = alternatives.choose(&mut self.rng) {
                sequence.codons[position] = (*codon).clone();
            }
        }
    }

    /// Recombine two parents of equal length into one child. Returns a
    /// copy of `first` when crossover does not apply.
    pub fn crossover(&mut self, first: &CodonSequence, second: &CodonSequence) -> CodonSequence {
        let mut child = first.clone();
        let len = first.len();
        if len < 2 || second.len() != len {
            return child;
        }
        let span = self.config.crossover_span;

        match self.config.crossover {
            CrossoverMethod::None => {}
            CrossoverMethod::SinglePoint => {
                let point = self.binomial_count(len, span, 1, len - 1);
                child.codons[..point].clone_from_slice(&second.codons[..point]);
            }
            CrossoverMethod::TwoPoint => {
                let width = self.binomial_count(len, span, 1, len - 1);
                let start = self.rng.gen_range(0..len).min(len - width);
                let end = start + width;
                child.codons[start..end].clone_from_slice(&second.codons[start..end]);
            }
            CrossoverMethod::Binomial => {
                let n = self.binomial_count(len, span, 1, len - 1);
                for i in index::sample(&mut self.rng, len, n) {
                    child.codons[i] = second.codons[i].clone();
                }
            }
        }
        child
    }
}

impl VariationOperator for CodonMutator {
    /// Every single-codon mutant of the first `full_scan_parents` survivors.
    fn full_scan(&mut self, population: &[Candidate], _ctx: &VariationContext) -> Vec<Offspring> {
        let parents = &population[..population.len().min(self.config.full_scan_parents)];
        let mut offspring = Vec::new();
        for parent in parents {
            for &position in self.mutable.iter().filter(|&&p| p < parent.sequence.len()) {
                let current = &parent.sequence.codons[position];
                for codon in self.table.choices(position).iter().filter(|c| *c != current) {
                    let mut child = parent.sequence.clone();
                    child.codons[position] = codon.clone();
                    offspring.push(Offspring {
                        sequence: child,
                        parent: Some(parent.id),
                    });
                }
            }
        }
        offspring
    }

    fn expected_mutations(&self, mutation_rate: f64) -> Option<f64> {
        Some(self.table.single_mutations() as f64 * mutation_rate)
    }

    /// Parents are taken in population order, cycling, so every survivor
    /// contributes before any contributes twice.
    fn vary(&mut self, population: &[Candidate], ctx: &VariationContext) -> Vec<Offspring> {
        if population.is_empty() {
            return Vec::new();
        }

        let mut offspring = Vec::with_capacity(ctx.offspring);
        for k in 0..ctx.offspring {
            let parent = &population[k % population.len()];
            let mate = &population[(k + 1) % population.len()];

            let recombine = self.config.crossover != CrossoverMethod::None
                && population.len() > 1
                && self.rng.gen_bool(self.config.crossover_rate.clamp(0.0, 1.0));
            let mut child = if recombine {
                self.crossover(&parent.sequence, &mate.sequence)
            } else {
                parent.sequence.clone()
            };

            self.mutate(&mut child, ctx.mutation_rate);
            offspring.push(Offspring {
                sequence: child,
                parent: Some(parent.id),
            });
        }
        offspring
    }
}
