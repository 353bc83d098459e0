//! NSGA-II survivor selection.
//!
//! Reduces an oversized pool of scored candidates to a fixed-size population
//! using fast non-dominated sorting and crowding distance, following
//! Deb et al. (2002), "A Fast and Elitist Multiobjective Genetic Algorithm:
//! NSGA-II".
//!
//! All objectives are maximized. Ties between candidates that neither rank
//! nor crowding distance can separate are broken by input order: every sort
//! here is stable, so the same pool always yields the same selection.

use std::cmp::Ordering;

use super::search::Candidate;

/// Selection precondition failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Pool of {pool} candidates cannot fill a population of {target}")]
    PoolTooSmall { pool: usize, target: usize },
    #[error("Candidate {index} has {found} objectives, expected {expected}")]
    ArityMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("Candidate {index} has not been evaluated")]
    Unscored { index: usize },
}

/// Returns true if `a` Pareto-dominates `b`: no worse on every objective and
/// strictly better on at least one.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut better_in_any = false;
    for (oa, ob) in a.iter().zip(b) {
        if oa < ob {
            return false;
        }
        if oa > ob {
            better_in_any = true;
        }
    }
    better_in_any
}

/// Partition `pool` into non-dominated fronts, best first, and record each
/// candidate's front index in `rank`.
///
/// Every pool index appears in exactly one front. Within a front, indices
/// are in discovery order, which for front 0 is input order. An empty pool
/// yields no fronts.
pub fn non_dominated_sort(pool: &mut [Candidate]) -> Vec<Vec<usize>> {
    let n = pool.len();
    let mut fronts: Vec<Vec<usize>> = Vec::new();
    if n == 0 {
        return fronts;
    }

    let mut domination_count = vec![0usize; n];
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(pool[i].objectives(), pool[j].objectives()) {
                dominated[i].push(j);
            } else if dominates(pool[j].objectives(), pool[i].objectives()) {
                domination_count[i] += 1;
            }
        }
    }

    let first: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    for &i in &first {
        pool[i].rank = 0;
    }
    fronts.push(first);

    let mut current = 0;
    loop {
        let mut next_front = Vec::new();
        for &p in &fronts[current] {
            for &q in &dominated[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    pool[q].rank = current + 1;
                    next_front.push(q);
                }
            }
        }
        if next_front.is_empty() {
            break;
        }
        fronts.push(next_front);
        current += 1;
    }

    fronts
}

/// Assign crowding distance to the members of `front`, resetting any
/// previous value first.
///
/// For each objective the front is sorted ascending; the two extremes get
/// `f64::INFINITY` and interior members accumulate the normalized gap
/// between their neighbours. An objective on which the whole front is equal
/// contributes nothing to interior members.
///
/// # Panics
///
/// Panics if members of `front` differ in objective arity. [`select`]
/// rejects such pools before calling this.
pub fn assign_crowding_distance(pool: &mut [Candidate], front: &[usize]) {
    for &i in front {
        pool[i].crowding_distance = 0.0;
    }

    let n = front.len();
    if n == 0 {
        return;
    }
    let arity = pool[front[0]].objectives().len();
    assert!(
        front.iter().all(|&i| pool[i].objectives().len() == arity),
        "crowding distance needs a front of uniform arity {arity}"
    );

    let mut order = front.to_vec();
    for m in 0..arity {
        order.copy_from_slice(front);
        order.sort_by(|&a, &b| pool[a].objectives()[m].total_cmp(&pool[b].objectives()[m]));

        let first = order[0];
        let last = order[n - 1];
        pool[first].crowding_distance = f64::INFINITY;
        pool[last].crowding_distance = f64::INFINITY;

        let range = pool[last].objectives()[m] - pool[first].objectives()[m];
        if !(range.is_finite() && range > 0.0) {
            continue;
        }

        for k in 1..n.saturating_sub(1) {
            let gap =
                pool[order[k + 1]].objectives()[m] - pool[order[k - 1]].objectives()[m];
            pool[order[k]].crowding_distance += gap / range;
        }
    }
}

/// Crowded-comparison operator. `Ordering::Less` means `a` is preferred:
/// lower rank first, then larger crowding distance.
pub fn crowd_compare(a: &Candidate, b: &Candidate) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| b.crowding_distance.total_cmp(&a.crowding_distance))
}

/// Outcome of a selection call.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Survivors in front-major order, crowding-major within the boundary
    /// front.
    pub survivors: Vec<Candidate>,
    /// Number of non-dominated fronts found in the pool.
    pub front_count: usize,
}

impl Selection {
    /// Survivors belonging to front 0.
    pub fn front(&self) -> impl Iterator<Item = &Candidate> {
        self.survivors.iter().filter(|c| c.rank == 0)
    }
}

/// Reduce `pool` to exactly `target_size` survivors.
///
/// Whole fronts are taken in rank order while they fit; the first front
/// that would overflow is ordered by [`crowd_compare`] and truncated.
pub fn select(pool: Vec<Candidate>, target_size: usize) -> Result<Vec<Candidate>, SelectionError> {
    select_fronts(pool, target_size).map(|s| s.survivors)
}

/// Same as [`select`], also reporting the front count.
pub fn select_fronts(
    mut pool: Vec<Candidate>,
    target_size: usize,
) -> Result<Selection, SelectionError> {
    if pool.len() < target_size {
        return Err(SelectionError::PoolTooSmall {
            pool: pool.len(),
            target: target_size,
        });
    }
    validate_pool(&pool)?;

    for candidate in &mut pool {
        candidate.rank = 0;
        candidate.crowding_distance = 0.0;
    }

    let fronts = non_dominated_sort(&mut pool);
    let front_count = fronts.len();

    let mut chosen: Vec<usize> = Vec::with_capacity(target_size);
    for front in &fronts {
        if chosen.len() == target_size {
            break;
        }
        assign_crowding_distance(&mut pool, front);

        if chosen.len() + front.len() <= target_size {
            chosen.extend_from_slice(front);
        } else {
            let mut boundary = front.clone();
            boundary.sort_by(|&a, &b| crowd_compare(&pool[a], &pool[b]));
            let remaining = target_size - chosen.len();
            log::debug!(
                "Boundary front {} truncated: {} of {} kept",
                pool[boundary[0]].rank,
                remaining,
                boundary.len()
            );
            chosen.extend_from_slice(&boundary[..remaining]);
            break;
        }
    }

    let mut slots: Vec<Option<Candidate>> = pool.into_iter().map(Some).collect();
    let survivors = chosen
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect();

    Ok(Selection {
        survivors,
        front_count,
    })
}

fn validate_pool(pool: &[Candidate]) -> Result<(), SelectionError> {
    let Some(first) = pool.first() else {
        return Ok(());
    };
    let expected = first.objectives().len();
    for (index, candidate) in pool.iter().enumerate() {
        if !candidate.is_scored() {
            return Err(SelectionError::Unscored { index });
        }
        let found = candidate.objectives().len();
        if found != expected {
            return Err(SelectionError::ArityMismatch {
                index,
                expected,
                found,
            });
        }
    }
    Ok(())
}
