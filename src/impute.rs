use std::collections::HashMap;

use ndarray::Array2;
use num_traits::Float;
use tracing::debug;

use crate::store::LabelCell;

/// Dense (or residually missing) copy of one (algorithm, k) slice.
#[derive(Debug, Clone)]
pub struct ImputedSlice {
    /// Replicate x sample cells after both fill stages
    pub cells: Array2<LabelCell>,
    /// (replicate, sample) entries that could not be filled
    pub unresolved: Vec<(usize, usize)>,
}

impl ImputedSlice {
    pub fn is_dense(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Majority label among `votes`, ties broken by smallest cluster id.
fn majority(votes: &HashMap<u32, usize>) -> Option<u32> {
    votes
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(&label, _)| label)
}

/// Two-stage fill of missing cells in a single (algorithm, k) slice.
///
/// Stage 1 votes over the `neighbors` nearest feature-space neighbors that
/// carry a known label in the same replicate, reading only pre-imputation
/// state; a cell stays missing when fewer than `min_known` such neighbors
/// exist. Stage 2 falls back to the sample's most frequent known label across
/// replicates. Cells missing after both stages are reported, never guessed.
///
/// The slice is treated in isolation: nothing from other algorithms or other
/// k values can leak in. Running the fill on an already-dense slice returns
/// it unchanged.
pub fn impute_slice<F>(
    cells: &Array2<LabelCell>,
    distances: &Array2<F>,
    neighbors: usize,
    min_known: usize,
) -> ImputedSlice
where
    F: Float + Send + Sync,
{
    let (n_replicates, n_samples) = cells.dim();
    let mut out = cells.clone();

    // Stage 1: nearest-neighbor vote within each replicate
    for replicate in 0..n_replicates {
        for sample in 0..n_samples {
            if !cells[[replicate, sample]].is_missing() {
                continue;
            }
            let mut candidates: Vec<(usize, u32)> = (0..n_samples)
                .filter(|&other| other != sample)
                .filter_map(|other| {
                    cells[[replicate, other]]
                        .known()
                        .map(|label| (other, label))
                })
                .collect();
            if candidates.len() < min_known {
                continue;
            }
            candidates.sort_by(|a, b| {
                distances[[sample, a.0]]
                    .partial_cmp(&distances[[sample, b.0]])
                    .unwrap()
                    .then(a.0.cmp(&b.0))
            });
            let mut votes: HashMap<u32, usize> = HashMap::new();
            for &(_, label) in candidates.iter().take(neighbors) {
                *votes.entry(label).or_insert(0) += 1;
            }
            if let Some(label) = majority(&votes) {
                out[[replicate, sample]] = LabelCell::Known(label);
            }
        }
    }

    // Stage 2: per-sample majority across replicates
    let mut unresolved = Vec::new();
    for sample in 0..n_samples {
        let mut votes: HashMap<u32, usize> = HashMap::new();
        for replicate in 0..n_replicates {
            if let Some(label) = out[[replicate, sample]].known() {
                *votes.entry(label).or_insert(0) += 1;
            }
        }
        let fallback = majority(&votes);
        for replicate in 0..n_replicates {
            if !out[[replicate, sample]].is_missing() {
                continue;
            }
            match fallback {
                Some(label) => out[[replicate, sample]] = LabelCell::Known(label),
                None => unresolved.push((replicate, sample)),
            }
        }
    }

    if !unresolved.is_empty() {
        debug!(
            count = unresolved.len(),
            "cells remain missing after imputation"
        );
    }
    ImputedSlice {
        cells: out,
        unresolved,
    }
}

#[cfg(test)]
mod test {
    use ndarray::{arr2, Array2};

    use crate::distance::{Distance, Euclidean};
    use crate::store::LabelCell;

    use super::impute_slice;

    const K: fn(u32) -> LabelCell = LabelCell::Known;
    const E: LabelCell = LabelCell::Excluded;
    const F: LabelCell = LabelCell::Failed;

    fn distances() -> Array2<f64> {
        // 4 samples on a line: 0 and 1 close, 2 and 3 close
        let x = arr2(&[[0.], [1.], [10.], [11.]]);
        Euclidean::default().distances(&x)
    }

    #[test]
    fn neighbor_vote_uses_nearest_known() {
        let cells = arr2(&[[K(1), E, K(2), K(2)]]);
        let filled = impute_slice(&cells, &distances(), 2, 1);
        // Sample 1's nearest known neighbor is sample 0 (label 1), then 2
        // (label 2): tie of one vote each resolves to the smaller id
        assert_eq!(filled.cells[[0, 1]], K(1));
        assert!(filled.is_dense());
    }

    #[test]
    fn threshold_defers_to_fallback() {
        let cells = arr2(&[[K(1), E, E, E], [K(2), K(2), K(2), K(2)]]);
        // Replicate 0 has a single known label; min_known=2 blocks the vote,
        // so samples 1..3 fall back to their across-replicate majority
        let filled = impute_slice(&cells, &distances(), 3, 2);
        assert_eq!(filled.cells[[0, 1]], K(2));
        assert_eq!(filled.cells[[0, 2]], K(2));
        assert!(filled.is_dense());
    }

    #[test]
    fn unlabeled_everywhere_is_reported() {
        let cells = arr2(&[[K(1), K(1), K(2), F], [K(1), K(1), K(2), E]]);
        // Sample 3 has no known label in any replicate and no neighbors are
        // consulted with min_known above the replicate's known count
        let filled = impute_slice(&cells, &distances(), 3, 4);
        assert_eq!(filled.unresolved, vec![(0, 3), (1, 3)]);
        assert_eq!(filled.cells[[0, 3]], F);
    }

    #[test]
    fn dense_slice_is_untouched() {
        let cells = arr2(&[[K(1), K(1), K(2), K(2)], [K(2), K(2), K(1), K(1)]]);
        let filled = impute_slice(&cells, &distances(), 5, 1);
        assert_eq!(filled.cells, cells);
        assert!(filled.is_dense());
        // Idempotence: a second pass changes nothing either
        let again = impute_slice(&filled.cells, &distances(), 5, 1);
        assert_eq!(again.cells, cells);
    }

    #[test]
    fn vote_reads_pre_imputation_state() {
        // Samples 1 and 2 both missing; neither may see the other's fill
        let cells = arr2(&[[K(1), F, F, K(2)]]);
        let filled = impute_slice(&cells, &distances(), 1, 1);
        assert_eq!(filled.cells[[0, 1]], K(1));
        assert_eq!(filled.cells[[0, 2]], K(2));
    }
}
