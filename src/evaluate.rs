use std::collections::HashMap;

use ndarray::{Array1, Array2, Axis};
use num_traits::{Float, ToPrimitive};
use tracing::warn;

use crate::store::LabelCell;

/// Whether larger or smaller index values indicate a better clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherBetter,
    LowerBetter,
}

/// One internal validation index value, tagged with its direction so ranking
/// and reweighing never need to know which index they are looking at.
#[derive(Debug, Clone)]
pub struct IndexScore {
    pub name: String,
    pub direction: Direction,
    pub value: f64,
}

/// Scores for one (algorithm, k) combination.
#[derive(Debug, Clone)]
pub struct IndexRow {
    pub algorithm: usize,
    pub k: usize,
    pub scores: Vec<IndexScore>,
}

/// One row per evaluated (algorithm, k) combination.
#[derive(Debug, Clone, Default)]
pub struct ValidationIndexTable {
    pub rows: Vec<IndexRow>,
}

impl ValidationIndexTable {
    pub fn rows_for_k(&self, k: usize) -> Vec<&IndexRow> {
        self.rows.iter().filter(|row| row.k == k).collect()
    }
}

/// Trim/reweigh outcome for one k. When the table has rows for the k,
/// `copies` sums to the configured total and every kept algorithm holds a
/// strictly positive weight; `degenerate` flags a skipped trim that would
/// have removed too much. A k with no table rows yields an all-empty result.
#[derive(Debug, Clone)]
pub struct TrimmedEnsemble {
    pub kept: Vec<usize>,
    pub removed: Vec<usize>,
    pub weights: Vec<(usize, f64)>,
    pub copies: Vec<(usize, usize)>,
    pub degenerate: bool,
}

/// Proportion of ambiguous clustering: the fraction of defined off-diagonal
/// consensus entries lying strictly between the bounds. Lower is better.
pub fn pac(matrix: &Array2<f64>, lower: f64, upper: f64) -> f64 {
    let mut defined = 0usize;
    let mut ambiguous = 0usize;
    for ((i, j), value) in matrix.indexed_iter() {
        if i == j || value.is_nan() {
            continue;
        }
        defined += 1;
        if *value > lower && *value < upper {
            ambiguous += 1;
        }
    }
    if defined == 0 {
        return f64::NAN;
    }
    ambiguous as f64 / defined as f64
}

/// Calinski-Harabasz pseudo-F: between-cluster dispersion (weighted by
/// cluster size) over within-cluster dispersion, scaled by the degrees of
/// freedom (n - k)/(k - 1). Higher is better. Returns NaN for degenerate
/// label sets and infinity when every cluster is a single point.
pub fn calinski_harabasz<F>(x: &Array2<F>, labels: &[u32]) -> f64
where
    F: Float + Send + Sync,
{
    let n = x.nrows();
    assert_eq!(n, labels.len(), "one label per sample required");
    let mut groups: HashMap<u32, Vec<usize>> = HashMap::new();
    for (sample, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(sample);
    }
    let k = groups.len();
    if k < 2 || k >= n {
        return f64::NAN;
    }

    let mut overall = Array1::<f64>::zeros(x.ncols());
    for row in x.axis_iter(Axis(0)) {
        overall += &row.map(|v| v.to_f64().unwrap());
    }
    overall /= n as f64;
    let mut between = 0f64;
    let mut within = 0f64;
    for members in groups.values() {
        let size = members.len() as f64;
        let mut centroid = Array1::<f64>::zeros(x.ncols());
        for &sample in members {
            centroid += &x.row(sample).map(|v| v.to_f64().unwrap());
        }
        centroid /= size;
        between += size
            * centroid
                .iter()
                .zip(overall.iter())
                .map(|(c, o)| (c - o).powi(2))
                .sum::<f64>();
        for &sample in members {
            within += x
                .row(sample)
                .iter()
                .zip(centroid.iter())
                .map(|(v, c)| (v.to_f64().unwrap() - c).powi(2))
                .sum::<f64>();
        }
    }
    if within == 0. {
        return f64::INFINITY;
    }
    (between / (k - 1) as f64) / (within / (n - k) as f64)
}

/// Type-7 (linear interpolation) quantile of `values`.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Direction-aware per-index ranks (1 = best) summed per algorithm. NaN
/// scores rank worst; ties resolve by algorithm id.
fn rank_sums(rows: &[&IndexRow]) -> Vec<(usize, f64)> {
    let n_indices = rows.first().map(|r| r.scores.len()).unwrap_or(0);
    let mut sums: Vec<(usize, f64)> = rows.iter().map(|row| (row.algorithm, 0.)).collect();
    for index in 0..n_indices {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        // Flip sign so ascending sort always puts the best first; NaN is
        // pinned to the worst rank regardless of direction
        let key = |score: &IndexScore| {
            if score.value.is_nan() {
                return f64::INFINITY;
            }
            match score.direction {
                Direction::HigherBetter => -score.value,
                Direction::LowerBetter => score.value,
            }
        };
        order.sort_by(|&a, &b| {
            key(&rows[a].scores[index])
                .total_cmp(&key(&rows[b].scores[index]))
                .then(rows[a].algorithm.cmp(&rows[b].algorithm))
        });
        for (rank, &row_idx) in order.iter().enumerate() {
            sums[row_idx].1 += (rank + 1) as f64;
        }
    }
    sums
}

/// Rank algorithms for one k, trim those whose summed rank exceeds the q-th
/// quantile, and derive copy weights for the survivors.
///
/// Trimming never removes every algorithm: when fewer than 2 would remain the
/// trim is skipped, everyone is kept, and the result is flagged degenerate.
/// Weights are uniform unless `reweigh` is set, in which case each index is
/// min-max normalized (direction-adjusted) and the per-algorithm sums are
/// scaled to 1. Reweighed weights stay strictly positive even for a fully
/// dominated member; only the quantile rule removes algorithms. Copy counts
/// use largest-remainder allocation so they total exactly `total_copies`
/// (remainder ties go to the smallest algorithm id), and whenever
/// `total_copies` covers the kept set, every kept algorithm receives at
/// least one copy.
pub fn trim_and_reweigh(
    table: &ValidationIndexTable,
    k: usize,
    trim_quantile: f64,
    reweigh: bool,
    total_copies: usize,
) -> TrimmedEnsemble {
    let rows = table.rows_for_k(k);
    let sums = rank_sums(&rows);
    let values: Vec<f64> = sums.iter().map(|(_, sum)| *sum).collect();
    let cutoff = if values.is_empty() {
        f64::INFINITY
    } else {
        quantile(&values, trim_quantile)
    };

    let mut kept: Vec<usize> = Vec::new();
    let mut removed: Vec<usize> = Vec::new();
    for &(algorithm, sum) in &sums {
        if sum > cutoff {
            removed.push(algorithm);
        } else {
            kept.push(algorithm);
        }
    }
    let mut degenerate = false;
    if kept.len() < 2 {
        warn!(k, "trimming would leave fewer than 2 algorithms; keeping all");
        kept = sums.iter().map(|(algorithm, _)| *algorithm).collect();
        removed.clear();
        degenerate = true;
    }

    let weights = if reweigh {
        reweighed_weights(&rows, &kept)
    } else {
        let uniform = 1. / kept.len() as f64;
        kept.iter().map(|&algorithm| (algorithm, uniform)).collect()
    };
    let mut copies = largest_remainder(&weights, total_copies);
    if total_copies >= copies.len() {
        // Kept means kept: move copies from the largest holder until no
        // kept algorithm sits at zero
        while let Some(starved) = copies.iter().position(|&(_, count)| count == 0) {
            let donor = copies
                .iter()
                .enumerate()
                .max_by_key(|&(_, &(_, count))| count)
                .map(|(position, _)| position)
                .unwrap_or(starved);
            if copies[donor].1 <= 1 {
                break;
            }
            copies[donor].1 -= 1;
            copies[starved].1 += 1;
        }
    }
    TrimmedEnsemble {
        kept,
        removed,
        weights,
        copies,
        degenerate,
    }
}

/// Min-max normalize each index across the kept algorithms (flipping
/// lower-is-better indices), sum per algorithm, add a small positive floor,
/// scale to 1. The floor keeps a fully dominated member's weight above zero;
/// with no usable index values the weights degrade to uniform.
fn reweighed_weights(rows: &[&IndexRow], kept: &[usize]) -> Vec<(usize, f64)> {
    let kept_rows: Vec<&&IndexRow> = rows.iter().filter(|r| kept.contains(&r.algorithm)).collect();
    let n_indices = kept_rows.first().map(|r| r.scores.len()).unwrap_or(0);
    let mut scores: HashMap<usize, f64> = kept.iter().map(|&a| (a, 0.)).collect();
    for index in 0..n_indices {
        let finite: Vec<f64> = kept_rows
            .iter()
            .map(|r| r.scores[index].value)
            .filter(|v| v.is_finite())
            .collect();
        if finite.is_empty() {
            continue;
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = max - min;
        for row in &kept_rows {
            let score = &row.scores[index];
            let value = if score.value.is_finite() {
                score.value.clamp(min, max)
            } else if score.value == f64::INFINITY {
                max
            } else {
                min
            };
            let normalized = if span > 0. { (value - min) / span } else { 0.5 };
            let adjusted = match score.direction {
                Direction::HigherBetter => normalized,
                Direction::LowerBetter => 1. - normalized,
            };
            *scores.get_mut(&row.algorithm).unwrap() += adjusted;
        }
    }
    let floor = 0.01 * n_indices.max(1) as f64;
    let total: f64 = scores.values().map(|score| score + floor).sum();
    kept.iter()
        .map(|&a| (a, (scores[&a] + floor) / total))
        .collect()
}

/// Hamilton apportionment of `total` copies across the weighted algorithms:
/// floors first, then leftover copies by descending fractional remainder with
/// ties to the smallest algorithm id. The result sums to `total` exactly.
fn largest_remainder(weights: &[(usize, f64)], total: usize) -> Vec<(usize, usize)> {
    let mut copies: Vec<(usize, usize)> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(weights.len());
    let mut allocated = 0usize;
    for (position, &(algorithm, weight)) in weights.iter().enumerate() {
        let ideal = weight * total as f64;
        let floor = ideal.floor() as usize;
        allocated += floor;
        copies.push((algorithm, floor));
        remainders.push((position, ideal - ideal.floor()));
    }
    remainders.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then(copies[a.0].0.cmp(&copies[b.0].0))
    });
    let mut leftover = total.saturating_sub(allocated);
    for (position, _) in remainders {
        if leftover == 0 {
            break;
        }
        copies[position].1 += 1;
        leftover -= 1;
    }
    copies
}

/// Expand a trim result into the replicated multiset of label slices used
/// for the final consensus pass.
pub fn replicated_slices<'a>(
    trimmed: &TrimmedEnsemble,
    slice_for: impl Fn(usize) -> Option<&'a Array2<LabelCell>>,
) -> Vec<&'a Array2<LabelCell>> {
    let mut out = Vec::new();
    for &(algorithm, count) in &trimmed.copies {
        if let Some(slice) = slice_for(algorithm) {
            for _ in 0..count {
                out.push(slice);
            }
        }
    }
    out
}
