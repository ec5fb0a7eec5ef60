use ndarray::Array2;

use crate::error::{ConsensusError, Result};

/// Trace-maximized correspondence between two partitions of the same samples.
///
/// `matrix` is the padded square contingency matrix with its columns permuted
/// so that row i lines up with its assigned target cluster. `mapping` pairs
/// each source label with its matched target label; `None` marks a padded
/// dummy row or column when the two alphabets differ in size.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub matrix: Array2<f64>,
    pub permutation: Vec<usize>,
    pub trace: f64,
    pub mapping: Vec<(Option<u32>, Option<u32>)>,
}

fn alphabet(labels: &[u32]) -> Vec<u32> {
    let mut symbols: Vec<u32> = labels.to_vec();
    symbols.sort_unstable();
    symbols.dedup();
    symbols
}

/// Contingency matrix over the two partitions' sorted label alphabets,
/// zero-padded square so the assignment problem is well posed for k1 != k2.
fn padded_contingency(source: &[u32], target: &[u32]) -> (Array2<f64>, Vec<u32>, Vec<u32>) {
    let rows = alphabet(source);
    let cols = alphabet(target);
    let size = rows.len().max(cols.len());
    let mut matrix = Array2::<f64>::zeros((size, size));
    for (&a, &b) in source.iter().zip(target.iter()) {
        let i = rows.binary_search(&a).unwrap();
        let j = cols.binary_search(&b).unwrap();
        matrix[[i, j]] += 1.;
    }
    (matrix, rows, cols)
}

/// Kuhn-Munkres on a square cost matrix via row/column potentials and
/// augmenting paths, O(n^3). Returns the row-to-column assignment.
fn min_cost_assignment(cost: &Array2<f64>) -> Vec<usize> {
    let n = cost.nrows();
    let mut u = vec![0f64; n + 1];
    let mut v = vec![0f64; n + 1];
    let mut assigned_row = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];
    for row in 1..=n {
        assigned_row[0] = row;
        let mut col0 = 0usize;
        let mut min_seen = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[col0] = true;
            let row0 = assigned_row[col0];
            let mut delta = f64::INFINITY;
            let mut col1 = 0usize;
            for col in 1..=n {
                if used[col] {
                    continue;
                }
                let reduced = cost[[row0 - 1, col - 1]] - u[row0] - v[col];
                if reduced < min_seen[col] {
                    min_seen[col] = reduced;
                    way[col] = col0;
                }
                if min_seen[col] < delta {
                    delta = min_seen[col];
                    col1 = col;
                }
            }
            for col in 0..=n {
                if used[col] {
                    u[assigned_row[col]] += delta;
                    v[col] -= delta;
                } else {
                    min_seen[col] -= delta;
                }
            }
            col0 = col1;
            if assigned_row[col0] == 0 {
                break;
            }
        }
        loop {
            let col1 = way[col0];
            assigned_row[col0] = assigned_row[col1];
            col0 = col1;
            if col0 == 0 {
                break;
            }
        }
    }
    let mut assignment = vec![0usize; n];
    for col in 1..=n {
        if assigned_row[col] > 0 {
            assignment[assigned_row[col] - 1] = col - 1;
        }
    }
    assignment
}

fn trace_for(profit: &Array2<f64>, assignment: &[usize]) -> f64 {
    assignment
        .iter()
        .enumerate()
        .map(|(row, &col)| profit[[row, col]])
        .sum()
}

/// Maximize the assignment profit with a row-by-row fix: among all
/// trace-optimal permutations, return the lexicographically smallest
/// row-to-column mapping. Contingency entries are integers, so optimality
/// comparisons tolerate only rounding noise.
fn lexicographic_max_assignment(profit: &Array2<f64>) -> Vec<usize> {
    let n = profit.nrows();
    let max_entry = profit.iter().copied().fold(0f64, f64::max);
    let to_cost = |p: &Array2<f64>| p.map(|value| max_entry - value);
    let best = trace_for(profit, &min_cost_assignment(&to_cost(profit)));
    // Large enough to dominate any achievable trace
    let forbidden = (max_entry + 1.) * (n as f64 + 1.);

    let mut fixed: Vec<usize> = Vec::with_capacity(n);
    let mut constrained = profit.clone();
    for row in 0..n {
        for col in 0..n {
            if fixed.contains(&col) {
                continue;
            }
            // Pin this row to `col` and see whether the optimum survives
            let mut trial = constrained.clone();
            for other in 0..n {
                if other != col {
                    trial[[row, other]] = -forbidden;
                }
            }
            let assignment = min_cost_assignment(&to_cost(&trial));
            if assignment[row] == col && (trace_for(profit, &assignment) - best).abs() < 1e-6 {
                for other in 0..n {
                    if other != col {
                        constrained[[row, other]] = -forbidden;
                    }
                }
                fixed.push(col);
                break;
            }
        }
    }
    fixed
}

/// Align `source` against `target`: build the padded contingency matrix,
/// solve the trace-maximizing column assignment, and permute the columns
/// accordingly. Deterministic, and independent of the rest of the pipeline.
pub fn align_partitions(source: &[u32], target: &[u32]) -> Result<Alignment> {
    if source.len() != target.len() {
        return Err(ConsensusError::InvalidConfig(format!(
            "partitions cover {} and {} samples; counts must match",
            source.len(),
            target.len()
        )));
    }
    if source.is_empty() {
        return Err(ConsensusError::InvalidConfig(
            "cannot align empty partitions".to_string(),
        ));
    }
    let (contingency, row_labels, col_labels) = padded_contingency(source, target);
    let permutation = lexicographic_max_assignment(&contingency);
    let size = contingency.nrows();
    let mut permuted = Array2::<f64>::zeros((size, size));
    for row in 0..size {
        for col in 0..size {
            permuted[[row, col]] = contingency[[row, permutation[col]]];
        }
    }
    let trace = (0..size).map(|i| permuted[[i, i]]).sum();
    let mapping = (0..size)
        .map(|row| {
            (
                row_labels.get(row).copied(),
                col_labels.get(permutation[row]).copied(),
            )
        })
        .collect();
    Ok(Alignment {
        matrix: permuted,
        permutation,
        trace,
        mapping,
    })
}
