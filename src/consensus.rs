use ndarray::Array2;
use rayon::prelude::*;

use crate::config::Linkage;
use crate::error::{ConsensusError, Result};
use crate::store::LabelCell;

/// Pairwise co-occurrence consensus matrix over one or more label slices.
///
/// For a sample pair (i, j) the denominator counts replicates (across all
/// supplied slices) where both carry a known label, the numerator those where
/// the labels agree. Pairs never jointly included stay `NaN` rather than
/// being silently zeroed. Diagonal is forced to 1; the result is symmetric.
pub fn consensus_matrix(slices: &[&Array2<LabelCell>], n_samples: usize) -> Array2<f64> {
    let rows: Vec<Vec<f64>> = (0..n_samples)
        .into_par_iter()
        .map(|i| {
            let mut row = vec![0.; n_samples - i - 1];
            for (offset, j) in (i + 1..n_samples).enumerate() {
                let mut joint = 0usize;
                let mut agree = 0usize;
                for slice in slices {
                    for replicate in 0..slice.nrows() {
                        if let (Some(a), Some(b)) = (
                            slice[[replicate, i]].known(),
                            slice[[replicate, j]].known(),
                        ) {
                            joint += 1;
                            if a == b {
                                agree += 1;
                            }
                        }
                    }
                }
                row[offset] = if joint > 0 {
                    agree as f64 / joint as f64
                } else {
                    f64::NAN
                };
            }
            row
        })
        .collect();
    let mut out = Array2::<f64>::zeros((n_samples, n_samples));
    for i in 0..n_samples {
        out[[i, i]] = 1.;
        for (offset, j) in (i + 1..n_samples).enumerate() {
            out[[i, j]] = rows[i][offset];
            out[[j, i]] = rows[i][offset];
        }
    }
    out
}

/// Extract consensus classes by cutting an agglomerative dendrogram built on
/// `1 - matrix` at exactly `k` groups. Output labels are a fresh canonical
/// numbering 1..=k ordered by each group's smallest member index.
///
/// Every off-diagonal entry must be defined: unresolved missing data has to
/// be imputed or excluded before this stage.
pub fn consensus_classes(matrix: &Array2<f64>, k: usize, linkage: Linkage) -> Result<Vec<u32>> {
    let n = matrix.nrows();
    if k < 2 || k >= n {
        return Err(ConsensusError::InvalidK { k, n });
    }
    let undefined = matrix.indexed_iter().filter(|((i, j), v)| i != j && v.is_nan()).count();
    if undefined > 0 {
        return Err(ConsensusError::UnresolvedMissingData {
            context: "consensus matrix".to_string(),
            count: undefined,
        });
    }

    // Active cluster list plus a mutable inter-cluster dissimilarity table
    let mut members: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();
    let mut dissim = vec![vec![0.; n]; n];
    for i in 0..n {
        for j in 0..n {
            dissim[i][j] = 1. - matrix[[i, j]];
        }
    }
    let mut active = n;
    while active > k {
        // Closest active pair; ties resolve to the smallest index pair
        let mut best = (0usize, 0usize);
        let mut best_d = f64::INFINITY;
        for a in 0..n {
            if members[a].is_none() {
                continue;
            }
            for b in a + 1..n {
                if members[b].is_none() {
                    continue;
                }
                if dissim[a][b] < best_d {
                    best_d = dissim[a][b];
                    best = (a, b);
                }
            }
        }
        let (a, b) = best;
        let size_a = members[a].as_ref().unwrap().len() as f64;
        let size_b = members[b].as_ref().unwrap().len() as f64;
        for other in 0..n {
            if other == a || other == b || members[other].is_none() {
                continue;
            }
            let d = match linkage {
                Linkage::Single => dissim[a][other].min(dissim[b][other]),
                Linkage::Complete => dissim[a][other].max(dissim[b][other]),
                Linkage::Average => {
                    (size_a * dissim[a][other] + size_b * dissim[b][other]) / (size_a + size_b)
                }
            };
            dissim[a][other] = d;
            dissim[other][a] = d;
        }
        let absorbed = members[b].take().unwrap();
        members[a].as_mut().unwrap().extend(absorbed);
        active -= 1;
    }

    // Canonical numbering by smallest member index
    let mut groups: Vec<Vec<usize>> = members.into_iter().flatten().collect();
    groups.sort_by_key(|g| g.iter().copied().min().unwrap());
    let mut labels = vec![0u32; n];
    for (idx, group) in groups.iter().enumerate() {
        for &sample in group {
            labels[sample] = idx as u32 + 1;
        }
    }
    Ok(labels)
}
