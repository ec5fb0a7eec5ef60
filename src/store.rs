use std::collections::{HashMap, HashSet};

use ndarray::Array2;
use tracing::warn;

use crate::error::{ConsensusError, Result};
use crate::resample::InclusionMask;

/// One cell of the 4-D label structure. The two missing reasons stay
/// distinguishable: `Excluded` means the sample was outside the replicate's
/// inclusion mask, `Failed` means a clustering job should have labeled the
/// sample but did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelCell {
    Known(u32),
    Excluded,
    Failed,
}

impl LabelCell {
    pub fn known(&self) -> Option<u32> {
        match self {
            LabelCell::Known(label) => Some(*label),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        !matches!(self, LabelCell::Known(_))
    }
}

/// Per-slice missingness summary reported alongside quantitative results.
#[derive(Debug, Clone)]
pub struct MissingReport {
    pub algorithm: String,
    pub k: usize,
    pub known: usize,
    pub excluded: usize,
    pub failed: usize,
}

/// Owner of the (sample, replicate, algorithm, k) label structure.
///
/// Cluster ids are arbitrary per-slice symbols: a label recorded under one
/// (replicate, algorithm) has no relation to the same integer under another,
/// and nothing here ever compares them across slices.
///
/// Cells for a (replicate, algorithm, k) start as `Failed` inside the
/// replicate's mask and `Excluded` outside it, so an abandoned run leaves a
/// store that is still valid for evaluation. Each (replicate, algorithm, k)
/// may be recorded exactly once.
#[derive(Debug)]
pub struct EnsembleStore {
    n_samples: usize,
    masks: Vec<InclusionMask>,
    algorithms: Vec<String>,
    ks: Vec<usize>,
    slices: HashMap<(usize, usize), Array2<LabelCell>>,
    recorded: HashSet<(usize, usize, usize)>,
}

impl EnsembleStore {
    pub fn new(masks: Vec<InclusionMask>, algorithms: Vec<String>, ks: Vec<usize>) -> Self {
        let n_samples = masks.first().map(|m| m.n_samples()).unwrap_or(0);
        let n_replicates = masks.len();
        let mut slices = HashMap::new();
        for algorithm in 0..algorithms.len() {
            for &k in &ks {
                let mut slice = Array2::from_elem((n_replicates, n_samples), LabelCell::Excluded);
                for (replicate, mask) in masks.iter().enumerate() {
                    for sample in mask.samples() {
                        slice[[replicate, sample]] = LabelCell::Failed;
                    }
                }
                slices.insert((algorithm, k), slice);
            }
        }
        Self {
            n_samples,
            masks,
            algorithms,
            ks,
            slices,
            recorded: HashSet::new(),
        }
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_replicates(&self) -> usize {
        self.masks.len()
    }

    pub fn masks(&self) -> &[InclusionMask] {
        &self.masks
    }

    pub fn algorithms(&self) -> &[String] {
        &self.algorithms
    }

    pub fn ks(&self) -> &[usize] {
        &self.ks
    }

    fn algorithm_name(&self, algorithm: usize) -> String {
        self.algorithms
            .get(algorithm)
            .cloned()
            .unwrap_or_else(|| format!("#{}", algorithm))
    }

    fn check_key(&self, replicate: usize, algorithm: usize, k: usize) -> Result<()> {
        let mismatch = |reason: String| ConsensusError::ShapeMismatch {
            replicate,
            algorithm: self.algorithm_name(algorithm),
            k,
            reason,
        };
        if replicate >= self.masks.len() {
            return Err(mismatch(format!(
                "replicate out of range (have {})",
                self.masks.len()
            )));
        }
        if algorithm >= self.algorithms.len() {
            return Err(mismatch("unknown algorithm".to_string()));
        }
        if !self.ks.contains(&k) {
            return Err(mismatch("k is not a configured candidate".to_string()));
        }
        if self.recorded.contains(&(replicate, algorithm, k)) {
            return Err(mismatch("slice row already recorded".to_string()));
        }
        Ok(())
    }

    /// Record one clustering job's labels. `labels` must map exactly the
    /// samples in the replicate's inclusion mask; a `None` value marks a
    /// sample the algorithm failed to label (distinct from mask exclusion).
    pub fn record(
        &mut self,
        replicate: usize,
        algorithm: usize,
        k: usize,
        labels: &HashMap<usize, Option<u32>>,
    ) -> Result<()> {
        self.check_key(replicate, algorithm, k)?;
        let mask = &self.masks[replicate];
        for &sample in labels.keys() {
            if !mask.contains(sample) {
                return Err(ConsensusError::ShapeMismatch {
                    replicate,
                    algorithm: self.algorithm_name(algorithm),
                    k,
                    reason: format!("sample {} lies outside the inclusion mask", sample),
                });
            }
        }
        for sample in mask.samples() {
            if !labels.contains_key(&sample) {
                return Err(ConsensusError::ShapeMismatch {
                    replicate,
                    algorithm: self.algorithm_name(algorithm),
                    k,
                    reason: format!("sample {} inside the mask has no entry", sample),
                });
            }
        }
        let mut unlabeled = 0usize;
        let slice = self.slices.get_mut(&(algorithm, k)).unwrap();
        for (&sample, &label) in labels {
            slice[[replicate, sample]] = match label {
                Some(label) => LabelCell::Known(label),
                None => {
                    unlabeled += 1;
                    LabelCell::Failed
                }
            };
        }
        if unlabeled > 0 {
            warn!(
                replicate,
                algorithm = %self.algorithm_name(algorithm),
                k,
                unlabeled,
                "job left samples unlabeled; recorded as missing"
            );
        }
        self.recorded.insert((replicate, algorithm, k));
        Ok(())
    }

    /// Record a whole-job failure: every in-mask cell stays `Failed`.
    pub fn record_failure(
        &mut self,
        replicate: usize,
        algorithm: usize,
        k: usize,
        reason: &str,
    ) -> Result<()> {
        self.check_key(replicate, algorithm, k)?;
        warn!(
            replicate,
            algorithm = %self.algorithm_name(algorithm),
            k,
            reason,
            "clustering job failed; slice row recorded as missing"
        );
        self.recorded.insert((replicate, algorithm, k));
        Ok(())
    }

    /// Replicate x sample cell matrix for one (algorithm, k) slice.
    pub fn slice(&self, algorithm: usize, k: usize) -> Option<&Array2<LabelCell>> {
        self.slices.get(&(algorithm, k))
    }

    /// All algorithm slices for one k, ordered by algorithm id.
    pub fn slices_for_k(&self, k: usize) -> Vec<(usize, &Array2<LabelCell>)> {
        let mut out: Vec<(usize, &Array2<LabelCell>)> = Vec::new();
        for algorithm in 0..self.algorithms.len() {
            if let Some(slice) = self.slices.get(&(algorithm, k)) {
                out.push((algorithm, slice));
            }
        }
        out
    }

    /// Missingness summary per slice, ordered by (algorithm, k).
    pub fn missing_report(&self) -> Vec<MissingReport> {
        let mut out = Vec::new();
        for algorithm in 0..self.algorithms.len() {
            for &k in &self.ks {
                let slice = &self.slices[&(algorithm, k)];
                let mut report = MissingReport {
                    algorithm: self.algorithms[algorithm].clone(),
                    k,
                    known: 0,
                    excluded: 0,
                    failed: 0,
                };
                for cell in slice.iter() {
                    match cell {
                        LabelCell::Known(_) => report.known += 1,
                        LabelCell::Excluded => report.excluded += 1,
                        LabelCell::Failed => report.failed += 1,
                    }
                }
                out.push(report);
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use crate::error::ConsensusError;
    use crate::resample::InclusionMask;

    use super::{EnsembleStore, LabelCell};

    fn store() -> EnsembleStore {
        // 4 samples, 2 replicates: replicate 0 holds {0,1,2}, replicate 1 holds {1,2,3}
        let masks = vec![
            InclusionMask::from_indices(4, &[0, 1, 2]),
            InclusionMask::from_indices(4, &[1, 2, 3]),
        ];
        EnsembleStore::new(masks, vec!["km".to_string()], vec![2])
    }

    fn labels(entries: &[(usize, Option<u32>)]) -> HashMap<usize, Option<u32>> {
        entries.iter().copied().collect()
    }

    #[test]
    fn excluded_samples_stay_missing() {
        let mut s = store();
        s.record(0, 0, 2, &labels(&[(0, Some(1)), (1, Some(1)), (2, Some(2))]))
            .unwrap();
        let slice = s.slice(0, 2).unwrap();
        assert_eq!(slice[[0, 0]], LabelCell::Known(1));
        assert_eq!(slice[[0, 3]], LabelCell::Excluded);
        // Replicate 1 never recorded: in-mask cells are failures, not defaults
        assert_eq!(slice[[1, 3]], LabelCell::Failed);
        assert_eq!(slice[[1, 0]], LabelCell::Excluded);
    }

    #[test]
    fn explicit_none_marks_failure() {
        let mut s = store();
        s.record(0, 0, 2, &labels(&[(0, Some(1)), (1, None), (2, Some(2))]))
            .unwrap();
        let slice = s.slice(0, 2).unwrap();
        assert_eq!(slice[[0, 1]], LabelCell::Failed);
    }

    #[test]
    fn out_of_mask_sample_rejected() {
        let mut s = store();
        let result = s.record(
            0,
            0,
            2,
            &labels(&[(0, Some(1)), (1, Some(1)), (2, Some(2)), (3, Some(2))]),
        );
        assert!(matches!(result, Err(ConsensusError::ShapeMismatch { .. })));
    }

    #[test]
    fn missing_in_mask_sample_rejected() {
        let mut s = store();
        let result = s.record(0, 0, 2, &labels(&[(0, Some(1)), (1, Some(1))]));
        assert!(matches!(result, Err(ConsensusError::ShapeMismatch { .. })));
    }

    #[test]
    fn double_record_rejected() {
        let mut s = store();
        let l = labels(&[(0, Some(1)), (1, Some(1)), (2, Some(2))]);
        s.record(0, 0, 2, &l).unwrap();
        assert!(s.record(0, 0, 2, &l).is_err());
    }

    #[test]
    fn job_failure_keeps_row_missing() {
        let mut s = store();
        s.record_failure(1, 0, 2, "solver crashed").unwrap();
        let slice = s.slice(0, 2).unwrap();
        assert_eq!(slice[[1, 1]], LabelCell::Failed);
        assert_eq!(slice[[1, 0]], LabelCell::Excluded);
        // Row is consumed; a late result cannot overwrite it
        let l = labels(&[(1, Some(1)), (2, Some(1)), (3, Some(2))]);
        assert!(s.record(1, 0, 2, &l).is_err());
    }

    #[test]
    fn missing_report_counts_cells() {
        let mut s = store();
        s.record(0, 0, 2, &labels(&[(0, Some(1)), (1, None), (2, Some(2))]))
            .unwrap();
        let report = s.missing_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].known, 2);
        // 1 explicit failure + 3 unrecorded in-mask cells of replicate 1
        assert_eq!(report[0].failed, 4);
        assert_eq!(report[0].excluded, 2);
    }
}
