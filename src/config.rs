use crate::error::{ConsensusError, Result};

/// Merge rule for agglomerative consensus-class extraction.
///
/// - Single: distance between closest members of two groups
/// - Complete: distance between farthest members
/// - Average: size-weighted mean inter-group distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Single,
    Complete,
    Average,
}

/// Every tunable knob of the ensemble pipeline, with documented defaults.
/// Passed explicitly to each stage; there is no ambient global state.
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    /// Candidate cluster counts, each in [2, n_samples)
    pub ks: Vec<usize>,
    /// Fraction of samples drawn (without replacement) per replicate, in (0, 1]
    pub subsample_fraction: f64,
    /// Number of bootstrap replicates
    pub replicates: usize,
    /// Seed for mask generation; identical seeds reproduce identical masks
    pub seed: u64,
    /// Worker threads for the generation stage
    pub threads: usize,
    /// PAC lower bound (entries strictly above count as ambiguous)
    pub pac_lower: f64,
    /// PAC upper bound (entries strictly below count as ambiguous)
    pub pac_upper: f64,
    /// Quantile of summed ranks above which algorithms are trimmed
    pub trim_quantile: f64,
    /// Total replicated label columns allocated across kept algorithms, at most 100
    pub total_copies: usize,
    /// Weigh kept algorithms by score instead of uniformly
    pub reweigh: bool,
    /// Neighbors consulted per missing entry during imputation
    pub impute_neighbors: usize,
    /// Minimum known-label neighbors required for a stage-1 vote
    pub min_known_neighbors: usize,
    /// Linkage for consensus-class extraction
    pub linkage: Linkage,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            ks: vec![2, 3, 4],
            subsample_fraction: 0.8,
            replicates: 10,
            seed: 0,
            threads: 4,
            pac_lower: 0.0,
            pac_upper: 1.0,
            trim_quantile: 0.75,
            total_copies: 100,
            reweigh: false,
            impute_neighbors: 5,
            min_known_neighbors: 1,
            linkage: Linkage::Average,
        }
    }
}

impl EnsembleConfig {
    /// Reject malformed parameters before any work begins.
    pub fn validate(&self, n_samples: usize) -> Result<()> {
        if n_samples < 2 {
            return Err(ConsensusError::InvalidConfig(format!(
                "need at least 2 samples, got {}",
                n_samples
            )));
        }
        if self.subsample_fraction <= 0. || self.subsample_fraction > 1. {
            return Err(ConsensusError::InvalidConfig(format!(
                "subsample fraction must lie in (0, 1], got {}",
                self.subsample_fraction
            )));
        }
        if self.replicates < 1 {
            return Err(ConsensusError::InvalidConfig(
                "replicate count must be at least 1".to_string(),
            ));
        }
        if self.ks.is_empty() {
            return Err(ConsensusError::InvalidConfig(
                "at least one candidate k is required".to_string(),
            ));
        }
        for &k in &self.ks {
            if k < 2 || k >= n_samples {
                return Err(ConsensusError::InvalidK { k, n: n_samples });
            }
        }
        if self.trim_quantile <= 0. || self.trim_quantile >= 1. {
            return Err(ConsensusError::InvalidConfig(format!(
                "trim quantile must lie in (0, 1), got {}",
                self.trim_quantile
            )));
        }
        if !(0. ..=1.).contains(&self.pac_lower)
            || !(0. ..=1.).contains(&self.pac_upper)
            || self.pac_lower >= self.pac_upper
        {
            return Err(ConsensusError::InvalidConfig(format!(
                "PAC bounds must satisfy 0 <= lower < upper <= 1, got ({}, {})",
                self.pac_lower, self.pac_upper
            )));
        }
        if self.total_copies < 1 || self.total_copies > 100 {
            return Err(ConsensusError::InvalidConfig(format!(
                "total copies must lie in [1, 100], got {}",
                self.total_copies
            )));
        }
        if self.impute_neighbors < 1 {
            return Err(ConsensusError::InvalidConfig(
                "imputation neighbor count must be at least 1".to_string(),
            ));
        }
        if self.threads < 1 {
            return Err(ConsensusError::InvalidConfig(
                "thread count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EnsembleConfig::default().validate(100).is_ok());
    }

    #[test]
    fn rejects_bad_fraction() {
        let mut config = EnsembleConfig::default();
        config.subsample_fraction = 0.;
        assert!(config.validate(100).is_err());
        config.subsample_fraction = 1.5;
        assert!(config.validate(100).is_err());
    }

    #[test]
    fn rejects_k_out_of_range() {
        let mut config = EnsembleConfig::default();
        config.ks = vec![1];
        assert!(matches!(
            config.validate(100),
            Err(ConsensusError::InvalidK { k: 1, .. })
        ));
        config.ks = vec![100];
        assert!(config.validate(100).is_err());
    }

    #[test]
    fn rejects_tiny_sample_set() {
        assert!(EnsembleConfig::default().validate(1).is_err());
    }

    #[test]
    fn rejects_bad_pac_bounds() {
        let mut config = EnsembleConfig::default();
        config.pac_lower = 0.9;
        config.pac_upper = 0.1;
        assert!(config.validate(100).is_err());
        config.pac_lower = -0.1;
        config.pac_upper = 1.0;
        assert!(config.validate(100).is_err());
    }

    #[test]
    fn rejects_excessive_copies() {
        let mut config = EnsembleConfig::default();
        config.total_copies = 101;
        assert!(config.validate(100).is_err());
    }
}
