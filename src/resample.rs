use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::EnsembleConfig;
use crate::error::{ConsensusError, Result};

/// Set of samples drawn into one bootstrap replicate. Samples outside the
/// mask are missing by construction for every job run on that replicate.
#[derive(Debug, Clone)]
pub struct InclusionMask {
    included: Vec<bool>,
    count: usize,
}

impl InclusionMask {
    pub(crate) fn from_indices(n_samples: usize, indices: &[usize]) -> Self {
        let mut included = vec![false; n_samples];
        for &idx in indices {
            included[idx] = true;
        }
        let count = included.iter().filter(|v| **v).count();
        Self { included, count }
    }

    pub fn contains(&self, sample: usize) -> bool {
        self.included.get(sample).copied().unwrap_or(false)
    }

    /// Included sample ids in ascending order.
    pub fn samples(&self) -> impl Iterator<Item = usize> + '_ {
        self.included
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .map(|(idx, _)| idx)
    }

    /// Number of included samples.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total sample count the mask was drawn from.
    pub fn n_samples(&self) -> usize {
        self.included.len()
    }
}

/// Draw one inclusion mask per replicate, each a without-replacement subsample
/// of size `round(fraction * n_samples)` (never below 1). A fixed seed yields
/// an identical mask sequence on every call.
pub fn subsample_masks(n_samples: usize, config: &EnsembleConfig) -> Result<Vec<InclusionMask>> {
    if n_samples < 2 {
        return Err(ConsensusError::InvalidConfig(format!(
            "need at least 2 samples, got {}",
            n_samples
        )));
    }
    if config.subsample_fraction <= 0. || config.subsample_fraction > 1. {
        return Err(ConsensusError::InvalidConfig(format!(
            "subsample fraction must lie in (0, 1], got {}",
            config.subsample_fraction
        )));
    }
    if config.replicates < 1 {
        return Err(ConsensusError::InvalidConfig(
            "replicate count must be at least 1".to_string(),
        ));
    }
    let size = (config.subsample_fraction * n_samples as f64).round() as usize;
    let size = size.clamp(1, n_samples);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    Ok((0..config.replicates)
        .map(|_| {
            let drawn = index::sample(&mut rng, n_samples, size).into_vec();
            InclusionMask::from_indices(n_samples, &drawn)
        })
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::EnsembleConfig;

    fn config(fraction: f64, replicates: usize, seed: u64) -> EnsembleConfig {
        EnsembleConfig {
            subsample_fraction: fraction,
            replicates,
            seed,
            ..EnsembleConfig::default()
        }
    }

    #[test]
    fn masks_have_requested_size() {
        let masks = subsample_masks(10, &config(0.8, 5, 42)).unwrap();
        assert_eq!(masks.len(), 5);
        for mask in &masks {
            assert_eq!(mask.len(), 8);
            assert_eq!(mask.n_samples(), 10);
            assert!(mask.samples().all(|s| s < 10));
        }
    }

    #[test]
    fn same_seed_reproduces_masks() {
        let a = subsample_masks(50, &config(0.5, 10, 7)).unwrap();
        let b = subsample_masks(50, &config(0.5, 10, 7)).unwrap();
        for (ma, mb) in a.iter().zip(b.iter()) {
            assert_eq!(
                ma.samples().collect::<Vec<_>>(),
                mb.samples().collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = subsample_masks(50, &config(0.5, 10, 7)).unwrap();
        let b = subsample_masks(50, &config(0.5, 10, 8)).unwrap();
        let identical = a.iter().zip(b.iter()).all(|(ma, mb)| {
            ma.samples().collect::<Vec<_>>() == mb.samples().collect::<Vec<_>>()
        });
        assert!(!identical);
    }

    #[test]
    fn full_fraction_includes_everything() {
        let masks = subsample_masks(10, &config(1., 2, 0)).unwrap();
        for mask in &masks {
            assert_eq!(mask.len(), 10);
        }
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(subsample_masks(10, &config(0., 5, 0)).is_err());
        assert!(subsample_masks(10, &config(1.1, 5, 0)).is_err());
        assert!(subsample_masks(10, &config(0.8, 0, 0)).is_err());
        assert!(subsample_masks(1, &config(0.8, 5, 0)).is_err());
    }
}
