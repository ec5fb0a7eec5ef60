use std::collections::HashMap;

use ndarray::{Array2, Axis};
use num_traits::{Float, ToPrimitive};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::EnsembleConfig;
use crate::consensus::{consensus_classes, consensus_matrix};
use crate::distance::{Distance, Euclidean};
use crate::error::{ConsensusError, Result};
use crate::evaluate::{
    calinski_harabasz, pac, replicated_slices, trim_and_reweigh, Direction, IndexRow, IndexScore,
    TrimmedEnsemble, ValidationIndexTable,
};
use crate::impute::{impute_slice, ImputedSlice};
use crate::resample::subsample_masks;
use crate::store::{EnsembleStore, LabelCell};

/// A pluggable clustering algorithm: given a data subset and a target cluster
/// count, produce one label per subset row. Labels are arbitrary symbols
/// local to the call; failures are caught per job and never abort a run.
pub trait ClusterAlgorithm<F>: Send + Sync
where
    F: Float + Send + Sync,
{
    fn name(&self) -> &str;

    fn cluster(
        &self,
        x: &Array2<F>,
        k: usize,
    ) -> std::result::Result<Vec<u32>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Seeded Lloyd's-iteration k-means. Reference implementation of the plugin
/// interface for the binary and the integration tests; real ensembles wrap
/// external algorithms behind the same trait.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            seed: 0,
        }
    }
}

impl<F> ClusterAlgorithm<F> for KMeans
where
    F: Float + Send + Sync,
{
    fn name(&self) -> &str {
        "kmeans"
    }

    fn cluster(
        &self,
        x: &Array2<F>,
        k: usize,
    ) -> std::result::Result<Vec<u32>, Box<dyn std::error::Error + Send + Sync>> {
        let n = x.nrows();
        if k < 1 || k > n {
            return Err(format!("k={} out of range for {} samples", k, n).into());
        }
        let points: Vec<Vec<f64>> = x
            .axis_iter(Axis(0))
            .map(|row| row.iter().map(|v| v.to_f64().unwrap()).collect())
            .collect();
        let dim = points[0].len();
        // Maximin seeding: a random first centroid, then repeatedly the point
        // farthest from its nearest chosen centroid. Far better behaved than
        // uniform seeding on separated data, and deterministic per seed.
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(k as u64));
        let first = index::sample(&mut rng, n, 1).index(0);
        let mut chosen = vec![first];
        while chosen.len() < k {
            let next = (0..n)
                .filter(|idx| !chosen.contains(idx))
                .max_by(|&a, &b| {
                    let da = nearest_distance(&points, &chosen, a);
                    let db = nearest_distance(&points, &chosen, b);
                    da.total_cmp(&db).then(b.cmp(&a))
                })
                .unwrap();
            chosen.push(next);
        }
        let mut centroids: Vec<Vec<f64>> = chosen.iter().map(|&idx| points[idx].clone()).collect();
        let mut labels = vec![0u32; n];
        for _ in 0..self.max_iterations {
            let mut changed = false;
            for (sample, point) in points.iter().enumerate() {
                let mut best = 0usize;
                let mut best_d = f64::INFINITY;
                for (cluster, centroid) in centroids.iter().enumerate() {
                    let d: f64 = point
                        .iter()
                        .zip(centroid.iter())
                        .map(|(p, c)| (p - c).powi(2))
                        .sum();
                    if d < best_d {
                        best_d = d;
                        best = cluster;
                    }
                }
                if labels[sample] != best as u32 {
                    labels[sample] = best as u32;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            let mut sums = vec![vec![0f64; dim]; k];
            let mut counts = vec![0usize; k];
            for (sample, point) in points.iter().enumerate() {
                let cluster = labels[sample] as usize;
                counts[cluster] += 1;
                for (accum, value) in sums[cluster].iter_mut().zip(point.iter()) {
                    *accum += value;
                }
            }
            for cluster in 0..k {
                // Empty clusters keep their previous centroid
                if counts[cluster] > 0 {
                    for (slot, accum) in centroids[cluster].iter_mut().zip(sums[cluster].iter()) {
                        *slot = accum / counts[cluster] as f64;
                    }
                }
            }
        }
        Ok(labels)
    }
}

fn nearest_distance(points: &[Vec<f64>], chosen: &[usize], candidate: usize) -> f64 {
    chosen
        .iter()
        .map(|&c| {
            points[candidate]
                .iter()
                .zip(points[c].iter())
                .map(|(p, q)| (p - q).powi(2))
                .sum::<f64>()
        })
        .fold(f64::INFINITY, f64::min)
}

enum JobOutcome {
    Labels(HashMap<usize, Option<u32>>),
    Failed(String),
}

/// Generation-stage driver: draws inclusion masks, fans one clustering job
/// per (replicate, algorithm, k) out over a worker pool, and gathers the
/// results into an [`EnsembleStore`].
pub struct ConsensusClustering {
    config: EnsembleConfig,
}

impl ConsensusClustering {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self {
            config: EnsembleConfig::default(),
        }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Run the full generation stage. Per-job failures are logged and
    /// recorded as missing; only configuration problems abort.
    pub fn run<F>(
        &self,
        x: &Array2<F>,
        algorithms: &[Box<dyn ClusterAlgorithm<F>>],
    ) -> Result<EnsembleRun<F>>
    where
        F: Float + Send + Sync,
    {
        let n = x.nrows();
        self.config.validate(n)?;
        if algorithms.is_empty() {
            return Err(ConsensusError::InvalidConfig(
                "at least one clustering algorithm is required".to_string(),
            ));
        }
        let masks = subsample_masks(n, &self.config)?;
        let names: Vec<String> = algorithms.iter().map(|a| a.name().to_string()).collect();
        let mut store = EnsembleStore::new(masks, names, self.config.ks.clone());

        let mut jobs = Vec::new();
        for replicate in 0..self.config.replicates {
            for algorithm in 0..algorithms.len() {
                for &k in &self.config.ks {
                    jobs.push((replicate, algorithm, k));
                }
            }
        }
        debug!(jobs = jobs.len(), "starting ensemble generation");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| ConsensusError::InvalidConfig(e.to_string()))?;
        let masks = store.masks().to_vec();
        let outcomes: Vec<((usize, usize, usize), JobOutcome)> = pool.install(|| {
            jobs.par_iter()
                .map(|&(replicate, algorithm, k)| {
                    let included: Vec<usize> = masks[replicate].samples().collect();
                    let subset = x.select(Axis(0), &included);
                    let outcome = match algorithms[algorithm].cluster(&subset, k) {
                        Ok(labels) if labels.len() == included.len() => JobOutcome::Labels(
                            included
                                .iter()
                                .zip(labels)
                                .map(|(&sample, label)| (sample, Some(label)))
                                .collect(),
                        ),
                        Ok(labels) => JobOutcome::Failed(format!(
                            "returned {} labels for {} samples",
                            labels.len(),
                            included.len()
                        )),
                        Err(e) => JobOutcome::Failed(e.to_string()),
                    };
                    ((replicate, algorithm, k), outcome)
                })
                .collect()
        });

        for ((replicate, algorithm, k), outcome) in outcomes {
            match outcome {
                JobOutcome::Labels(labels) => {
                    if let Err(e) = store.record(replicate, algorithm, k, &labels) {
                        warn!(error = %e, "dropping job result");
                        let _ = store.record_failure(replicate, algorithm, k, &e.to_string());
                    }
                }
                JobOutcome::Failed(reason) => {
                    store.record_failure(replicate, algorithm, k, &reason)?;
                }
            }
        }

        let distances = Euclidean::default().distances(x);
        let mut imputed = HashMap::new();
        for algorithm in 0..store.algorithms().len() {
            for &k in &self.config.ks {
                let slice = store.slice(algorithm, k).unwrap();
                let filled = impute_slice(
                    slice,
                    &distances,
                    self.config.impute_neighbors,
                    self.config.min_known_neighbors,
                );
                if !filled.is_dense() {
                    warn!(
                        algorithm = %store.algorithms()[algorithm],
                        k,
                        unresolved = filled.unresolved.len(),
                        "slice retains missing cells after imputation"
                    );
                }
                imputed.insert((algorithm, k), filled);
            }
        }

        Ok(EnsembleRun {
            x: x.clone(),
            config: self.config.clone(),
            store,
            imputed,
        })
    }
}

/// All in-memory products of one ensemble run: the 4-D label store, the
/// per-slice imputation results, and derived consensus/validation views.
pub struct EnsembleRun<F>
where
    F: Float + Send + Sync,
{
    x: Array2<F>,
    config: EnsembleConfig,
    store: EnsembleStore,
    imputed: HashMap<(usize, usize), ImputedSlice>,
}

impl<F> EnsembleRun<F>
where
    F: Float + Send + Sync,
{
    pub fn store(&self) -> &EnsembleStore {
        &self.store
    }

    pub fn imputed_slice(&self, algorithm: usize, k: usize) -> Option<&ImputedSlice> {
        self.imputed.get(&(algorithm, k))
    }

    /// Consensus matrix for one algorithm's (post-imputation) slice.
    pub fn consensus_matrix_for(&self, algorithm: usize, k: usize) -> Option<Array2<f64>> {
        self.imputed
            .get(&(algorithm, k))
            .map(|slice| consensus_matrix(&[&slice.cells], self.store.n_samples()))
    }

    /// Consensus matrix pooled over every algorithm's slice at `k`.
    pub fn combined_consensus(&self, k: usize) -> Array2<f64> {
        let slices: Vec<&Array2<LabelCell>> = (0..self.store.algorithms().len())
            .filter_map(|algorithm| self.imputed.get(&(algorithm, k)))
            .map(|slice| &slice.cells)
            .collect();
        consensus_matrix(&slices, self.store.n_samples())
    }

    /// Consensus classes from the pooled matrix at `k`.
    pub fn consensus_classes(&self, k: usize) -> Result<Vec<u32>> {
        consensus_classes(&self.combined_consensus(k), k, self.config.linkage)
    }

    /// PAC and CHI per (algorithm, k). Slices whose consensus classes cannot
    /// be extracted (unresolved missing data) are skipped with a warning so
    /// the remaining combinations still get evaluated.
    pub fn validation_table(&self) -> ValidationIndexTable {
        let mut table = ValidationIndexTable::default();
        for algorithm in 0..self.store.algorithms().len() {
            for &k in self.store.ks() {
                let matrix = match self.consensus_matrix_for(algorithm, k) {
                    Some(matrix) => matrix,
                    None => continue,
                };
                let pac_value = pac(&matrix, self.config.pac_lower, self.config.pac_upper);
                let chi_value = match consensus_classes(&matrix, k, self.config.linkage) {
                    Ok(labels) => calinski_harabasz(&self.x, &labels),
                    Err(e) => {
                        warn!(
                            algorithm = %self.store.algorithms()[algorithm],
                            k,
                            error = %e,
                            "skipping separation index"
                        );
                        f64::NAN
                    }
                };
                table.rows.push(IndexRow {
                    algorithm,
                    k,
                    scores: vec![
                        IndexScore {
                            name: "pac".to_string(),
                            direction: Direction::LowerBetter,
                            value: pac_value,
                        },
                        IndexScore {
                            name: "chi".to_string(),
                            direction: Direction::HigherBetter,
                            value: chi_value,
                        },
                    ],
                });
            }
        }
        table
    }

    /// Rank, trim, and reweigh the algorithms at `k`.
    pub fn trim_and_reweigh(&self, table: &ValidationIndexTable, k: usize) -> TrimmedEnsemble {
        trim_and_reweigh(
            table,
            k,
            self.config.trim_quantile,
            self.config.reweigh,
            self.config.total_copies,
        )
    }

    /// Consensus classes at `k` from the trimmed, copy-replicated ensemble.
    pub fn trimmed_consensus_classes(&self, trimmed: &TrimmedEnsemble, k: usize) -> Result<Vec<u32>> {
        let slices = replicated_slices(trimmed, |algorithm| {
            self.imputed.get(&(algorithm, k)).map(|slice| &slice.cells)
        });
        let matrix = consensus_matrix(&slices, self.store.n_samples());
        consensus_classes(&matrix, k, self.config.linkage)
    }
}
