use ndarray::Array2;

use consensuscluster::{
    align_partitions, pac, ClusterAlgorithm, ConsensusClustering, EnsembleConfig, KMeans,
};

/// Three well-separated planted blobs of 8 samples each.
fn blobs() -> (Array2<f64>, Vec<u32>) {
    let centers = [(0., 0.), (10., 10.), (-10., 10.)];
    let mut rows = Vec::new();
    let mut truth = Vec::new();
    for (cluster, &(cx, cy)) in centers.iter().enumerate() {
        for i in 0..8 {
            let jitter = i as f64 * 0.05;
            rows.push(cx + jitter);
            rows.push(cy - jitter);
            truth.push(cluster as u32 + 1);
        }
    }
    let x = Array2::from_shape_vec((24, 2), rows).unwrap();
    (x, truth)
}

fn config() -> EnsembleConfig {
    EnsembleConfig {
        ks: vec![2, 3],
        subsample_fraction: 0.8,
        replicates: 10,
        seed: 3,
        threads: 2,
        ..EnsembleConfig::default()
    }
}

/// Labels each subset row by its position, so the same sample flips labels
/// between replicates: a deliberately unstable ensemble member.
struct Scrambler;

impl ClusterAlgorithm<f64> for Scrambler {
    fn name(&self) -> &str {
        "scrambler"
    }

    fn cluster(
        &self,
        x: &Array2<f64>,
        k: usize,
    ) -> Result<Vec<u32>, Box<dyn std::error::Error + Send + Sync>> {
        Ok((0..x.nrows())
            .map(|i| ((i * 7 + x.nrows() * 13) % k) as u32)
            .collect())
    }
}

struct AlwaysFails;

impl ClusterAlgorithm<f64> for AlwaysFails {
    fn name(&self) -> &str {
        "brokenalg"
    }

    fn cluster(
        &self,
        _x: &Array2<f64>,
        _k: usize,
    ) -> Result<Vec<u32>, Box<dyn std::error::Error + Send + Sync>> {
        Err("solver exploded".into())
    }
}

/// Returns one label too few for every subset it is handed.
struct ShortLabeler;

impl ClusterAlgorithm<f64> for ShortLabeler {
    fn name(&self) -> &str {
        "shortlabeler"
    }

    fn cluster(
        &self,
        x: &Array2<f64>,
        _k: usize,
    ) -> Result<Vec<u32>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(vec![0; x.nrows() - 1])
    }
}

#[test]
fn pipeline_recovers_planted_partition() {
    let (x, truth) = blobs();
    let driver = ConsensusClustering::new(config());
    let algorithms: Vec<Box<dyn ClusterAlgorithm<f64>>> =
        vec![Box::new(KMeans::default()), Box::new(KMeans {
            max_iterations: 100,
            seed: 11,
        })];
    let ensemble = driver.run(&x, &algorithms).unwrap();

    let matrix = ensemble.combined_consensus(3);
    for i in 0..24 {
        assert_eq!(matrix[[i, i]], 1.0);
        for j in 0..24 {
            assert_eq!(matrix[[i, j]], matrix[[j, i]]);
            assert!((0. ..=1.).contains(&matrix[[i, j]]));
        }
    }
    // Clean blobs cluster crisply: no ambiguous consensus entries
    assert!(pac(&matrix, 0., 1.) <= 0.05);

    let classes = ensemble.consensus_classes(3).unwrap();
    let alignment = align_partitions(&classes, &truth).unwrap();
    assert_eq!(alignment.trace, 24.);
}

#[test]
fn identical_seeds_reproduce_runs() {
    let (x, _) = blobs();
    let driver = ConsensusClustering::new(config());
    let algorithms: Vec<Box<dyn ClusterAlgorithm<f64>>> = vec![Box::new(KMeans::default())];
    let first = driver.run(&x, &algorithms).unwrap();
    let second = driver.run(&x, &algorithms).unwrap();
    assert_eq!(
        first.consensus_classes(3).unwrap(),
        second.consensus_classes(3).unwrap()
    );
    assert_eq!(first.combined_consensus(3), second.combined_consensus(3));
}

#[test]
fn failing_algorithm_does_not_abort_the_run() {
    let (x, truth) = blobs();
    let driver = ConsensusClustering::new(config());
    let algorithms: Vec<Box<dyn ClusterAlgorithm<f64>>> =
        vec![Box::new(KMeans::default()), Box::new(AlwaysFails)];
    let ensemble = driver.run(&x, &algorithms).unwrap();

    // Every in-mask cell of the broken algorithm is a recorded failure
    let report = ensemble.store().missing_report();
    let broken: Vec<_> = report.iter().filter(|r| r.algorithm == "brokenalg").collect();
    assert!(!broken.is_empty());
    for slice in broken {
        assert_eq!(slice.known, 0);
        assert!(slice.failed > 0);
    }

    // The surviving algorithm still produces a usable consensus
    let classes = ensemble.consensus_classes(3).unwrap();
    let alignment = align_partitions(&classes, &truth).unwrap();
    assert_eq!(alignment.trace, 24.);
}

#[test]
fn wrong_label_count_is_recorded_as_failure() {
    let (x, truth) = blobs();
    let driver = ConsensusClustering::new(config());
    let algorithms: Vec<Box<dyn ClusterAlgorithm<f64>>> =
        vec![Box::new(KMeans::default()), Box::new(ShortLabeler)];
    let ensemble = driver.run(&x, &algorithms).unwrap();

    // A label vector that does not cover the subset never reaches the store
    let report = ensemble.store().missing_report();
    let short: Vec<_> = report
        .iter()
        .filter(|r| r.algorithm == "shortlabeler")
        .collect();
    assert!(!short.is_empty());
    for slice in short {
        assert_eq!(slice.known, 0);
        assert!(slice.failed > 0);
    }

    // The well-behaved algorithm still carries the consensus
    let classes = ensemble.consensus_classes(3).unwrap();
    let alignment = align_partitions(&classes, &truth).unwrap();
    assert_eq!(alignment.trace, 24.);
}

#[test]
fn trimming_removes_the_unstable_member() {
    let (x, truth) = blobs();
    let mut config = config();
    config.reweigh = true;
    let driver = ConsensusClustering::new(config);
    let algorithms: Vec<Box<dyn ClusterAlgorithm<f64>>> = vec![
        Box::new(KMeans::default()),
        Box::new(KMeans {
            max_iterations: 100,
            seed: 11,
        }),
        Box::new(Scrambler),
    ];
    let ensemble = driver.run(&x, &algorithms).unwrap();
    let table = ensemble.validation_table();
    let trimmed = ensemble.trim_and_reweigh(&table, 3);

    assert!(!trimmed.degenerate);
    assert_eq!(trimmed.removed, vec![2]);
    assert_eq!(trimmed.kept, vec![0, 1]);
    let total: usize = trimmed.copies.iter().map(|(_, c)| c).sum();
    assert_eq!(total, 100);

    let classes = ensemble.trimmed_consensus_classes(&trimmed, 3).unwrap();
    let alignment = align_partitions(&classes, &truth).unwrap();
    assert_eq!(alignment.trace, 24.);
}

#[test]
fn excluded_samples_are_missing_before_imputation() {
    let (x, _) = blobs();
    let driver = ConsensusClustering::new(config());
    let algorithms: Vec<Box<dyn ClusterAlgorithm<f64>>> = vec![Box::new(KMeans::default())];
    let ensemble = driver.run(&x, &algorithms).unwrap();
    let store = ensemble.store();
    let slice = store.slice(0, 2).unwrap();
    for (replicate, mask) in store.masks().iter().enumerate() {
        for sample in 0..store.n_samples() {
            let cell = slice[[replicate, sample]];
            if mask.contains(sample) {
                assert!(cell.known().is_some());
            } else {
                assert!(cell.is_missing());
            }
        }
    }
    // Imputation then fills exactly the excluded cells
    let filled = ensemble.imputed_slice(0, 2).unwrap();
    assert!(filled.is_dense());
}
