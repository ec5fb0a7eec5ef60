#[macro_use]
extern crate clap;

use std::fmt::Debug;
use std::path::Path;
use std::process::exit;
use std::str::FromStr;

use num_traits::Float;

use consensuscluster::{
    calinski_harabasz, pac, ClusterAlgorithm, ConsensusClustering, EnsembleConfig, KMeans, Linkage,
};

use crate::ops::{display_results, from_file, parse_ks, KReport};

mod ops;

fn main() {
    let matches = clap_app!(consensuscluster =>
        (version: "0.1.0")
        (about: "Parallelized consensus clustering with ensemble trimming and reweighing")
        (@arg INPUT: -i --input +takes_value +required "Path to tab-separated input file")
        (@arg KS: -k --clusters +takes_value "Comma-separated candidate cluster counts, default=2,3,4")
        (@arg FRACTION: -f --fraction +takes_value "Subsample fraction in (0, 1], default=0.8")
        (@arg REPLICATES: -r --replicates +takes_value "Bootstrap replicates, default=10")
        (@arg SEED: -s --seed +takes_value "Random seed, default=0")
        (@arg THREADS: -t --threads +takes_value "Number of worker threads, default=4")
        (@arg QUANTILE: -q --quantile +takes_value "Trim quantile in (0, 1), default=0.75")
        (@arg COPIES: -c --copies +takes_value "Total replicated columns (at most 100), default=100")
        (@arg REWEIGH: -w --reweigh "Weigh kept algorithms by score instead of uniformly")
        (@arg NEIGHBORS: -m --neighbors +takes_value "Imputation neighbor count, default=5")
        (@arg MIN_KNOWN: --("min-known") +takes_value "Labeled neighbors required for a neighbor vote, default=1")
        (@arg PAC_LOWER: --("pac-lower") +takes_value "Lower PAC bound in [0, 1), default=0.0")
        (@arg PAC_UPPER: --("pac-upper") +takes_value "Upper PAC bound in (lower, 1], default=1.0")
        (@arg LINKAGE: -l --linkage +takes_value "Linkage: single, complete, or average (default)")
        (@arg PRECISION: -p --precision +takes_value "Set f32 or f64 precision, default=f32")
    )
    .get_matches();

    let input_file = matches.value_of("INPUT").unwrap().to_string();
    if !Path::new(&input_file).exists() {
        eprintln!("Unable to locate input file {}", input_file);
        exit(1);
    }
    let mut config = EnsembleConfig::default();
    if let Some(raw) = matches.value_of("KS") {
        config.ks = parse_ks(raw).unwrap_or_else(|e| {
            eprintln!("{}", e.message);
            exit(1);
        });
    }
    config.subsample_fraction = matches
        .value_of("FRACTION")
        .unwrap_or("0.8")
        .parse::<f64>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse fraction");
            exit(1);
        });
    config.replicates = matches
        .value_of("REPLICATES")
        .unwrap_or("10")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse replicates");
            exit(1);
        });
    config.seed = matches
        .value_of("SEED")
        .unwrap_or("0")
        .parse::<u64>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse seed");
            exit(1);
        });
    config.threads = matches
        .value_of("THREADS")
        .unwrap_or("4")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse threads");
            exit(1);
        });
    config.trim_quantile = matches
        .value_of("QUANTILE")
        .unwrap_or("0.75")
        .parse::<f64>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse quantile");
            exit(1);
        });
    config.total_copies = matches
        .value_of("COPIES")
        .unwrap_or("100")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse copies");
            exit(1);
        });
    config.reweigh = matches.is_present("REWEIGH");
    config.impute_neighbors = matches
        .value_of("NEIGHBORS")
        .unwrap_or("5")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse neighbors");
            exit(1);
        });
    config.min_known_neighbors = matches
        .value_of("MIN_KNOWN")
        .unwrap_or("1")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse min-known");
            exit(1);
        });
    config.pac_lower = matches
        .value_of("PAC_LOWER")
        .unwrap_or("0.0")
        .parse::<f64>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse pac-lower");
            exit(1);
        });
    config.pac_upper = matches
        .value_of("PAC_UPPER")
        .unwrap_or("1.0")
        .parse::<f64>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse pac-upper");
            exit(1);
        });
    config.linkage = match matches.value_of("LINKAGE").unwrap_or("average") {
        "single" => Linkage::Single,
        "complete" => Linkage::Complete,
        "average" => Linkage::Average,
        other => {
            eprintln!("Unknown linkage '{}'", other);
            exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let precision = matches.value_of("PRECISION").unwrap_or("f32");
    match precision {
        "f64" => run::<f64>(&input_file, config),
        _ => run::<f32>(&input_file, config),
    };
}

fn run<F>(input_file: &str, config: EnsembleConfig)
where
    F: Float + Send + Sync + Default + FromStr + 'static,
    <F as FromStr>::Err: Debug,
{
    let (x, row_ids) = from_file::<F>(Path::new(input_file).to_path_buf(), "\t")
        .unwrap_or_else(|e| {
            eprintln!("{}", e.message);
            exit(1);
        });
    let seed = config.seed;
    let ks = config.ks.clone();
    let driver = ConsensusClustering::new(config);
    let algorithms: Vec<Box<dyn ClusterAlgorithm<F>>> = vec![Box::new(KMeans {
        max_iterations: 100,
        seed,
    })];
    let ensemble = driver.run(&x, &algorithms).unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(2);
    });
    let table = ensemble.validation_table();
    let mut reports = Vec::new();
    for &k in &ks {
        let trimmed = ensemble.trim_and_reweigh(&table, k);
        let classes = match ensemble.trimmed_consensus_classes(&trimmed, k) {
            Ok(classes) => classes,
            Err(e) => {
                eprintln!("k={}: {}", k, e);
                continue;
            }
        };
        let matrix = ensemble.combined_consensus(k);
        reports.push(KReport {
            k,
            pac: pac(&matrix, driver.config().pac_lower, driver.config().pac_upper),
            chi: calinski_harabasz(&x, &classes),
            classes,
            trimmed,
        });
    }
    display_results(
        &row_ids,
        ensemble.store().algorithms(),
        &reports,
        &ensemble.store().missing_report(),
    );
}
