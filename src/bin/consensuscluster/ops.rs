use std::fmt::Debug;
use std::fs::File;
use std::io::{stdout, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use num_traits::Float;

use consensuscluster::{MissingReport, TrimmedEnsemble};

#[derive(Debug)]
pub(crate) struct FileParseError {
    pub message: String,
}

/// Reads in a file formatted as (tab separated):
///     id1 val1 val2 val3
///     id2 val1 val2 val3
///
/// Provide as many ids and values as desired
/// All rows should be same length
/// Values should be floating-point decimal values
pub(crate) fn from_file<F>(p: PathBuf, d: &str) -> Result<(Array2<F>, Vec<String>), FileParseError>
where
    F: Float + Default + FromStr,
    <F as FromStr>::Err: Debug,
{
    let reader = BufReader::new(File::open(p).expect("Unable to open file"));
    let mut labels = Vec::new();
    let mut data = Vec::new();
    for (idx, line) in reader.lines().map(|l| l.unwrap()).enumerate() {
        if !line.contains(d) {
            return Err(FileParseError {
                message: "Input file is not tab-delimited".to_string(),
            });
        }
        let mut line = line.split(d);
        let id = match line.next() {
            Some(l) => l.to_string(),
            None => {
                return Err(FileParseError {
                    message: "Error loading line label".to_string(),
                })
            }
        };
        labels.push(id);
        let mut entry: Vec<F> = vec![];
        for s in line {
            match s.parse::<F>() {
                Ok(v) => {
                    entry.push(v);
                }
                Err(_) => {
                    return Err(FileParseError {
                        message: format!("Error parsing file at line {}", idx + 1),
                    })
                }
            };
        }
        data.push(entry);
    }
    if data.len() <= 1 {
        return Err(FileParseError {
            message: "Data file is empty or only contains a single entry".to_string(),
        });
    }
    let length = data[0].len();
    for v in data.iter() {
        if v.len() != length {
            return Err(FileParseError {
                message: "Input data rows must all be same length!".to_string(),
            });
        }
    }
    let mut out = Array2::<F>::default((data.len(), data[0].len()));
    out.axis_iter_mut(Axis(0))
        .enumerate()
        .for_each(|(idx1, mut row)| {
            row.iter_mut().enumerate().for_each(|(idx2, col)| {
                *col = data[idx1][idx2];
            });
        });
    Ok((out, labels))
}

/// Parse a comma-separated list of candidate cluster counts.
pub(crate) fn parse_ks(raw: &str) -> Result<Vec<usize>, FileParseError> {
    let mut ks = Vec::new();
    for part in raw.split(',') {
        match part.trim().parse::<usize>() {
            Ok(k) => ks.push(k),
            Err(_) => {
                return Err(FileParseError {
                    message: format!("Unable to parse cluster count '{}'", part),
                })
            }
        }
    }
    Ok(ks)
}

pub(crate) struct KReport {
    pub k: usize,
    pub pac: f64,
    pub chi: f64,
    pub classes: Vec<u32>,
    pub trimmed: TrimmedEnsemble,
}

pub(crate) fn display_results(
    labels: &[String],
    algorithms: &[String],
    reports: &[KReport],
    missing: &[MissingReport],
) {
    let mut writer = BufWriter::new(stdout());
    for report in reports {
        writer
            .write_all(
                format!(
                    ">k={} PAC={:.4} CHI={:.4} trimmed={} degenerate={}\n",
                    report.k,
                    report.pac,
                    report.chi,
                    report
                        .trimmed
                        .removed
                        .iter()
                        .map(|&a| algorithms[a].as_str())
                        .collect::<Vec<&str>>()
                        .join(","),
                    report.trimmed.degenerate
                )
                .as_ref(),
            )
            .unwrap();
        let mut it = report.classes.iter().zip(labels.iter());
        if let Some((class, label)) = it.next() {
            writer
                .write_all(format!("{}:{}", label, class).as_ref())
                .unwrap();
        }
        it.for_each(|(class, label)| {
            writer
                .write_all(format!(",{}:{}", label, class).as_ref())
                .unwrap();
        });
        writer.write_all(b"\n").unwrap();
    }
    for report in missing {
        if report.failed > 0 {
            writer
                .write_all(
                    format!(
                        "#missing algorithm={} k={} failed={} excluded={}\n",
                        report.algorithm, report.k, report.failed, report.excluded
                    )
                    .as_ref(),
                )
                .unwrap();
        }
    }
    writer.flush().unwrap();
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use ndarray::arr2;
    use tempfile::NamedTempFile;

    use crate::ops::{from_file, parse_ks};

    #[test]
    fn valid_load() {
        // Write tempdata
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id1\t1.0\t5.0\t1.0").unwrap();
        writeln!(file, "id2\t2.0\t4.0\t2.0").unwrap();
        writeln!(file, "id3\t3.0\t3.0\t3.0").unwrap();
        writeln!(file, "id4\t4.0\t2.0\t4.0").unwrap();
        writeln!(file, "id5\t5.0\t1.0\t5.0").unwrap();
        // Read into starting data
        let (data, labels) = from_file::<f32>(file.path().to_path_buf(), "\t").unwrap();
        // Validate ids
        for i in 0..5 {
            assert_eq!("id".to_string() + &(i + 1).to_string(), labels[i as usize]);
        }
        // Validate remaining
        let expected = arr2(&[
            [1., 5., 1.],
            [2., 4., 2.],
            [3., 3., 3.],
            [4., 2., 4.],
            [5., 1., 5.],
        ]);
        assert_eq!(data, expected);
    }

    #[test]
    #[should_panic]
    fn invalid_load_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let (_, _) = from_file::<f32>(file.path().to_path_buf(), "\t").unwrap();
    }

    #[test]
    #[should_panic]
    fn invalid_load_mismatched_data() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id1\t1.0\t5.0\t1.0").unwrap();
        writeln!(file, "id2\t2.0\t4.0").unwrap();
        writeln!(file, "id3\t1.0\t5.0\t1.0").unwrap();
        let (_, _) = from_file::<f32>(file.path().to_path_buf(), "\t").unwrap();
    }

    #[test]
    #[should_panic]
    fn invalid_load_invalid_data() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id1\t1.0\t5.0\t1.0").unwrap();
        writeln!(file, "id2\ta\tb\tc").unwrap();
        let (_, _) = from_file::<f32>(file.path().to_path_buf(), "\t").unwrap();
    }

    #[test]
    #[should_panic]
    fn invalid_file_format() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id1 1.0 5.0 1.0").unwrap();
        writeln!(file, "id2 1.0 2.0 1.0").unwrap();
        let (_, _) = from_file::<f32>(file.path().to_path_buf(), "\t").unwrap();
    }

    #[test]
    fn parses_k_list() {
        assert_eq!(parse_ks("2,3,4").unwrap(), vec![2, 3, 4]);
        assert_eq!(parse_ks(" 5 ").unwrap(), vec![5]);
        assert!(parse_ks("2,x").is_err());
    }
}
