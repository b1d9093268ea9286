// Chart buffer export.
//
// Writes the retained window of every non-empty chart as one CSV table:
// an `index` column, then one column per metric in config order. Rows are
// sample positions within each window (oldest first), so columns of
// different lengths leave trailing cells empty. Values are written with
// Rust's shortest round-trip float formatting.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use skyline_sim::series::{SeriesRegistry, SlidingWindowSeries};

use crate::replay::ReplayError;

/// Write the table to `out`. Returns the number of data rows written.
pub fn write_csv<W: Write>(
    registry: &SeriesRegistry,
    metrics: &[String],
    mut out: W,
) -> io::Result<usize> {
    let columns: Vec<&SlidingWindowSeries> = metrics
        .iter()
        .filter_map(|name| registry.get(name))
        .filter(|series| !series.is_empty())
        .collect();

    write!(out, "index")?;
    for series in &columns {
        write!(out, ",{}", series.name())?;
    }
    writeln!(out)?;

    let values: Vec<Vec<f64>> = columns
        .iter()
        .map(|series| series.samples().map(|s| s.value).collect())
        .collect();
    let rows = values.iter().map(Vec::len).max().unwrap_or(0);
    for row in 0..rows {
        write!(out, "{row}")?;
        for column in &values {
            match column.get(row) {
                Some(v) => write!(out, ",{v}")?,
                None => write!(out, ",")?,
            }
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(rows)
}

/// Write the table to a file.
pub fn export_csv(
    registry: &SeriesRegistry,
    metrics: &[String],
    path: &Path,
) -> Result<usize, ReplayError> {
    let write_err = |source| ReplayError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    write_csv(registry, metrics, BufWriter::new(file)).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyline_protocol::message::Sample;

    #[test]
    fn one_column_per_non_empty_metric() {
        let metrics: Vec<String> = ["welfare", "n_sick", "tax_rate"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        let mut registry = SeriesRegistry::new(metrics.iter().cloned(), 3, 500);
        for i in 0..4 {
            registry.append(
                "welfare",
                &[Sample {
                    time: i,
                    value: i as f64 * 1.5,
                }],
            );
        }
        registry.append("tax_rate", &[Sample { time: 0, value: 0.25 }]);

        let mut buf = Vec::new();
        let rows = write_csv(&registry, &metrics, &mut buf).unwrap();
        assert_eq!(rows, 3);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "index,welfare,tax_rate\n0,1.5,0.25\n1,3,\n2,4.5,\n");
    }

    #[test]
    fn empty_registry_writes_only_the_header() {
        let registry = SeriesRegistry::new(["welfare"], 51, 500);
        let mut buf = Vec::new();
        let rows = write_csv(&registry, &["welfare".to_owned()], &mut buf).unwrap();
        assert_eq!(rows, 0);
        assert_eq!(String::from_utf8(buf).unwrap(), "index\n");
    }
}
