//! CSV ingestion for flow feature datasets.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::{debug, info};

use super::matrix::FeatureMatrix;
use super::schema;
use crate::error::{Result, SentryError};

/// Load a flow feature CSV into a numeric matrix.
///
/// Identifier columns are dropped by name, every remaining cell must parse
/// as a number, and row order is preserved exactly. No rows are filtered.
pub fn load_features<P: AsRef<Path>>(path: P) -> Result<FeatureMatrix> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let header: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let retained = schema::feature_columns(&header)?;
    debug!(
        "{}: {} header columns, {} retained as features",
        path.display(),
        header.len(),
        retained.len()
    );

    let columns: Vec<String> = retained.iter().map(|(_, name)| name.clone()).collect();
    let mut matrix = FeatureMatrix::new(columns);

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = Vec::with_capacity(retained.len());
        for (col_idx, name) in &retained {
            let raw = record.get(*col_idx).unwrap_or("");
            let value: f32 = raw.trim().parse().map_err(|_| {
                SentryError::Schema(format!(
                    "non-numeric value '{}' in column '{}' at data row {}",
                    raw,
                    name,
                    row_idx + 1
                ))
            })?;
            // "NaN" and "inf" parse as f32 but would poison fitted statistics.
            if !value.is_finite() {
                return Err(SentryError::Schema(format!(
                    "non-finite value '{}' in column '{}' at data row {}",
                    raw,
                    name,
                    row_idx + 1
                )));
            }
            row.push(value);
        }
        matrix.push_row(row)?;
    }

    if matrix.is_empty() {
        return Err(SentryError::EmptyDataset(format!(
            "{} has no data rows",
            path.display()
        )));
    }

    info!(
        "Loaded {} rows x {} features from {}",
        matrix.n_rows(),
        matrix.n_columns(),
        path.display()
    );

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const HEADER: &str = "StartTime,EndTime,SourceIP,DestinationIP,SourcePort,DestinationPort,Protocol,Flags,Duration,TotalBytes";

    #[test]
    fn test_load_drops_identifier_columns() {
        let csv = format!(
            "{}\n{}\n{}\n",
            HEADER,
            "1,2,10.0.0.1,10.0.0.2,22,4242,tcp,S,0.5,1400",
            "3,4,10.0.0.3,10.0.0.2,22,4243,tcp,S,1.5,2800"
        );
        let file = write_csv(&csv);

        let matrix = load_features(file.path()).unwrap();
        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.columns(), ["Duration", "TotalBytes"]);
        assert_eq!(matrix.row(0).unwrap(), [0.5, 1400.0]);
        assert_eq!(matrix.row(1).unwrap(), [1.5, 2800.0]);
    }

    #[test]
    fn test_row_order_preserved() {
        let mut csv = format!("{}\n", HEADER);
        for i in 0..10 {
            csv.push_str(&format!(
                "1,2,10.0.0.1,10.0.0.2,22,4242,tcp,S,{},{}\n",
                i,
                i * 10
            ));
        }
        let file = write_csv(&csv);

        let matrix = load_features(file.path()).unwrap();
        for i in 0..10 {
            assert_eq!(matrix.row(i).unwrap()[0], i as f32);
        }
    }

    #[test]
    fn test_missing_exclusion_column_is_schema_error() {
        let csv = "StartTime,EndTime,SourceIP,Duration\n1,2,10.0.0.1,0.5\n";
        let file = write_csv(csv);

        match load_features(file.path()) {
            Err(SentryError::Schema(msg)) => assert!(msg.contains("missing")),
            other => panic!("expected schema error, got {:?}", other.map(|m| m.n_rows())),
        }
    }

    #[test]
    fn test_non_numeric_feature_is_schema_error() {
        let csv = format!(
            "{}\n{}\n",
            HEADER, "1,2,10.0.0.1,10.0.0.2,22,4242,tcp,S,fast,1400"
        );
        let file = write_csv(&csv);

        match load_features(file.path()) {
            Err(SentryError::Schema(msg)) => {
                assert!(msg.contains("Duration"));
                assert!(msg.contains("row 1"));
            }
            other => panic!("expected schema error, got {:?}", other.map(|m| m.n_rows())),
        }
    }

    #[test]
    fn test_non_finite_feature_is_schema_error() {
        let csv = format!(
            "{}\n{}\n",
            HEADER, "1,2,10.0.0.1,10.0.0.2,22,4242,tcp,S,NaN,1400"
        );
        let file = write_csv(&csv);

        match load_features(file.path()) {
            Err(SentryError::Schema(msg)) => {
                assert!(msg.contains("non-finite"));
                assert!(msg.contains("Duration"));
                assert!(msg.contains("row 1"));
            }
            other => panic!("expected schema error, got {:?}", other.map(|m| m.n_rows())),
        }

        let csv = format!(
            "{}\n{}\n",
            HEADER, "1,2,10.0.0.1,10.0.0.2,22,4242,tcp,S,0.5,inf"
        );
        let file = write_csv(&csv);
        assert!(matches!(
            load_features(file.path()),
            Err(SentryError::Schema(_))
        ));
    }

    #[test]
    fn test_header_only_file_is_empty_dataset() {
        let csv = format!("{}\n", HEADER);
        let file = write_csv(&csv);

        assert!(matches!(
            load_features(file.path()),
            Err(SentryError::EmptyDataset(_))
        ));
    }
}
