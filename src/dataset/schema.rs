//! Input schema for flow feature CSVs.
//!
//! The upstream feature extractor writes identifier and metadata columns
//! alongside the numeric features. Those columns are never model input and
//! are dropped by name. The list lives here, in one place, so training and
//! evaluation can never drift apart on what gets excluded.

use crate::error::{Result, SentryError};

/// Columns always removed before modeling.
pub const EXCLUDED_COLUMNS: [&str; 8] = [
    "StartTime",
    "EndTime",
    "SourceIP",
    "DestinationIP",
    "SourcePort",
    "DestinationPort",
    "Protocol",
    "Flags",
];

/// Check whether a column is on the exclusion list.
pub fn is_excluded(name: &str) -> bool {
    EXCLUDED_COLUMNS.contains(&name)
}

/// Resolve the retained feature columns of a CSV header.
///
/// Every exclusion column must be present in the header; whatever remains is
/// the feature set, in header order. Returns `(index, name)` pairs so the
/// loader can pick cells out of each record.
pub fn feature_columns(header: &[String]) -> Result<Vec<(usize, String)>> {
    for required in EXCLUDED_COLUMNS {
        if !header.iter().any(|h| h == required) {
            return Err(SentryError::Schema(format!(
                "required column '{}' missing from header",
                required
            )));
        }
    }

    let retained: Vec<(usize, String)> = header
        .iter()
        .enumerate()
        .filter(|(_, name)| !is_excluded(name))
        .map(|(idx, name)| (idx, name.clone()))
        .collect();

    if retained.is_empty() {
        return Err(SentryError::Schema(
            "no feature columns remain after exclusions".to_string(),
        ));
    }

    Ok(retained)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_header() -> Vec<String> {
        let mut header: Vec<String> = EXCLUDED_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.push("Duration".to_string());
        header.push("TotalBytes".to_string());
        header.push("PacketCount".to_string());
        header
    }

    #[test]
    fn test_feature_columns_retains_order() {
        let header = full_header();
        let retained = feature_columns(&header).unwrap();

        let names: Vec<&str> = retained.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["Duration", "TotalBytes", "PacketCount"]);
        assert_eq!(retained[0].0, 8);
    }

    #[test]
    fn test_missing_exclusion_column_fails() {
        let mut header = full_header();
        header.retain(|h| h != "Flags");

        let err = feature_columns(&header).unwrap_err();
        assert!(err.to_string().contains("Flags"));
    }

    #[test]
    fn test_header_with_only_excluded_columns_fails() {
        let header: Vec<String> = EXCLUDED_COLUMNS.iter().map(|c| c.to_string()).collect();
        assert!(feature_columns(&header).is_err());
    }

    #[test]
    fn test_is_excluded() {
        assert!(is_excluded("SourceIP"));
        assert!(!is_excluded("Duration"));
    }
}
