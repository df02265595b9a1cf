//! CSV export of outings.
//!
//! Rows are appended to the target file; headers are written only when the
//! file is new or empty.

use crate::{OutingInfo, Result};
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: i64,
    date: String,
    time_out: String,
    time_in: Option<String>,
    boat: String,
    rowers: String,
    cox: Option<u32>,
    distance_km: u32,
    destination: Option<String>,
    comment: Option<String>,
}

impl From<&OutingInfo> for CsvRow {
    fn from(outing: &OutingInfo) -> Self {
        CsvRow {
            id: outing.id,
            date: outing.date.format("%Y-%m-%d").to_string(),
            time_out: outing.time_out.format("%H:%M").to_string(),
            time_in: outing.time_in.map(|t| t.format("%H:%M").to_string()),
            boat: outing.boat_name.clone(),
            rowers: outing
                .rowers
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(";"),
            cox: outing.cox,
            distance_km: outing.distance,
            destination: outing.destination.clone(),
            comment: outing.comment.clone(),
        }
    }
}

/// Append outings to a CSV file and sync it to disk
///
/// Returns the number of rows written.
pub fn export_outings_csv(outings: &[OutingInfo], csv_path: &Path) -> Result<usize> {
    if outings.is_empty() {
        tracing::info!("No outings to export");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for outing in outings {
        writer.serialize(CsvRow::from(outing))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} outings to {:?}", outings.len(), csv_path);
    Ok(outings.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn create_test_outing(id: i64, boat: &str) -> OutingInfo {
        OutingInfo {
            id,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            rowers: vec![4, 7],
            cox: None,
            time_out: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            time_in: Some(NaiveTime::from_hms_opt(9, 5, 0).unwrap()),
            comment: Some("calm, sunny".into()),
            destination: None,
            boat_name: boat.into(),
            distance: 12,
        }
    }

    #[test]
    fn test_export_creates_file_with_headers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("outings.csv");

        let count =
            export_outings_csv(&[create_test_outing(1, "Nixe"), create_test_outing(2, "Undine")], &csv_path)
                .unwrap();
        assert_eq!(count, 2);

        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert!(content.starts_with("id,date,time_out,time_in,boat,rowers"));
        assert!(content.contains("1,2024-06-01,07:30,09:05,Nixe,4;7,,12,,\"calm, sunny\""));
    }

    #[test]
    fn test_export_appends() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("outings.csv");

        export_outings_csv(&[create_test_outing(1, "Nixe")], &csv_path).unwrap();
        export_outings_csv(&[create_test_outing(2, "Undine")], &csv_path).unwrap();

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.into_records().count(), 2);
    }

    #[test]
    fn test_empty_export_creates_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("outings.csv");

        assert_eq!(export_outings_csv(&[], &csv_path).unwrap(), 0);
        assert!(!csv_path.exists());
    }
}
