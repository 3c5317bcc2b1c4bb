//! Result exports (CSV tables and JSON documents).
//!
//! Tables go through `csv` with serde rows, so absent values (`None`) become
//! empty cells rather than `NaN`.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::error::AppError;
use crate::timebins::VariabilityRow;

/// Write one CSV row per item, headers from the field names.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::external(format!("Failed to create CSV '{}': {e}", path.display())))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::external(format!("Failed to write CSV row to '{}': {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::external(format!("Failed to flush CSV '{}': {e}", path.display())))?;
    Ok(())
}

/// Variability table: bin edges followed by `<param>, <param>_err` columns.
pub fn write_variability_csv(path: &Path, rows: &[VariabilityRow]) -> Result<(), AppError> {
    let map_err = |e: csv::Error| AppError::external(format!("Failed to write CSV '{}': {e}", path.display()));
    let mut writer = csv::Writer::from_path(path).map_err(map_err)?;

    let names: Vec<String> = rows
        .first()
        .map(|r| r.values.iter().map(|v| v.name.clone()).collect())
        .unwrap_or_default();
    let mut header = vec![
        "time_min".to_string(),
        "time_max".to_string(),
        "time_mid".to_string(),
        "n_runs".to_string(),
        "success".to_string(),
    ];
    for n in &names {
        header.push(n.clone());
        header.push(format!("{n}_err"));
    }
    writer.write_record(&header).map_err(map_err)?;

    for row in rows {
        let mut record = vec![
            row.start.to_string(),
            row.end.to_string(),
            (0.5 * (row.start + row.end)).to_string(),
            row.n_runs.to_string(),
            row.success.to_string(),
        ];
        for n in &names {
            let v = row.values.iter().find(|v| &v.name == n);
            record.push(v.map(|v| format!("{:e}", v.value)).unwrap_or_default());
            record.push(
                v.and_then(|v| v.error)
                    .map(|e| format!("{e:e}"))
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&record).map_err(map_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::external(format!("Failed to flush CSV '{}': {e}", path.display())))?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::external(format!("Failed to create JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| AppError::external(format!("Failed to write JSON '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timebins::DriftValue;

    #[derive(Serialize)]
    struct Row {
        e_ref: f64,
        dnde: Option<f64>,
        is_ul: bool,
    }

    #[test]
    fn missing_values_are_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        let rows = [
            Row { e_ref: 1.0, dnde: Some(2.5e-12), is_ul: false },
            Row { e_ref: 3.0, dnde: None, is_ul: true },
        ];
        write_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "e_ref,dnde,is_ul");
        assert_eq!(lines[2], "3.0,,true");
        assert!(!text.contains("NaN"));
    }

    #[test]
    fn variability_columns_follow_parameter_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("variability.csv");
        let rows = [VariabilityRow {
            start: 0.0,
            end: 2.0,
            n_runs: 3,
            success: true,
            values: vec![DriftValue { name: "index".into(), value: 2.5, error: Some(0.1) }],
        }];
        write_variability_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("time_min,time_max,time_mid,n_runs,success,index,index_err\n"));
        assert!(text.contains("0,2,1,3,true,2.5e0,1e-1"));
    }

    #[test]
    fn json_round_trips_through_serde() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        write_json(&path, &vec![1.0, 2.0]).unwrap();
        let back: Vec<f64> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![1.0, 2.0]);
    }
}
