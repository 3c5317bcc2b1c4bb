//! Directory-backed data store.
//!
//! Layout:
//!
//! ```text
//! <dir>/obs-index.json     {"runs": [{"record": {...}, "file": "run_000001.json"}, ...]}
//! <dir>/run_000001.json    RunData
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::ObservationRecord;
use crate::error::AppError;
use crate::io::write_json;
use crate::store::{DataStore, RunData};

pub const INDEX_FILE: &str = "obs-index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    record: ObservationRecord,
    file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ObsIndex {
    runs: Vec<IndexEntry>,
}

/// Data store reading `obs-index.json` and per-run JSON files.
#[derive(Debug, Clone)]
pub struct JsonDataStore {
    root: PathBuf,
    index: ObsIndex,
}

impl JsonDataStore {
    pub fn open(root: &Path) -> Result<Self, AppError> {
        let path = root.join(INDEX_FILE);
        let file = File::open(&path).map_err(|e| {
            AppError::external(format!("Failed to open observation index '{}': {e}", path.display()))
        })?;
        let index: ObsIndex = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            AppError::external(format!("Invalid observation index '{}': {e}", path.display()))
        })?;
        tracing::debug!(root = %root.display(), runs = index.runs.len(), "opened data store");
        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }

    /// Write a complete store (index + run files) into `root`.
    pub fn write(root: &Path, runs: &[(ObservationRecord, RunData)]) -> Result<(), AppError> {
        std::fs::create_dir_all(root).map_err(|e| {
            AppError::external(format!("Failed to create data store '{}': {e}", root.display()))
        })?;

        let mut index = ObsIndex::default();
        for (record, data) in runs {
            let name = format!("run_{:06}.json", record.obs_id);
            write_json(&root.join(&name), data)?;
            index.runs.push(IndexEntry {
                record: record.clone(),
                file: name,
            });
        }
        write_json(&root.join(INDEX_FILE), &index)
    }
}

impl DataStore for JsonDataStore {
    fn observation_table(&self) -> Vec<ObservationRecord> {
        self.index.runs.iter().map(|e| e.record.clone()).collect()
    }

    fn load_run(&self, obs_id: u64) -> Result<RunData, AppError> {
        let entry = self
            .index
            .runs
            .iter()
            .find(|e| e.record.obs_id == obs_id)
            .ok_or_else(|| AppError::external(format!("Run {obs_id} is not in the observation index.")))?;
        let path = self.root.join(&entry.file);
        let file = File::open(&path).map_err(|e| {
            AppError::external(format!("Missing run file '{}': {e}", path.display()))
        })?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppError::external(format!("Invalid run file '{}': {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SkyCoord;
    use crate::store::{EffectiveAreaTable, EnergyDispersionTable, Event};

    fn run(obs_id: u64) -> (ObservationRecord, RunData) {
        let coord = SkyCoord::new(83.63, 22.01);
        let record = ObservationRecord {
            obs_id,
            object: "Crab".to_string(),
            tstart_mjd: 60000.0,
            tstop_mjd: 60000.02,
            livetime_s: 1600.0,
            ontime_s: 1700.0,
            deadc: 0.94,
            pointing: coord.offset_by(0.0, 0.5),
            target: coord,
        };
        let data = RunData {
            obs_id,
            events: vec![Event {
                time_mjd: 60000.01,
                energy_tev: 1.2,
                ra: 83.6,
                dec: 22.0,
            }],
            gtis: vec![],
            rad_max_deg: Some(0.1),
            aeff: EffectiveAreaTable {
                energy_tev: vec![0.1, 100.0],
                area_m2: vec![1e4, 1e5],
            },
            edisp: EnergyDispersionTable {
                energy_tev: vec![0.1, 100.0],
                bias: vec![0.0, 0.0],
                resolution: vec![0.1, 0.1],
            },
        };
        (record, data)
    }

    #[test]
    fn round_trips_through_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        JsonDataStore::write(dir.path(), &[run(11), run(12)]).unwrap();

        let store = JsonDataStore::open(dir.path()).unwrap();
        let table = store.observation_table();
        assert_eq!(table.iter().map(|r| r.obs_id).collect::<Vec<_>>(), [11, 12]);
        assert_eq!(store.load_run(12).unwrap(), run(12).1);
    }

    #[test]
    fn missing_files_are_external_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonDataStore::open(dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::External);

        JsonDataStore::write(dir.path(), &[run(7)]).unwrap();
        std::fs::remove_file(dir.path().join("run_000007.json")).unwrap();
        let store = JsonDataStore::open(dir.path()).unwrap();
        assert_eq!(store.load_run(7).unwrap_err().kind(), crate::error::ErrorKind::External);
        assert_eq!(store.load_run(99).unwrap_err().kind(), crate::error::ErrorKind::External);
    }
}
