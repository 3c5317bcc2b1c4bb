//! Observation data store.
//!
//! The store provides the run index (`ObservationRecord`s) and loads the
//! event list plus point-like IRFs of each run on demand. Two backends:
//!
//! - `JsonDataStore`: a directory with `obs-index.json` and one JSON file per run
//! - `InMemoryStore`: runs held in memory (tests, simulator)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::ObservationRecord;
use crate::error::AppError;

pub mod irf;
pub mod json;

pub use irf::*;
pub use json::*;

/// One reconstructed gamma-like event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time_mjd: f64,
    pub energy_tev: f64,
    pub ra: f64,
    pub dec: f64,
}

/// Good time interval (MJD).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gti {
    pub start_mjd: f64,
    pub stop_mjd: f64,
}

/// Event list and responses of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    pub obs_id: u64,
    pub events: Vec<Event>,
    pub gtis: Vec<Gti>,
    /// Point-spread containment radius stored with the IRFs, if any.
    pub rad_max_deg: Option<f64>,
    pub aeff: EffectiveAreaTable,
    pub edisp: EnergyDispersionTable,
}

impl RunData {
    /// Events inside any GTI (all events when no GTI is listed).
    pub fn events_in_gti(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|ev| {
            self.gtis.is_empty()
                || self
                    .gtis
                    .iter()
                    .any(|g| ev.time_mjd >= g.start_mjd && ev.time_mjd <= g.stop_mjd)
        })
    }
}

/// Source of observation metadata and run payloads.
pub trait DataStore {
    fn observation_table(&self) -> Vec<ObservationRecord>;
    fn load_run(&self, obs_id: u64) -> Result<RunData, AppError>;
}

/// One selected run with its payload.
#[derive(Debug, Clone)]
pub struct Observation {
    pub record: ObservationRecord,
    pub data: RunData,
}

/// Selected runs, in selection order.
#[derive(Debug, Clone, Default)]
pub struct ObservationSet {
    pub observations: Vec<Observation>,
}

impl ObservationSet {
    /// Load the payload of every record; a missing run is fatal.
    pub fn load(store: &dyn DataStore, records: &[ObservationRecord]) -> Result<Self, AppError> {
        let observations = records
            .iter()
            .map(|record| {
                Ok(Observation {
                    record: record.clone(),
                    data: store.load_run(record.obs_id)?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        Ok(Self { observations })
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn obs_ids(&self) -> Vec<u64> {
        self.observations.iter().map(|o| o.record.obs_id).collect()
    }

    pub fn records(&self) -> Vec<ObservationRecord> {
        self.observations.iter().map(|o| o.record.clone()).collect()
    }

    /// Subset keeping the given run ids, preserving order.
    pub fn subset(&self, obs_ids: &[u64]) -> ObservationSet {
        ObservationSet {
            observations: self
                .observations
                .iter()
                .filter(|o| obs_ids.contains(&o.record.obs_id))
                .cloned()
                .collect(),
        }
    }
}

/// Runs kept in memory, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Vec<ObservationRecord>,
    runs: BTreeMap<u64, RunData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ObservationRecord, data: RunData) {
        self.runs.insert(record.obs_id, data);
        self.records.push(record);
    }

    pub fn runs(&self) -> impl Iterator<Item = (&ObservationRecord, &RunData)> {
        self.records
            .iter()
            .filter_map(|r| self.runs.get(&r.obs_id).map(|d| (r, d)))
    }
}

impl DataStore for InMemoryStore {
    fn observation_table(&self) -> Vec<ObservationRecord> {
        self.records.clone()
    }

    fn load_run(&self, obs_id: u64) -> Result<RunData, AppError> {
        self.runs
            .get(&obs_id)
            .cloned()
            .ok_or_else(|| AppError::external(format!("Run {obs_id} is not in the data store.")))
    }
}
