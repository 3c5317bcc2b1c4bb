//! Cumulative on/off statistics over a dataset collection.

use serde::Serialize;

use crate::domain::ObservationRecord;
use crate::reduction::{DatasetCollection, SpectrumDatasetOnOff};
use crate::stats::li_ma_significance;

/// One row of an on/off statistics table.
///
/// In a cumulative table `name` is the last run added and every count is the
/// running sum up to and including that run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoRow {
    pub name: String,
    pub livetime_s: f64,
    pub counts: f64,
    pub counts_off: f64,
    /// Effective ratio `Σ(α·off) / Σoff`.
    pub alpha: f64,
    pub background: f64,
    pub excess: f64,
    pub sqrt_ts: f64,
}

impl InfoRow {
    fn from_totals(name: &str, livetime_s: f64, counts: f64, counts_off: f64, background: f64) -> Self {
        let alpha = if counts_off > 0.0 { background / counts_off } else { 0.0 };
        Self {
            name: name.to_string(),
            livetime_s,
            counts,
            counts_off,
            alpha,
            background,
            excess: counts - background,
            sqrt_ts: li_ma_significance(counts, counts_off, alpha),
        }
    }

    /// Statistics of one dataset alone.
    pub fn for_dataset(ds: &SpectrumDatasetOnOff) -> Self {
        let (on, off, bkg) = ds.masked_totals();
        Self::from_totals(&ds.name, ds.livetime_s, on, off, bkg)
    }
}

/// Running totals in collection order; the last row describes the whole
/// collection. Empty for an empty collection.
pub fn cumulative_info_table(collection: &DatasetCollection) -> Vec<InfoRow> {
    let mut rows = Vec::with_capacity(collection.len());
    let (mut livetime, mut on, mut off, mut bkg) = (0.0, 0.0, 0.0, 0.0);
    for ds in &collection.datasets {
        let (n_on, n_off, b) = ds.masked_totals();
        livetime += ds.livetime_s;
        on += n_on;
        off += n_off;
        bkg += b;
        rows.push(InfoRow::from_totals(&ds.name, livetime, on, off, bkg));
    }
    rows
}

/// Per-run statistics (the on/off counts export).
pub fn per_run_info_table(collection: &DatasetCollection) -> Vec<InfoRow> {
    collection.datasets.iter().map(InfoRow::for_dataset).collect()
}

/// Summary of the selected runs' metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDiagnostics {
    pub n_runs: usize,
    pub livetime_h: f64,
    pub ontime_h: f64,
    pub livetime_fraction: f64,
    pub deadc_min: f64,
    pub deadc_mean: f64,
    pub deadc_max: f64,
    pub offset_mean_deg: f64,
    pub offset_std_deg: f64,
}

pub fn run_diagnostics(records: &[ObservationRecord]) -> Option<RunDiagnostics> {
    if records.is_empty() {
        return None;
    }
    let n = records.len() as f64;
    let livetime_h = records.iter().map(|r| r.livetime_s).sum::<f64>() / 3600.0;
    let ontime_h = records.iter().map(|r| r.ontime_s).sum::<f64>() / 3600.0;
    let deadc: Vec<f64> = records.iter().map(|r| r.deadc).collect();
    let offsets: Vec<f64> = records.iter().map(|r| r.pointing_offset_deg()).collect();
    let offset_mean = offsets.iter().sum::<f64>() / n;
    let offset_var = offsets.iter().map(|o| (o - offset_mean).powi(2)).sum::<f64>() / n;

    Some(RunDiagnostics {
        n_runs: records.len(),
        livetime_h,
        ontime_h,
        livetime_fraction: if ontime_h > 0.0 { livetime_h / ontime_h } else { 0.0 },
        deadc_min: deadc.iter().copied().fold(f64::INFINITY, f64::min),
        deadc_mean: deadc.iter().sum::<f64>() / n,
        deadc_max: deadc.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        offset_mean_deg: offset_mean,
        offset_std_deg: offset_var.sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SkyCoord;
    use crate::reduction::dataset::tests::{axes, toy_dataset};

    fn collection(runs: &[(f64, f64)]) -> DatasetCollection {
        let axes = axes();
        let mut c = DatasetCollection::new(axes.clone());
        for (k, &(on, off)) in runs.iter().enumerate() {
            let mut counts = vec![0.0; 6];
            let mut counts_off = vec![0.0; 6];
            counts[2] = on;
            counts_off[2] = off;
            let mut ds = toy_dataset(&axes, counts, counts_off, 0.2);
            ds.name = format!("{}", k + 1);
            c.push(ds).unwrap();
        }
        c
    }

    #[test]
    fn cumulative_rows_accumulate_in_order() {
        let c = collection(&[(100.0, 400.0), (50.0, 200.0), (30.0, 100.0)]);
        let rows = cumulative_info_table(&c);
        assert_eq!(rows.len(), 3);
        let last = rows.last().unwrap();
        assert_eq!(last.name, "3");
        assert_eq!(last.counts, 180.0);
        assert_eq!(last.counts_off, 700.0);
        assert!((last.alpha - 0.2).abs() < 1e-12);
        assert!((last.excess - 40.0).abs() < 1e-9);
        assert!((last.livetime_s - 3.0 * 1800.0).abs() < 1e-9);
        assert!((rows[0].sqrt_ts - li_ma_significance(100.0, 400.0, 0.2)).abs() < 1e-12);
    }

    #[test]
    fn significance_grows_with_consistent_excess() {
        let c = collection(&[(100.0, 400.0); 4]);
        let rows = cumulative_info_table(&c);
        for pair in rows.windows(2) {
            assert!(pair[1].sqrt_ts >= pair[0].sqrt_ts);
        }
    }

    #[test]
    fn masked_bins_and_missing_background_are_ignored() {
        let mut c = collection(&[(100.0, 400.0)]);
        c.datasets[0].mask_safe[2] = false;
        let row = &per_run_info_table(&c)[0];
        assert_eq!(row.counts, 0.0);
        assert_eq!(row.alpha, 0.0);
        assert_eq!(row.sqrt_ts, 0.0);
    }

    #[test]
    fn run_diagnostics_summarise_metadata() {
        let target = SkyCoord::new(83.6, 22.0);
        let record = |obs_id, deadc: f64, offset| ObservationRecord {
            obs_id,
            object: "Crab".into(),
            tstart_mjd: 60000.0,
            tstop_mjd: 60000.02,
            livetime_s: 1800.0 * deadc,
            ontime_s: 1800.0,
            deadc,
            pointing: target.offset_by(0.0, offset),
            target,
        };
        let d = run_diagnostics(&[record(1, 0.9, 0.5), record(2, 0.8, 0.7)]).unwrap();
        assert!((d.ontime_h - 1.0).abs() < 1e-12);
        assert!((d.livetime_fraction - 0.85).abs() < 1e-12);
        assert_eq!((d.deadc_min, d.deadc_max), (0.8, 0.9));
        assert!((d.offset_mean_deg - 0.6).abs() < 1e-6);
        assert!((d.offset_std_deg - 0.1).abs() < 1e-6);
        assert!(run_diagnostics(&[]).is_none());
    }
}
