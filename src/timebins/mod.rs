//! Time intervals and the per-interval re-analysis loop.
//!
//! Runs are assigned to intervals by their start time only; a run is never
//! split. Intervals are half-open `[start, end)`, except that an interval
//! whose end is not the start of another interval also includes its end, so
//! contiguous bins never share a boundary run and isolated bins keep a run
//! starting exactly at their end.

use std::path::Path;

use serde::Serialize;

use crate::domain::{ObservationRecord, TimeBin};
use crate::error::{AppError, ErrorKind};
use crate::fit::FitResult;
use crate::report::Reporter;
use crate::store::ObservationSet;

const STAGE: &str = "time bins";

/// Parse whitespace-separated `start end` pairs; `#` starts a comment.
pub fn parse_time_bins(text: &str) -> Result<Vec<TimeBin>, AppError> {
    let mut bins = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(AppError::configuration(format!(
                "Time-bin line {}: expected 'start end', got '{line}'.",
                lineno + 1
            )));
        }
        let parse = |s: &str| {
            s.parse::<f64>().map_err(|_| {
                AppError::configuration(format!("Time-bin line {}: '{s}' is not a number.", lineno + 1))
            })
        };
        bins.push(TimeBin::new(parse(fields[0])?, parse(fields[1])?));
    }
    Ok(bins)
}

pub fn read_time_bin_file(path: &Path) -> Result<Vec<TimeBin>, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::configuration(format!("Failed to read time-bin file '{}': {e}", path.display()))
    })?;
    let bins = parse_time_bins(&text)?;
    validate_time_bins(&bins)?;
    Ok(bins)
}

/// Bins must be finite, non-empty, and must not overlap once sorted.
pub fn validate_time_bins(bins: &[TimeBin]) -> Result<(), AppError> {
    for b in bins {
        if !(b.start.is_finite() && b.end.is_finite()) || b.start >= b.end {
            return Err(AppError::configuration(format!(
                "Invalid time bin {b}: start must be finite and before end."
            )));
        }
    }
    let mut sorted = bins.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
    if let Some(pair) = sorted.windows(2).find(|w| w[1].start < w[0].end) {
        return Err(AppError::configuration(format!(
            "Time bins {} and {} overlap.",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Contiguous bins of `days` from the earliest to past the latest start time.
pub fn auto_time_bins(starts: &[f64], days: f64) -> Result<Vec<TimeBin>, AppError> {
    if !(days.is_finite() && days > 0.0) {
        return Err(AppError::configuration(format!(
            "Time-bin duration must be positive (got {days})."
        )));
    }
    let first = starts.iter().copied().fold(f64::INFINITY, f64::min);
    let last = starts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(first.is_finite() && last.is_finite()) {
        return Ok(Vec::new());
    }
    let n = ((last - first) / days).floor() as usize + 1;
    Ok((0..n)
        .map(|k| TimeBin::new(first + k as f64 * days, first + (k + 1) as f64 * days))
        .collect())
}

/// Whether a run starting at `t` belongs to `bins[idx]`.
pub fn bin_contains_start(bins: &[TimeBin], idx: usize, t: f64) -> bool {
    let bin = &bins[idx];
    if t < bin.start || t > bin.end {
        return false;
    }
    if t < bin.end {
        return true;
    }
    // t == end: only if no other bin starts there.
    !bins
        .iter()
        .enumerate()
        .any(|(k, other)| k != idx && other.start == bin.end)
}

/// Runs of `records` belonging to each bin, in record order.
pub fn assign_runs(bins: &[TimeBin], records: &[ObservationRecord]) -> Vec<Vec<u64>> {
    (0..bins.len())
        .map(|idx| {
            records
                .iter()
                .filter(|r| bin_contains_start(bins, idx, r.tstart_mjd))
                .map(|r| r.obs_id)
                .collect()
        })
        .collect()
}

/// Fit of one time bin.
#[derive(Debug, Clone)]
pub struct TimeBinOutcome {
    pub bin: TimeBin,
    pub obs_ids: Vec<u64>,
    pub fit: FitResult,
}

/// Run `analyse` on each bin's runs in isolation.
///
/// Bins without runs, and bins whose analysis reports degenerate data, are
/// skipped with a warning; any other error aborts.
pub fn orchestrate<F>(
    bins: &[TimeBin],
    observations: &ObservationSet,
    reporter: &mut dyn Reporter,
    mut analyse: F,
) -> Result<Vec<TimeBinOutcome>, AppError>
where
    F: FnMut(&TimeBin, &ObservationSet, &mut dyn Reporter) -> Result<FitResult, AppError>,
{
    let assignment = assign_runs(bins, &observations.records());
    let mut outcomes = Vec::new();
    for (bin, obs_ids) in bins.iter().zip(assignment) {
        if obs_ids.is_empty() {
            reporter.warn(STAGE, &format!("Time bin {bin}: no runs, skipped."));
            continue;
        }
        reporter.record(
            STAGE,
            &bin.label(),
            &format!(
                "{} runs: {}",
                obs_ids.len(),
                obs_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
            ),
        );
        let subset = observations.subset(&obs_ids);
        match analyse(bin, &subset, reporter) {
            Ok(fit) => outcomes.push(TimeBinOutcome {
                bin: *bin,
                obs_ids,
                fit,
            }),
            Err(e) if e.kind() == ErrorKind::DegenerateData => {
                reporter.warn(STAGE, &format!("Time bin {bin}: {}; skipped.", e.message()));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcomes)
}

/// One parameter of one bin in the drift summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftValue {
    pub name: String,
    pub value: f64,
    pub error: Option<f64>,
}

/// Free-parameter values of one bin, for the variability table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariabilityRow {
    pub start: f64,
    pub end: f64,
    pub n_runs: usize,
    pub success: bool,
    pub values: Vec<DriftValue>,
}

/// Drift of every free parameter, sorted by bin mid time.
pub fn parameter_drift(outcomes: &[TimeBinOutcome]) -> Vec<VariabilityRow> {
    let mut rows: Vec<VariabilityRow> = outcomes
        .iter()
        .map(|o| VariabilityRow {
            start: o.bin.start,
            end: o.bin.end,
            n_runs: o.obs_ids.len(),
            success: o.fit.success,
            values: o
                .fit
                .free_parameters()
                .into_iter()
                .map(|p| DriftValue {
                    name: p.name.clone(),
                    value: p.value,
                    error: p.error,
                })
                .collect(),
        })
        .collect();
    rows.sort_by(|a, b| (a.start + a.end).total_cmp(&(b.start + b.end)));
    rows
}

/// Pearson correlation of two parameters across bins (needs ≥ 3 bins).
pub fn parameter_correlation(rows: &[VariabilityRow], a: &str, b: &str) -> Option<f64> {
    let pick = |row: &VariabilityRow, name: &str| row.values.iter().find(|v| v.name == name).map(|v| v.value);
    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| Some((pick(r, a)?, pick(r, b)?)))
        .collect();
    if pairs.len() < 3 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let sxy: f64 = pairs.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    let sxx: f64 = pairs.iter().map(|p| (p.0 - mx).powi(2)).sum();
    let syy: f64 = pairs.iter().map(|p| (p.1 - my).powi(2)).sum();
    let r = sxy / (sxx * syy).sqrt();
    r.is_finite().then_some(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SkyCoord;
    use crate::report::MemoryReporter;

    fn record(obs_id: u64, tstart: f64) -> ObservationRecord {
        let target = SkyCoord::new(83.6, 22.0);
        ObservationRecord {
            obs_id,
            object: "Crab".into(),
            tstart_mjd: tstart,
            tstop_mjd: tstart + 0.02,
            livetime_s: 1500.0,
            ontime_s: 1600.0,
            deadc: 0.94,
            pointing: target.offset_by(0.0, 0.5),
            target,
        }
    }

    #[test]
    fn parses_bins_with_comments() {
        let bins = parse_time_bins("# start end\n60000 60001\n\n60001.5 60002 # second\n").unwrap();
        assert_eq!(bins, vec![TimeBin::new(60000.0, 60001.0), TimeBin::new(60001.5, 60002.0)]);
        assert!(parse_time_bins("60000\n").is_err());
        assert!(parse_time_bins("60000 abc\n").is_err());
    }

    #[test]
    fn validation_rejects_inverted_and_overlapping_bins() {
        assert!(validate_time_bins(&[TimeBin::new(2.0, 1.0)]).is_err());
        assert!(validate_time_bins(&[TimeBin::new(0.0, 2.0), TimeBin::new(1.0, 3.0)]).is_err());
        // Unsorted but disjoint is fine.
        assert!(validate_time_bins(&[TimeBin::new(2.0, 3.0), TimeBin::new(0.0, 2.0)]).is_ok());
    }

    #[test]
    fn contiguous_bins_assign_each_run_exactly_once() {
        let records: Vec<ObservationRecord> = [60000.0, 60000.5, 60001.0, 60002.0, 60003.7]
            .iter()
            .enumerate()
            .map(|(k, &t)| record(k as u64, t))
            .collect();
        let starts: Vec<f64> = records.iter().map(|r| r.tstart_mjd).collect();
        let bins = auto_time_bins(&starts, 1.0).unwrap();
        assert_eq!(bins.len(), 4);
        let assigned = assign_runs(&bins, &records);
        let mut all: Vec<u64> = assigned.iter().flatten().copied().collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4]);
        assert_eq!(assigned[0], vec![0, 1]);
        assert_eq!(assigned[1], vec![2]);
    }

    #[test]
    fn isolated_bin_includes_its_end() {
        let bins = [TimeBin::new(0.0, 1.0)];
        assert!(bin_contains_start(&bins, 0, 1.0));
        let bins = [TimeBin::new(0.0, 1.0), TimeBin::new(1.0, 2.0)];
        assert!(!bin_contains_start(&bins, 0, 1.0));
        assert!(bin_contains_start(&bins, 1, 1.0));
    }

    #[test]
    fn empty_and_degenerate_bins_are_skipped() {
        use crate::store::{Observation, RunData};
        let data = |obs_id| RunData {
            obs_id,
            events: vec![],
            gtis: vec![],
            rad_max_deg: None,
            aeff: crate::sim::default_aeff(),
            edisp: crate::sim::default_edisp(),
        };
        let observations = ObservationSet {
            observations: vec![
                Observation { record: record(1, 10.0), data: data(1) },
                Observation { record: record(2, 30.0), data: data(2) },
            ],
        };
        let bins = [TimeBin::new(0.0, 20.0), TimeBin::new(20.0, 25.0), TimeBin::new(25.0, 40.0)];
        let mut reporter = MemoryReporter::new();
        let mut calls = Vec::new();
        let outcomes = orchestrate(&bins, &observations, &mut reporter, |bin, obs, _| {
            calls.push((bin.start, obs.obs_ids()));
            Err(AppError::degenerate("nothing to fit"))
        })
        .unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(calls, vec![(0.0, vec![1]), (25.0, vec![2])]);
        assert_eq!(reporter.warnings().len(), 3);
    }

    #[test]
    fn correlation_of_linear_drift_is_one() {
        let rows: Vec<VariabilityRow> = (0..4)
            .map(|k| VariabilityRow {
                start: k as f64,
                end: k as f64 + 1.0,
                n_runs: 1,
                success: true,
                values: vec![
                    DriftValue { name: "index".into(), value: 2.0 + 0.1 * k as f64, error: None },
                    DriftValue { name: "amplitude".into(), value: 1e-12 * (1.0 - 0.1 * k as f64), error: None },
                ],
            })
            .collect();
        let r = parameter_correlation(&rows, "index", "amplitude").unwrap();
        assert!((r + 1.0).abs() < 1e-9);
        assert!(parameter_correlation(&rows[..2], "index", "amplitude").is_none());
    }
}
