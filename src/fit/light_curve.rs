//! Integral-flux light curve with the spectral shape fixed at the all-data
//! best fit.
//!
//! In each time interval only the overall norm is re-fitted, using the runs
//! that start inside the interval and the reconstructed bins whose centers lie
//! in the light-curve energy range.

use serde::Serialize;

use crate::domain::{FluxPointOptions, LightCurveOptions, ObservationRecord, TimeBin};
use crate::error::AppError;
use crate::fit::{FitResult, NormScanOptions, profile_norm};
use crate::reduction::DatasetCollection;
use crate::stats::wstat;
use crate::timebins::bin_contains_start;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightCurvePoint {
    pub time_min: f64,
    pub time_max: f64,
    pub n_runs: usize,
    /// Integral flux over the light-curve energy range (cm⁻² s⁻¹).
    pub flux: Option<f64>,
    pub flux_err: Option<f64>,
    pub flux_ul: Option<f64>,
    pub is_ul: bool,
    pub ts: f64,
    pub sqrt_ts: f64,
    pub success: bool,
}

/// Light-curve intervals: fixed-width bins from the start (or earliest run
/// start) to the latest run stop, or one interval per run.
pub fn light_curve_intervals(
    records: &[ObservationRecord],
    opts: &LightCurveOptions,
) -> Result<Vec<TimeBin>, AppError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let Some(days) = opts.bin_duration_days else {
        let mut bins: Vec<TimeBin> = records
            .iter()
            .map(|r| TimeBin::new(r.tstart_mjd, r.tstop_mjd))
            .collect();
        bins.sort_by(|a, b| a.start.total_cmp(&b.start));
        return Ok(bins);
    };
    if !(days.is_finite() && days > 0.0) {
        return Err(AppError::configuration(format!(
            "Light-curve bin duration must be positive (got {days})."
        )));
    }
    let first = records.iter().map(|r| r.tstart_mjd).fold(f64::INFINITY, f64::min);
    let start = opts.start_mjd.unwrap_or(first);
    let end = records.iter().map(|r| r.tstop_mjd).fold(f64::NEG_INFINITY, f64::max);
    if !(end > start) {
        return Err(AppError::configuration(format!(
            "Light-curve start {start} is after the last run stop {end}."
        )));
    }
    let n = ((end - start) / days).ceil().max(1.0) as usize;
    Ok((0..n)
        .map(|k| TimeBin::new(start + k as f64 * days, start + (k + 1) as f64 * days))
        .collect())
}

/// One norm profile per interval over `[e_min, e_max]`.
pub fn estimate_light_curve(
    collection: &DatasetCollection,
    fit: &FitResult,
    intervals: &[TimeBin],
    e_min: f64,
    e_max: f64,
    opts: &LightCurveOptions,
    flux_opts: &FluxPointOptions,
) -> Vec<LightCurvePoint> {
    let reco = &collection.axes.reco;
    let bins: Vec<usize> = (0..reco.n_bins())
        .filter(|&i| (e_min..=e_max).contains(&reco.center(i)))
        .collect();
    let ref_flux = fit.model.integral(e_min, e_max);
    let scan = NormScanOptions {
        norm_min: flux_opts.norm_min,
        norm_max: flux_opts.norm_max,
        n_values: flux_opts.norm_n_values,
        n_sigma: flux_opts.n_sigma,
        n_sigma_ul: opts.n_sigma_ul,
    };

    (0..intervals.len())
        .map(|k| {
            let interval = intervals[k];
            let members: Vec<usize> = collection
                .datasets
                .iter()
                .enumerate()
                .filter(|(_, d)| bin_contains_start(intervals, k, d.tstart_mjd))
                .map(|(j, _)| j)
                .collect();
            let terms: Vec<(f64, f64, f64, f64)> = members
                .iter()
                .flat_map(|&j| {
                    let d = &collection.datasets[j];
                    let npred = &fit.npred[j];
                    bins.iter()
                        .filter(|&&i| d.mask(i))
                        .map(move |&i| (d.counts[i], d.counts_off[i], d.alpha[i], npred[i]))
                })
                .collect();
            let npred_total: f64 = terms.iter().map(|t| t.3).sum();

            let mut point = LightCurvePoint {
                time_min: interval.start,
                time_max: interval.end,
                n_runs: members.len(),
                flux: None,
                flux_err: None,
                flux_ul: None,
                is_ul: false,
                ts: 0.0,
                sqrt_ts: 0.0,
                success: false,
            };
            if terms.is_empty() || !(npred_total > 0.0) || !(ref_flux > 0.0) {
                return point;
            }
            let stat = |norm: f64| -> f64 {
                terms
                    .iter()
                    .map(|&(n_on, n_off, alpha, mu)| wstat(n_on, n_off, alpha, norm * mu))
                    .sum()
            };
            let p = profile_norm(stat, &scan);
            let scaled = |v: Option<f64>| v.map(|x| x * ref_flux).filter(|x| x.is_finite());
            point.flux = scaled(p.norm);
            point.flux_err = scaled(p.norm_err);
            point.flux_ul = scaled(p.norm_ul);
            point.ts = p.ts;
            point.sqrt_ts = p.sqrt_ts;
            point.is_ul = p.sqrt_ts < flux_opts.sqrt_ts_threshold_ul;
            point.success = p.success;
            point
        })
        .collect()
}

/// Mean flux of the detected (non upper-limit) points.
pub fn mean_flux(points: &[LightCurvePoint]) -> Option<f64> {
    let fluxes: Vec<f64> = points
        .iter()
        .filter(|p| !p.is_ul)
        .filter_map(|p| p.flux)
        .collect();
    (!fluxes.is_empty()).then(|| fluxes.iter().sum::<f64>() / fluxes.len() as f64)
}
