//! Flux points: one norm re-fit per reconstructed-energy bin.
//!
//! The spectral shape is frozen at the joint best fit. In bin `i` the
//! predicted signal of every run scales as `norm · npred_best[i]`, and the
//! Wstat of all runs' bin `i` is profiled in `norm`. The flux point is
//! `norm · dnde_best(e_ref)` at the geometric bin center.

use serde::Serialize;

use crate::domain::FluxPointOptions;
use crate::fit::{FitResult, NormProfile, NormScanOptions, profile_norm};
use crate::reduction::DatasetCollection;
use crate::report::Reporter;
use crate::stats::wstat;

const STAGE: &str = "flux points";

/// One energy bin of a flux-point set. Quantities that could not be
/// determined are `None`, never NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FluxPoint {
    pub e_min: f64,
    pub e_max: f64,
    pub e_ref: f64,
    /// Best-fit model at `e_ref` (TeV⁻¹ cm⁻² s⁻¹).
    pub ref_dnde: f64,
    pub norm: Option<f64>,
    pub norm_err: Option<f64>,
    pub norm_ul: Option<f64>,
    pub dnde: Option<f64>,
    pub dnde_err: Option<f64>,
    pub dnde_ul: Option<f64>,
    pub ts: f64,
    pub sqrt_ts: f64,
    pub is_ul: bool,
    pub success: bool,
    pub counts: f64,
    pub npred: f64,
}

impl FluxPoint {
    /// Value to plot: the upper limit for non-detections, otherwise the flux.
    pub fn plotted_dnde(&self) -> Option<f64> {
        if self.is_ul { self.dnde_ul } else { self.dnde }
    }
}

/// Flux points for every reconstructed bin of the collection.
pub fn estimate_flux_points(
    collection: &DatasetCollection,
    fit: &FitResult,
    opts: &FluxPointOptions,
) -> Vec<FluxPoint> {
    let axes = &collection.axes;
    let scan = NormScanOptions {
        norm_min: opts.norm_min,
        norm_max: opts.norm_max,
        n_values: opts.norm_n_values,
        n_sigma: opts.n_sigma,
        n_sigma_ul: opts.n_sigma_ul,
    };

    (0..axes.reco.n_bins())
        .map(|i| {
            let (e_min, e_max) = (axes.reco.lo(i), axes.reco.hi(i));
            let e_ref = (e_min * e_max).sqrt();
            let ref_dnde = fit.model.dnde(e_ref);

            // (counts, off, alpha, npred at norm 1) of every run using bin i.
            let terms: Vec<(f64, f64, f64, f64)> = collection
                .datasets
                .iter()
                .zip(&fit.npred)
                .filter(|(d, _)| d.mask(i))
                .map(|(d, npred)| (d.counts[i], d.counts_off[i], d.alpha[i], npred[i]))
                .collect();
            let counts: f64 = terms.iter().map(|t| t.0).sum();
            let npred: f64 = terms.iter().map(|t| t.3).sum();

            let profile = if terms.is_empty() || !(npred > 0.0) || !(ref_dnde > 0.0) {
                None
            } else {
                let stat = |norm: f64| -> f64 {
                    terms
                        .iter()
                        .map(|&(n_on, n_off, alpha, mu)| wstat(n_on, n_off, alpha, norm * mu))
                        .sum()
                };
                Some(profile_norm(stat, &scan))
            };
            build_point(e_min, e_max, e_ref, ref_dnde, counts, npred, profile, opts)
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn build_point(
    e_min: f64,
    e_max: f64,
    e_ref: f64,
    ref_dnde: f64,
    counts: f64,
    npred: f64,
    profile: Option<NormProfile>,
    opts: &FluxPointOptions,
) -> FluxPoint {
    let Some(p) = profile else {
        return FluxPoint {
            e_min,
            e_max,
            e_ref,
            ref_dnde: if ref_dnde.is_finite() { ref_dnde } else { 0.0 },
            norm: None,
            norm_err: None,
            norm_ul: None,
            dnde: None,
            dnde_err: None,
            dnde_ul: None,
            ts: 0.0,
            sqrt_ts: 0.0,
            is_ul: false,
            success: false,
            counts,
            npred,
        };
    };
    let scaled = |v: Option<f64>| v.map(|x| x * ref_dnde).filter(|x| x.is_finite());
    FluxPoint {
        e_min,
        e_max,
        e_ref,
        ref_dnde,
        norm: p.norm,
        norm_err: p.norm_err,
        norm_ul: p.norm_ul,
        dnde: scaled(p.norm),
        dnde_err: scaled(p.norm_err),
        dnde_ul: scaled(p.norm_ul),
        ts: p.ts,
        sqrt_ts: p.sqrt_ts,
        is_ul: p.sqrt_ts < opts.sqrt_ts_threshold_ul,
        success: p.success,
        counts,
        npred,
    }
}

/// Report bins that ended up without a usable estimate.
pub fn report_flux_points(points: &[FluxPoint], reporter: &mut dyn Reporter) {
    let n_ul = points.iter().filter(|p| p.is_ul).count();
    let failed: Vec<String> = points
        .iter()
        .filter(|p| !p.success)
        .map(|p| format!("{:.3}-{:.3} TeV", p.e_min, p.e_max))
        .collect();
    reporter.record(
        STAGE,
        "points",
        &format!("{} bins, {} upper limits", points.len(), n_ul),
    );
    if !failed.is_empty() {
        reporter.warn(
            STAGE,
            &format!("No norm estimate in {} bins: {}", failed.len(), failed.join(", ")),
        );
    }
}
