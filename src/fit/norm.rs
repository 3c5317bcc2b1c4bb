//! One-dimensional likelihood profile of a normalisation factor.
//!
//! Flux points and light-curve points re-fit only an overall norm with the
//! spectral shape held fixed. Predicted counts are linear in the norm, so the
//! profile is a cheap function of one variable. We:
//!
//! 1. scan a coarse grid over `[norm_min, norm_max]`
//! 2. refine the best grid cell with golden-section search
//! 3. find the `Δstat = n_sigma²` crossings on each side for the errors, and
//!    the `Δstat = n_sigma_ul²` crossing above the best fit for the upper limit
//!
//! The wide grid keeps bins with no excess from wandering off to divergent
//! solutions; infeasible norms (negative total expectation) evaluate to `+∞`
//! and are simply skipped by the scan.

use serde::Serialize;

use crate::math::{bisect_crossing, golden_section};

#[derive(Debug, Clone)]
pub struct NormScanOptions {
    pub norm_min: f64,
    pub norm_max: f64,
    pub n_values: usize,
    pub n_sigma: f64,
    pub n_sigma_ul: f64,
}

/// Result of a norm profile; every value is finite or absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormProfile {
    pub norm: Option<f64>,
    pub norm_err: Option<f64>,
    pub norm_errn: Option<f64>,
    pub norm_errp: Option<f64>,
    pub norm_ul: Option<f64>,
    /// `stat(0) - stat(best)`, never negative.
    pub ts: f64,
    /// Signed square root of `ts` (sign of the best-fit norm).
    pub sqrt_ts: f64,
    pub stat_best: Option<f64>,
    pub success: bool,
}

impl NormProfile {
    fn failed() -> Self {
        Self {
            norm: None,
            norm_err: None,
            norm_errn: None,
            norm_errp: None,
            norm_ul: None,
            ts: 0.0,
            sqrt_ts: 0.0,
            stat_best: None,
            success: false,
        }
    }
}

const TOL: f64 = 1e-6;

/// Profile `stat(norm)`.
pub fn profile_norm(stat: impl Fn(f64) -> f64, opts: &NormScanOptions) -> NormProfile {
    let n = opts.n_values.max(3);
    let (lo, hi) = (opts.norm_min, opts.norm_max);
    if !(lo.is_finite() && hi.is_finite() && hi > lo) {
        return NormProfile::failed();
    }
    let step = (hi - lo) / (n - 1) as f64;
    let grid: Vec<f64> = (0..n).map(|k| lo + step * k as f64).collect();
    let values: Vec<f64> = grid.iter().map(|&x| stat(x)).collect();

    let Some(k_best) = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, _)| k)
    else {
        return NormProfile::failed();
    };

    let a = grid[k_best.saturating_sub(1)];
    let b = grid[(k_best + 1).min(n - 1)];
    let (mut norm, mut stat_best) = golden_section(&stat, a, b, TOL);
    if !(stat_best.is_finite() && stat_best <= values[k_best]) {
        norm = grid[k_best];
        stat_best = values[k_best];
    }

    let stat_null = stat(0.0);
    let ts = if stat_null.is_finite() {
        (stat_null - stat_best).max(0.0)
    } else {
        0.0
    };
    let sqrt_ts = if norm < 0.0 { -ts.sqrt() } else { ts.sqrt() };

    let delta = opts.n_sigma * opts.n_sigma;
    let errn = bisect_crossing(&stat, lo, norm, stat_best + delta, TOL).map(|x| norm - x);
    let errp = bisect_crossing(&stat, norm, hi, stat_best + delta, TOL).map(|x| x - norm);
    let norm_err = match (errn, errp) {
        (Some(n), Some(p)) => Some(0.5 * (n + p)),
        (Some(e), None) | (None, Some(e)) => Some(e),
        (None, None) => None,
    };
    let delta_ul = opts.n_sigma_ul * opts.n_sigma_ul;
    let norm_ul = bisect_crossing(&stat, norm, hi, stat_best + delta_ul, TOL);

    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
    NormProfile {
        norm: Some(norm).filter(|x| x.is_finite()),
        norm_err: finite(norm_err),
        norm_errn: finite(errn),
        norm_errp: finite(errp),
        norm_ul: finite(norm_ul),
        ts,
        sqrt_ts,
        stat_best: Some(stat_best),
        success: norm.is_finite() && norm_err.is_some(),
    }
}
