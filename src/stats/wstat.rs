//! On/off counting statistics.
//!
//! - `wstat`: Poisson on/off deviance with the background profiled out
//!   (Wstat, as used for spectral fitting of on/off datasets)
//! - `li_ma_significance`: Li & Ma (1983) Eq. 17 detection significance
//!
//! Both follow the `x·ln(x) → 0` conventions for empty bins so that
//! zero-count bins never produce NaN.

use crate::math::xlogx;

/// Profiled background expectation in the off region for a given signal
/// expectation `mu_sig`.
pub fn wstat_mu_bkg(n_on: f64, n_off: f64, alpha: f64, mu_sig: f64) -> f64 {
    if n_on == 0.0 {
        return n_off / (alpha + 1.0);
    }
    if n_off == 0.0 {
        let limit = n_on * alpha / (alpha + 1.0);
        return if mu_sig < limit {
            n_on / (1.0 + alpha) - mu_sig / alpha
        } else {
            0.0
        };
    }
    let c = alpha * (n_on + n_off) - (1.0 + alpha) * mu_sig;
    let d = (c * c + 4.0 * alpha * (alpha + 1.0) * n_off * mu_sig).sqrt();
    (c + d) / (2.0 * alpha * (alpha + 1.0))
}

/// Wstat deviance for one bin (including the goodness-of-fit terms, so a
/// perfect description gives zero).
///
/// Returns `+∞` for a non-positive `alpha`, a non-finite signal expectation or
/// a non-positive expectation where counts were observed. The profiled
/// background keeps the on expectation positive for any finite `mu_sig`.
pub fn wstat(n_on: f64, n_off: f64, alpha: f64, mu_sig: f64) -> f64 {
    if !(alpha > 0.0) || !mu_sig.is_finite() {
        return f64::INFINITY;
    }
    let mu_bkg = wstat_mu_bkg(n_on, n_off, alpha, mu_sig);
    let mu_on = mu_sig + alpha * mu_bkg;

    let term1 = mu_sig + (1.0 + alpha) * mu_bkg;
    let term2 = if n_on > 0.0 {
        if mu_on <= 0.0 {
            return f64::INFINITY;
        }
        -n_on * mu_on.ln()
    } else {
        0.0
    };
    let term3 = if n_off > 0.0 {
        if mu_bkg <= 0.0 {
            return f64::INFINITY;
        }
        -n_off * mu_bkg.ln()
    } else {
        0.0
    };

    let gof = 2.0 * ((xlogx(n_on) - n_on) + (xlogx(n_off) - n_off));
    let stat = 2.0 * (term1 + term2 + term3) + gof;
    if stat.is_finite() { stat } else { f64::INFINITY }
}

/// Signed Li & Ma significance of an on/off measurement.
///
/// `alpha` is the on/off exposure ratio. Degenerate inputs (no counts at all,
/// non-positive alpha) give zero.
pub fn li_ma_significance(n_on: f64, n_off: f64, alpha: f64) -> f64 {
    let total = n_on + n_off;
    if !(alpha > 0.0) || !(total > 0.0) {
        return 0.0;
    }
    let excess = n_on - alpha * n_off;
    if excess == 0.0 {
        return 0.0;
    }

    let t_on = if n_on > 0.0 {
        n_on * ((1.0 + alpha) * n_on / (alpha * total)).ln()
    } else {
        0.0
    };
    let t_off = if n_off > 0.0 {
        n_off * ((1.0 + alpha) * n_off / total).ln()
    } else {
        0.0
    };

    let ts = (2.0 * (t_on + t_off)).max(0.0);
    excess.signum() * ts.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn li_ma_reference_values() {
        // 100 on, 400 off, alpha 0.2: background 80, excess 20.
        let s = li_ma_significance(100.0, 400.0, 0.2);
        assert!((s - 1.951_08).abs() < 1e-4, "{s}");
        let s = li_ma_significance(13.0, 11.0, 0.5);
        assert!((s - 2.092_83).abs() < 1e-4, "{s}");
        let s = li_ma_significance(130.0, 1000.0, 0.1);
        assert!((s - 2.721_00).abs() < 1e-4, "{s}");
    }

    #[test]
    fn li_ma_is_negative_for_deficit_and_zero_without_excess() {
        assert!(li_ma_significance(50.0, 400.0, 0.2) < 0.0);
        assert_eq!(li_ma_significance(80.0, 400.0, 0.2), 0.0);
        assert_eq!(li_ma_significance(0.0, 0.0, 0.2), 0.0);
        assert!(li_ma_significance(5.0, 0.0, 0.2).is_finite());
        assert!(li_ma_significance(0.0, 10.0, 0.2).is_finite());
    }

    #[test]
    fn wstat_ts_reproduces_li_ma() {
        for &(n_on, n_off, alpha) in &[(100.0, 400.0, 0.2), (12.0, 30.0, 0.1), (3.0, 50.0, 0.05)] {
            let excess = n_on - alpha * n_off;
            let ts = wstat(n_on, n_off, alpha, 0.0) - wstat(n_on, n_off, alpha, excess);
            let s = li_ma_significance(n_on, n_off, alpha);
            assert!((ts.sqrt() - s.abs()).abs() < 1e-6, "ts={ts} s={s}");
        }
    }

    #[test]
    fn wstat_is_zero_at_best_fit_and_positive_elsewhere() {
        let (n_on, n_off, alpha) = (40.0, 100.0, 0.25);
        let best = n_on - alpha * n_off;
        assert!(wstat(n_on, n_off, alpha, best).abs() < 1e-9);
        assert!(wstat(n_on, n_off, alpha, best + 5.0) > 0.0);
        assert!(wstat(n_on, n_off, alpha, best - 5.0) > 0.0);
    }

    #[test]
    fn wstat_handles_empty_bins() {
        assert!(wstat(0.0, 0.0, 0.2, 0.0).abs() < 1e-12);
        assert!(wstat(0.0, 0.0, 0.2, 1.0).is_finite());
        assert!(wstat(0.0, 5.0, 0.2, 0.5).is_finite());
        assert!(wstat(3.0, 0.0, 0.2, 1.0).is_finite());
        // A strongly negative signal is absorbed by the profiled background.
        let deep = wstat(3.0, 5.0, 0.2, -50.0);
        assert!((deep - 461.53).abs() < 0.01, "{deep}");
        assert_eq!(wstat(3.0, 5.0, 0.0, 1.0), f64::INFINITY);
        assert_eq!(wstat(3.0, 5.0, 0.2, f64::NAN), f64::INFINITY);
    }
}
