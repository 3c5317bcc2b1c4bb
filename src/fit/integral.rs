//! Integral flux of a fitted model with a covariance-propagated error.

use serde::Serialize;

use crate::fit::FitResult;

/// Upper integration bound (TeV).
pub const INTEGRAL_FLUX_MAX_ENERGY_TEV: f64 = 5000.0;

const QUADRATURE_INTERVALS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegralFlux {
    pub e_min: f64,
    pub e_max: f64,
    /// cm⁻² s⁻¹
    pub flux: f64,
    pub flux_err: Option<f64>,
}

/// `∫ dnde dE` over `[e_min, e_max]`, with `σ² = gᵀ C g` where `g` is the
/// gradient with respect to the free parameters.
pub fn integral_flux(fit: &FitResult, e_min: f64, e_max: f64) -> IntegralFlux {
    let model = &fit.model;
    let flux = model.integral_with(e_min, e_max, QUADRATURE_INTERVALS);

    let flux_err = fit.covariance.as_ref().and_then(|cov| {
        let values = model.free_values();
        let scales = model.free_scales();
        let grad: Vec<f64> = (0..values.len())
            .map(|k| {
                let h = 1e-4 * scales[k];
                let mut shifted = model.clone();
                let mut v = values.clone();
                v[k] = values[k] + h;
                shifted.set_free_values(&v);
                let up = shifted.integral_with(e_min, e_max, QUADRATURE_INTERVALS);
                v[k] = values[k] - h;
                shifted.set_free_values(&v);
                let down = shifted.integral_with(e_min, e_max, QUADRATURE_INTERVALS);
                (up - down) / (2.0 * h)
            })
            .collect();
        let var: f64 = (0..grad.len())
            .flat_map(|i| (0..grad.len()).map(move |j| (i, j)))
            .map(|(i, j)| grad[i] * cov[i][j] * grad[j])
            .sum();
        (var.is_finite() && var >= 0.0).then(|| var.sqrt())
    });

    IntegralFlux {
        e_min,
        e_max,
        flux,
        flux_err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::FittedParameter;
    use crate::models::{ModelExpr, ModelKind, ModelParameterConfig, build_spectral_model};

    fn fit_with(cov: Option<Vec<Vec<f64>>>) -> FitResult {
        let mut model =
            build_spectral_model(&ModelExpr::Single(ModelKind::PowerLaw), &ModelParameterConfig::default(), "src")
                .unwrap();
        model.set_free_values(&[2.0, 1e-12]);
        FitResult {
            success: true,
            message: String::new(),
            n_iter: 1,
            n_fev: 1,
            total_stat: 0.0,
            n_bins: 1,
            parameters: Vec::<FittedParameter>::new(),
            free_names: model.free_names(),
            covariance: cov,
            npred: vec![],
            model,
        }
    }

    #[test]
    fn power_law_integral_matches_closed_form() {
        let r = integral_flux(&fit_with(None), 0.2, INTEGRAL_FLUX_MAX_ENERGY_TEV);
        let expected = 1e-12 * (1.0 / 0.2 - 1.0 / 5000.0);
        assert!((r.flux / expected - 1.0).abs() < 1e-4, "{} {expected}", r.flux);
        assert!(r.flux_err.is_none());
    }

    #[test]
    fn amplitude_error_propagates_linearly() {
        // 10% amplitude error, no index error: 10% flux error.
        let cov = vec![vec![0.0, 0.0], vec![0.0, (1e-13f64).powi(2)]];
        let r = integral_flux(&fit_with(Some(cov)), 1.0, 10.0);
        assert!((r.flux_err.unwrap() / r.flux - 0.1).abs() < 1e-4);
    }
}
