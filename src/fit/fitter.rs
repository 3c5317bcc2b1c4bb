//! Joint maximum-likelihood fit of one spectral model to every dataset of a
//! collection.
//!
//! The objective is the summed Wstat deviance over all masked bins of all
//! runs; the model instance is shared, so every run constrains the same
//! parameters. We minimise on scaled free parameters (`value / scale`) and
//! convert the deviance Hessian into a covariance:
//!
//! - `cov_scaled = 2 · H⁻¹` (deviance = −2 ln L)
//! - `cov_ij = cov_scaled_ij · s_i · s_j`
//!
//! A non-converged fit is still returned (with `success = false`); callers
//! decide how loudly to flag it.

use serde::Serialize;

use crate::error::AppError;
use crate::math::{MinimizeOptions, invert_spd, minimize};
use crate::models::SpectralModel;
use crate::reduction::DatasetCollection;
use crate::report::Reporter;

const STAGE: &str = "fit";

/// A fitted parameter as reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedParameter {
    pub name: String,
    pub value: f64,
    pub error: Option<f64>,
    pub frozen: bool,
}

/// Outcome of a joint fit.
#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    pub success: bool,
    pub message: String,
    pub n_iter: usize,
    pub n_fev: usize,
    pub total_stat: f64,
    /// Bins that took part in the fit.
    pub n_bins: usize,
    pub parameters: Vec<FittedParameter>,
    pub free_names: Vec<String>,
    /// Covariance of the free parameters (physical units), if the Hessian was
    /// invertible.
    pub covariance: Option<Vec<Vec<f64>>>,
    /// Predicted signal counts per dataset and reconstructed bin.
    #[serde(skip)]
    pub npred: Vec<Vec<f64>>,
    pub model: SpectralModel,
}

impl FitResult {
    pub fn parameter(&self, name: &str) -> Option<&FittedParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.parameter(name).map(|p| p.value)
    }

    pub fn error(&self, name: &str) -> Option<f64> {
        self.parameter(name).and_then(|p| p.error)
    }

    /// Free parameters in fit order.
    pub fn free_parameters(&self) -> Vec<&FittedParameter> {
        self.free_names
            .iter()
            .filter_map(|n| self.parameter(n))
            .collect()
    }
}

/// Fit `model` jointly to every dataset in `collection`.
///
/// The fitted model is attached to the collection. Errors only when there is
/// nothing to fit.
pub fn fit_joint(
    collection: &mut DatasetCollection,
    model: &SpectralModel,
    opts: &MinimizeOptions,
) -> Result<FitResult, AppError> {
    let n_bins = collection.n_fit_bins();
    if collection.is_empty() || n_bins == 0 {
        return Err(AppError::degenerate("No energy bins with data to fit."));
    }

    let scales = model.free_scales();
    let x0: Vec<f64> = model
        .free_values()
        .iter()
        .zip(&scales)
        .map(|(v, s)| v / s)
        .collect();
    let bounds = model.free_bounds_scaled();

    let objective = |x: &[f64]| collection.total_stat(&model.with_scaled(x));
    let min = minimize(&objective, &x0, &bounds, opts);
    tracing::debug!(
        converged = min.converged,
        n_iter = min.n_iter,
        n_fev = min.n_fev,
        stat = min.fval,
        "joint fit finished"
    );

    let covariance = min.hessian.as_ref().and_then(invert_spd).map(|inv| {
        let n = scales.len();
        (0..n)
            .map(|i| (0..n).map(|j| 2.0 * inv[(i, j)] * scales[i] * scales[j]).collect())
            .collect::<Vec<Vec<f64>>>()
    });
    let errors: Vec<Option<f64>> = (0..scales.len())
        .map(|i| {
            covariance
                .as_ref()
                .map(|c| c[i][i])
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(f64::sqrt)
        })
        .collect();

    let mut fitted = model.with_scaled(&min.x);
    fitted.set_free_errors(&errors);

    let npred = collection
        .datasets
        .iter()
        .map(|d| d.npred_sig(&fitted, &collection.axes))
        .collect();
    let parameters = fitted
        .all_parameters()
        .into_iter()
        .map(|(name, p)| FittedParameter {
            name,
            value: p.value,
            error: p.error,
            frozen: p.frozen,
        })
        .collect();

    let result = FitResult {
        success: min.converged && min.fval.is_finite(),
        message: min.message,
        n_iter: min.n_iter,
        n_fev: min.n_fev,
        total_stat: min.fval,
        n_bins,
        parameters,
        free_names: fitted.free_names(),
        covariance,
        npred,
        model: fitted.clone(),
    };
    collection.model = Some(fitted);
    Ok(result)
}

/// Push the fit outcome to the report; a failed optimisation is flagged.
pub fn report_fit(result: &FitResult, label: &str, reporter: &mut dyn Reporter) {
    if !result.success {
        reporter.warn(
            STAGE,
            &format!("ERROR IN OPTIMISATION ({label}): {}", result.message),
        );
    }
    reporter.record(STAGE, &format!("{label} model"), &result.model.expression());
    reporter.record(
        STAGE,
        &format!("{label} status"),
        &format!(
            "success={} stat={:.3} bins={} iterations={}",
            result.success, result.total_stat, result.n_bins, result.n_iter
        ),
    );
    for p in &result.parameters {
        let err = p
            .error
            .map(|e| format!(" +/- {e:.4e}"))
            .unwrap_or_default();
        let frozen = if p.frozen { " (frozen)" } else { "" };
        reporter.record(
            STAGE,
            &format!("{label} {}", p.name),
            &format!("{:.4e}{err}{frozen}", p.value),
        );
    }
}
