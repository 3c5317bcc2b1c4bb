//! Evaluable spectral models.
//!
//! A `SpectralModel` is one component or the sum of two. Every component keeps
//! its parameters in schema order (see `ModelKind::schema`); the fitter works
//! on the flattened list of free parameters in scaled units
//! (`value / scale`), so amplitudes of order `1e-12` and indices of order 1
//! are conditioned alike.

use serde::{Deserialize, Serialize};

use crate::math::integrate_log_simpson;
use crate::models::{ModelExpr, ModelExprError, ModelKind, ModelOp, ModelParameterConfig};

/// One model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub error: Option<f64>,
    pub frozen: bool,
    pub scale: f64,
    pub min: f64,
    pub max: f64,
}

impl Parameter {
    fn new(name: &str, value: f64) -> Self {
        let scale = if value != 0.0 && value.is_finite() { value.abs() } else { 1.0 };
        Self {
            name: name.to_string(),
            value,
            error: None,
            frozen: false,
            scale,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    fn positive(mut self) -> Self {
        self.min = 1e-6 * self.scale;
        self
    }
}

/// A single named spectral shape with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralComponent {
    pub kind: ModelKind,
    pub parameters: Vec<Parameter>,
}

impl SpectralComponent {
    pub fn from_config(kind: ModelKind, cfg: &ModelParameterConfig) -> Self {
        let parameters = match kind {
            ModelKind::PowerLaw => {
                let p = &cfg.power_law;
                vec![
                    Parameter::new("index", p.index),
                    Parameter::new("amplitude", p.amplitude),
                    Parameter::new("reference", p.reference).frozen(),
                ]
            }
            ModelKind::PowerLawCutOff => {
                let p = &cfg.power_law_cutoff;
                vec![
                    Parameter::new("index", p.index),
                    Parameter::new("amplitude", p.amplitude),
                    Parameter::new("reference", p.reference).frozen(),
                    Parameter::new("alpha", p.alpha).frozen(),
                    Parameter::new("lambda", p.lambda),
                ]
            }
            ModelKind::BrokenPowerLaw => {
                let p = &cfg.broken_power_law;
                vec![
                    Parameter::new("index1", p.index1),
                    Parameter::new("index2", p.index2),
                    Parameter::new("amplitude", p.amplitude),
                    Parameter::new("energy_break", p.energy_break).positive(),
                ]
            }
            ModelKind::LogParabola => {
                let p = &cfg.log_parabola;
                vec![
                    Parameter::new("amplitude", p.amplitude),
                    Parameter::new("reference", p.reference).frozen(),
                    Parameter::new("alpha", p.alpha),
                    Parameter::new("beta", p.beta),
                ]
            }
            ModelKind::SmoothBrokenPowerLaw => {
                let p = &cfg.smooth_broken_power_law;
                vec![
                    Parameter::new("index1", p.index1),
                    Parameter::new("index2", p.index2),
                    Parameter::new("amplitude", p.amplitude),
                    Parameter::new("energy_break", p.energy_break).positive(),
                    Parameter::new("reference", p.reference).frozen(),
                    Parameter::new("beta", p.beta).frozen(),
                ]
            }
        };
        Self { kind, parameters }
    }

    /// Differential flux at `energy` (TeV).
    pub fn dnde(&self, energy: f64) -> f64 {
        let v = |i: usize| self.parameters[i].value;
        match self.kind {
            ModelKind::PowerLaw => {
                let (index, amplitude, reference) = (v(0), v(1), v(2));
                amplitude * (energy / reference).powf(-index)
            }
            ModelKind::PowerLawCutOff => {
                let (index, amplitude, reference, alpha, lambda) = (v(0), v(1), v(2), v(3), v(4));
                amplitude * (energy / reference).powf(-index) * (-(lambda * energy).powf(alpha)).exp()
            }
            ModelKind::BrokenPowerLaw => {
                let (index1, index2, amplitude, ebreak) = (v(0), v(1), v(2), v(3));
                let index = if energy < ebreak { index1 } else { index2 };
                amplitude * (energy / ebreak).powf(-index)
            }
            ModelKind::LogParabola => {
                let (amplitude, reference, alpha, beta) = (v(0), v(1), v(2), v(3));
                let x = energy / reference;
                amplitude * x.powf(-alpha - beta * x.ln())
            }
            ModelKind::SmoothBrokenPowerLaw => {
                let (index1, index2, amplitude, ebreak, reference, beta) =
                    (v(0), v(1), v(2), v(3), v(4), v(5));
                let smooth = 1.0 + (energy / ebreak).powf((index2 - index1) / beta);
                amplitude * (energy / reference).powf(-index1) * smooth.powf(-beta)
            }
        }
    }
}

/// Index of a parameter inside a model: (component, parameter).
pub type ParamRef = (usize, usize);

/// A spectral model attached to a named source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralModel {
    pub source_name: String,
    pub components: Vec<SpectralComponent>,
}

/// Build the spectral model named by `expr` with starting values from `cfg`.
pub fn build_spectral_model(
    expr: &ModelExpr,
    cfg: &ModelParameterConfig,
    source_name: &str,
) -> Result<SpectralModel, ModelExprError> {
    let components = match expr {
        ModelExpr::Single(kind) => vec![SpectralComponent::from_config(*kind, cfg)],
        ModelExpr::Compound {
            left,
            op: ModelOp::Add,
            right,
        } => vec![
            SpectralComponent::from_config(*left, cfg),
            SpectralComponent::from_config(*right, cfg),
        ],
        ModelExpr::Compound { op, .. } => {
            return Err(ModelExprError::Unimplemented { op: op.symbol() });
        }
    };
    Ok(SpectralModel {
        source_name: source_name.to_string(),
        components,
    })
}

impl SpectralModel {
    pub fn dnde(&self, energy: f64) -> f64 {
        self.components.iter().map(|c| c.dnde(energy)).sum()
    }

    /// Integrated flux over `[e_min, e_max]` (TeV).
    pub fn integral(&self, e_min: f64, e_max: f64) -> f64 {
        self.integral_with(e_min, e_max, 64)
    }

    /// Integrated flux with an explicit number of quadrature intervals.
    pub fn integral_with(&self, e_min: f64, e_max: f64, n: usize) -> f64 {
        integrate_log_simpson(|e| self.dnde(e), e_min, e_max, n)
    }

    pub fn expression(&self) -> String {
        self.components
            .iter()
            .map(|c| c.kind.name())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Parameter label; components of a sum are suffixed `_1`, `_2`.
    pub fn label(&self, (c, p): ParamRef) -> String {
        let name = &self.components[c].parameters[p].name;
        if self.components.len() > 1 {
            format!("{name}_{}", c + 1)
        } else {
            name.clone()
        }
    }

    pub fn parameter(&self, (c, p): ParamRef) -> &Parameter {
        &self.components[c].parameters[p]
    }

    /// Every parameter, labelled, in model order.
    pub fn all_parameters(&self) -> Vec<(String, &Parameter)> {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(c, comp)| (0..comp.parameters.len()).map(move |p| (c, p)))
            .map(|r| (self.label(r), self.parameter(r)))
            .collect()
    }

    pub fn free_refs(&self) -> Vec<ParamRef> {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(c, comp)| {
                comp.parameters
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| !p.frozen)
                    .map(move |(p, _)| (c, p))
            })
            .collect()
    }

    pub fn free_names(&self) -> Vec<String> {
        self.free_refs().into_iter().map(|r| self.label(r)).collect()
    }

    pub fn free_values(&self) -> Vec<f64> {
        self.free_refs().into_iter().map(|r| self.parameter(r).value).collect()
    }

    pub fn free_scales(&self) -> Vec<f64> {
        self.free_refs().into_iter().map(|r| self.parameter(r).scale).collect()
    }

    /// Free-parameter bounds in scaled units.
    pub fn free_bounds_scaled(&self) -> Vec<(f64, f64)> {
        self.free_refs()
            .into_iter()
            .map(|r| {
                let p = self.parameter(r);
                (p.min / p.scale, p.max / p.scale)
            })
            .collect()
    }

    pub fn set_free_values(&mut self, values: &[f64]) {
        for (r, &v) in self.free_refs().into_iter().zip(values) {
            self.components[r.0].parameters[r.1].value = v;
        }
    }

    pub fn set_free_errors(&mut self, errors: &[Option<f64>]) {
        for (r, &e) in self.free_refs().into_iter().zip(errors) {
            self.components[r.0].parameters[r.1].error = e;
        }
    }

    /// Copy of the model with the given scaled free-parameter values.
    pub fn with_scaled(&self, scaled: &[f64]) -> SpectralModel {
        let values: Vec<f64> = self
            .free_scales()
            .iter()
            .zip(scaled)
            .map(|(s, x)| s * x)
            .collect();
        let mut m = self.clone();
        m.set_free_values(&values);
        m
    }
}
