//! Typed parameter records, one per model kind.
//!
//! Units: amplitude in `cm^-2 s^-1 TeV^-1`, energies in TeV, `lambda` in
//! `TeV^-1`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerLawParams {
    pub index: f64,
    pub amplitude: f64,
    pub reference: f64,
}

impl Default for PowerLawParams {
    fn default() -> Self {
        Self {
            index: 2.0,
            amplitude: 1e-12,
            reference: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerLawCutOffParams {
    pub index: f64,
    pub amplitude: f64,
    pub reference: f64,
    pub alpha: f64,
    pub lambda: f64,
}

impl Default for PowerLawCutOffParams {
    fn default() -> Self {
        Self {
            index: 1.5,
            amplitude: 1e-12,
            reference: 1.0,
            alpha: 1.0,
            lambda: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokenPowerLawParams {
    pub index1: f64,
    pub index2: f64,
    pub amplitude: f64,
    pub energy_break: f64,
}

impl Default for BrokenPowerLawParams {
    fn default() -> Self {
        Self {
            index1: 2.0,
            index2: 2.0,
            amplitude: 1e-12,
            energy_break: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogParabolaParams {
    pub amplitude: f64,
    pub reference: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl Default for LogParabolaParams {
    fn default() -> Self {
        Self {
            amplitude: 1e-12,
            reference: 1.0,
            alpha: 2.0,
            beta: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothBrokenPowerLawParams {
    pub index1: f64,
    pub index2: f64,
    pub amplitude: f64,
    pub energy_break: f64,
    pub reference: f64,
    pub beta: f64,
}

impl Default for SmoothBrokenPowerLawParams {
    fn default() -> Self {
        Self {
            index1: 2.0,
            index2: 2.0,
            amplitude: 1e-12,
            energy_break: 1.0,
            reference: 1.0,
            beta: 1.0,
        }
    }
}

/// Starting values for every model kind.
///
/// Only the records of the kinds named in the model expression are used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameterConfig {
    pub power_law: PowerLawParams,
    pub power_law_cutoff: PowerLawCutOffParams,
    pub broken_power_law: BrokenPowerLawParams,
    pub log_parabola: LogParabolaParams,
    pub smooth_broken_power_law: SmoothBrokenPowerLawParams,
}
