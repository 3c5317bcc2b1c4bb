//! Reconstructed and true energy binning.

use serde::{Deserialize, Serialize};

use crate::domain::EnergyAxisOptions;
use crate::error::AppError;

/// Log-spaced energy bin edges (TeV).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAxis {
    edges: Vec<f64>,
}

impl EnergyAxis {
    pub fn log_spaced(e_min: f64, e_max: f64, n_bins: usize) -> Result<Self, AppError> {
        if !(e_min.is_finite() && e_max.is_finite() && e_min > 0.0 && e_max > e_min) {
            return Err(AppError::configuration(format!(
                "Invalid energy range [{e_min}, {e_max}] TeV: need 0 < min < max."
            )));
        }
        if n_bins == 0 {
            return Err(AppError::configuration("Energy axis needs at least one bin."));
        }
        let (l0, l1) = (e_min.ln(), e_max.ln());
        let mut edges: Vec<f64> = (0..=n_bins)
            .map(|i| (l0 + (l1 - l0) * i as f64 / n_bins as f64).exp())
            .collect();
        edges[0] = e_min;
        edges[n_bins] = e_max;
        Ok(Self { edges })
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn lo(&self, i: usize) -> f64 {
        self.edges[i]
    }

    pub fn hi(&self, i: usize) -> f64 {
        self.edges[i + 1]
    }

    /// Geometric bin center.
    pub fn center(&self, i: usize) -> f64 {
        (self.edges[i] * self.edges[i + 1]).sqrt()
    }

    pub fn centers(&self) -> Vec<f64> {
        (0..self.n_bins()).map(|i| self.center(i)).collect()
    }

    pub fn e_min(&self) -> f64 {
        self.edges[0]
    }

    pub fn e_max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Bin containing `energy`; the upper edge belongs to no bin.
    pub fn bin_index(&self, energy: f64) -> Option<usize> {
        if !(energy >= self.e_min() && energy < self.e_max()) {
            return None;
        }
        let i = self.edges.partition_point(|&e| e <= energy);
        Some(i - 1)
    }

    /// Width of one bin in `ln E` (bins are log-spaced).
    pub fn log_width(&self) -> f64 {
        (self.e_max() / self.e_min()).ln() / self.n_bins() as f64
    }
}

/// Reconstructed axis plus the wider, finer true-energy axis used for folding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAxes {
    pub reco: EnergyAxis,
    pub true_energy: EnergyAxis,
}

/// Build both axes.
///
/// The true axis spans `[0.5·min, 2·max]` with at least twice the bin count,
/// raised further until its bins are at most half as wide (in `ln E`) as the
/// reconstructed bins.
pub fn build_energy_axes(opts: &EnergyAxisOptions) -> Result<EnergyAxes, AppError> {
    let reco = EnergyAxis::log_spaced(opts.energy_min_tev, opts.energy_max_tev, opts.n_bins)?;

    let (t_min, t_max) = (0.5 * opts.energy_min_tev, 2.0 * opts.energy_max_tev);
    let needed = ((t_max / t_min).ln() / (0.5 * reco.log_width())).ceil() as usize;
    let n_true = (2 * opts.n_bins).max(needed);
    let true_energy = EnergyAxis::log_spaced(t_min, t_max, n_true)?;

    validate_axes(&reco, &true_energy)?;
    Ok(EnergyAxes { reco, true_energy })
}

/// The true axis must strictly contain the reconstructed axis at ≥2× resolution.
pub fn validate_axes(reco: &EnergyAxis, true_energy: &EnergyAxis) -> Result<(), AppError> {
    if !(true_energy.e_min() < reco.e_min() && true_energy.e_max() > reco.e_max()) {
        return Err(AppError::configuration(
            "True-energy axis must strictly contain the reconstructed-energy axis.",
        ));
    }
    if true_energy.log_width() > 0.5 * reco.log_width() * (1.0 + 1e-9) {
        return Err(AppError::configuration(
            "True-energy axis must have at least twice the reconstructed-energy resolution.",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(min: f64, max: f64, n: usize) -> EnergyAxisOptions {
        EnergyAxisOptions {
            energy_min_tev: min,
            energy_max_tev: max,
            n_bins: n,
        }
    }

    #[test]
    fn axes_follow_containment_and_resolution() {
        let axes = build_energy_axes(&opts(0.1, 100.0, 12)).unwrap();
        assert_eq!(axes.reco.n_bins(), 12);
        assert_eq!(axes.true_energy.e_min(), 0.05);
        assert_eq!(axes.true_energy.e_max(), 200.0);
        assert!(axes.true_energy.n_bins() >= 24);
        assert!(axes.true_energy.log_width() <= 0.5 * axes.reco.log_width() * (1.0 + 1e-9));
        assert!((axes.reco.center(0) - (0.1f64 * axes.reco.hi(0)).sqrt()).abs() < 1e-15);
    }

    #[test]
    fn bin_lookup_is_half_open() {
        let axis = EnergyAxis::log_spaced(1.0, 100.0, 2).unwrap();
        assert_eq!(axis.bin_index(1.0), Some(0));
        assert_eq!(axis.bin_index(50.0), Some(1));
        assert_eq!(axis.bin_index(100.0), None);
        assert_eq!(axis.bin_index(0.5), None);
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(build_energy_axes(&opts(1.0, 0.5, 10)).is_err());
        assert!(build_energy_axes(&opts(0.0, 1.0, 10)).is_err());
        assert!(build_energy_axes(&opts(0.1, 1.0, 0)).is_err());
    }
}
