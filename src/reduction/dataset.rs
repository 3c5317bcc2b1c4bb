//! One run's reduced on/off spectrum.

use serde::Serialize;

use crate::domain::CircleRegion;
use crate::geometry::EnergyAxes;
use crate::models::SpectralModel;
use crate::stats::wstat;

/// Quadrature intervals per true-energy bin when folding a model.
const FOLD_SUBDIVISIONS: usize = 4;

/// Binned on/off counts with the responses needed to predict signal counts.
///
/// Vectors indexed by `i` run over reconstructed-energy bins, by `j` over
/// true-energy bins. `edisp[j][i]` is the migration probability.
#[derive(Debug, Clone, Serialize)]
pub struct SpectrumDatasetOnOff {
    pub name: String,
    pub obs_id: u64,
    pub counts: Vec<f64>,
    pub counts_off: Vec<f64>,
    /// On/off exposure ratio per reconstructed bin (0 = no background estimate).
    pub alpha: Vec<f64>,
    /// Effective area × livetime per true-energy bin (cm² s).
    pub exposure: Vec<f64>,
    pub edisp: Vec<Vec<f64>>,
    pub mask_safe: Vec<bool>,
    pub livetime_s: f64,
    pub tstart_mjd: f64,
    pub tstop_mjd: f64,
    pub on_region: CircleRegion,
    pub off_regions: Vec<CircleRegion>,
}

impl SpectrumDatasetOnOff {
    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    /// Bins that take part in fits and statistics.
    pub fn mask(&self, i: usize) -> bool {
        self.mask_safe[i] && self.alpha[i] > 0.0
    }

    pub fn background(&self, i: usize) -> f64 {
        self.alpha[i] * self.counts_off[i]
    }

    pub fn excess(&self, i: usize) -> f64 {
        self.counts[i] - self.background(i)
    }

    /// Predicted signal counts per reconstructed bin.
    pub fn npred_sig(&self, model: &SpectralModel, axes: &EnergyAxes) -> Vec<f64> {
        let t = &axes.true_energy;
        let mut out = vec![0.0; self.n_bins()];
        for j in 0..t.n_bins() {
            if self.exposure[j] <= 0.0 {
                continue;
            }
            let flux = model.integral_with(t.lo(j), t.hi(j), FOLD_SUBDIVISIONS);
            let n_true = flux * self.exposure[j];
            for (i, o) in out.iter_mut().enumerate() {
                *o += n_true * self.edisp[j][i];
            }
        }
        out
    }

    /// Total Wstat over masked bins given predicted signal counts.
    pub fn stat_sum(&self, npred: &[f64]) -> f64 {
        (0..self.n_bins())
            .filter(|&i| self.mask(i))
            .map(|i| wstat(self.counts[i], self.counts_off[i], self.alpha[i], npred[i]))
            .sum()
    }

    /// Summed `(counts, counts_off, alpha·counts_off)` over masked bins.
    pub fn masked_totals(&self) -> (f64, f64, f64) {
        (0..self.n_bins())
            .filter(|&i| self.mask(i))
            .fold((0.0, 0.0, 0.0), |(n_on, n_off, bkg), i| {
                (n_on + self.counts[i], n_off + self.counts_off[i], bkg + self.background(i))
            })
    }

    /// Lowest and highest reconstructed-energy edges of the safe range.
    pub fn safe_energy_range(&self, axes: &EnergyAxes) -> Option<(f64, f64)> {
        let first = self.mask_safe.iter().position(|m| *m)?;
        let last = self.mask_safe.iter().rposition(|m| *m)?;
        Some((axes.reco.lo(first), axes.reco.hi(last)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{EnergyAxisOptions, RegionSource, SkyCoord};
    use crate::geometry::build_energy_axes;
    use crate::models::{ModelExpr, ModelKind, ModelParameterConfig, build_spectral_model};

    pub(crate) fn axes() -> EnergyAxes {
        build_energy_axes(&EnergyAxisOptions {
            energy_min_tev: 0.1,
            energy_max_tev: 100.0,
            n_bins: 6,
        })
        .unwrap()
    }

    /// Dataset with a diagonal response and flat exposure.
    pub(crate) fn toy_dataset(axes: &EnergyAxes, counts: Vec<f64>, counts_off: Vec<f64>, alpha: f64) -> SpectrumDatasetOnOff {
        let n = axes.reco.n_bins();
        let t = &axes.true_energy;
        let edisp = (0..t.n_bins())
            .map(|j| {
                let mut row = vec![0.0; n];
                if let Some(i) = axes.reco.bin_index(t.center(j)) {
                    row[i] = 1.0;
                }
                row
            })
            .collect();
        let region = CircleRegion::new(SkyCoord::new(0.0, 0.0), 0.1, RegionSource::On);
        SpectrumDatasetOnOff {
            name: "1".into(),
            obs_id: 1,
            counts,
            counts_off,
            alpha: vec![alpha; n],
            exposure: vec![1e9 * 1800.0; t.n_bins()],
            edisp,
            mask_safe: vec![true; n],
            livetime_s: 1800.0,
            tstart_mjd: 60000.0,
            tstop_mjd: 60000.02,
            on_region: region.clone(),
            off_regions: vec![],
        }
    }

    #[test]
    fn npred_folds_flux_times_exposure() {
        let axes = axes();
        let ds = toy_dataset(&axes, vec![0.0; 6], vec![0.0; 6], 0.2);
        let model =
            build_spectral_model(&ModelExpr::Single(ModelKind::PowerLaw), &ModelParameterConfig::default(), "src")
                .unwrap();
        let npred = ds.npred_sig(&model, &axes);
        let total: f64 = npred.iter().sum();
        let t = &axes.true_energy;
        let expected: f64 = (0..t.n_bins())
            .filter(|&j| axes.reco.bin_index(t.center(j)).is_some())
            .map(|j| model.integral(t.lo(j), t.hi(j)) * 1e9 * 1800.0)
            .sum();
        assert!((total / expected - 1.0).abs() < 1e-4, "{total} vs {expected}");
        assert!(npred[0] > npred[5]);
    }

    #[test]
    fn masked_bins_do_not_contribute() {
        let axes = axes();
        let mut ds = toy_dataset(&axes, vec![10.0; 6], vec![20.0; 6], 0.25);
        let npred = vec![5.0; 6];
        let full = ds.stat_sum(&npred);
        ds.mask_safe[0] = false;
        ds.alpha[1] = 0.0;
        let partial = ds.stat_sum(&npred);
        assert!((partial - full * 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(ds.masked_totals(), (40.0, 80.0, 20.0));
    }
}
