//! Per-run dataset reduction.
//!
//! For each run:
//!
//! 1. bin the on-region events and fold the IRFs onto the shared energy axes
//! 2. estimate the background (reflected regions or ring)
//! 3. optionally apply the safe energy mask
//!
//! Every dataset of a `DatasetCollection` shares one geometry and one pair of
//! energy axes.

use crate::domain::{BackgroundMethod, ReductionOptions, SkyCoord};
use crate::error::AppError;
use crate::geometry::{EnergyAxes, Geometry};
use crate::models::SpectralModel;
use crate::report::Reporter;
use crate::store::{Observation, ObservationSet};

pub mod background;
pub mod dataset;
pub mod safe_mask;

pub use background::*;
pub use dataset::*;
pub use safe_mask::*;

const STAGE: &str = "reduction";

/// Datasets sharing axes, plus the (at most one) joint model attached to all.
#[derive(Debug, Clone)]
pub struct DatasetCollection {
    pub datasets: Vec<SpectrumDatasetOnOff>,
    pub axes: EnergyAxes,
    pub model: Option<SpectralModel>,
}

impl DatasetCollection {
    pub fn new(axes: EnergyAxes) -> Self {
        Self {
            datasets: Vec::new(),
            axes,
            model: None,
        }
    }

    /// Add a dataset; its binning must match the collection axes.
    pub fn push(&mut self, dataset: SpectrumDatasetOnOff) -> Result<(), AppError> {
        let n_reco = self.axes.reco.n_bins();
        let n_true = self.axes.true_energy.n_bins();
        let ok = dataset.counts.len() == n_reco
            && dataset.counts_off.len() == n_reco
            && dataset.alpha.len() == n_reco
            && dataset.mask_safe.len() == n_reco
            && dataset.exposure.len() == n_true
            && dataset.edisp.len() == n_true
            && dataset.edisp.iter().all(|row| row.len() == n_reco);
        if !ok {
            return Err(AppError::numerical(format!(
                "Dataset '{}' does not match the collection energy axes.",
                dataset.name
            )));
        }
        self.datasets.push(dataset);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Summed Wstat of `model` over all datasets.
    pub fn total_stat(&self, model: &SpectralModel) -> f64 {
        self.datasets
            .iter()
            .map(|d| d.stat_sum(&d.npred_sig(model, &self.axes)))
            .sum()
    }

    /// Number of bins taking part in fits.
    pub fn n_fit_bins(&self) -> usize {
        self.datasets
            .iter()
            .map(|d| (0..d.n_bins()).filter(|&i| d.mask(i)).count())
            .sum()
    }
}

/// Builds datasets on a fixed geometry.
pub struct DatasetMaker<'a> {
    geometry: &'a Geometry,
    opts: &'a ReductionOptions,
}

impl<'a> DatasetMaker<'a> {
    pub fn new(geometry: &'a Geometry, opts: &'a ReductionOptions) -> Self {
        Self { geometry, opts }
    }

    /// Reduce one run.
    pub fn make(&self, obs: &Observation, apply_safe_mask: bool) -> SpectrumDatasetOnOff {
        let axes = &self.geometry.axes;
        let reco = &axes.reco;
        let truth = &axes.true_energy;
        let data = &obs.data;
        let record = &obs.record;
        let on_region = self.geometry.on_region.clone();

        let mut counts = vec![0.0; reco.n_bins()];
        for ev in data.events_in_gti() {
            if on_region.contains(&SkyCoord::new(ev.ra, ev.dec)) {
                if let Some(i) = reco.bin_index(ev.energy_tev) {
                    counts[i] += 1.0;
                }
            }
        }

        let exposure: Vec<f64> = (0..truth.n_bins())
            .map(|j| data.aeff.evaluate_cm2(truth.center(j)) * record.livetime_s)
            .collect();
        let edisp: Vec<Vec<f64>> = (0..truth.n_bins())
            .map(|j| {
                (0..reco.n_bins())
                    .map(|i| data.edisp.migration_probability(truth.center(j), reco.lo(i), reco.hi(i)))
                    .collect()
            })
            .collect();

        let bin_of = |e: f64| reco.bin_index(e);
        let mask = &self.geometry.exclusion_mask;
        let estimate = match &self.opts.background {
            BackgroundMethod::ReflectedRegions(o) => reflected_regions_background(
                &on_region,
                record.pointing,
                data.events_in_gti(),
                bin_of,
                reco.n_bins(),
                mask,
                o,
            ),
            BackgroundMethod::RingBackground(o) => {
                ring_background(&on_region, data.events_in_gti(), bin_of, reco.n_bins(), mask, o)
            }
        };

        let mask_safe = if apply_safe_mask {
            make_safe_mask(record, data, axes, &self.opts.safe_mask).mask
        } else {
            vec![true; reco.n_bins()]
        };

        SpectrumDatasetOnOff {
            name: record.obs_id.to_string(),
            obs_id: record.obs_id,
            counts,
            counts_off: estimate.counts_off,
            alpha: vec![estimate.alpha; reco.n_bins()],
            exposure,
            edisp,
            mask_safe,
            livetime_s: record.livetime_s,
            tstart_mjd: record.tstart_mjd,
            tstop_mjd: record.tstop_mjd,
            on_region,
            off_regions: estimate.off_regions,
        }
    }

    /// Reduce every run into a fresh collection.
    pub fn make_collection(
        &self,
        observations: &ObservationSet,
        apply_safe_mask: bool,
        reporter: &mut dyn Reporter,
    ) -> Result<DatasetCollection, AppError> {
        let mut collection = DatasetCollection::new(self.geometry.axes.clone());
        for obs in &observations.observations {
            let ds = self.make(obs, apply_safe_mask);
            if ds.alpha.iter().all(|a| *a <= 0.0) {
                reporter.warn(
                    STAGE,
                    &format!(
                        "Run {}: no usable {} background region; run contributes no bins.",
                        ds.obs_id,
                        self.opts.background.kind().display_name()
                    ),
                );
            }
            if apply_safe_mask {
                let range = ds
                    .safe_energy_range(&self.geometry.axes)
                    .map(|(lo, hi)| format!("{lo:.3} - {hi:.3} TeV"))
                    .unwrap_or_else(|| "empty".to_string());
                reporter.record(STAGE, &format!("run {} safe range", ds.obs_id), &range);
            }
            collection.push(ds)?;
        }
        Ok(collection)
    }
}
