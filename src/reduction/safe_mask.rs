//! Safe energy range.
//!
//! A reconstructed bin is kept only if it passes every criterion:
//!
//! - offset-max: the target lies within `offset_max` of the pointing
//! - aeff-max: the bin center is above the lowest true energy whose effective
//!   area reaches `aeff_percent` of the peak
//! - edisp-bias: the bin center is above the lowest true energy whose
//!   absolute bias is at most `bias_percent`

use crate::domain::{ObservationRecord, SafeMaskOptions};
use crate::geometry::EnergyAxes;
use crate::store::RunData;

/// Safe mask plus the thresholds that produced it (for the report).
#[derive(Debug, Clone)]
pub struct SafeMask {
    pub mask: Vec<bool>,
    pub offset_deg: f64,
    pub aeff_threshold_tev: Option<f64>,
    pub bias_threshold_tev: Option<f64>,
}

pub fn make_safe_mask(
    record: &ObservationRecord,
    data: &RunData,
    axes: &EnergyAxes,
    opts: &SafeMaskOptions,
) -> SafeMask {
    let n = axes.reco.n_bins();
    let offset_deg = record.pointing_offset_deg();
    let aeff_threshold_tev = aeff_energy_threshold(data, axes, opts.aeff_percent);
    let bias_threshold_tev = bias_energy_threshold(data, axes, opts.bias_percent);

    let mask = if offset_deg > opts.offset_max_deg {
        vec![false; n]
    } else {
        (0..n)
            .map(|i| {
                let e = axes.reco.center(i);
                let above = |t: Option<f64>| t.is_some_and(|t| e >= t);
                above(aeff_threshold_tev) && above(bias_threshold_tev)
            })
            .collect()
    };

    SafeMask {
        mask,
        offset_deg,
        aeff_threshold_tev,
        bias_threshold_tev,
    }
}

/// Lowest true-energy bin center where the effective area exceeds the given
/// percentage of its peak on the true axis.
pub fn aeff_energy_threshold(data: &RunData, axes: &EnergyAxes, percent: f64) -> Option<f64> {
    let centers = axes.true_energy.centers();
    let areas: Vec<f64> = centers.iter().map(|&e| data.aeff.evaluate_cm2(e)).collect();
    let peak = areas.iter().copied().fold(0.0, f64::max);
    if peak <= 0.0 {
        return None;
    }
    let limit = percent / 100.0 * peak;
    centers
        .iter()
        .zip(&areas)
        .find(|(_, a)| **a > limit)
        .map(|(e, _)| *e)
}

/// Lowest true-energy bin center with `|bias| <= percent`.
pub fn bias_energy_threshold(data: &RunData, axes: &EnergyAxes, percent: f64) -> Option<f64> {
    let limit = percent / 100.0;
    axes.true_energy
        .centers()
        .into_iter()
        .find(|&e| data.edisp.bias_at(e).abs() <= limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SkyCoord;
    use crate::reduction::dataset::tests::axes;
    use crate::store::{EffectiveAreaTable, EnergyDispersionTable};

    fn run(offset: f64) -> (ObservationRecord, RunData) {
        let target = SkyCoord::new(10.0, 20.0);
        let record = ObservationRecord {
            obs_id: 1,
            object: "x".into(),
            tstart_mjd: 0.0,
            tstop_mjd: 0.1,
            livetime_s: 1.0,
            ontime_s: 1.0,
            deadc: 1.0,
            pointing: target.offset_by(0.0, offset),
            target,
        };
        let data = RunData {
            obs_id: 1,
            events: vec![],
            gtis: vec![],
            rad_max_deg: None,
            aeff: EffectiveAreaTable {
                energy_tev: vec![0.05, 0.3, 1.0, 200.0],
                area_m2: vec![1.0, 1e3, 1e5, 1e5],
            },
            edisp: EnergyDispersionTable {
                energy_tev: vec![0.05, 0.5, 1.0, 200.0],
                bias: vec![0.5, 0.2, 0.0, 0.0],
                resolution: vec![0.2; 4],
            },
        };
        (record, data)
    }

    #[test]
    fn thresholds_cut_low_energy_bins() {
        let axes = axes();
        let (record, data) = run(0.5);
        let safe = make_safe_mask(&record, &data, &axes, &SafeMaskOptions::default());
        let aeff_t = safe.aeff_threshold_tev.unwrap();
        let bias_t = safe.bias_threshold_tev.unwrap();
        assert!(aeff_t > 0.3 && aeff_t < 1.0, "{aeff_t}");
        assert!(bias_t > 0.5 && bias_t <= 1.2, "{bias_t}");
        let t = aeff_t.max(bias_t);
        for (i, m) in safe.mask.iter().enumerate() {
            assert_eq!(*m, axes.reco.center(i) >= t);
        }
        assert!(!safe.mask[0] && *safe.mask.last().unwrap());
    }

    #[test]
    fn large_offset_masks_everything() {
        let axes = axes();
        let (record, data) = run(2.0);
        let safe = make_safe_mask(&record, &data, &axes, &SafeMaskOptions::default());
        assert!(safe.mask.iter().all(|m| !m));
    }
}
